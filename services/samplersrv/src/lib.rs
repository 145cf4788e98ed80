//! Sampler service (`samplersrv`)
//!
//! Drives device refreshes from a one-second logical clock. Devices host
//! calculation elements from `voltage-calc`, fed by their variables and
//! archived on their own schedule.
//!
//! ```text
//! wall clock ──► Sampler ──tick──► refresh groups (concurrent)
//!                                   └─► devices (sequential)
//!                                        └─► CalcDevice: read ► evaluate ► archive
//! ```

pub mod calc_device;
pub mod config;
pub mod device;
pub mod error;
pub mod sampler;

pub use calc_device::{
    ArchiveRecord, ArchiveSink, CalcDevice, MemoryArchive, TracingArchive, VariableReader,
};
pub use config::{DeviceConfig, LoggingConfig, SamplerConfig, ServiceConfig, SERVICE_NAME};
pub use device::{partition_groups, Device, DeviceRegistry, RefreshGroup, SharedDevice};
pub use error::{Result, SamplerError};
pub use sampler::{Sampler, TickEvent};
