//! `VoltageEMS` basic library
//!
//! Service plumbing shared by the VoltageEMS binaries:
//! - logging setup with runtime level changes
//! - layered configuration loading
//! - shutdown signal handling
//! - common command-line arguments

pub mod bootstrap_args;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod shutdown;

pub use error::{Error, Result};
