//! Device abstraction and registry
//!
//! A device is anything the sampler refreshes once per tick. Devices that
//! share a refresh group (for example a serial bus or a single TCP gateway)
//! are refreshed one after another; different groups run concurrently.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use voltage_calc::TickNumber;

use crate::error::{Result, SamplerError};

#[async_trait]
pub trait Device: Send + Sync {
    /// Unique device id
    fn id(&self) -> &str;

    /// Devices with the same group id are never refreshed concurrently
    fn refresh_group_id(&self) -> &str {
        self.id()
    }

    /// Special devices refresh after every normal device of the same tick
    fn is_special(&self) -> bool {
        false
    }

    /// Sample inputs, evaluate and archive for `tick`
    async fn refresh(&self, tick: TickNumber) -> Result<()>;
}

pub type SharedDevice = Arc<dyn Device>;

/// Devices refreshed sequentially within one tick
#[derive(Clone)]
pub struct RefreshGroup {
    pub id: String,
    pub devices: Vec<SharedDevice>,
}

impl fmt::Debug for RefreshGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshGroup")
            .field("id", &self.id)
            .field(
                "devices",
                &self.devices.iter().map(|d| d.id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Group `devices` by refresh group, keeping registration order within and
/// across groups
pub fn partition_groups(devices: &[SharedDevice]) -> Vec<RefreshGroup> {
    let mut groups: Vec<RefreshGroup> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for device in devices {
        let group_id = device.refresh_group_id();
        match index.get(group_id) {
            Some(&i) => groups[i].devices.push(Arc::clone(device)),
            None => {
                index.insert(group_id, groups.len());
                groups.push(RefreshGroup {
                    id: group_id.to_string(),
                    devices: vec![Arc::clone(device)],
                });
            },
        }
    }
    groups
}

/// Registered devices in registration order
#[derive(Default)]
pub struct DeviceRegistry {
    devices: Vec<SharedDevice>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `device`, replacing (in place) a device with the same id
    pub fn add(&mut self, device: SharedDevice) -> Option<SharedDevice> {
        match self.devices.iter_mut().find(|d| d.id() == device.id()) {
            Some(slot) => Some(std::mem::replace(slot, device)),
            None => {
                self.devices.push(device);
                None
            },
        }
    }

    pub fn remove(&mut self, id: &str) -> Result<SharedDevice> {
        let pos = self
            .devices
            .iter()
            .position(|d| d.id() == id)
            .ok_or_else(|| SamplerError::DeviceNotFound(id.to_string()))?;
        Ok(self.devices.remove(pos))
    }

    pub fn get(&self, id: &str) -> Option<SharedDevice> {
        self.devices.iter().find(|d| d.id() == id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.iter().any(|d| d.id() == id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.id().to_string()).collect()
    }

    /// Point-in-time copy for one tick
    pub fn snapshot(&self) -> Vec<SharedDevice> {
        self.devices.clone()
    }
}
