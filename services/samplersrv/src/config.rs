//! Service configuration
//!
//! ```yaml
//! sampler:
//!   clock_interval_ms: 100
//! logging:
//!   level: info
//!   dir: logs
//! devices:
//!   - id: meter-1
//!     refresh_group: rs485-1
//!     variables:
//!       - { id: p_import, name: Import power, initial: 0.0 }
//!     elements:
//!       - { type: factorElement, name: Power kW, variableId: p_import, factor: 0.001 }
//! ```
//!
//! Any key can be overridden through `SAMPLERSRV_*` environment variables,
//! with `__` separating nested keys.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use voltage_calc::{ElementPayload, SampleInterval, Variable, VariableValue};

use crate::calc_device::{ArchiveSink, CalcDevice, VariableReader};
use crate::error::{Result, SamplerError};

pub const SERVICE_NAME: &str = "samplersrv";

/// Scheduler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Wall-clock polling period; must be well under one second
    pub clock_interval_ms: u64,
    /// Buffered tick events per subscriber
    pub tick_channel_capacity: usize,
    /// How long shutdown waits for the in-flight tick
    pub shutdown_grace_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            clock_interval_ms: 100,
            tick_channel_capacity: 64,
            shutdown_grace_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Log directory; `VOLTAGE_LOG_DIR` takes precedence
    pub dir: Option<PathBuf>,
    pub json: bool,
    /// Write the daily log file
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            json: false,
            file: true,
        }
    }
}

impl LoggingConfig {
    /// Directory for the daily log file, `None` when file logging is off
    pub fn log_dir(&self) -> Option<PathBuf> {
        if !self.file {
            return None;
        }
        std::env::var("VOLTAGE_LOG_DIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.dir.clone())
            .or_else(|| Some(PathBuf::from("logs")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sample_time: SampleInterval,
    #[serde(default)]
    pub initial: VariableValue,
}

impl VariableConfig {
    fn to_variable(&self) -> Variable {
        Variable::new(&self.id, self.name.clone().unwrap_or_else(|| self.id.clone()))
            .with_sample_time(self.sample_time)
            .with_value(self.initial)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Defaults to the device id
    #[serde(default)]
    pub refresh_group: Option<String>,
    #[serde(default)]
    pub special: bool,
    #[serde(default)]
    pub variables: Vec<VariableConfig>,
    #[serde(default)]
    pub elements: Vec<ElementPayload>,
}

impl DeviceConfig {
    pub fn refresh_group(&self) -> &str {
        self.refresh_group.as_deref().unwrap_or(&self.id)
    }

    /// Build the device with its variables and elements
    pub fn build(
        &self,
        reader: Option<Arc<dyn VariableReader>>,
        archive: Option<Arc<dyn ArchiveSink>>,
    ) -> Result<CalcDevice> {
        let mut device = CalcDevice::new(&self.id, self.name.as_deref().unwrap_or(&self.id))
            .with_refresh_group(self.refresh_group())
            .with_special(self.special);
        if let Some(reader) = reader {
            device = device.with_reader(reader);
        }
        if let Some(archive) = archive {
            device = device.with_archive(archive);
        }

        for variable in &self.variables {
            device.add_variable(variable.to_variable());
        }
        for payload in &self.elements {
            device.add_element(payload).map_err(|e| {
                SamplerError::config(format!("device '{}': {}", self.id, e))
            })?;
        }
        Ok(device)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub sampler: SamplerConfig,
    pub logging: LoggingConfig,
    pub devices: Vec<DeviceConfig>,
}

impl ServiceConfig {
    /// Load from defaults, the optional file and `SAMPLERSRV_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = common::config_loader::load_config(path, SERVICE_NAME)?;
        Ok(config)
    }

    /// Log a summary of the loaded configuration
    ///
    /// Loading runs before the subscriber exists, so the summary is emitted
    /// separately once logging is up.
    pub fn log_summary(&self) {
        let elements: usize = self.devices.iter().map(|d| d.elements.len()).sum();
        info!(
            devices = self.devices.len(),
            elements,
            clock_interval_ms = self.sampler.clock_interval_ms,
            "Configuration loaded"
        );
    }

    pub fn validate(&self) -> Result<()> {
        if self.sampler.clock_interval_ms == 0 {
            return Err(SamplerError::config("sampler.clock_interval_ms must be positive"));
        }
        if self.sampler.clock_interval_ms >= 1000 {
            return Err(SamplerError::config(
                "sampler.clock_interval_ms must be below 1000 or ticks are skipped",
            ));
        }
        if self.sampler.tick_channel_capacity == 0 {
            return Err(SamplerError::config(
                "sampler.tick_channel_capacity must be positive",
            ));
        }

        let mut device_ids = HashSet::new();
        for device in &self.devices {
            if device.id.trim().is_empty() {
                return Err(SamplerError::config("device id must not be empty"));
            }
            if !device_ids.insert(device.id.as_str()) {
                return Err(SamplerError::config(format!(
                    "duplicate device id '{}'",
                    device.id
                )));
            }

            let mut variable_ids = HashSet::new();
            for variable in &device.variables {
                if !variable_ids.insert(variable.id.as_str()) {
                    return Err(SamplerError::config(format!(
                        "device '{}': duplicate variable id '{}'",
                        device.id, variable.id
                    )));
                }
            }

            // Builds every element against the device variables
            device.build(None, None)?;
        }
        Ok(())
    }

    /// Build every configured device, sharing `reader` and `archive`
    pub fn build_devices(
        &self,
        reader: Option<Arc<dyn VariableReader>>,
        archive: Option<Arc<dyn ArchiveSink>>,
    ) -> Result<Vec<Arc<CalcDevice>>> {
        self.devices
            .iter()
            .map(|device| {
                device
                    .build(reader.clone(), archive.clone())
                    .map(Arc::new)
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::device::Device;
    use tracing_test::traced_test;

    fn parse(yaml: &str) -> ServiceConfig {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        std::io::Write::write_all(&mut file, yaml.as_bytes()).unwrap();
        ServiceConfig::load(Some(file.path())).unwrap()
    }

    const METER: &str = r#"
devices:
  - id: meter-1
    refresh_group: bus-1
    variables:
      - { id: p_import, name: Import power, initial: 120.0 }
      - { id: p_export, initial: 20.0, sample_time: 5 }
    elements:
      - type: sumElement
        id: net
        name: Net power
        plusVariables: [{ id: p_import, factor: 1.0 }]
        minusVariables: [{ id: p_export, factor: 1.0 }]
  - id: meter-2
    special: true
"#;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.sampler.clock_interval_ms, 100);
        assert_eq!(config.sampler.tick_channel_capacity, 64);
        assert_eq!(config.sampler.shutdown_grace_ms, 5000);
        assert_eq!(config.logging.level, "info");
        assert!(config.devices.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_load_and_build() {
        let config = parse(METER);
        config.validate().unwrap();

        assert_eq!(config.devices[0].refresh_group(), "bus-1");
        assert_eq!(config.devices[1].refresh_group(), "meter-2");
        assert_eq!(config.devices[0].variables[1].sample_time, SampleInterval::new(5));

        let devices = config.build_devices(None, None).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].refresh_group_id(), "bus-1");
        assert!(devices[1].is_special());
        assert_eq!(devices[0].element_ids(), vec!["net"]);
        assert_eq!(
            devices[0].variable_value("p_import"),
            Some(VariableValue::Number(120.0))
        );
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        let mut config = parse(METER);
        config.sampler.clock_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = parse(METER);
        let duplicate = config.devices[0].clone();
        config.devices.push(duplicate);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate device id"));

        let mut config = parse(METER);
        let variable = config.devices[0].variables[0].clone();
        config.devices[0].variables.push(variable);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate variable id"));

        let mut config = parse(METER);
        config.devices[0].elements[0].plus_variables =
            Some(vec![voltage_calc::VariableFactor::new("ghost", 1.0)]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    #[traced_test]
    fn test_log_summary() {
        let config = parse(METER);
        config.log_summary();
        assert!(logs_contain("Configuration loaded"));
        assert!(logs_contain("devices=2"));
        assert!(logs_contain("elements=1"));
    }

    #[test]
    fn test_log_dir_disabled() {
        let logging = LoggingConfig {
            file: false,
            ..Default::default()
        };
        assert_eq!(logging.log_dir(), None);
    }
}
