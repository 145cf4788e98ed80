//! Error handling for the sampler service

use errors::{ErrorCategory, VoltageError, VoltageErrorTrait};
use thiserror::Error;
use voltage_calc::CalcError;

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Element not found: {device}/{element}")]
    ElementNotFound { device: String, element: String },

    #[error("Element already exists: {device}/{element}")]
    DuplicateElement { device: String, element: String },

    /// Device-level refresh failure; reported in the tick outcome
    #[error("Device {device} refresh failed: {reason}")]
    Refresh { device: String, reason: String },

    #[error("Variable read failed: {0}")]
    VariableRead(String),

    #[error("Archive failed: {0}")]
    Archive(String),

    #[error("Calculation error: {0}")]
    Calc(#[from] CalcError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SamplerError>;

impl SamplerError {
    pub fn refresh(device: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Refresh {
            device: device.into(),
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn element_not_found(device: impl Into<String>, element: impl Into<String>) -> Self {
        Self::ElementNotFound {
            device: device.into(),
            element: element.into(),
        }
    }
}

impl From<common::Error> for SamplerError {
    fn from(err: common::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl VoltageErrorTrait for SamplerError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Self::ElementNotFound { .. } => "ELEMENT_NOT_FOUND",
            Self::DuplicateElement { .. } => "DUPLICATE_ELEMENT",
            Self::Refresh { .. } => "DEVICE_REFRESH_FAILED",
            Self::VariableRead(_) => "VARIABLE_READ_FAILED",
            Self::Archive(_) => "ARCHIVE_FAILED",
            Self::Calc(_) => "CALCULATION_ERROR",
            Self::Config(_) => "CONFIGURATION_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::DeviceNotFound(_) | Self::ElementNotFound { .. } => ErrorCategory::NotFound,
            Self::DuplicateElement { .. } => ErrorCategory::Conflict,
            Self::Refresh { .. } | Self::VariableRead(_) | Self::Archive(_) => {
                ErrorCategory::Device
            },
            Self::Calc(_) => ErrorCategory::Calculation,
            Self::Config(_) => ErrorCategory::Configuration,
        }
    }
}

impl From<SamplerError> for VoltageError {
    fn from(err: SamplerError) -> Self {
        match err {
            SamplerError::DeviceNotFound(id) => VoltageError::NotFound {
                resource: format!("Device: {}", id),
            },
            SamplerError::ElementNotFound { device, element } => VoltageError::NotFound {
                resource: format!("Element: {}/{}", device, element),
            },
            SamplerError::DuplicateElement { device, element } => {
                VoltageError::AlreadyExists(format!("Element: {}/{}", device, element))
            },
            SamplerError::Config(msg) => VoltageError::Configuration(msg),
            SamplerError::Calc(e) => VoltageError::Calculation(e.to_string()),
            other @ (SamplerError::Refresh { .. }
            | SamplerError::VariableRead(_)
            | SamplerError::Archive(_)) => VoltageError::Processing(other.to_string()),
        }
    }
}
