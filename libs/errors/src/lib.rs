//! Unified error handling for VoltageEMS services
//!
//! Libraries keep their own domain error types and implement
//! [`VoltageErrorTrait`] for a common outward-facing interface. Binaries
//! return [`VoltageResult`] from `main`.

use thiserror::Error;

// ============================================================================
// VoltageError - Main error type
// ============================================================================

/// Top-level error for VoltageEMS service binaries
#[derive(Debug, Error)]
pub enum VoltageError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ======================================
    // Calculation & Processing Errors
    // ======================================
    #[error("Calculation error: {0}")]
    Calculation(String),

    #[error("Processing error: {0}")]
    Processing(String),

    // ======================================
    // Lookup Errors
    // ======================================
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    // ======================================
    // Service & Runtime Errors
    // ======================================
    #[error("Service startup failed: {0}")]
    StartupFailed(String),
}

/// Result type alias using VoltageError
pub type VoltageResult<T> = Result<T, VoltageError>;

impl VoltageErrorTrait for VoltageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Calculation(_) => "CALCULATION_ERROR",
            Self::Processing(_) => "PROCESSING_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::StartupFailed(_) => "STARTUP_FAILED",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Calculation(_) | Self::Processing(_) => ErrorCategory::Calculation,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyExists(_) => ErrorCategory::Conflict,
            Self::StartupFailed(_) => ErrorCategory::Internal,
        }
    }
}

// ============================================================================
// VoltageEMS Error Trait - Architectural layer
// ============================================================================

/// Error category enum - used for classification and log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    // Infrastructure layer
    Configuration,

    // Business logic layer
    NotFound,
    Conflict,

    // Device refresh and calculation
    Device,
    Calculation,

    // System level
    Internal,
}

/// Common interface for the domain error types of VoltageEMS libraries
pub trait VoltageErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Stable error code for logs and monitoring
    fn error_code(&self) -> &'static str;

    fn category(&self) -> ErrorCategory;

    /// Whether the failed operation may succeed when retried
    fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Device)
    }

    /// Level the error should be logged at
    fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Internal => Level::ERROR,
            ErrorCategory::NotFound => Level::INFO,
            _ => Level::WARN,
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            VoltageError::Configuration("x".into()).category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            VoltageError::NotFound {
                resource: "device".into()
            }
            .error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            VoltageError::StartupFailed("x".into()).log_level(),
            tracing::Level::ERROR
        );
    }

    #[test]
    fn test_error_retryable() {
        assert!(!VoltageError::Configuration("x".into()).is_retryable());
        assert!(!VoltageError::StartupFailed("x".into()).is_retryable());
    }
}
