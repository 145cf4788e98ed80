//! Error types for voltage-calc

use thiserror::Error;

/// Calculation element errors
#[derive(Debug, Error)]
pub enum CalcError {
    #[error("Missing required field '{field}' in {element} payload")]
    MissingField {
        element: &'static str,
        field: &'static str,
    },

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Variable not found: {0}")]
    VariableNotFound(String),

    #[error("Unknown calculation element type: {0}")]
    UnknownType(String),

    #[error("Variable '{id}' appears more than once in {set}")]
    DuplicateVariable { id: String, set: &'static str },

    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

impl CalcError {
    pub fn missing_field(element: &'static str, field: &'static str) -> Self {
        Self::MissingField { element, field }
    }

    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    pub fn variable_not_found(id: impl Into<String>) -> Self {
        Self::VariableNotFound(id.into())
    }
}

pub type Result<T> = std::result::Result<T, CalcError>;
