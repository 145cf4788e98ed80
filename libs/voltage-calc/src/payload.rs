//! Declarative element payloads
//!
//! Elements are created from JSON-shaped payloads such as:
//!
//! ```json
//! {
//!   "type": "increaseElement",
//!   "name": "Energy increase",
//!   "sampleTime": 10,
//!   "variableId": "energy_total",
//!   "factor": 0.001,
//!   "calculationInterval": 900,
//!   "overflow": 4294967296
//! }
//! ```
//!
//! Every field is optional at the serde level so that validation can name the
//! field that is missing instead of failing with a generic decode error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CalcError, Result};

/// The four calculation algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementType {
    SumElement,
    FactorElement,
    AverageElement,
    IncreaseElement,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SumElement => "sumElement",
            Self::FactorElement => "factorElement",
            Self::AverageElement => "averageElement",
            Self::IncreaseElement => "increaseElement",
        }
    }
}

impl FromStr for ElementType {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sumElement" => Ok(Self::SumElement),
            "factorElement" => Ok(Self::FactorElement),
            "averageElement" => Ok(Self::AverageElement),
            "increaseElement" => Ok(Self::IncreaseElement),
            other => Err(CalcError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{id, factor}` entry of a sum element's plus/minus set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableFactor {
    pub id: String,
    pub factor: f64,
}

impl VariableFactor {
    pub fn new(id: impl Into<String>, factor: f64) -> Self {
        Self {
            id: id.into(),
            factor,
        }
    }
}

/// Construction payload shared by all element types
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementPayload {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_sample_time: Option<i64>,

    // Per-type fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation_interval: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overflow: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plus_variables: Option<Vec<VariableFactor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minus_variables: Option<Vec<VariableFactor>>,
}

impl ElementPayload {
    pub fn new(element_type: ElementType, name: impl Into<String>) -> Self {
        Self {
            element_type: Some(element_type.as_str().to_string()),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Declared element type
    pub fn parsed_type(&self) -> Result<ElementType> {
        self.element_type
            .as_deref()
            .ok_or(CalcError::missing_field("element", "type"))?
            .parse()
    }

    pub fn with_variable(mut self, variable_id: impl Into<String>, factor: f64) -> Self {
        self.variable_id = Some(variable_id.into());
        self.factor = Some(factor);
        self
    }

    pub fn with_sample_time(mut self, sample_time: i64) -> Self {
        self.sample_time = Some(sample_time);
        self
    }

    pub fn with_calculation_interval(mut self, interval: i64) -> Self {
        self.calculation_interval = Some(interval);
        self
    }

    pub fn with_overflow(mut self, overflow: f64) -> Self {
        self.overflow = Some(overflow);
        self
    }
}

/// Unwrap a required payload field or name it in the error
pub(crate) fn require<T: Clone>(
    value: &Option<T>,
    element: ElementType,
    field: &'static str,
) -> Result<T> {
    value
        .clone()
        .ok_or(CalcError::missing_field(element.as_str(), field))
}

pub(crate) fn require_finite(value: f64, field: &'static str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CalcError::invalid_field(field, "must be a finite number"))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_camel_case_fields() {
        let payload = ElementPayload::from_json(json!({
            "type": "averageElement",
            "name": "Mean power",
            "sampleTime": 5,
            "variableId": "p",
            "factor": 2.0,
            "calculationInterval": 60,
            "archiveSampleTime": 60
        }))
        .unwrap();

        assert_eq!(payload.parsed_type().unwrap(), ElementType::AverageElement);
        assert_eq!(payload.sample_time, Some(5));
        assert_eq!(payload.variable_id.as_deref(), Some("p"));
        assert_eq!(payload.calculation_interval, Some(60));
        assert_eq!(payload.archive_sample_time, Some(60));
        assert_eq!(payload.overflow, None);
    }

    #[test]
    fn test_unknown_and_missing_type() {
        let payload = ElementPayload::from_json(json!({"type": "medianElement"})).unwrap();
        assert!(matches!(
            payload.parsed_type(),
            Err(CalcError::UnknownType(t)) if t == "medianElement"
        ));

        let payload = ElementPayload::from_json(json!({"name": "x"})).unwrap();
        assert!(matches!(
            payload.parsed_type(),
            Err(CalcError::MissingField { field: "type", .. })
        ));
    }

    #[test]
    fn test_payload_serialization_skips_unset_fields() {
        let payload = ElementPayload::new(ElementType::FactorElement, "Scaled").with_variable("v", 3.0);
        let value = payload.to_json().unwrap();
        assert_eq!(
            value,
            json!({"type": "factorElement", "name": "Scaled", "variableId": "v", "factor": 3.0})
        );
    }
}
