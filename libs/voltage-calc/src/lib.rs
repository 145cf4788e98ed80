//! voltage-calc - Calculation elements for VoltageEMS sampling
//!
//! Turns the instantaneous value of device variables into time-aware derived
//! metrics, evaluated on the sampler's logical clock.
//!
//! # Elements
//!
//! | Type | Payload fields | Result |
//! |------|----------------|--------|
//! | `sumElement` | `plusVariables`, `minusVariables` | Signed weighted sum, every evaluation |
//! | `factorElement` | `variableId`, `factor` | `factor · value`, every evaluation |
//! | `averageElement` | `variableId`, `factor`, `calculationInterval` | Time-weighted average per closed period |
//! | `increaseElement` | `variableId`, `factor`, `calculationInterval`, `overflow` | Counter increase per closed period |
//!
//! Common fields: `id` (generated when absent), `name` (required),
//! `sampleTime` (default 1), `unit`, `archived`, `archiveSampleTime`
//! (default `sampleTime`).
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use serde_json::json;
//! use voltage_calc::{CalculationElement, TickNumber, VariableValue};
//!
//! let mut vars = HashMap::new();
//! vars.insert("p1".to_string(), VariableValue::Number(100.0));
//! vars.insert("p2".to_string(), VariableValue::Number(40.0));
//!
//! let mut net = CalculationElement::from_json(
//!     json!({
//!         "type": "sumElement",
//!         "name": "Net power",
//!         "plusVariables": [{"id": "p1", "factor": 1.0}],
//!         "minusVariables": [{"id": "p2", "factor": 1.0}]
//!     }),
//!     &vars,
//! )
//! .unwrap();
//!
//! assert_eq!(net.refresh(TickNumber::new(1), &vars).unwrap(), Some(60.0));
//! // Ticks that are not newer than the last one are ignored
//! assert_eq!(net.refresh(TickNumber::new(1), &vars).unwrap(), None);
//! ```

pub mod average;
pub mod element;
pub mod error;
pub mod factor;
pub mod increase;
pub mod payload;
pub mod period;
pub mod sum;
pub mod tick;
pub mod variable;

// Re-exports for convenience
pub use average::{calculate_average, AverageElement, Sample};
pub use element::{Calculation, CalculationElement, ElementKind, ElementRefreshed};
pub use error::{CalcError, Result};
pub use factor::FactorElement;
pub use increase::{IncreaseElement, IncreaseState};
pub use payload::{ElementPayload, ElementType, VariableFactor};
pub use period::Period;
pub use sum::SumElement;
pub use tick::{SampleInterval, TickNumber};
pub use variable::{Variable, VariableSource, VariableTable, VariableValue};
