//! Device variables read by calculation elements
//!
//! Variables belong to a device. Elements never hold on to them; they look
//! values up through [`VariableSource`] each time they are evaluated.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{CalcError, Result};
use crate::tick::{SampleInterval, TickNumber};

/// Instantaneous value of a variable
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Bool(bool),
    Number(f64),
}

impl VariableValue {
    /// Numeric view, booleans coerce to 1/0
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Bool(true) => 1.0,
            Self::Bool(false) => 0.0,
            Self::Number(n) => n,
        }
    }
}

impl Default for VariableValue {
    fn default() -> Self {
        Self::Number(0.0)
    }
}

impl From<f64> for VariableValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for VariableValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Read access to the variables of one device
pub trait VariableSource {
    fn value_of(&self, id: &str) -> Option<VariableValue>;

    fn contains(&self, id: &str) -> bool {
        self.value_of(id).is_some()
    }
}

impl VariableSource for HashMap<String, VariableValue> {
    fn value_of(&self, id: &str) -> Option<VariableValue> {
        self.get(id).copied()
    }
}

/// Look up a variable and coerce it to a number
pub(crate) fn numeric_value(vars: &dyn VariableSource, id: &str) -> Result<f64> {
    vars.value_of(id)
        .map(VariableValue::as_f64)
        .ok_or_else(|| CalcError::variable_not_found(id))
}

/// A device variable with its last known value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sample_time: SampleInterval,
    #[serde(default)]
    pub value: VariableValue,
    /// Tick of the last successful read, `None` until first read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<TickNumber>,
}

impl Variable {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            sample_time: SampleInterval::DEFAULT,
            value: VariableValue::default(),
            updated_at: None,
        }
    }

    pub fn with_sample_time(mut self, sample_time: SampleInterval) -> Self {
        self.sample_time = sample_time;
        self
    }

    pub fn with_value(mut self, value: impl Into<VariableValue>) -> Self {
        self.value = value.into();
        self
    }
}

/// Variables owned by a device, keyed by id
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    variables: BTreeMap<String, Variable>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a variable, returning the previous one
    pub fn insert(&mut self, variable: Variable) -> Option<Variable> {
        self.variables.insert(variable.id.clone(), variable)
    }

    pub fn remove(&mut self, id: &str) -> Option<Variable> {
        self.variables.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Variable> {
        self.variables.get(id)
    }

    pub fn set_value(
        &mut self,
        id: &str,
        value: impl Into<VariableValue>,
        tick: Option<TickNumber>,
    ) -> Result<()> {
        let variable = self
            .variables
            .get_mut(id)
            .ok_or_else(|| CalcError::variable_not_found(id))?;
        variable.value = value.into();
        if tick.is_some() {
            variable.updated_at = tick;
        }
        Ok(())
    }

    /// Ids of the variables whose sample time matches `tick`
    pub fn due(&self, tick: TickNumber) -> Vec<String> {
        self.variables
            .values()
            .filter(|v| v.sample_time.matches(tick))
            .map(|v| v.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }
}

impl FromIterator<Variable> for VariableTable {
    fn from_iter<I: IntoIterator<Item = Variable>>(iter: I) -> Self {
        let mut table = Self::new();
        for variable in iter {
            table.insert(variable);
        }
        table
    }
}

impl VariableSource for VariableTable {
    fn value_of(&self, id: &str) -> Option<VariableValue> {
        self.variables.get(id).map(|v| v.value)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_coercion() {
        assert_eq!(VariableValue::Bool(true).as_f64(), 1.0);
        assert_eq!(VariableValue::Bool(false).as_f64(), 0.0);
        assert_eq!(VariableValue::Number(2.5).as_f64(), 2.5);
    }

    #[test]
    fn test_value_deserializes_untagged() {
        let v: VariableValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, VariableValue::Bool(true));
        let v: VariableValue = serde_json::from_str("12.5").unwrap();
        assert_eq!(v, VariableValue::Number(12.5));
    }

    #[test]
    fn test_table_set_and_due() {
        let mut table: VariableTable = [
            Variable::new("p", "Power"),
            Variable::new("e", "Energy").with_sample_time(SampleInterval::new(10)),
        ]
        .into_iter()
        .collect();

        table.set_value("p", 42.0, Some(TickNumber::new(3))).unwrap();
        assert_eq!(table.value_of("p"), Some(VariableValue::Number(42.0)));
        assert_eq!(table.get("p").unwrap().updated_at, Some(TickNumber::new(3)));

        assert_eq!(table.due(TickNumber::new(3)), vec!["p".to_string()]);
        assert_eq!(table.due(TickNumber::new(20)).len(), 2);

        assert!(matches!(
            table.set_value("missing", 1.0, None),
            Err(CalcError::VariableNotFound(_))
        ));
    }
}
