//! SumElement - signed weighted sum of device variables
//!
//! `value = Σ factor·plus − Σ factor·minus`, recomputed on every evaluation.

use std::collections::BTreeMap;

use crate::element::Calculation;
use crate::error::{CalcError, Result};
use crate::payload::{ElementPayload, VariableFactor};
use crate::tick::TickNumber;
use crate::variable::{numeric_value, VariableSource};

const PLUS_SET: &str = "plusVariables";
const MINUS_SET: &str = "minusVariables";

#[derive(Debug, Clone, Default)]
pub struct SumElement {
    plus: BTreeMap<String, f64>,
    minus: BTreeMap<String, f64>,
}

impl SumElement {
    pub fn from_payload(payload: &ElementPayload, vars: &dyn VariableSource) -> Result<Self> {
        let mut element = Self::default();
        for entry in payload.plus_variables.iter().flatten() {
            element.add_plus_variable(&entry.id, entry.factor, vars)?;
        }
        for entry in payload.minus_variables.iter().flatten() {
            element.add_minus_variable(&entry.id, entry.factor, vars)?;
        }
        Ok(element)
    }

    pub fn add_plus_variable(
        &mut self,
        id: &str,
        factor: f64,
        vars: &dyn VariableSource,
    ) -> Result<()> {
        insert_checked(&mut self.plus, PLUS_SET, id, factor, vars)
    }

    pub fn add_minus_variable(
        &mut self,
        id: &str,
        factor: f64,
        vars: &dyn VariableSource,
    ) -> Result<()> {
        insert_checked(&mut self.minus, MINUS_SET, id, factor, vars)
    }

    /// Remove a variable from the plus set, returning its factor
    pub fn remove_plus_variable(&mut self, id: &str) -> Option<f64> {
        self.plus.remove(id)
    }

    /// Remove a variable from the minus set, returning its factor
    pub fn remove_minus_variable(&mut self, id: &str) -> Option<f64> {
        self.minus.remove(id)
    }

    pub fn plus_variables(&self) -> Vec<VariableFactor> {
        to_entries(&self.plus)
    }

    pub fn minus_variables(&self) -> Vec<VariableFactor> {
        to_entries(&self.minus)
    }

    fn evaluate(&self, vars: &dyn VariableSource) -> Result<f64> {
        let plus = weighted_sum(&self.plus, vars)?;
        let minus = weighted_sum(&self.minus, vars)?;
        Ok(plus - minus)
    }
}

fn insert_checked(
    set: &mut BTreeMap<String, f64>,
    set_name: &'static str,
    id: &str,
    factor: f64,
    vars: &dyn VariableSource,
) -> Result<()> {
    if !factor.is_finite() {
        return Err(CalcError::invalid_field(
            "factor",
            format!("factor of '{}' must be a finite number", id),
        ));
    }
    if !vars.contains(id) {
        return Err(CalcError::variable_not_found(id));
    }
    if set.contains_key(id) {
        return Err(CalcError::DuplicateVariable {
            id: id.to_string(),
            set: set_name,
        });
    }
    set.insert(id.to_string(), factor);
    Ok(())
}

fn weighted_sum(set: &BTreeMap<String, f64>, vars: &dyn VariableSource) -> Result<f64> {
    set.iter()
        .try_fold(0.0, |acc, (id, factor)| -> Result<f64> {
            Ok(acc + factor * numeric_value(vars, id)?)
        })
}

fn to_entries(set: &BTreeMap<String, f64>) -> Vec<VariableFactor> {
    set.iter()
        .map(|(id, factor)| VariableFactor::new(id.clone(), *factor))
        .collect()
}

impl Calculation for SumElement {
    fn first_refresh(
        &mut self,
        _tick: TickNumber,
        vars: &dyn VariableSource,
    ) -> Result<Option<f64>> {
        self.evaluate(vars).map(Some)
    }

    fn refresh(
        &mut self,
        _last_tick: TickNumber,
        _tick: TickNumber,
        vars: &dyn VariableSource,
    ) -> Result<Option<f64>> {
        self.evaluate(vars).map(Some)
    }

    fn write_payload(&self, payload: &mut ElementPayload) {
        payload.plus_variables = Some(self.plus_variables());
        payload.minus_variables = Some(self.minus_variables());
    }
}
