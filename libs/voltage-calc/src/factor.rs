//! FactorElement - one variable scaled by a constant

use crate::element::Calculation;
use crate::error::{CalcError, Result};
use crate::payload::{require, require_finite, ElementPayload, ElementType};
use crate::tick::TickNumber;
use crate::variable::{numeric_value, VariableSource};

#[derive(Debug, Clone)]
pub struct FactorElement {
    variable_id: String,
    factor: f64,
}

impl FactorElement {
    pub fn from_payload(payload: &ElementPayload, vars: &dyn VariableSource) -> Result<Self> {
        let element = ElementType::FactorElement;
        let variable_id = require(&payload.variable_id, element, "variableId")?;
        let factor = require_finite(require(&payload.factor, element, "factor")?, "factor")?;
        if !vars.contains(&variable_id) {
            return Err(CalcError::variable_not_found(variable_id));
        }
        Ok(Self {
            variable_id,
            factor,
        })
    }

    pub fn variable_id(&self) -> &str {
        &self.variable_id
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    fn evaluate(&self, vars: &dyn VariableSource) -> Result<f64> {
        Ok(self.factor * numeric_value(vars, &self.variable_id)?)
    }
}

impl Calculation for FactorElement {
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
        payload.variable_id = Some(self.variable_id.clone());
        payload.factor = Some(self.factor);
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::variable::VariableValue;
    use std::collections::HashMap;

    #[test]
    fn test_scales_every_tick() {
        let mut vars = HashMap::from([("v".to_string(), VariableValue::Number(3.0))]);
        let payload = ElementPayload::default().with_variable("v", 1.5);
        let mut element = FactorElement::from_payload(&payload, &vars).unwrap();

        assert_eq!(element.first_refresh(TickNumber::new(1), &vars).unwrap(), Some(4.5));
        vars.insert("v".to_string(), VariableValue::Number(-2.0));
        assert_eq!(
            element.refresh(TickNumber::new(1), TickNumber::new(2), &vars).unwrap(),
            Some(-3.0)
        );
    }

    #[test]
    fn test_required_fields() {
        let vars = HashMap::from([("v".to_string(), VariableValue::Number(3.0))]);

        let payload = ElementPayload {
            factor: Some(1.0),
            ..Default::default()
        };
        assert!(matches!(
            FactorElement::from_payload(&payload, &vars),
            Err(CalcError::MissingField { field: "variableId", .. })
        ));

        let payload = ElementPayload {
            variable_id: Some("v".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            FactorElement::from_payload(&payload, &vars),
            Err(CalcError::MissingField { field: "factor", .. })
        ));

        let payload = ElementPayload::default().with_variable("v", f64::NAN);
        assert!(matches!(
            FactorElement::from_payload(&payload, &vars),
            Err(CalcError::InvalidField { field: "factor", .. })
        ));
    }
}
