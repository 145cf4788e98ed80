//! IncreaseElement - increase of a wrapping counter per aligned period
//!
//! Energy meters expose monotonic registers that wrap at a fixed modulus
//! (`overflow`). The element reads the raw counter at period boundaries only
//! and reports `factor · (max − min)` for each closed period, adding the
//! modulus back when the counter wrapped in between.
//!
//! Accumulation is deferred to the first period boundary after the element is
//! first evaluated, so the first reported period is always complete:
//!
//! ```text
//! Inactive ──(tick ≥ start_time)──► Active ──(tick ≥ max_tick_id)──► Active (next period)
//! ```

use serde::Serialize;
use tracing::debug;

use crate::element::Calculation;
use crate::error::{CalcError, Result};
use crate::payload::{require, require_finite, ElementPayload, ElementType};
use crate::period::{self, Period};
use crate::tick::TickNumber;
use crate::variable::{numeric_value, VariableSource};

/// Accumulation state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum IncreaseState {
    /// Waiting for `start_time`
    Inactive,
    /// Counting within `period`
    Active {
        period: Period,
        /// Raw counter at period start
        min_value: f64,
        /// Raw counter at the end of the previous period
        max_value: Option<f64>,
    },
}

#[derive(Debug, Clone)]
pub struct IncreaseElement {
    variable_id: String,
    factor: f64,
    calculation_interval: i64,
    overflow: f64,
    start_time: Option<i64>,
    state: IncreaseState,
}

impl IncreaseElement {
    pub fn from_payload(payload: &ElementPayload, vars: &dyn VariableSource) -> Result<Self> {
        let element = ElementType::IncreaseElement;
        let variable_id = require(&payload.variable_id, element, "variableId")?;
        let factor = require_finite(require(&payload.factor, element, "factor")?, "factor")?;
        let calculation_interval =
            require(&payload.calculation_interval, element, "calculationInterval")?;
        let overflow = require_finite(require(&payload.overflow, element, "overflow")?, "overflow")?;
        if overflow <= 0.0 {
            return Err(CalcError::invalid_field(
                "overflow",
                format!("must be positive, got {}", overflow),
            ));
        }
        if !vars.contains(&variable_id) {
            return Err(CalcError::variable_not_found(variable_id));
        }
        Ok(Self {
            variable_id,
            factor,
            calculation_interval,
            overflow,
            start_time: None,
            state: IncreaseState::Inactive,
        })
    }

    /// Start of the period containing `tick`
    pub fn calculate_min_tick_id(tick: i64, interval: i64) -> i64 {
        period::min_tick_id(tick, interval)
    }

    /// End (exclusive) of the period containing `tick`
    pub fn calculate_max_tick_id(tick: i64, interval: i64) -> i64 {
        period::max_tick_id(tick, interval)
    }

    /// Counter increase between two raw readings, scaled by `factor`
    ///
    /// A reading lower than the previous one means the counter wrapped past
    /// `overflow`.
    pub fn calculate_increase(min_value: f64, max_value: f64, overflow: f64, factor: f64) -> f64 {
        if max_value < min_value {
            factor * (overflow - min_value + max_value)
        } else {
            factor * (max_value - min_value)
        }
    }

    pub fn variable_id(&self) -> &str {
        &self.variable_id
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn calculation_interval(&self) -> i64 {
        self.calculation_interval
    }

    pub fn overflow(&self) -> f64 {
        self.overflow
    }

    /// First tick at which accumulation may begin, fixed on first evaluation
    pub fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    pub fn state(&self) -> &IncreaseState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, IncreaseState::Active { .. })
    }

    fn open_period(&mut self, tick: i64, min_value: f64, max_value: Option<f64>) {
        self.state = IncreaseState::Active {
            period: Period::aligned(tick, self.calculation_interval),
            min_value,
            max_value,
        };
    }
}

impl Calculation for IncreaseElement {
    fn first_refresh(
        &mut self,
        tick: TickNumber,
        _vars: &dyn VariableSource,
    ) -> Result<Option<f64>> {
        let start_time = Self::calculate_max_tick_id(tick.value(), self.calculation_interval);
        self.start_time = Some(start_time);
        self.state = IncreaseState::Inactive;
        debug!(variable = %self.variable_id, start_time, "Increase accumulation scheduled");
        Ok(None)
    }

    fn refresh(
        &mut self,
        _last_tick: TickNumber,
        tick: TickNumber,
        vars: &dyn VariableSource,
    ) -> Result<Option<f64>> {
        let tick = tick.value();

        match self.state {
            IncreaseState::Inactive => {
                let start_time = *self.start_time.get_or_insert_with(|| {
                    Self::calculate_max_tick_id(tick, self.calculation_interval)
                });
                if tick >= start_time {
                    let value = numeric_value(vars, &self.variable_id)?;
                    self.open_period(tick, value, None);
                    debug!(variable = %self.variable_id, tick, "Increase accumulation started");
                }
                Ok(None)
            },
            IncreaseState::Active {
                period, min_value, ..
            } => {
                if !period.is_closed_by(tick) {
                    return Ok(None);
                }
                let max_value = numeric_value(vars, &self.variable_id)?;
                let increase =
                    Self::calculate_increase(min_value, max_value, self.overflow, self.factor);
                self.open_period(tick, max_value, Some(max_value));
                Ok(Some(increase))
            },
        }
    }

    fn write_payload(&self, payload: &mut ElementPayload) {
        payload.variable_id = Some(self.variable_id.clone());
        payload.factor = Some(self.factor);
        payload.calculation_interval = Some(self.calculation_interval);
        payload.overflow = Some(self.overflow);
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::variable::VariableValue;
    use std::collections::HashMap;

    fn element(interval: i64, overflow: f64, factor: f64) -> IncreaseElement {
        let vars = HashMap::from([("e".to_string(), VariableValue::Number(0.0))]);
        let payload = ElementPayload::default()
            .with_variable("e", factor)
            .with_calculation_interval(interval)
            .with_overflow(overflow);
        IncreaseElement::from_payload(&payload, &vars).unwrap()
    }

    fn counter(value: f64) -> HashMap<String, VariableValue> {
        HashMap::from([("e".to_string(), VariableValue::Number(value))])
    }

    #[test]
    fn test_tick_alignment() {
        assert_eq!(IncreaseElement::calculate_max_tick_id(123, 10), 130);
        assert_eq!(IncreaseElement::calculate_min_tick_id(123, 10), 120);
        assert_eq!(IncreaseElement::calculate_min_tick_id(123, 0), 123);
        assert_eq!(IncreaseElement::calculate_max_tick_id(123, 0), 123);
    }

    #[test]
    fn test_calculate_increase() {
        assert_eq!(IncreaseElement::calculate_increase(10.0, 20.0, 100.0, 2.0), 20.0);
        // Wrapped: 2 * (100 - 20 + 10)
        assert_eq!(IncreaseElement::calculate_increase(20.0, 10.0, 100.0, 2.0), 180.0);
    }

    #[test]
    fn test_deferred_start() {
        let mut inc = element(10, 1000.0, 1.0);

        assert_eq!(inc.first_refresh(TickNumber::new(123), &counter(5.0)).unwrap(), None);
        assert_eq!(inc.start_time(), Some(130));
        assert!(!inc.is_active());

        assert_eq!(
            inc.refresh(TickNumber::new(123), TickNumber::new(129), &counter(6.0)).unwrap(),
            None
        );
        assert!(!inc.is_active());

        assert_eq!(
            inc.refresh(TickNumber::new(129), TickNumber::new(130), &counter(7.0)).unwrap(),
            None
        );
        assert_eq!(
            inc.state(),
            &IncreaseState::Active {
                period: Period {
                    min_tick_id: 130,
                    max_tick_id: 140
                },
                min_value: 7.0,
                max_value: None,
            }
        );
    }

    #[test]
    fn test_period_increases_with_wraparound() {
        let mut inc = element(10, 100.0, 2.0);
        inc.first_refresh(TickNumber::new(5), &counter(0.0)).unwrap();
        inc.refresh(TickNumber::new(5), TickNumber::new(10), &counter(40.0)).unwrap();

        // Inside the period, counter is not sampled
        assert_eq!(
            inc.refresh(TickNumber::new(10), TickNumber::new(15), &counter(60.0)).unwrap(),
            None
        );

        assert_eq!(
            inc.refresh(TickNumber::new(15), TickNumber::new(20), &counter(70.0)).unwrap(),
            Some(60.0)
        );

        // 70 -> 100 wraps -> 5
        assert_eq!(
            inc.refresh(TickNumber::new(20), TickNumber::new(31), &counter(5.0)).unwrap(),
            Some(70.0)
        );
        match inc.state() {
            IncreaseState::Active {
                period,
                min_value,
                max_value,
            } => {
                assert_eq!(period.min_tick_id, 30);
                assert_eq!(period.max_tick_id, 40);
                assert_eq!(*min_value, 5.0);
                assert_eq!(*max_value, Some(5.0));
            },
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_overflow_required_and_positive() {
        let vars = counter(0.0);
        let payload = ElementPayload::default()
            .with_variable("e", 1.0)
            .with_calculation_interval(60);
        assert!(matches!(
            IncreaseElement::from_payload(&payload, &vars),
            Err(CalcError::MissingField { field: "overflow", .. })
        ));

        let payload = payload.with_overflow(0.0);
        assert!(matches!(
            IncreaseElement::from_payload(&payload, &vars),
            Err(CalcError::InvalidField { field: "overflow", .. })
        ));
    }
}
