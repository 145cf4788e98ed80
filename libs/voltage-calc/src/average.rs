//! AverageElement - time-weighted average over aligned periods
//!
//! Samples are collected while a period `[min_tick_id, max_tick_id)` is open.
//! The first tick at or past `max_tick_id` closes it: the element reports the
//! time-weighted average of the collected samples and opens the period that
//! contains the current tick, seeded with one sample at its start.
//!
//! Each sample is weighted by the number of ticks until the next sample, the
//! last one by the ticks until the period end:
//!
//! ```text
//! avg = factor · Σ(value_i · Δtick_i) / Σ(Δtick_i)
//! ```

use serde::Serialize;
use std::iter;

use crate::element::Calculation;
use crate::error::{CalcError, Result};
use crate::payload::{require, require_finite, ElementPayload, ElementType};
use crate::period::Period;
use crate::tick::TickNumber;
use crate::variable::{numeric_value, VariableSource};

/// Variable value observed at a tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub tick: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(tick: i64, value: f64) -> Self {
        Self { tick, value }
    }
}

/// Time-weighted average of `samples` over a period ending at `closing_tick`
///
/// `samples` must be ordered by tick. No samples yields 0. When all weights
/// are zero (a single sample taken at the closing tick) the last value is used.
pub fn calculate_average(samples: &[Sample], closing_tick: i64, factor: f64) -> f64 {
    let Some(last) = samples.last() else {
        return 0.0;
    };

    let next_ticks = samples
        .iter()
        .skip(1)
        .map(|s| s.tick)
        .chain(iter::once(closing_tick));

    let (weighted_sum, total_weight) = samples.iter().zip(next_ticks).fold(
        (0.0, 0_i64),
        |(sum, weight), (sample, next_tick)| {
            let delta = next_tick - sample.tick;
            (sum + sample.value * delta as f64, weight + delta)
        },
    );

    if total_weight <= 0 {
        return factor * last.value;
    }
    factor * weighted_sum / total_weight as f64
}

#[derive(Debug, Clone)]
pub struct AverageElement {
    variable_id: String,
    factor: f64,
    calculation_interval: i64,
    period: Option<Period>,
    samples: Vec<Sample>,
}

impl AverageElement {
    pub fn from_payload(payload: &ElementPayload, vars: &dyn VariableSource) -> Result<Self> {
        let element = ElementType::AverageElement;
        let variable_id = require(&payload.variable_id, element, "variableId")?;
        let factor = require_finite(require(&payload.factor, element, "factor")?, "factor")?;
        let calculation_interval =
            require(&payload.calculation_interval, element, "calculationInterval")?;
        if !vars.contains(&variable_id) {
            return Err(CalcError::variable_not_found(variable_id));
        }
        Ok(Self {
            variable_id,
            factor,
            calculation_interval,
            period: None,
            samples: Vec::new(),
        })
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

    /// Currently open period, `None` before the first evaluation
    pub fn period(&self) -> Option<Period> {
        self.period
    }

    /// Samples collected in the open period
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    fn open_period(&mut self, tick: i64, value: f64) {
        let period = Period::spanning(tick, self.calculation_interval);
        self.samples.clear();
        self.samples.push(Sample::new(period.min_tick_id, value));
        self.period = Some(period);
    }
}

impl Calculation for AverageElement {
    fn first_refresh(
        &mut self,
        tick: TickNumber,
        vars: &dyn VariableSource,
    ) -> Result<Option<f64>> {
        let value = numeric_value(vars, &self.variable_id)?;
        self.open_period(tick.value(), value);
        Ok(None)
    }

    fn refresh(
        &mut self,
        _last_tick: TickNumber,
        tick: TickNumber,
        vars: &dyn VariableSource,
    ) -> Result<Option<f64>> {
        let value = numeric_value(vars, &self.variable_id)?;
        let tick = tick.value();

        let Some(period) = self.period else {
            self.open_period(tick, value);
            return Ok(None);
        };

        if !period.is_closed_by(tick) {
            self.samples.push(Sample::new(tick, value));
            return Ok(None);
        }

        // The boundary sample belongs to the next period, where it becomes the anchor
        let average = calculate_average(&self.samples, period.max_tick_id, self.factor);
        self.open_period(tick, value);
        Ok(Some(average))
    }

    fn write_payload(&self, payload: &mut ElementPayload) {
        payload.variable_id = Some(self.variable_id.clone());
        payload.factor = Some(self.factor);
        payload.calculation_interval = Some(self.calculation_interval);
    }
}
