//! CalculationElement - shared lifecycle of every derived metric
//!
//! An element is evaluated by its owning device on ticks matching its sample
//! interval. The lifecycle is the same for all algorithms:
//!
//! 1. A tick that is not newer than the last evaluated one is dropped.
//! 2. The first evaluation goes to [`Calculation::first_refresh`], later ones
//!    to [`Calculation::refresh`] with the previous tick.
//! 3. A produced value becomes the element value and is broadcast as
//!    [`ElementRefreshed`].

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::average::AverageElement;
use crate::error::{CalcError, Result};
use crate::factor::FactorElement;
use crate::increase::IncreaseElement;
use crate::payload::{ElementPayload, ElementType};
use crate::sum::SumElement;
use crate::tick::{SampleInterval, TickNumber};
use crate::variable::VariableSource;

/// Capacity of each element's change notification channel
const REFRESH_CHANNEL_CAPACITY: usize = 16;

/// Per-algorithm evaluation hooks
pub trait Calculation {
    /// Evaluation on the first tick ever seen by the element
    fn first_refresh(&mut self, tick: TickNumber, vars: &dyn VariableSource)
        -> Result<Option<f64>>;

    /// Evaluation on every later tick
    fn refresh(
        &mut self,
        last_tick: TickNumber,
        tick: TickNumber,
        vars: &dyn VariableSource,
    ) -> Result<Option<f64>>;

    /// Copy the algorithm-specific configuration into `payload`
    fn write_payload(&self, payload: &mut ElementPayload);
}

/// Value change notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRefreshed {
    pub element_id: String,
    pub name: String,
    pub unit: String,
    pub tick: TickNumber,
    pub value: f64,
}

/// Algorithm and per-algorithm state of an element
#[derive(Debug, Clone)]
pub enum ElementKind {
    Sum(SumElement),
    Factor(FactorElement),
    Average(AverageElement),
    Increase(IncreaseElement),
}

impl ElementKind {
    fn from_payload(
        element_type: ElementType,
        payload: &ElementPayload,
        vars: &dyn VariableSource,
    ) -> Result<Self> {
        Ok(match element_type {
            ElementType::SumElement => Self::Sum(SumElement::from_payload(payload, vars)?),
            ElementType::FactorElement => Self::Factor(FactorElement::from_payload(payload, vars)?),
            ElementType::AverageElement => {
                Self::Average(AverageElement::from_payload(payload, vars)?)
            },
            ElementType::IncreaseElement => {
                Self::Increase(IncreaseElement::from_payload(payload, vars)?)
            },
        })
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Sum(_) => ElementType::SumElement,
            Self::Factor(_) => ElementType::FactorElement,
            Self::Average(_) => ElementType::AverageElement,
            Self::Increase(_) => ElementType::IncreaseElement,
        }
    }

    fn calculation(&self) -> &dyn Calculation {
        match self {
            Self::Sum(e) => e,
            Self::Factor(e) => e,
            Self::Average(e) => e,
            Self::Increase(e) => e,
        }
    }

    fn calculation_mut(&mut self) -> &mut dyn Calculation {
        match self {
            Self::Sum(e) => e,
            Self::Factor(e) => e,
            Self::Average(e) => e,
            Self::Increase(e) => e,
        }
    }
}

/// Common settings parsed from the payload header
struct ElementHeader {
    id: String,
    name: String,
    unit: String,
    sample_interval: SampleInterval,
    archived: bool,
    archive_interval: SampleInterval,
}

impl ElementHeader {
    fn parse(element_type: ElementType, payload: &ElementPayload) -> Result<Self> {
        let name = payload
            .name
            .clone()
            .ok_or(CalcError::missing_field(element_type.as_str(), "name"))?;
        if name.trim().is_empty() {
            return Err(CalcError::invalid_field("name", "must not be empty"));
        }

        let sample_time = payload.sample_time.unwrap_or(SampleInterval::DEFAULT.value());
        if sample_time <= 0 {
            return Err(CalcError::invalid_field(
                "sampleTime",
                format!("must be positive, got {}", sample_time),
            ));
        }

        let archive_sample_time = payload.archive_sample_time.unwrap_or(sample_time);
        if archive_sample_time <= 0 {
            return Err(CalcError::invalid_field(
                "archiveSampleTime",
                format!("must be positive, got {}", archive_sample_time),
            ));
        }

        let id = match payload.id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };

        Ok(Self {
            id,
            name,
            unit: payload.unit.clone().unwrap_or_default(),
            sample_interval: SampleInterval::new(sample_time),
            archived: payload.archived.unwrap_or(false),
            archive_interval: SampleInterval::new(archive_sample_time),
        })
    }
}

/// A derived metric owned by a device
#[derive(Debug)]
pub struct CalculationElement {
    id: String,
    name: String,
    unit: String,
    sample_interval: SampleInterval,
    archived: bool,
    archive_interval: SampleInterval,
    last_tick: Option<TickNumber>,
    value: f64,
    kind: ElementKind,
    events: broadcast::Sender<ElementRefreshed>,
}

impl CalculationElement {
    /// Validate `payload` and build the element it declares
    ///
    /// Fails on a missing or invalid field, an unknown type, or a variable id
    /// that `vars` does not know.
    pub fn from_payload(payload: &ElementPayload, vars: &dyn VariableSource) -> Result<Self> {
        let element_type = payload.parsed_type()?;
        let header = ElementHeader::parse(element_type, payload)?;
        let kind = ElementKind::from_payload(element_type, payload, vars)?;
        let (events, _) = broadcast::channel(REFRESH_CHANNEL_CAPACITY);

        debug!(
            element = %header.id,
            name = %header.name,
            kind = %element_type,
            sample_time = header.sample_interval.value(),
            "Calculation element created"
        );

        Ok(Self {
            id: header.id,
            name: header.name,
            unit: header.unit,
            sample_interval: header.sample_interval,
            archived: header.archived,
            archive_interval: header.archive_interval,
            last_tick: None,
            value: 0.0,
            kind,
            events,
        })
    }

    pub fn from_json(value: serde_json::Value, vars: &dyn VariableSource) -> Result<Self> {
        Self::from_payload(&ElementPayload::from_json(value)?, vars)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn sample_interval(&self) -> SampleInterval {
        self.sample_interval
    }

    pub fn archived(&self) -> bool {
        self.archived
    }

    pub fn archive_interval(&self) -> SampleInterval {
        self.archive_interval
    }

    /// Last evaluated tick, `None` if never evaluated
    pub fn last_tick(&self) -> Option<TickNumber> {
        self.last_tick
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn element_type(&self) -> ElementType {
        self.kind.element_type()
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut ElementKind {
        &mut self.kind
    }

    /// Whether the element is evaluated on `tick`
    pub fn matches(&self, tick: TickNumber) -> bool {
        self.sample_interval.matches(tick)
    }

    /// Whether the element value should be archived on `tick`
    pub fn is_archive_due(&self, tick: TickNumber) -> bool {
        self.archived && self.archive_interval.matches(tick)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ElementRefreshed> {
        self.events.subscribe()
    }

    /// Evaluate the element for `tick`
    ///
    /// Returns `Ok(None)` when the tick is stale or the algorithm has nothing
    /// new to report. On error the element state is left as it was before the
    /// call, so the tick can be retried.
    pub fn refresh(&mut self, tick: TickNumber, vars: &dyn VariableSource) -> Result<Option<f64>> {
        let result = match self.last_tick {
            Some(last) if tick <= last => {
                trace!(element = %self.id, %tick, last = %last, "Stale tick ignored");
                return Ok(None);
            },
            Some(last) => self.kind.calculation_mut().refresh(last, tick, vars)?,
            None => self.kind.calculation_mut().first_refresh(tick, vars)?,
        };

        self.last_tick = Some(tick);

        if let Some(value) = result {
            self.value = value;
            // No receivers is fine
            let _ = self.events.send(ElementRefreshed {
                element_id: self.id.clone(),
                name: self.name.clone(),
                unit: self.unit.clone(),
                tick,
                value,
            });
            trace!(element = %self.id, %tick, value, "Element refreshed");
        }

        Ok(result)
    }

    /// Declarative configuration reproducing this element
    pub fn payload(&self) -> ElementPayload {
        let mut payload = ElementPayload {
            element_type: Some(self.element_type().as_str().to_string()),
            id: Some(self.id.clone()),
            name: Some(self.name.clone()),
            sample_time: Some(self.sample_interval.value()),
            unit: Some(self.unit.clone()),
            archived: Some(self.archived),
            archive_sample_time: Some(self.archive_interval.value()),
            ..Default::default()
        };
        self.kind.calculation().write_payload(&mut payload);
        payload
    }

    /// Replace the configuration with `payload`, keeping the id and subscribers
    ///
    /// Evaluation restarts from scratch: the next refresh is a first refresh.
    /// On a validation error the element is left unchanged.
    pub fn edit(&mut self, payload: &ElementPayload, vars: &dyn VariableSource) -> Result<()> {
        let mut payload = payload.clone();
        if payload.element_type.is_none() {
            payload.element_type = Some(self.element_type().as_str().to_string());
        }
        payload.id = Some(self.id.clone());

        let element_type = payload.parsed_type()?;
        let header = ElementHeader::parse(element_type, &payload)?;
        let kind = ElementKind::from_payload(element_type, &payload, vars)?;

        self.name = header.name;
        self.unit = header.unit;
        self.sample_interval = header.sample_interval;
        self.archived = header.archived;
        self.archive_interval = header.archive_interval;
        self.kind = kind;
        self.last_tick = None;
        self.value = 0.0;

        debug!(element = %self.id, kind = %element_type, "Calculation element edited");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::variable::VariableValue;
    use serde_json::json;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, f64)]) -> HashMap<String, VariableValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), VariableValue::Number(*v)))
            .collect()
    }

    fn factor_element(vars: &HashMap<String, VariableValue>) -> CalculationElement {
        CalculationElement::from_json(
            json!({"type": "factorElement", "name": "Scaled", "variableId": "v", "factor": 2.0}),
            vars,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let vars = vars(&[("v", 1.0)]);
        let element = factor_element(&vars);

        assert!(!element.id().is_empty());
        assert_eq!(element.sample_interval(), SampleInterval::new(1));
        assert_eq!(element.archive_interval(), SampleInterval::new(1));
        assert_eq!(element.unit(), "");
        assert!(!element.archived());
        assert_eq!(element.last_tick(), None);
    }

    #[test]
    fn test_archive_sample_time_defaults_to_sample_time() {
        let vars = vars(&[("v", 1.0)]);
        let element = CalculationElement::from_json(
            json!({"type": "factorElement", "name": "x", "sampleTime": 15, "variableId": "v", "factor": 1.0, "archived": true}),
            &vars,
        )
        .unwrap();
        assert_eq!(element.archive_interval(), SampleInterval::new(15));
        assert!(element.is_archive_due(TickNumber::new(30)));
        assert!(!element.is_archive_due(TickNumber::new(31)));
    }

    #[test]
    fn test_missing_name_is_named() {
        let vars = vars(&[("v", 1.0)]);
        let err = CalculationElement::from_json(
            json!({"type": "factorElement", "variableId": "v", "factor": 2.0}),
            &vars,
        )
        .unwrap_err();
        assert!(matches!(err, CalcError::MissingField { field: "name", .. }));
    }

    #[test]
    fn test_invalid_sample_time_rejected() {
        let vars = vars(&[("v", 1.0)]);
        let err = CalculationElement::from_json(
            json!({"type": "factorElement", "name": "x", "sampleTime": 0, "variableId": "v", "factor": 2.0}),
            &vars,
        )
        .unwrap_err();
        assert!(matches!(err, CalcError::InvalidField { field: "sampleTime", .. }));
    }

    #[test]
    fn test_stale_tick_leaves_state_unchanged() {
        let mut vars = vars(&[("v", 5.0)]);
        let mut element = factor_element(&vars);

        assert_eq!(element.refresh(TickNumber::new(10), &vars).unwrap(), Some(10.0));

        vars.insert("v".to_string(), VariableValue::Number(100.0));
        assert_eq!(element.refresh(TickNumber::new(9), &vars).unwrap(), None);
        assert_eq!(element.refresh(TickNumber::new(10), &vars).unwrap(), None);
        assert_eq!(element.value(), 10.0);
        assert_eq!(element.last_tick(), Some(TickNumber::new(10)));
    }

    #[test]
    fn test_failed_refresh_keeps_last_tick() {
        let mut vars = vars(&[("v", 5.0)]);
        let mut element = factor_element(&vars);
        element.refresh(TickNumber::new(1), &vars).unwrap();

        vars.remove("v");
        assert!(element.refresh(TickNumber::new(2), &vars).is_err());
        assert_eq!(element.last_tick(), Some(TickNumber::new(1)));
    }

    #[tokio::test]
    async fn test_refreshed_notification() {
        let vars = vars(&[("v", 4.0)]);
        let mut element = factor_element(&vars);
        let mut rx = element.subscribe();

        element.refresh(TickNumber::new(3), &vars).unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.element_id, element.id());
        assert_eq!(event.tick, TickNumber::new(3));
        assert_eq!(event.value, 8.0);
    }

    #[test]
    fn test_payload_round_trip_keeps_id() {
        let vars = vars(&[("v", 1.0)]);
        let element = factor_element(&vars);
        let payload = element.payload();

        let rebuilt = CalculationElement::from_payload(&payload, &vars).unwrap();
        assert_eq!(rebuilt.id(), element.id());
        assert_eq!(rebuilt.payload(), payload);
    }

    #[test]
    fn test_edit_resets_evaluation() {
        let vars = vars(&[("v", 3.0), ("w", 7.0)]);
        let mut element = factor_element(&vars);
        let id = element.id().to_string();
        element.refresh(TickNumber::new(1), &vars).unwrap();

        let edit = ElementPayload {
            name: Some("Rescaled".to_string()),
            variable_id: Some("w".to_string()),
            factor: Some(10.0),
            ..Default::default()
        };
        element.edit(&edit, &vars).unwrap();

        assert_eq!(element.id(), id);
        assert_eq!(element.name(), "Rescaled");
        assert_eq!(element.last_tick(), None);
        assert_eq!(element.refresh(TickNumber::new(1), &vars).unwrap(), Some(70.0));
    }

    #[test]
    fn test_edit_validation_failure_keeps_element() {
        let vars = vars(&[("v", 3.0)]);
        let mut element = factor_element(&vars);

        let edit = ElementPayload {
            name: Some("Broken".to_string()),
            variable_id: Some("nope".to_string()),
            factor: Some(1.0),
            ..Default::default()
        };
        assert!(matches!(
            element.edit(&edit, &vars),
            Err(CalcError::VariableNotFound(_))
        ));
        assert_eq!(element.name(), "Scaled");
    }
}
