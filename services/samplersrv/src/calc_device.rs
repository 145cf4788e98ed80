//! Device hosting calculation elements
//!
//! A `CalcDevice` owns a variable table and the elements computed from it.
//! On each tick it:
//!
//! 1. reads the variables whose sample time is due from its [`VariableReader`]
//! 2. evaluates the elements whose sample time matches the tick
//! 3. hands the values of elements due for archiving to its [`ArchiveSink`]
//!
//! Element failures do not stop the other elements. They are collected with
//! any archive failure and reported as one device refresh failure.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};
use voltage_calc::{
    CalculationElement, ElementPayload, ElementRefreshed, TickNumber, Variable, VariableTable,
    VariableValue,
};

use crate::device::Device;
use crate::error::{Result, SamplerError};

/// Source of raw variable values (field bus, RTDB, simulator, ...)
#[async_trait]
pub trait VariableReader: Send + Sync {
    /// Read the current values of `variable_ids` for `device_id`
    ///
    /// Ids missing from the result keep their previous value.
    async fn read(
        &self,
        device_id: &str,
        variable_ids: &[String],
        tick: TickNumber,
    ) -> Result<HashMap<String, VariableValue>>;
}

/// One archived element value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    pub device_id: String,
    pub element_id: String,
    pub name: String,
    pub unit: String,
    pub tick: TickNumber,
    pub value: f64,
}

/// Destination of archived element values
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    async fn archive(&self, records: Vec<ArchiveRecord>) -> Result<()>;
}

/// Archive sink keeping records in memory
#[derive(Debug, Default)]
pub struct MemoryArchive {
    records: Mutex<Vec<ArchiveRecord>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ArchiveRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl ArchiveSink for MemoryArchive {
    async fn archive(&self, records: Vec<ArchiveRecord>) -> Result<()> {
        self.records.lock().extend(records);
        Ok(())
    }
}

/// Archive sink writing records to the `archive` log target
#[derive(Debug, Default)]
pub struct TracingArchive;

#[async_trait]
impl ArchiveSink for TracingArchive {
    async fn archive(&self, records: Vec<ArchiveRecord>) -> Result<()> {
        for record in records {
            info!(
                target: "archive",
                device = %record.device_id,
                element = %record.element_id,
                tick = %record.tick,
                value = record.value,
                unit = %record.unit,
                "{}",
                record.name
            );
        }
        Ok(())
    }
}

#[derive(Default)]
struct DeviceState {
    variables: VariableTable,
    elements: Vec<CalculationElement>,
}

impl DeviceState {
    fn element_mut(&mut self, device: &str, id: &str) -> Result<&mut CalculationElement> {
        self.elements
            .iter_mut()
            .find(|e| e.id() == id)
            .ok_or_else(|| SamplerError::element_not_found(device, id))
    }
}

pub struct CalcDevice {
    id: String,
    name: String,
    refresh_group: String,
    special: bool,
    state: Mutex<DeviceState>,
    reader: Option<Arc<dyn VariableReader>>,
    archive: Option<Arc<dyn ArchiveSink>>,
}

impl CalcDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: name.into(),
            refresh_group: id.clone(),
            id,
            special: false,
            state: Mutex::new(DeviceState::default()),
            reader: None,
            archive: None,
        }
    }

    pub fn with_refresh_group(mut self, group: impl Into<String>) -> Self {
        self.refresh_group = group.into();
        self
    }

    pub fn with_special(mut self, special: bool) -> Self {
        self.special = special;
        self
    }

    pub fn with_reader(mut self, reader: Arc<dyn VariableReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn with_archive(mut self, archive: Arc<dyn ArchiveSink>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add or replace a variable
    pub fn add_variable(&self, variable: Variable) {
        self.state.lock().variables.insert(variable);
    }

    pub fn set_variable(&self, id: &str, value: impl Into<VariableValue>) -> Result<()> {
        self.state.lock().variables.set_value(id, value, None)?;
        Ok(())
    }

    pub fn variable_value(&self, id: &str) -> Option<VariableValue> {
        self.state.lock().variables.get(id).map(|v| v.value)
    }

    /// Build an element from `payload` against this device's variables
    ///
    /// Returns the element id.
    pub fn add_element(&self, payload: &ElementPayload) -> Result<String> {
        let mut state = self.state.lock();
        let element = CalculationElement::from_payload(payload, &state.variables)?;
        let element_id = element.id().to_string();
        if state.elements.iter().any(|e| e.id() == element_id) {
            return Err(SamplerError::DuplicateElement {
                device: self.id.clone(),
                element: element_id,
            });
        }
        debug!(device = %self.id, element = %element_id, kind = %element.element_type(), "Element added");
        state.elements.push(element);
        Ok(element_id)
    }

    pub fn remove_element(&self, element_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let pos = state
            .elements
            .iter()
            .position(|e| e.id() == element_id)
            .ok_or_else(|| SamplerError::element_not_found(&self.id, element_id))?;
        state.elements.remove(pos);
        debug!(device = %self.id, element = %element_id, "Element removed");
        Ok(())
    }

    /// Reconfigure an element in place; subscribers stay attached
    pub fn edit_element(&self, element_id: &str, payload: &ElementPayload) -> Result<()> {
        let mut state = self.state.lock();
        let DeviceState {
            variables,
            elements,
        } = &mut *state;
        let element = elements
            .iter_mut()
            .find(|e| e.id() == element_id)
            .ok_or_else(|| SamplerError::element_not_found(&self.id, element_id))?;
        element.edit(payload, variables)?;
        Ok(())
    }

    pub fn element_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .elements
            .iter()
            .map(|e| e.id().to_string())
            .collect()
    }

    pub fn element_value(&self, element_id: &str) -> Option<f64> {
        self.state
            .lock()
            .elements
            .iter()
            .find(|e| e.id() == element_id)
            .map(CalculationElement::value)
    }

    pub fn element_payload(&self, element_id: &str) -> Result<ElementPayload> {
        let mut state = self.state.lock();
        Ok(state.element_mut(&self.id, element_id)?.payload())
    }

    pub fn element_payloads(&self) -> Vec<ElementPayload> {
        self.state
            .lock()
            .elements
            .iter()
            .map(CalculationElement::payload)
            .collect()
    }

    pub fn subscribe_element(
        &self,
        element_id: &str,
    ) -> Result<broadcast::Receiver<ElementRefreshed>> {
        let mut state = self.state.lock();
        Ok(state.element_mut(&self.id, element_id)?.subscribe())
    }

    async fn read_due_variables(&self, reader: &dyn VariableReader, tick: TickNumber) -> Result<()> {
        let due = self.state.lock().variables.due(tick);
        if due.is_empty() {
            return Ok(());
        }

        let values = reader
            .read(&self.id, &due, tick)
            .await
            .map_err(|e| SamplerError::VariableRead(e.to_string()))?;

        let mut state = self.state.lock();
        for (id, value) in values {
            if let Err(e) = state.variables.set_value(&id, value, Some(tick)) {
                warn!(device = %self.id, variable = %id, "Ignoring read value: {}", e);
            }
        }
        Ok(())
    }

    /// Evaluate matching elements, returning due archive records and failures
    fn evaluate(&self, tick: TickNumber) -> (Vec<ArchiveRecord>, Vec<String>) {
        let mut state = self.state.lock();
        let DeviceState {
            variables,
            elements,
        } = &mut *state;

        let mut records = Vec::new();
        let mut failures = Vec::new();

        for element in elements.iter_mut() {
            if element.matches(tick) {
                if let Err(e) = element.refresh(tick, variables) {
                    warn!(device = %self.id, element = %element.id(), %tick, "Element refresh failed: {}", e);
                    failures.push(format!("{}: {}", element.id(), e));
                    // Its value is not current for this tick
                    continue;
                }
            }

            // Nothing to archive before the first evaluation
            if element.is_archive_due(tick) && element.last_tick().is_some() {
                records.push(ArchiveRecord {
                    device_id: self.id.clone(),
                    element_id: element.id().to_string(),
                    name: element.name().to_string(),
                    unit: element.unit().to_string(),
                    tick,
                    value: element.value(),
                });
            }
        }

        (records, failures)
    }
}

#[async_trait]
impl Device for CalcDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn refresh_group_id(&self) -> &str {
        &self.refresh_group
    }

    fn is_special(&self) -> bool {
        self.special
    }

    async fn refresh(&self, tick: TickNumber) -> Result<()> {
        if let Some(reader) = &self.reader {
            self.read_due_variables(reader.as_ref(), tick)
                .await
                .map_err(|e| SamplerError::refresh(&self.id, e.to_string()))?;
        }

        let (records, mut failures) = self.evaluate(tick);

        if !records.is_empty() {
            match &self.archive {
                Some(archive) => {
                    trace!(device = %self.id, %tick, count = records.len(), "Archiving element values");
                    if let Err(e) = archive.archive(records).await {
                        warn!(device = %self.id, %tick, "Archive failed: {}", e);
                        failures.push(e.to_string());
                    }
                },
                None => trace!(device = %self.id, %tick, "No archive sink, records dropped"),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(SamplerError::refresh(&self.id, failures.join("; ")))
        }
    }
}
