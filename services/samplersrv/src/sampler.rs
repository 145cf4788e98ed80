//! Tick scheduler
//!
//! A clock task polls the wall clock every `clock_interval_ms` and converts it
//! to a [`TickNumber`] (whole seconds). Each new tick is processed once:
//!
//! 1. normal devices, then special devices
//! 2. within a phase, devices are partitioned by refresh group; groups run
//!    concurrently, devices of one group run sequentially
//! 3. once every group settled, the tick is recorded as the last tick and a
//!    single [`TickEvent`] is broadcast
//!
//! A device that fails or panics is reported in the event and never stops
//! the other devices.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use voltage_calc::TickNumber;

use crate::config::SamplerConfig;
use crate::device::{partition_groups, DeviceRegistry, RefreshGroup, SharedDevice};
use crate::error::Result;

/// Outcome of one processed tick
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickEvent {
    pub tick: TickNumber,
    /// Devices refreshed on this tick
    pub devices: usize,
    /// Failure reason per device id
    pub failures: BTreeMap<String, String>,
    pub elapsed_ms: u64,
}

impl TickEvent {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct ClockHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

struct SamplerInner {
    config: SamplerConfig,
    registry: RwLock<DeviceRegistry>,
    last_tick: Mutex<Option<TickNumber>>,
    // Serializes tick processing
    tick_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<TickEvent>,
    clock: Mutex<Option<ClockHandle>>,
}

/// Cloneable handle to the scheduler
#[derive(Clone)]
pub struct Sampler {
    inner: Arc<SamplerInner>,
}

impl Sampler {
    pub fn new(config: SamplerConfig) -> Self {
        let (events, _) = broadcast::channel(config.tick_channel_capacity.max(1));
        Self {
            inner: Arc::new(SamplerInner {
                config,
                registry: RwLock::new(DeviceRegistry::new()),
                last_tick: Mutex::new(None),
                tick_lock: tokio::sync::Mutex::new(()),
                events,
                clock: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.inner.config
    }

    /// Register a device; a device with the same id is replaced
    ///
    /// Takes effect from the next tick.
    pub fn add_device(&self, device: SharedDevice) {
        let id = device.id().to_string();
        if self.inner.registry.write().add(device).is_some() {
            warn!(device = %id, "Device replaced");
        } else {
            debug!(device = %id, "Device added");
        }
    }

    /// Unregister a device; a tick in flight still completes its refresh
    pub fn remove_device(&self, id: &str) -> Result<SharedDevice> {
        let device = self.inner.registry.write().remove(id)?;
        debug!(device = %id, "Device removed");
        Ok(device)
    }

    pub fn device(&self, id: &str) -> Option<SharedDevice> {
        self.inner.registry.read().get(id)
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.inner.registry.read().ids()
    }

    pub fn device_count(&self) -> usize {
        self.inner.registry.read().len()
    }

    /// Receive one [`TickEvent`] per processed tick
    pub fn subscribe(&self) -> broadcast::Receiver<TickEvent> {
        self.inner.events.subscribe()
    }

    pub fn last_tick(&self) -> Option<TickNumber> {
        *self.inner.last_tick.lock()
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .clock
            .lock()
            .as_ref()
            .is_some_and(|clock| !clock.task.is_finished())
    }

    /// Start the clock task; returns `false` if it is already running
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut clock = self.inner.clock.lock();
        if clock.as_ref().is_some_and(|c| !c.task.is_finished()) {
            debug!("Sampler already running");
            return false;
        }

        let token = CancellationToken::new();
        let period = Duration::from_millis(self.inner.config.clock_interval_ms.max(1));
        let task = spawn_clock(Arc::downgrade(&self.inner), token.clone(), period);
        *clock = Some(ClockHandle { token, task });

        info!(
            clock_interval_ms = period.as_millis() as u64,
            "Sampler started"
        );
        true
    }

    /// Stop scheduling new ticks; returns `false` if not running
    ///
    /// A tick already in progress runs to completion in the background.
    pub fn stop(&self) -> bool {
        match self.inner.clock.lock().take() {
            Some(clock) => {
                clock.token.cancel();
                info!("Sampler stopped");
                true
            },
            None => false,
        }
    }

    /// Stop and wait for the in-flight tick, up to `shutdown_grace_ms`
    pub async fn shutdown(&self) {
        let Some(clock) = self.inner.clock.lock().take() else {
            return;
        };
        clock.token.cancel();

        let grace = Duration::from_millis(self.inner.config.shutdown_grace_ms);
        match tokio::time::timeout(grace, clock.task).await {
            Ok(Ok(())) => info!("Sampler shut down"),
            Ok(Err(e)) => error!("Sampler clock task failed: {}", e),
            Err(_) => warn!(
                grace_ms = self.inner.config.shutdown_grace_ms,
                "In-flight tick did not finish within the grace period"
            ),
        }
    }

    /// Process the tick for a Unix timestamp in milliseconds
    pub async fn tick_at_millis(&self, millis: i64) -> Option<TickEvent> {
        self.inner.process_tick(TickNumber::from_millis(millis)).await
    }

    /// Process `tick`; `None` when it equals the last processed tick
    pub async fn tick(&self, tick: TickNumber) -> Option<TickEvent> {
        self.inner.process_tick(tick).await
    }
}

fn spawn_clock(
    inner: Weak<SamplerInner>,
    token: CancellationToken,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = interval.tick() => {
                    let Some(inner) = inner.upgrade() else {
                        debug!("Sampler dropped, clock exiting");
                        break;
                    };
                    let now = chrono::Utc::now().timestamp_millis();
                    inner.process_tick(TickNumber::from_millis(now)).await;
                }
            }
        }

        debug!("Sampler clock terminated");
    })
}

impl SamplerInner {
    async fn process_tick(&self, tick: TickNumber) -> Option<TickEvent> {
        let _guard = self.tick_lock.lock().await;

        let last = *self.last_tick.lock();
        match last {
            Some(last) if last == tick => {
                trace!(%tick, "Tick already processed");
                return None;
            },
            Some(last) if tick < last => {
                warn!(%tick, last = %last, "Wall clock moved backwards");
            },
            _ => {},
        }

        let started = Instant::now();
        let devices = self.registry.read().snapshot();
        let device_count = devices.len();
        let (special, normal): (Vec<_>, Vec<_>) =
            devices.into_iter().partition(|d| d.is_special());

        let mut failures = BTreeMap::new();
        run_phase(&normal, tick, &mut failures).await;
        run_phase(&special, tick, &mut failures).await;

        *self.last_tick.lock() = Some(tick);

        let elapsed = started.elapsed();
        let event = TickEvent {
            tick,
            devices: device_count,
            failures,
            elapsed_ms: elapsed.as_millis() as u64,
        };

        if event.is_clean() {
            debug!(%tick, devices = device_count, elapsed_ms = event.elapsed_ms, "Tick processed");
        } else {
            warn!(
                %tick,
                devices = device_count,
                failed = event.failures.len(),
                elapsed_ms = event.elapsed_ms,
                "Tick processed with failures"
            );
        }
        if elapsed > Duration::from_secs(1) {
            warn!(%tick, elapsed_ms = event.elapsed_ms, "Tick overran its second");
        }

        // No subscribers is fine
        let _ = self.events.send(event.clone());
        Some(event)
    }
}

/// Refresh one phase: groups concurrently, devices within a group in order
async fn run_phase(
    devices: &[SharedDevice],
    tick: TickNumber,
    failures: &mut BTreeMap<String, String>,
) {
    if devices.is_empty() {
        return;
    }

    let mut tasks = JoinSet::new();
    for group in partition_groups(devices) {
        tasks.spawn(refresh_group(group, tick));
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(group_failures) => failures.extend(group_failures),
            Err(e) => error!(%tick, "Refresh group task failed: {}", e),
        }
    }
}

async fn refresh_group(group: RefreshGroup, tick: TickNumber) -> Vec<(String, String)> {
    let started = Instant::now();
    let mut failures = Vec::new();

    for device in &group.devices {
        let outcome = AssertUnwindSafe(device.refresh(tick)).catch_unwind().await;
        match outcome {
            Ok(Ok(())) => trace!(device = %device.id(), %tick, "Device refreshed"),
            Ok(Err(e)) => {
                warn!(device = %device.id(), group = %group.id, %tick, "Device refresh failed: {}", e);
                failures.push((device.id().to_string(), e.to_string()));
            },
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(device = %device.id(), group = %group.id, %tick, "Device refresh panicked: {}", reason);
                failures.push((device.id().to_string(), format!("panicked: {}", reason)));
            },
        }
    }

    trace!(
        group = %group.id,
        %tick,
        devices = group.devices.len(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "Refresh group done"
    );
    failures
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
