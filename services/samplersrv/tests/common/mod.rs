//! Shared harness for sampler integration tests
//!
//! Mock devices record when each refresh starts and ends, and probes track
//! how many refreshes overlap.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use samplersrv::{Device, SamplerConfig, SamplerError};
use voltage_calc::TickNumber;

/// Concurrency probe shared by a set of devices
#[derive(Debug, Default)]
pub struct Probe {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
}

#[derive(Debug, Clone)]
pub struct RefreshRecord {
    pub device: String,
    pub tick: TickNumber,
    pub started: Instant,
    pub finished: Instant,
}

pub type Journal = Arc<Mutex<Vec<RefreshRecord>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// Device that sleeps for `delay` on every refresh
pub struct TimedDevice {
    id: String,
    group: String,
    special: bool,
    delay: Duration,
    behavior: Behavior,
    probes: Vec<Arc<Probe>>,
    journal: Journal,
    refreshes: AtomicUsize,
}

impl TimedDevice {
    pub fn new(id: &str, journal: &Journal) -> Self {
        Self {
            id: id.to_string(),
            group: id.to_string(),
            special: false,
            delay: Duration::from_millis(20),
            behavior: Behavior::Succeed,
            probes: Vec::new(),
            journal: Arc::clone(journal),
            refreshes: AtomicUsize::new(0),
        }
    }

    pub fn group(mut self, group: &str) -> Self {
        self.group = group.to_string();
        self
    }

    pub fn special(mut self) -> Self {
        self.special = true;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn probe(mut self, probe: &Arc<Probe>) -> Self {
        self.probes.push(Arc::clone(probe));
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Device for TimedDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn refresh_group_id(&self) -> &str {
        &self.group
    }

    fn is_special(&self) -> bool {
        self.special
    }

    async fn refresh(&self, tick: TickNumber) -> samplersrv::Result<()> {
        let started = Instant::now();
        self.probes.iter().for_each(|p| p.enter());
        tokio::time::sleep(self.delay).await;
        self.probes.iter().for_each(|p| p.leave());
        self.refreshes.fetch_add(1, Ordering::SeqCst);

        self.journal.lock().push(RefreshRecord {
            device: self.id.clone(),
            tick,
            started,
            finished: Instant::now(),
        });

        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(SamplerError::refresh(&self.id, "no response")),
            Behavior::Panic => panic!("driver crashed on {}", self.id),
        }
    }
}

pub fn fast_config() -> SamplerConfig {
    SamplerConfig {
        clock_interval_ms: 10,
        tick_channel_capacity: 16,
        shutdown_grace_ms: 2000,
    }
}
