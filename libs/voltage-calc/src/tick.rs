//! Logical clock units
//!
//! The sampler drives everything from one integer clock: a tick is one
//! wall-clock second. Sample intervals use the same unit today, but they are
//! kept as separate types so the two can diverge later without touching call
//! sites.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical time unit derived from the wall clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TickNumber(i64);

impl TickNumber {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    /// Tick for a Unix timestamp in milliseconds: `round(millis / 1000)`
    ///
    /// Half seconds round up, so 1500 ms is tick 2.
    pub fn from_millis(millis: i64) -> Self {
        Self((millis + 500).div_euclid(1000))
    }

    /// Tick for the current wall-clock time
    pub fn now() -> Self {
        Self::from_millis(chrono::Utc::now().timestamp_millis())
    }
}

impl From<i64> for TickNumber {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for TickNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How often (in ticks) an element or variable is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleInterval(i64);

impl SampleInterval {
    pub const DEFAULT: SampleInterval = SampleInterval(1);

    pub const fn new(seconds: i64) -> Self {
        Self(seconds)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    /// Interval expressed in ticks (identity today)
    pub const fn as_ticks(self) -> i64 {
        self.0
    }

    /// True when `tick mod interval == 0`
    ///
    /// A non-positive interval never matches.
    pub fn matches(self, tick: TickNumber) -> bool {
        let ticks = self.as_ticks();
        ticks > 0 && tick.value().rem_euclid(ticks) == 0
    }
}

impl Default for SampleInterval {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for SampleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_from_millis_rounds() {
        assert_eq!(TickNumber::from_millis(1_000), TickNumber::new(1));
        assert_eq!(TickNumber::from_millis(1_499), TickNumber::new(1));
        assert_eq!(TickNumber::from_millis(1_500), TickNumber::new(2));
        assert_eq!(TickNumber::from_millis(1_999), TickNumber::new(2));
        assert_eq!(TickNumber::from_millis(0), TickNumber::new(0));
    }

    #[test]
    fn test_sample_interval_matches() {
        let every_ten = SampleInterval::new(10);
        assert!(every_ten.matches(TickNumber::new(0)));
        assert!(every_ten.matches(TickNumber::new(120)));
        assert!(!every_ten.matches(TickNumber::new(123)));

        assert!(SampleInterval::DEFAULT.matches(TickNumber::new(7)));
        assert!(!SampleInterval::new(0).matches(TickNumber::new(10)));
        assert!(!SampleInterval::new(-5).matches(TickNumber::new(10)));
    }
}
