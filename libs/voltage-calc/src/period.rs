//! Aggregation period alignment
//!
//! Average and increase elements accumulate over half-open windows
//! `[min_tick_id, max_tick_id)` aligned to multiples of their calculation
//! interval.

use serde::{Deserialize, Serialize};

/// Start of the interval-aligned period containing `tick`
///
/// A non-positive interval means no alignment and returns `tick` unchanged.
pub fn min_tick_id(tick: i64, interval: i64) -> i64 {
    if interval <= 0 {
        return tick;
    }
    tick - tick.rem_euclid(interval)
}

/// End (exclusive) of the interval-aligned period containing `tick`
///
/// A non-positive interval degenerates to `tick` itself.
pub fn max_tick_id(tick: i64, interval: i64) -> i64 {
    if interval <= 0 {
        return tick;
    }
    min_tick_id(tick, interval) + interval
}

/// Half-open tick window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub min_tick_id: i64,
    pub max_tick_id: i64,
}

impl Period {
    /// Period containing `tick`, using the degenerate alignment for `interval <= 0`
    pub fn aligned(tick: i64, interval: i64) -> Self {
        Self {
            min_tick_id: min_tick_id(tick, interval),
            max_tick_id: max_tick_id(tick, interval),
        }
    }

    /// Like [`Period::aligned`], but an unaligned period spans one tick
    /// (`[tick, tick + 1)`) instead of being empty
    pub fn spanning(tick: i64, interval: i64) -> Self {
        if interval <= 0 {
            return Self {
                min_tick_id: tick,
                max_tick_id: tick + 1,
            };
        }
        Self::aligned(tick, interval)
    }

    pub fn contains(&self, tick: i64) -> bool {
        tick >= self.min_tick_id && tick < self.max_tick_id
    }

    /// The period is over once a tick reaches its exclusive end
    pub fn is_closed_by(&self, tick: i64) -> bool {
        tick >= self.max_tick_id
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment() {
        assert_eq!(min_tick_id(123, 10), 120);
        assert_eq!(max_tick_id(123, 10), 130);
        assert_eq!(min_tick_id(120, 10), 120);
        assert_eq!(max_tick_id(120, 10), 130);
    }

    #[test]
    fn test_degenerate_interval() {
        assert_eq!(min_tick_id(123, 0), 123);
        assert_eq!(max_tick_id(123, 0), 123);
        assert_eq!(min_tick_id(123, -4), 123);

        let period = Period::spanning(123, 0);
        assert_eq!(period.min_tick_id, 123);
        assert_eq!(period.max_tick_id, 124);
        assert!(period.contains(123));
        assert!(period.is_closed_by(124));
    }

    #[test]
    fn test_period_bounds_are_half_open() {
        let period = Period::aligned(35, 10);
        assert!(period.contains(30));
        assert!(period.contains(39));
        assert!(!period.contains(40));
        assert!(period.is_closed_by(40));
        assert!(!period.is_closed_by(39));
    }
}
