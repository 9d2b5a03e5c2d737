//! Head block time drift.

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of "now" for drift computation.
pub trait WallClock: Send + Sync {
    /// Seconds since the unix epoch, fractional.
    fn now_seconds(&self) -> f64;
}

/// The host's system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_seconds(&self) -> f64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs_f64(),
            Err(e) => -e.duration().as_secs_f64(),
        }
    }
}

/// A clock frozen at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub f64);

impl WallClock for FixedClock {
    fn now_seconds(&self) -> f64 {
        self.0
    }
}

/// `round(now - block timestamp)`, halves rounded toward positive infinity.
/// Positive means the stream lags real time; negative values (block ahead of
/// the local clock) are reported as-is.
pub fn time_drift(now_seconds: f64, timestamp_seconds: i64) -> i64 {
    (now_seconds - timestamp_seconds as f64 + 0.5).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_rounds_to_nearest_second() {
        assert_eq!(time_drift(1_700_000_010.0, 1_700_000_000), 10);
        assert_eq!(time_drift(1_700_000_010.4, 1_700_000_000), 10);
        assert_eq!(time_drift(1_700_000_010.6, 1_700_000_000), 11);
    }

    #[test]
    fn drift_is_negative_when_block_is_ahead() {
        assert_eq!(time_drift(1_700_000_000.0, 1_700_000_007), -7);
        assert_eq!(time_drift(1_699_999_999.8, 1_700_000_000), 0);
    }

    #[test]
    fn half_seconds_round_up() {
        assert_eq!(time_drift(1000.5, 1003), -2);
        assert_eq!(time_drift(1002.5, 1000), 3);
        assert_eq!(time_drift(999.5, 1000), 0);
    }

    #[test]
    fn system_clock_is_past_2020() {
        assert!(SystemClock.now_seconds() > 1_577_836_800.0);
    }
}
