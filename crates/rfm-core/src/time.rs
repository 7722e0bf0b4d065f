//! Timing utilities

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Timestamp type (seconds since the Unix epoch, fractional)
pub type Timestamp = f64;

/// Get current Unix timestamp in seconds
pub fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Get current Unix timestamp in whole seconds
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Convert a timestamp delta in seconds to a Duration
///
/// Negative or non-finite inputs saturate to zero, oversized ones to `Duration::MAX`.
pub fn to_duration(seconds: Timestamp) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_monotonic_enough() {
        let a = now();
        std::thread::sleep(Duration::from_millis(5));
        let b = now();
        assert!(b >= a);
        assert!(a > 1_600_000_000.0);
    }

    #[test]
    fn test_to_duration_saturates() {
        assert_eq!(to_duration(-1.0), Duration::ZERO);
        assert_eq!(to_duration(f64::NAN), Duration::ZERO);
        assert_eq!(to_duration(0.5), Duration::from_millis(500));
    }
}
