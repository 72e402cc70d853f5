//! Time utilities shared by the stores and the session manager.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Returns the current UTC time.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Returns the current Unix timestamp in seconds.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Converts a `std::time::Duration` into a chrono duration, clamping
/// out-of-range values to the chrono maximum.
pub fn to_chrono(d: std::time::Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or(ChronoDuration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_timestamp_is_reasonable() {
        let ts = now_timestamp();
        // Should be after 2024-01-01 (1704067200)
        assert!(ts > 1704067200, "timestamp {} is too old", ts);
        // Should be before 2100-01-01 (4102444800)
        assert!(ts < 4102444800, "timestamp {} is too far in future", ts);
    }

    #[test]
    fn test_to_chrono_roundtrip() {
        let d = std::time::Duration::from_secs(90);
        assert_eq!(to_chrono(d).num_seconds(), 90);
    }
}
