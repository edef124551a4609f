//! TTL expiration timestamps.
//!
//! The management API only accepts whole-minute timestamps ending in `:00Z`,
//! so sub-minute precision is truncated (never rounded) before formatting.

use chrono::{DateTime, Duration, DurationRound, Utc};

use crate::error::{PolicyError, Result};

pub const DEFAULT_TTL_MINUTES: u32 = 8 * 60;

/// `now + ttl_minutes`, truncated to the minute.
pub fn expiration(now: DateTime<Utc>, ttl_minutes: u32) -> Result<DateTime<Utc>> {
    if ttl_minutes == 0 {
        return Err(PolicyError::Config("ttlMinutes must be greater than zero".into()));
    }
    let end = now + Duration::minutes(i64::from(ttl_minutes));
    end.duration_trunc(Duration::minutes(1))
        .map_err(|e| PolicyError::Config(format!("cannot truncate expiration timestamp: {e}")))
}

/// Wire form: `YYYY-MM-DDTHH:MM:00Z`.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:00Z").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn eight_hours_from_midnight() {
        let ts = expiration(at("2024-01-01T00:00:00.000Z"), 480).unwrap();
        assert_eq!(format_timestamp(ts), "2024-01-01T08:00:00Z");
    }

    #[test]
    fn sub_minute_precision_is_truncated_not_rounded() {
        let ts = expiration(at("2024-01-01T00:00:59.999Z"), 480).unwrap();
        assert_eq!(format_timestamp(ts), "2024-01-01T08:00:00Z");
        assert_eq!(ts, at("2024-01-01T08:00:00Z"));
    }

    #[test]
    fn crosses_day_boundary() {
        let ts = expiration(at("2024-02-28T20:30:15Z"), 240).unwrap();
        assert_eq!(format_timestamp(ts), "2024-02-29T00:30:00Z");
    }

    #[test]
    fn zero_minutes_is_config_error() {
        let err = expiration(Utc::now(), 0).unwrap_err();
        assert!(matches!(err, PolicyError::Config(_)));
    }
}
