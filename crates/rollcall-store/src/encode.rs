//! Column encoding helpers.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings so that string
//! comparison in SQL matches chronological order. The ledger's `day` column
//! is the *local* calendar date of the event, computed at write time — that
//! is the idempotency unit, not the UTC date.

use chrono::{DateTime, Local, SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};

pub fn encode_dt(dt: DateTime<Local>) -> String {
    dt.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_dt(raw: &str) -> Result<DateTime<Local>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| Error::Timestamp(format!("{raw}: {e}")))
}

pub fn encode_uuid(id: Uuid) -> String {
    id.to_string()
}

pub fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(Error::Uuid)
}

/// Local calendar date key for the day-uniqueness constraint.
pub fn day_key(dt: DateTime<Local>) -> String {
    dt.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_round_trip() {
        let dt = Local.with_ymd_and_hms(2026, 8, 29, 23, 59, 59).unwrap();
        assert_eq!(parse_dt(&encode_dt(dt)).unwrap(), dt);
    }

    #[test]
    fn encoded_timestamps_sort_chronologically() {
        let early = Local.with_ymd_and_hms(2026, 8, 29, 9, 0, 0).unwrap();
        let late = Local.with_ymd_and_hms(2026, 8, 29, 17, 30, 0).unwrap();
        assert!(encode_dt(early) < encode_dt(late));
    }

    #[test]
    fn day_key_uses_local_date() {
        let dt = Local.with_ymd_and_hms(2026, 1, 2, 0, 0, 1).unwrap();
        assert_eq!(day_key(dt), "2026-01-02");
    }
}
