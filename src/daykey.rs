//! Calendar-day identifiers in the reference timezone.
//!
//! Quotas reset at local midnight of the configured UTC offset. Two instants
//! share a day key iff they fall on the same calendar date at that offset.
//! The server key computed here is authoritative; any client countdown is
//! advisory and derives from the same rule via `seconds_until_reset`.

use chrono::{FixedOffset, Offset, TimeZone, Utc};

fn reference_offset(utc_offset_hours: i32) -> FixedOffset {
    let secs = utc_offset_hours.clamp(-23, 23) * 3_600;
    match FixedOffset::east_opt(secs) {
        Some(offset) => offset,
        None => Utc.fix(),
    }
}

pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

/// Map an epoch-seconds instant to its "YYYY-MM-DD" key in the reference
/// timezone. Pure and total; instants outside chrono's representable range
/// collapse to the epoch date rather than failing.
pub fn day_key(ts_secs: i64, utc_offset_hours: i32) -> String {
    let offset = reference_offset(utc_offset_hours);
    match Utc.timestamp_opt(ts_secs, 0).single() {
        Some(utc) => utc.with_timezone(&offset).format("%Y-%m-%d").to_string(),
        None => "1970-01-01".to_string(),
    }
}

/// Seconds until the next local midnight at the reference offset.
pub fn seconds_until_reset(ts_secs: i64, utc_offset_hours: i32) -> i64 {
    let shift = reference_offset(utc_offset_hours).local_minus_utc() as i64;
    let local = ts_secs.saturating_add(shift);
    86_400 - local.rem_euclid(86_400)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-10 00:00:00 UTC
    const MARCH_10_UTC: i64 = 1_710_028_800;

    #[test]
    fn test_same_day_same_key() {
        let morning = MARCH_10_UTC + 6 * 3_600;
        let evening = MARCH_10_UTC + 20 * 3_600;
        assert_eq!(day_key(morning, 3), day_key(evening, 3));
    }

    #[test]
    fn test_reset_at_local_midnight_not_utc() {
        // At UTC+3 the local day flips at 21:00 UTC.
        let before = MARCH_10_UTC + 20 * 3_600 + 59 * 60 + 59;
        let after = MARCH_10_UTC + 21 * 3_600 + 1;
        assert_ne!(day_key(before, 3), day_key(after, 3));
        // ...while in UTC the same instants share a date.
        assert_eq!(day_key(before, 0), day_key(after, 0));
    }

    #[test]
    fn test_boundary_one_second_each_side() {
        // 23:59:59 vs 00:00:01 local time.
        let local_midnight_utc = MARCH_10_UTC - 3 * 3_600; // midnight at UTC+3
        assert_ne!(
            day_key(local_midnight_utc - 1, 3),
            day_key(local_midnight_utc + 1, 3)
        );
    }

    #[test]
    fn test_key_format() {
        assert_eq!(day_key(MARCH_10_UTC, 0), "2024-03-10");
        assert_eq!(day_key(0, 0), "1970-01-01");
    }

    #[test]
    fn test_negative_offset() {
        // At UTC-5 an instant just after UTC midnight is still the prior day.
        assert_eq!(day_key(MARCH_10_UTC + 60, -5), "2024-03-09");
    }

    #[test]
    fn test_offset_clamped() {
        // Out-of-range offsets clamp instead of failing.
        assert_eq!(day_key(MARCH_10_UTC, 99), day_key(MARCH_10_UTC, 23));
    }

    #[test]
    fn test_seconds_until_reset() {
        let local_midnight_utc = MARCH_10_UTC - 3 * 3_600;
        assert_eq!(seconds_until_reset(local_midnight_utc, 3), 86_400);
        assert_eq!(seconds_until_reset(local_midnight_utc + 1, 3), 86_399);
        assert_eq!(seconds_until_reset(local_midnight_utc + 86_399, 3), 1);
    }
}
