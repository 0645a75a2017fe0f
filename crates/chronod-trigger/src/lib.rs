//! `chronod-trigger` — pure next-run and retry-backoff calculators.
//!
//! No state, no I/O. The executor, the scheduler engine, and the job
//! service all consult these functions; everything here is a plain
//! computation from a recurrence spec and a reference instant.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use thiserror::Error;

/// Backoff delays are capped at this many minutes.
pub const BACKOFF_CAP_MINUTES: u32 = 60;

#[derive(Debug, Error)]
pub enum TriggerError {
    /// The cron expression failed to parse or has the wrong field count.
    #[error("Invalid recurrence spec: {0}")]
    InvalidRecurrenceSpec(String),
}

pub type Result<T> = std::result::Result<T, TriggerError>;

/// Parse a 5-field cron expression (minute hour day-of-month month
/// day-of-week).
///
/// The `cron` crate expects a seconds field, so a zero-seconds field is
/// prepended before parsing: a 5-field job spec always fires at second 0.
fn parse_cron(expr: &str) -> Result<Schedule> {
    let expr = expr.trim();
    let fields = expr.split_whitespace().count();
    if fields != 5 {
        return Err(TriggerError::InvalidRecurrenceSpec(format!(
            "expected 5 cron fields, got {fields}: {expr}"
        )));
    }
    Schedule::from_str(&format!("0 {expr}"))
        .map_err(|e| TriggerError::InvalidRecurrenceSpec(format!("{expr}: {e}")))
}

/// Validate a cron expression without computing anything.
pub fn validate_cron(expr: &str) -> Result<()> {
    parse_cron(expr).map(|_| ())
}

/// Earliest instant strictly after `from` matching the cron expression.
pub fn next_from_cron(expr: &str, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let schedule = parse_cron(expr)?;
    schedule.after(&from).next().ok_or_else(|| {
        TriggerError::InvalidRecurrenceSpec(format!("{expr}: no future occurrence"))
    })
}

/// `from + seconds` for interval-based jobs.
pub fn next_from_interval(seconds: u32, from: DateTime<Utc>) -> DateTime<Utc> {
    from + Duration::seconds(seconds as i64)
}

/// Retry instant with exponential backoff: `now + min(2^retry_count, 60)`
/// minutes. Monotonically non-decreasing in `retry_count`.
pub fn next_retry_time(retry_count: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    let delay_minutes = 2u32
        .checked_pow(retry_count)
        .map(|m| m.min(BACKOFF_CAP_MINUTES))
        .unwrap_or(BACKOFF_CAP_MINUTES);
    now + Duration::minutes(delay_minutes as i64)
}

/// Next run for whichever recurrence field is set.
///
/// Exactly one of `cron_expression` / `interval_seconds` is consulted;
/// the validation layer guarantees exclusivity. Returns `None` when
/// neither is set or the cron expression cannot produce a future run.
pub fn next_run_for(
    cron_expression: Option<&str>,
    interval_seconds: Option<u32>,
    from: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if let Some(expr) = cron_expression {
        next_from_cron(expr, from).ok()
    } else {
        interval_seconds.map(|secs| next_from_interval(secs, from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn cron_next_is_strictly_after_reference() {
        // Every Monday at 09:00.
        let from = at(2025, 6, 2, 9, 0, 0); // a Monday, exactly 09:00
        let next = next_from_cron("0 9 * * MON", from).unwrap();
        assert!(next > from);
        assert_eq!(next, at(2025, 6, 9, 9, 0, 0));
    }

    #[test]
    fn cron_matches_field_constraints() {
        let from = at(2025, 6, 2, 10, 30, 0);
        // Daily at 00:15.
        let next = next_from_cron("15 0 * * *", from).unwrap();
        assert_eq!(next, at(2025, 6, 3, 0, 15, 0));
        // Every 5 minutes.
        let next = next_from_cron("*/5 * * * *", from).unwrap();
        assert_eq!(next, at(2025, 6, 2, 10, 35, 0));
    }

    #[test]
    fn malformed_cron_is_rejected() {
        assert!(next_from_cron("not a cron", Utc::now()).is_err());
        assert!(next_from_cron("61 * * * *", Utc::now()).is_err());
        assert!(validate_cron("* * * *").is_err()); // 4 fields
        assert!(validate_cron("* * * * * *").is_err()); // 6 fields
        assert!(validate_cron("*/10 * * * *").is_ok());
    }

    #[test]
    fn interval_adds_exact_seconds() {
        let from = at(2025, 1, 1, 0, 0, 0);
        assert_eq!(next_from_interval(3600, from), at(2025, 1, 1, 1, 0, 0));
    }

    #[test]
    fn retry_backoff_formula_and_cap() {
        let now = at(2025, 1, 1, 0, 0, 0);
        assert_eq!(next_retry_time(0, now), now + Duration::minutes(1));
        assert_eq!(next_retry_time(1, now), now + Duration::minutes(2));
        assert_eq!(next_retry_time(3, now), now + Duration::minutes(8));
        assert_eq!(next_retry_time(5, now), now + Duration::minutes(32));
        // 2^6 = 64 > 60 — capped.
        assert_eq!(next_retry_time(6, now), now + Duration::minutes(60));
        assert_eq!(next_retry_time(40, now), now + Duration::minutes(60));
    }

    #[test]
    fn retry_backoff_is_monotone() {
        let now = Utc::now();
        let mut prev = next_retry_time(0, now);
        for count in 1..20 {
            let next = next_retry_time(count, now);
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn next_run_for_prefers_whichever_field_is_set() {
        let from = at(2025, 6, 2, 10, 0, 0);
        assert_eq!(
            next_run_for(None, Some(600), from),
            Some(at(2025, 6, 2, 10, 10, 0))
        );
        assert_eq!(
            next_run_for(Some("0 12 * * *"), None, from),
            Some(at(2025, 6, 2, 12, 0, 0))
        );
        assert_eq!(next_run_for(None, None, from), None);
        assert_eq!(next_run_for(Some("garbage"), None, from), None);
    }
}
