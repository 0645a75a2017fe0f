//! Field-level validation for job configuration and pagination.
//!
//! Everything here rejects before anything is persisted; a validation
//! failure is never partially applied.

use chronod_core::config::{
    INTERVAL_MAX_SECS, INTERVAL_MIN_SECS, MAX_RETRIES_LIMIT, NAME_MAX_LEN, NAME_MIN_LEN,
    PAGE_SIZE_MAX, PRIORITY_MAX, PRIORITY_MIN, TIMEOUT_MAX_SECS, TIMEOUT_MIN_SECS,
};
use chronod_core::{ChronodError, Result};

/// Trimmed, length- and charset-checked job name.
pub fn validate_job_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ChronodError::validation("name", "job name is required"));
    }
    if name.len() < NAME_MIN_LEN {
        return Err(ChronodError::validation(
            "name",
            format!("job name must be at least {NAME_MIN_LEN} characters"),
        ));
    }
    if name.len() > NAME_MAX_LEN {
        return Err(ChronodError::validation(
            "name",
            format!("job name cannot exceed {NAME_MAX_LEN} characters"),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
    {
        return Err(ChronodError::validation(
            "name",
            "job name can only contain letters, numbers, spaces, hyphens, and underscores",
        ));
    }
    Ok(name.to_string())
}

/// Exactly one recurrence field, and that field well-formed.
pub fn validate_recurrence(
    cron_expression: Option<&str>,
    interval_seconds: Option<u32>,
) -> Result<()> {
    match (cron_expression, interval_seconds) {
        (None, None) => Err(ChronodError::InvalidRecurrenceSpec(
            "either cron_expression or interval_seconds must be provided".to_string(),
        )),
        (Some(_), Some(_)) => Err(ChronodError::InvalidRecurrenceSpec(
            "cron_expression and interval_seconds are mutually exclusive".to_string(),
        )),
        (Some(expr), None) => chronod_trigger::validate_cron(expr)
            .map_err(|e| ChronodError::InvalidRecurrenceSpec(e.to_string())),
        (None, Some(interval)) => validate_interval_seconds(interval),
    }
}

pub fn validate_interval_seconds(interval: u32) -> Result<()> {
    if interval < INTERVAL_MIN_SECS {
        return Err(ChronodError::validation(
            "interval_seconds",
            format!("minimum interval is {INTERVAL_MIN_SECS} seconds"),
        ));
    }
    if interval > INTERVAL_MAX_SECS {
        return Err(ChronodError::validation(
            "interval_seconds",
            "maximum interval is 7 days",
        ));
    }
    Ok(())
}

pub fn validate_priority(priority: u8) -> Result<()> {
    if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&priority) {
        return Err(ChronodError::validation(
            "priority",
            format!("priority must be between {PRIORITY_MIN} and {PRIORITY_MAX}"),
        ));
    }
    Ok(())
}

pub fn validate_max_retries(max_retries: u32) -> Result<()> {
    if max_retries > MAX_RETRIES_LIMIT {
        return Err(ChronodError::validation(
            "max_retries",
            format!("max retries cannot exceed {MAX_RETRIES_LIMIT}"),
        ));
    }
    Ok(())
}

pub fn validate_timeout_seconds(timeout: u64) -> Result<()> {
    if timeout < TIMEOUT_MIN_SECS {
        return Err(ChronodError::validation(
            "timeout_seconds",
            format!("minimum timeout is {TIMEOUT_MIN_SECS} seconds"),
        ));
    }
    if timeout > TIMEOUT_MAX_SECS {
        return Err(ChronodError::validation(
            "timeout_seconds",
            "maximum timeout is 24 hours",
        ));
    }
    Ok(())
}

/// Validated `(page, per_page)`, 1-based.
pub fn validate_pagination(page: u32, per_page: u32) -> Result<(u32, u32)> {
    if page < 1 {
        return Err(ChronodError::validation("page", "page number must be >= 1"));
    }
    if per_page < 1 {
        return Err(ChronodError::validation("per_page", "per page must be >= 1"));
    }
    if per_page > PAGE_SIZE_MAX {
        return Err(ChronodError::validation(
            "per_page",
            format!("per page cannot exceed {PAGE_SIZE_MAX}"),
        ));
    }
    Ok((page, per_page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_bounds_and_charset() {
        assert!(validate_job_name("ab").is_err());
        assert!(validate_job_name("   ").is_err());
        assert!(validate_job_name(&"x".repeat(256)).is_err());
        assert!(validate_job_name("weird!name").is_err());
        assert_eq!(validate_job_name("  nightly-backup_1  ").unwrap(), "nightly-backup_1");
    }

    #[test]
    fn recurrence_exclusivity() {
        assert!(validate_recurrence(None, None).is_err());
        assert!(validate_recurrence(Some("*/5 * * * *"), Some(60)).is_err());
        assert!(validate_recurrence(Some("*/5 * * * *"), None).is_ok());
        assert!(validate_recurrence(None, Some(60)).is_ok());
        assert!(matches!(
            validate_recurrence(Some("bad cron"), None),
            Err(ChronodError::InvalidRecurrenceSpec(_))
        ));
    }

    #[test]
    fn interval_bounds() {
        assert!(validate_interval_seconds(59).is_err());
        assert!(validate_interval_seconds(60).is_ok());
        assert!(validate_interval_seconds(7 * 24 * 3600).is_ok());
        assert!(validate_interval_seconds(7 * 24 * 3600 + 1).is_err());
    }

    #[test]
    fn priority_bounds() {
        assert!(validate_priority(0).is_err());
        assert!(validate_priority(1).is_ok());
        assert!(validate_priority(10).is_ok());
        assert!(validate_priority(11).is_err());
    }

    #[test]
    fn retry_and_timeout_bounds() {
        assert!(validate_max_retries(10).is_ok());
        assert!(validate_max_retries(11).is_err());
        assert!(validate_timeout_seconds(29).is_err());
        assert!(validate_timeout_seconds(30).is_ok());
        assert!(validate_timeout_seconds(24 * 3600).is_ok());
        assert!(validate_timeout_seconds(24 * 3600 + 1).is_err());
    }

    #[test]
    fn pagination_bounds() {
        assert!(validate_pagination(0, 20).is_err());
        assert!(validate_pagination(1, 0).is_err());
        assert!(validate_pagination(1, 101).is_err());
        assert_eq!(validate_pagination(2, 50).unwrap(), (2, 50));
    }
}
