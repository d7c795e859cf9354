//! Input validation helpers
//!
//! Text length constants and the checks shared by intake, invoice and
//! change-request operations. SQLite TEXT has no built-in length enforcement.

use chrono::NaiveDate;
use shared::error::AppError;

// ── Text length limits ──────────────────────────────────────────────

/// Customer names, reviewer names, line item titles
pub const MAX_NAME_LEN: usize = 200;

/// Comments, admin responses, line item descriptions
pub const MAX_NOTE_LEN: usize = 500;

/// Phone numbers, service types, categories, payment methods
pub const MAX_SHORT_TEXT_LEN: usize = 100;

/// Email addresses (RFC 5321)
pub const MAX_EMAIL_LEN: usize = 254;

/// Event locations
pub const MAX_ADDRESS_LEN: usize = 500;

/// Largest tax rate accepted (basis points, 100%)
pub const MAX_TAX_RATE_BPS: i64 = 10_000;

// ── Validation helpers ──────────────────────────────────────────────

/// Validate that a required string is non-empty and within the length limit.
pub fn validate_required_text(value: &str, field: &str, max_len: usize) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} must not be empty")));
    }
    if value.len() > max_len {
        return Err(AppError::validation(format!(
            "{field} is too long ({} chars, max {max_len})",
            value.len()
        )));
    }
    Ok(())
}

/// Validate that an optional string, if present, is within the length limit.
pub fn validate_optional_text(
    value: &Option<String>,
    field: &str,
    max_len: usize,
) -> Result<(), AppError> {
    if let Some(v) = value
        && v.len() > max_len
    {
        return Err(AppError::validation(format!(
            "{field} is too long ({} chars, max {max_len})",
            v.len()
        )));
    }
    Ok(())
}

/// Minimal shape check: one `@` with text on both sides and a dot in the domain
pub fn validate_email(value: &str, field: &str) -> Result<(), AppError> {
    validate_required_text(value, field, MAX_EMAIL_LEN)?;
    let valid = match value.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.contains('@')
        }
        None => false,
    };
    if !valid {
        return Err(AppError::validation(format!("{field} is not a valid email address")));
    }
    Ok(())
}

pub fn validate_positive(value: i64, field: &str) -> Result<(), AppError> {
    if value <= 0 {
        return Err(AppError::validation(format!("{field} must be positive, got {value}")));
    }
    Ok(())
}

/// Event dates in the past are rejected at intake
pub fn validate_event_date(date: NaiveDate, today: NaiveDate) -> Result<(), AppError> {
    if date < today {
        return Err(AppError::validation(format!(
            "event_date {date} is in the past"
        )));
    }
    Ok(())
}
