//! Reusable validation helpers for the order model

use regex::Regex;
use std::sync::OnceLock;

use super::error::{ValidationError, ValidationErrorKind, ValidationResult};

/// Tolerance applied when comparing monetary amounts
pub const AMOUNT_TOLERANCE: f64 = 0.01;

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

/// Get or initialize the email regex pattern
fn email_regex() -> &'static Regex {
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Invalid email regex pattern")
    })
}

/// Validate that a required string field is not empty or blank
pub fn validate_required(value: &str, field_name: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        Err(ValidationError::new(
            ValidationErrorKind::RequiredField,
            field_name,
        ))
    } else {
        Ok(())
    }
}

/// Validate an optional email address. An empty string is accepted.
pub fn validate_email(email: &str, field_name: &str) -> ValidationResult<()> {
    if email.is_empty() || email_regex().is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::with_context(
            ValidationErrorKind::InvalidEmail,
            field_name,
            email.to_string(),
        ))
    }
}

/// Compare two monetary amounts within [`AMOUNT_TOLERANCE`]
pub fn amounts_match(expected: f64, actual: f64) -> bool {
    (expected - actual).abs() <= AMOUNT_TOLERANCE
}

/// Validate that an amount matches the value computed from its parts
pub fn validate_amount(expected: f64, actual: f64, field_name: &str) -> ValidationResult<()> {
    if amounts_match(expected, actual) {
        Ok(())
    } else {
        Err(ValidationError::new(
            ValidationErrorKind::AmountMismatch { expected, actual },
            field_name,
        ))
    }
}
