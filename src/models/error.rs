//! Validation error types for the order model
//!
//! These are separate from the general application errors so that callers
//! can inspect which field of an incoming order failed and why.

use std::fmt;
use thiserror::Error;

/// Main validation error type
#[derive(Error, Debug, Clone)]
pub struct ValidationError {
    /// The kind of validation error
    pub kind: ValidationErrorKind,
    /// The field that failed validation
    pub field: String,
    /// Optional additional context
    pub context: Option<String>,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(kind: ValidationErrorKind, field: impl Into<String>) -> Self {
        Self {
            kind,
            field: field.into(),
            context: None,
        }
    }

    /// Create a validation error with additional context
    pub fn with_context(
        kind: ValidationErrorKind,
        field: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            field: field.into(),
            context: Some(context.into()),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(ctx) => write!(
                f,
                "Validation failed for field '{}': {} - {}",
                self.field, self.kind, ctx
            ),
            None => write!(
                f,
                "Validation failed for field '{}': {}",
                self.field, self.kind
            ),
        }
    }
}

/// Specific validation error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationErrorKind {
    /// Field is required but missing or empty
    #[error("Required field is missing")]
    RequiredField,

    /// Sequence number must be positive
    #[error("Sequence must be positive")]
    InvalidSequence,

    /// Order must contain at least one item
    #[error("Order must contain at least one item")]
    NoItems,

    /// Quantity must be positive
    #[error("Quantity must be positive")]
    InvalidQuantity,

    /// Unit price must be positive
    #[error("Unit price must be positive")]
    InvalidUnitPrice,

    /// Tax must be zero or positive
    #[error("Tax must be zero or positive")]
    NegativeTax,

    /// An amount does not match the value computed from its parts
    #[error("Amount mismatch (expected {expected:.2}, got {actual:.2})")]
    AmountMismatch { expected: f64, actual: f64 },

    /// Invalid email format
    #[error("Invalid email format")]
    InvalidEmail,
}

/// Result type alias for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Convert validation errors to application errors
impl From<ValidationError> for crate::error::Error {
    fn from(err: ValidationError) -> Self {
        crate::error::Error::validation(err.to_string())
    }
}
