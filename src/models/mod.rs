//! Data models for the order pipeline
//!
//! This module defines the order event structure shared by the producer and
//! tracker, its validation rules, and the wire schemas of the tracker's
//! durable log files.

mod entry;
mod error;
mod order;
mod validation;

pub use entry::{
    AuditEntry, HealthEntry, LogLevel, EVENT_DESERIALIZATION_ERROR, EVENT_MESSAGE_RECEIVED,
};
pub use error::{ValidationError, ValidationErrorKind, ValidationResult};
pub use order::{CustomerInfo, InventoryStatus, Order, OrderItem, OrderMetadata};
pub use validation::{amounts_match, validate_email, validate_required, AMOUNT_TOLERANCE};
