//! Wire schemas for the tracker's durable log files
//!
//! [`HealthEntry`] is one line of `tracker.log` (application health
//! monitoring); [`AuditEntry`] is one line of `tracker.events` (audit trail).
//! Both are single self-contained JSON objects so the monitor can tail the
//! files line by line.

use serde::{Deserialize, Serialize};

/// Audit event type for a successfully read message
pub const EVENT_MESSAGE_RECEIVED: &str = "message.received";

/// Audit event type for a message whose payload could not be deserialized
pub const EVENT_DESERIALIZATION_ERROR: &str = "message.received.deserialization_error";

/// Severity levels for health entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "ERROR")]
    Error,
}

/// One line of the health log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthEntry {
    /// Timestamp in RFC3339 format
    pub timestamp: String,

    /// Severity level
    pub level: LogLevel,

    /// Main log message
    pub message: String,

    /// Name of the emitting service
    pub service: String,

    /// Error message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Additional contextual data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// One line of the audit trail
///
/// Captures a faithful copy of every message received from Kafka, valid or
/// not, along with its broker coordinates. This file is the source of truth
/// for auditing, event replay and debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Reception timestamp in RFC3339 format
    pub timestamp: String,

    /// Event type (`message.received` or
    /// `message.received.deserialization_error`)
    pub event_type: String,

    /// Source Kafka topic
    pub kafka_topic: String,

    /// Source Kafka partition
    pub kafka_partition: i32,

    /// Message offset within the partition
    pub kafka_offset: i64,

    /// Raw message content as text
    pub raw_message: String,

    /// Message size in bytes
    pub message_size: usize,

    /// Whether deserialization succeeded
    pub deserialized: bool,

    /// Deserialization error, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Full content of the deserialized order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_full: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_log_level_wire_format() {
        assert_eq!(serde_json::to_string(&LogLevel::Info).unwrap(), "\"INFO\"");
        assert_eq!(
            serde_json::to_string(&LogLevel::Error).unwrap(),
            "\"ERROR\""
        );
    }

    #[test]
    fn test_health_entry_omits_empty_optionals() {
        let entry = HealthEntry {
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            level: LogLevel::Info,
            message: "Consumer started".to_string(),
            service: "order-tracker".to_string(),
            error: None,
            metadata: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"level\":\"INFO\""));
        assert!(!json.contains("\"error\""));
        assert!(!json.contains("\"metadata\""));
    }

    #[test]
    fn test_health_entry_round_trip() {
        let entry = HealthEntry {
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            level: LogLevel::Error,
            message: "Read failed".to_string(),
            service: "order-tracker".to_string(),
            error: Some("broker down".to_string()),
            metadata: Some(json!({"consecutive_errors": 2})),
        };
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: HealthEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.level, LogLevel::Error);
        assert_eq!(parsed.error.as_deref(), Some("broker down"));
        assert_eq!(parsed.metadata.unwrap()["consecutive_errors"], 2);
    }

    #[test]
    fn test_audit_entry_keys() {
        let entry = AuditEntry {
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            event_type: EVENT_MESSAGE_RECEIVED.to_string(),
            kafka_topic: "orders".to_string(),
            kafka_partition: 0,
            kafka_offset: 42,
            raw_message: "{}".to_string(),
            message_size: 2,
            deserialized: true,
            error: None,
            order_full: Some(json!({"order_id": "abc"})),
        };
        let json = serde_json::to_string(&entry).unwrap();
        for key in [
            "timestamp",
            "event_type",
            "kafka_topic",
            "kafka_partition",
            "kafka_offset",
            "raw_message",
            "message_size",
            "deserialized",
            "order_full",
        ] {
            assert!(json.contains(&format!("\"{}\"", key)), "missing {}", key);
        }
        assert!(!json.contains("\"error\""));
    }
}
