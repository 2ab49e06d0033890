//! Audit trail writer
//!
//! One entry per message received from Kafka, valid or not, so no incoming
//! data is ever lost. Entries are written before the message is dispatched
//! to any handler.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use crate::error::Result;
use crate::kafka::InboundMessage;
use crate::models::{
    AuditEntry, Order, EVENT_DESERIALIZATION_ERROR, EVENT_MESSAGE_RECEIVED,
};

/// Append-only writer for the audit trail file
pub struct AuditLog {
    file: Mutex<File>,
}

impl AuditLog {
    /// Open the audit file in append mode, creating it if needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = super::open_append(path.as_ref())?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Record one received message.
    ///
    /// `order` carries the deserialized payload when parsing succeeded,
    /// `deser_error` the parse failure otherwise. Write failures are printed
    /// to stderr, never returned.
    pub fn record(&self, msg: &InboundMessage, order: Option<&Order>, deser_error: Option<&str>) {
        let event_type = if deser_error.is_some() {
            EVENT_DESERIALIZATION_ERROR
        } else {
            EVENT_MESSAGE_RECEIVED
        };

        let order_full = order.and_then(|o| match serde_json::to_value(o) {
            Ok(value) => Some(value),
            Err(e) => {
                eprintln!("Order serialization error: {}", e);
                None
            },
        });

        let entry = AuditEntry {
            timestamp: super::rfc3339_now(),
            event_type: event_type.to_string(),
            kafka_topic: msg.topic.clone(),
            kafka_partition: msg.partition,
            kafka_offset: msg.offset,
            raw_message: String::from_utf8_lossy(&msg.payload).into_owned(),
            message_size: msg.payload.len(),
            deserialized: order.is_some(),
            error: deser_error.map(str::to_string),
            order_full,
        };

        super::append_line(&self.file, &entry, "Audit");
    }

    /// Flush buffered entries to disk
    pub fn flush(&self) {
        super::flush_file(&self.file, "Audit");
    }
}
