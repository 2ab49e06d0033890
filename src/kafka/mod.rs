//! Kafka integration module for the order pipeline
//!
//! This module provides:
//! - The minimal broker surface the tracker consumes ([`MessageConsumer`])
//! - The rdkafka-backed consumer implementation
//! - The dead letter queue publisher with delivery-report accounting
//! - The order publisher used by the producer binary
//!
//! Only the operations the pipeline actually uses are abstracted behind
//! traits; everything else talks to rdkafka directly.

mod consumer;
mod dlq;
mod publisher;

pub use consumer::KafkaConsumer;
pub use dlq::{DeadLetterQueue, DlqStats, FailedMessage, KafkaDlqTransport};
pub use publisher::{OrderPublisher, PublishStats};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::time::Duration;

use crate::error::Result;

/// An owned copy of one record delivered by the broker
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Source topic
    pub topic: String,

    /// Source partition
    pub partition: i32,

    /// Offset within the partition
    pub offset: i64,

    /// Broker-assigned timestamp, when present
    pub timestamp: Option<DateTime<Utc>>,

    /// Message key, when present
    pub key: Option<Vec<u8>>,

    /// Message payload
    pub payload: Vec<u8>,
}

/// The consumer surface the tracker depends on.
///
/// `read_message` blocks for up to `timeout`; `Ok(None)` is the timeout
/// sentinel, transport failures come back as errors.
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Subscribe to a topic
    fn subscribe(&self, topic: &str) -> Result<()>;

    /// Read the next message, waiting at most `timeout`
    async fn read_message(&self, timeout: Duration) -> Result<Option<InboundMessage>>;
}

/// Asynchronous delivery confirmation for one produced record
pub type DeliveryConfirmation = BoxFuture<'static, std::result::Result<(), String>>;

/// One record handed to a DLQ transport
#[derive(Debug, Clone)]
pub struct OutboundRecord {
    /// Destination topic
    pub topic: String,

    /// Record key
    pub key: String,

    /// Serialized payload
    pub payload: Vec<u8>,

    /// Broker-level headers
    pub headers: Vec<(String, String)>,
}

/// The producer surface the dead letter queue depends on.
///
/// `produce` must not wait for delivery; the returned confirmation resolves
/// when the broker acknowledges or rejects the record.
pub trait DlqTransport: Send + Sync {
    /// Enqueue one record for delivery
    fn produce(&self, record: OutboundRecord) -> Result<DeliveryConfirmation>;

    /// Block for at most `timeout` flushing pending deliveries
    fn flush(&self, timeout: Duration) -> Result<()>;
}
