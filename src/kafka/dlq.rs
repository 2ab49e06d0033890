//! Dead letter queue publisher for messages that exhausted their retries

use chrono::{DateTime, Utc};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

use super::{DeliveryConfirmation, DlqTransport, InboundMessage, OutboundRecord};
use crate::error::{Error, Result};

/// How long `close` waits for pending deliveries
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Envelope published to the DLQ topic for a message that failed processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedMessage {
    /// Topic the message was consumed from
    pub original_topic: String,

    /// Partition the message was consumed from
    pub original_partition: i32,

    /// Offset of the message in its partition
    pub original_offset: i64,

    /// Broker timestamp of the original message, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_timestamp: Option<DateTime<Utc>>,

    /// When processing was given up
    pub failed_at: DateTime<Utc>,

    /// Handler attempts made before giving up
    pub attempts: u32,

    /// Final error message
    pub last_error: String,

    /// Original payload as text
    pub payload: String,
}

/// Statistics about DLQ operations
#[derive(Debug, Clone, Default)]
pub struct DlqStats {
    /// Records acknowledged by the broker
    pub messages_sent: u64,

    /// Records the broker rejected or that failed to enqueue
    pub send_errors: u64,

    /// Time of the last acknowledged delivery
    pub last_sent_at: Option<DateTime<Utc>>,

    /// Time of the last failure
    pub last_error_at: Option<DateTime<Utc>>,
}

/// Publishes exhausted messages to a secondary topic.
///
/// Sends are non-blocking: the record is enqueued and a background task
/// consumes delivery confirmations, updating [`DlqStats`] under a lock. A
/// failed DLQ send never fails the primary consumer.
pub struct DeadLetterQueue {
    transport: Option<Box<dyn DlqTransport>>,
    topic: String,
    stats: Arc<Mutex<DlqStats>>,
    report_tx: Option<mpsc::UnboundedSender<DeliveryConfirmation>>,
}

impl DeadLetterQueue {
    /// Create a DLQ handler backed by a real Kafka producer.
    ///
    /// Must be called from within a tokio runtime; the delivery-report drain
    /// runs as a background task. With `enabled` false every operation is a
    /// no-op.
    pub fn connect(broker: &str, topic: &str, enabled: bool) -> Result<Self> {
        if !enabled {
            return Ok(Self::disabled());
        }

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", broker)
            .set("acks", "all")
            .create()
            .map_err(|e| Error::kafka(format!("Failed to create DLQ producer: {}", e)))?;

        Ok(Self::with_transport(
            Box::new(KafkaDlqTransport { producer }),
            topic,
        ))
    }

    /// Create a DLQ handler over an arbitrary transport
    pub fn with_transport(transport: Box<dyn DlqTransport>, topic: &str) -> Self {
        let stats = Arc::new(Mutex::new(DlqStats::default()));
        let (report_tx, report_rx) = mpsc::unbounded_channel();

        tokio::spawn(drain_delivery_reports(report_rx, Arc::clone(&stats)));

        Self {
            transport: Some(transport),
            topic: topic.to_string(),
            stats,
            report_tx: Some(report_tx),
        }
    }

    /// Create a disabled handler whose operations are all no-ops
    pub fn disabled() -> Self {
        Self {
            transport: None,
            topic: String::new(),
            stats: Arc::new(Mutex::new(DlqStats::default())),
            report_tx: None,
        }
    }

    /// Whether this handler actually publishes
    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Publish one exhausted message.
    ///
    /// Serializes the envelope, attaches the `original-topic`, `error` and
    /// `attempts` headers and enqueues the record. Delivery is confirmed
    /// asynchronously by the drain task.
    pub fn send(&self, msg: &InboundMessage, attempts: u32, last_error: &Error) -> Result<()> {
        let Some(transport) = &self.transport else {
            return Ok(());
        };

        let envelope = FailedMessage {
            original_topic: msg.topic.clone(),
            original_partition: msg.partition,
            original_offset: msg.offset,
            original_timestamp: msg.timestamp,
            failed_at: Utc::now(),
            attempts,
            last_error: last_error.to_string(),
            payload: String::from_utf8_lossy(&msg.payload).into_owned(),
        };

        let record = OutboundRecord {
            topic: self.topic.clone(),
            key: format!("{}-{}", msg.partition, msg.offset),
            payload: serde_json::to_vec(&envelope)?,
            headers: vec![
                ("original-topic".to_string(), envelope.original_topic.clone()),
                ("error".to_string(), envelope.last_error.clone()),
                ("attempts".to_string(), attempts.to_string()),
            ],
        };

        match transport.produce(record) {
            Ok(confirmation) => {
                if let Some(tx) = &self.report_tx {
                    // The drain task only stops once the sender is dropped
                    let _ = tx.send(confirmation);
                }
                Ok(())
            },
            Err(e) => {
                let mut stats = self.lock_stats();
                stats.send_errors += 1;
                stats.last_error_at = Some(Utc::now());
                Err(e)
            },
        }
    }

    /// Snapshot of the current statistics
    pub fn stats(&self) -> DlqStats {
        self.lock_stats().clone()
    }

    /// Flush pending deliveries for at most five seconds and release the
    /// underlying producer
    pub fn close(&self) {
        if let Some(transport) = &self.transport {
            if let Err(e) = transport.flush(CLOSE_FLUSH_TIMEOUT) {
                eprintln!("DLQ flush error: {}", e);
            }
        }
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, DlqStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Await each delivery confirmation and record the outcome
async fn drain_delivery_reports(
    mut rx: mpsc::UnboundedReceiver<DeliveryConfirmation>,
    stats: Arc<Mutex<DlqStats>>,
) {
    while let Some(confirmation) = rx.recv().await {
        let outcome = confirmation.await;
        let mut stats = stats.lock().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Ok(()) => {
                stats.messages_sent += 1;
                stats.last_sent_at = Some(Utc::now());
            },
            Err(e) => {
                stats.send_errors += 1;
                stats.last_error_at = Some(Utc::now());
                tracing::warn!(error = %e, "DLQ delivery failed");
            },
        }
    }
}

/// Real transport over an rdkafka [`FutureProducer`]
pub struct KafkaDlqTransport {
    producer: FutureProducer,
}

impl DlqTransport for KafkaDlqTransport {
    fn produce(&self, record: OutboundRecord) -> Result<DeliveryConfirmation> {
        let mut headers = OwnedHeaders::new();
        for (key, value) in &record.headers {
            headers = headers.insert(Header {
                key: key.as_str(),
                value: Some(value.as_str()),
            });
        }

        let future_record = FutureRecord::to(&record.topic)
            .key(&record.key)
            .payload(&record.payload)
            .headers(headers);

        match self.producer.send_result(future_record) {
            Ok(delivery) => Ok(Box::pin(async move {
                match delivery.await {
                    Ok(Ok(_)) => Ok(()),
                    Ok(Err((e, _))) => Err(e.to_string()),
                    Err(e) => Err(e.to_string()),
                }
            })),
            Err((e, _)) => Err(Error::kafka(format!("Failed to enqueue DLQ record: {}", e))),
        }
    }

    fn flush(&self, timeout: Duration) -> Result<()> {
        self.producer
            .flush(timeout)
            .map_err(|e| Error::kafka(format!("DLQ flush failed: {}", e)))
    }
}
