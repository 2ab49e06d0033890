//! Order publisher used by the producer binary

use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::models::Order;

/// Delivery counters for the producer's final summary
#[derive(Debug, Clone, Default)]
pub struct PublishStats {
    /// Records acknowledged by the broker
    pub delivered: u64,

    /// Records the broker rejected
    pub failed: u64,
}

type PublishReport = futures::future::BoxFuture<'static, std::result::Result<(i32, i64), String>>;

/// Publishes order events to the primary topic.
///
/// `publish` hands the record to the client and returns immediately;
/// delivery reports are consumed by a background task that logs each outcome
/// and keeps [`PublishStats`] current.
pub struct OrderPublisher {
    producer: FutureProducer,
    topic: String,
    stats: Arc<Mutex<PublishStats>>,
    report_tx: mpsc::UnboundedSender<PublishReport>,
}

impl OrderPublisher {
    /// Create a publisher connected to `broker`, producing to `topic`.
    ///
    /// Must be called from within a tokio runtime; the delivery-report drain
    /// runs as a background task.
    pub fn connect(broker: &str, topic: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", broker)
            .create()
            .map_err(|e| Error::kafka(format!("Failed to create Kafka producer: {}", e)))?;

        let stats = Arc::new(Mutex::new(PublishStats::default()));
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        tokio::spawn(drain_delivery_reports(report_rx, Arc::clone(&stats)));

        Ok(Self {
            producer,
            topic: topic.to_string(),
            stats,
            report_tx,
        })
    }

    /// Serialize and enqueue one order
    pub fn publish(&self, order: &Order) -> Result<()> {
        let payload = serde_json::to_vec(order)?;

        let record = FutureRecord::to(&self.topic)
            .key(&order.order_id)
            .payload(&payload);

        match self.producer.send_result(record) {
            Ok(delivery) => {
                let report: PublishReport = Box::pin(async move {
                    match delivery.await {
                        Ok(Ok((partition, offset))) => Ok((partition, offset)),
                        Ok(Err((e, _))) => Err(e.to_string()),
                        Err(e) => Err(e.to_string()),
                    }
                });
                let _ = self.report_tx.send(report);
                Ok(())
            },
            Err((e, _)) => Err(Error::kafka(format!("Failed to enqueue order: {}", e))),
        }
    }

    /// Snapshot of the delivery counters
    pub fn stats(&self) -> PublishStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Flush pending records, waiting at most `timeout`. Returns how many
    /// records were still in flight afterwards.
    pub fn flush(&self, timeout: Duration) -> i32 {
        if let Err(e) = self.producer.flush(timeout) {
            tracing::warn!(error = %e, "Producer flush failed");
        }
        self.producer.in_flight_count()
    }
}

/// Await each delivery report, log it and update the counters
async fn drain_delivery_reports(
    mut rx: mpsc::UnboundedReceiver<PublishReport>,
    stats: Arc<Mutex<PublishStats>>,
) {
    while let Some(report) = rx.recv().await {
        let outcome = report.await;
        let mut stats = stats.lock().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Ok((partition, offset)) => {
                stats.delivered += 1;
                tracing::debug!(partition, offset, "Order delivered");
            },
            Err(e) => {
                stats.failed += 1;
                tracing::warn!(error = %e, "Order delivery failed");
            },
        }
    }
}
