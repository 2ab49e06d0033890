//! Consumer runtime for the order pipeline
//!
//! The [`Tracker`] owns the broker consumer, the audit and health log
//! writers, the metrics block and the cancellation token. It reads messages
//! with a timeout, records every one of them in the audit trail before any
//! other work, dispatches valid orders to the handler through the retry
//! engine, diverts exhausted messages to the dead letter queue, and emits
//! periodic health metrics until it is stopped.

mod handler;
mod metrics;

pub use handler::{ConsoleHandler, OrderHandler};
pub use metrics::{MetricsSnapshot, SystemMetrics};

use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, KafkaSettings, TrackerSettings};
use crate::error::{Error, Result};
use crate::kafka::{DeadLetterQueue, InboundMessage, KafkaConsumer, MessageConsumer};
use crate::logfile::{AuditLog, HealthLog};
use crate::models::Order;
use crate::retry::{self, RetryFailure, RetryPolicy};

/// Service tag written into every health entry
pub const SERVICE_NAME: &str = "order-tracker";

/// Lifecycle states of the consumer runtime.
///
/// States are entered linearly; transitions are gated by an internal mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Uninitialized,
    Initialized,
    Running,
    Stopping,
    Closed,
}

/// The consumer runtime
pub struct Tracker {
    tracker_settings: TrackerSettings,
    kafka_settings: KafkaSettings,
    retry_policy: RetryPolicy,
    state: Mutex<TrackerState>,
    cancel: CancellationToken,
    metrics: Arc<SystemMetrics>,
    health: Option<Arc<HealthLog>>,
    audit: Option<Arc<AuditLog>>,
    consumer: Option<Box<dyn MessageConsumer>>,
    handler: Arc<dyn OrderHandler>,
    dlq: Option<DeadLetterQueue>,
}

impl Tracker {
    /// Create an uninitialized tracker from the loaded configuration.
    ///
    /// The reference [`ConsoleHandler`] is installed by default; production
    /// deployments plug their own handler in with [`Tracker::with_handler`].
    pub fn new(config: &Config) -> Self {
        Self {
            tracker_settings: config.tracker.clone(),
            kafka_settings: config.kafka.clone(),
            retry_policy: RetryPolicy::from(&config.retry),
            state: Mutex::new(TrackerState::Uninitialized),
            cancel: CancellationToken::new(),
            metrics: Arc::new(SystemMetrics::new()),
            health: None,
            audit: None,
            consumer: None,
            handler: Arc::new(ConsoleHandler),
            dlq: None,
        }
    }

    /// Replace the order handler
    pub fn with_handler(mut self, handler: Arc<dyn OrderHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Attach a dead letter queue for exhausted messages
    pub fn with_dlq(mut self, dlq: DeadLetterQueue) -> Self {
        self.dlq = Some(dlq);
        self
    }

    /// Open the log writers, connect the Kafka consumer and subscribe to the
    /// configured topic. Any failure tears down what was already opened and
    /// is fatal to startup.
    pub fn initialize(&mut self) -> Result<()> {
        self.open_logs()?;

        let consumer = match KafkaConsumer::connect(
            &self.kafka_settings.broker,
            &self.kafka_settings.consumer_group,
        ) {
            Ok(consumer) => consumer,
            Err(e) => {
                if let Some(health) = &self.health {
                    health.error("Failed to create Kafka consumer", &e, None);
                }
                self.teardown_logs();
                return Err(e);
            },
        };

        self.attach_consumer(Box::new(consumer))
    }

    /// Like [`Tracker::initialize`], with a caller-supplied consumer
    pub fn initialize_with(&mut self, consumer: Box<dyn MessageConsumer>) -> Result<()> {
        self.open_logs()?;
        self.attach_consumer(consumer)
    }

    fn open_logs(&mut self) -> Result<()> {
        let health = HealthLog::open(&self.tracker_settings.log_file, SERVICE_NAME)?;
        let audit = match AuditLog::open(&self.tracker_settings.events_file) {
            Ok(audit) => audit,
            Err(e) => {
                // health writer is dropped, releasing its handle
                return Err(e);
            },
        };

        health.info(
            "Log files initialized",
            Some(json!({
                "log_file": self.tracker_settings.log_file,
                "events_file": self.tracker_settings.events_file,
            })),
        );

        self.health = Some(Arc::new(health));
        self.audit = Some(Arc::new(audit));
        Ok(())
    }

    fn attach_consumer(&mut self, consumer: Box<dyn MessageConsumer>) -> Result<()> {
        if let Err(e) = consumer.subscribe(&self.kafka_settings.topic) {
            if let Some(health) = &self.health {
                health.error(
                    "Failed to subscribe to topic",
                    &e,
                    Some(json!({"topic": self.kafka_settings.topic})),
                );
            }
            self.teardown_logs();
            return Err(e);
        }

        if let Some(health) = &self.health {
            health.info(
                &format!(
                    "Consumer started and subscribed to topic '{}'",
                    self.kafka_settings.topic
                ),
                None,
            );
        }

        self.consumer = Some(consumer);
        *self.lock_state() = TrackerState::Initialized;
        Ok(())
    }

    fn teardown_logs(&mut self) {
        self.health = None;
        self.audit = None;
    }

    /// Run the read loop until [`Tracker::stop`] is called or the broker
    /// becomes unavailable. Spawns the periodic metrics task on entry.
    pub async fn run(&self) {
        {
            let mut state = self.lock_state();
            if *state != TrackerState::Initialized {
                return;
            }
            *state = TrackerState::Running;
        }

        let (Some(consumer), Some(health), Some(audit)) = (
            self.consumer.as_deref(),
            self.health.as_ref(),
            self.audit.as_ref(),
        ) else {
            self.stop();
            return;
        };

        self.spawn_metrics_task(health);

        let read_timeout = self.tracker_settings.read_timeout();
        let mut consecutive_errors: u32 = 0;

        while self.is_running() {
            match consumer.read_message(read_timeout).await {
                // Timeout is benign
                Ok(None) => {
                    consecutive_errors = 0;
                },
                Ok(Some(msg)) => {
                    consecutive_errors = 0;
                    self.process_message(&msg, health, audit).await;
                },
                Err(e) => {
                    if self.handle_transport_error(&e, &mut consecutive_errors, health) {
                        break;
                    }
                },
            }
        }

        // The loop clears the running flag on every exit path, including
        // internal stops the caller never requested
        self.stop();
    }

    /// Handle a transport error from the broker. Returns true when the loop
    /// should stop.
    fn handle_transport_error(
        &self,
        err: &Error,
        consecutive_errors: &mut u32,
        health: &HealthLog,
    ) -> bool {
        let max_errors = self.tracker_settings.max_consecutive_errors;

        if err.is_broker_unavailable() {
            *consecutive_errors += 1;
            if *consecutive_errors >= max_errors {
                health.info(
                    "Kafka appears unavailable, stopping consumer",
                    Some(json!({
                        "consecutive_errors": *consecutive_errors,
                        "reason": "brokers_unavailable",
                    })),
                );
                return true;
            }
            return false;
        }

        // Every other transport error is logged, whatever its shape
        health.error("Failed to read message from Kafka", err, None);
        *consecutive_errors += 1;
        if *consecutive_errors >= max_errors {
            health.error(
                "Too many consecutive read errors, stopping consumer",
                err,
                Some(json!({"consecutive_errors": *consecutive_errors})),
            );
            return true;
        }

        false
    }

    /// Process one delivered message.
    ///
    /// The audit entry is written before any metric update or handler
    /// dispatch; that ordering is what makes the audit file the source of
    /// truth.
    async fn process_message(&self, msg: &InboundMessage, health: &HealthLog, audit: &AuditLog) {
        let parsed: std::result::Result<Order, serde_json::Error> =
            serde_json::from_slice(&msg.payload);

        match parsed {
            Err(deser_err) => {
                audit.record(msg, None, Some(&deser_err.to_string()));

                // Malformed payloads are poison; retrying cannot help
                self.metrics.record(false, true);
                health.error(
                    "Message deserialization failed",
                    &deser_err,
                    Some(json!({
                        "kafka_offset": msg.offset,
                        "raw_message": String::from_utf8_lossy(&msg.payload),
                    })),
                );
            },
            Ok(order) => {
                audit.record(msg, Some(&order), None);
                self.dispatch(msg, &order, health).await;
            },
        }
    }

    /// Run the handler under the retry policy and settle the outcome
    async fn dispatch(&self, msg: &InboundMessage, order: &Order, health: &HealthLog) {
        let outcome = retry::run_with_observer(
            &self.cancel,
            &self.retry_policy,
            || self.handler.handle(order),
            |attempt, err, next_delay| {
                health.error(
                    "Order handling failed, retry scheduled",
                    err,
                    Some(json!({
                        "kafka_offset": msg.offset,
                        "attempt": attempt,
                        "next_delay_ms": next_delay.as_millis() as u64,
                    })),
                );
            },
        )
        .await;

        match outcome.result {
            Ok(()) => {
                self.metrics.record(true, false);
            },
            Err(RetryFailure::Canceled) => {
                self.metrics.record(false, true);
                health.info(
                    "Order handling interrupted by shutdown",
                    Some(json!({
                        "kafka_offset": msg.offset,
                        "attempts": outcome.attempts,
                    })),
                );
            },
            Err(failure) => {
                let err = failure.into_error();
                self.metrics.record(false, true);
                health.error(
                    "Order handling failed",
                    &err,
                    Some(json!({
                        "kafka_offset": msg.offset,
                        "attempts": outcome.attempts,
                    })),
                );

                if let Some(dlq) = &self.dlq {
                    if let Err(send_err) = dlq.send(msg, outcome.attempts, &err) {
                        health.error(
                            "Failed to publish to dead letter queue",
                            &send_err,
                            Some(json!({"kafka_offset": msg.offset})),
                        );
                    }
                }
            },
        }
    }

    /// Emit an INFO metrics entry every metrics interval until cancellation
    fn spawn_metrics_task(&self, health: &Arc<HealthLog>) {
        let metrics = Arc::clone(&self.metrics);
        let health = Arc::clone(health);
        let cancel = self.cancel.clone();
        let interval = self.tracker_settings.metrics_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let snap = metrics.snapshot();
                        health.info(
                            "Periodic system metrics",
                            Some(json!({
                                "uptime_seconds": snap.uptime.as_secs_f64(),
                                "messages_received": snap.messages_received,
                                "messages_processed": snap.messages_processed,
                                "messages_failed": snap.messages_failed,
                                "success_rate_percent":
                                    format!("{:.2}", snap.success_rate_percent),
                                "messages_per_second":
                                    format!("{:.2}", snap.messages_per_second),
                            })),
                        );
                    }
                }
            }
        });
    }

    /// Stop the runtime: flip Running to Stopping, cancel the token and
    /// write the final summary. Safe to call from any task; idempotent.
    pub fn stop(&self) {
        {
            let mut state = self.lock_state();
            match *state {
                TrackerState::Stopping | TrackerState::Closed => return,
                _ => *state = TrackerState::Stopping,
            }
        }

        self.cancel.cancel();

        let snap = self.metrics.snapshot();
        if let Some(health) = &self.health {
            health.info(
                "Consumer stopped cleanly",
                Some(json!({
                    "uptime_seconds": snap.uptime.as_secs_f64(),
                    "total_messages_received": snap.messages_received,
                    "total_messages_processed": snap.messages_processed,
                    "total_messages_failed": snap.messages_failed,
                })),
            );
        }
    }

    /// Flush the writers, close the dead letter queue and mark the runtime
    /// closed. The underlying handles are released when the tracker drops.
    pub fn close(&self) {
        if let Some(dlq) = &self.dlq {
            dlq.close();
        }
        if let Some(audit) = &self.audit {
            audit.flush();
        }
        if let Some(health) = &self.health {
            health.flush();
        }
        *self.lock_state() = TrackerState::Closed;
    }

    /// Current lifecycle state
    pub fn state(&self) -> TrackerState {
        *self.lock_state()
    }

    /// Whether the read loop should keep going
    pub fn is_running(&self) -> bool {
        *self.lock_state() == TrackerState::Running
    }

    /// Snapshot of the runtime metrics
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Statistics of the attached dead letter queue, if any
    pub fn dlq_stats(&self) -> Option<crate::kafka::DlqStats> {
        self.dlq.as_ref().map(|dlq| dlq.stats())
    }

    fn lock_state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
