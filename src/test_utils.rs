//! Test utilities for the order pipeline
//!
//! Mock implementations of the broker surfaces and a configurable order
//! handler, used by the unit tests and the integration tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::kafka::{
    DeliveryConfirmation, DlqTransport, InboundMessage, MessageConsumer, OutboundRecord,
};
use crate::models::Order;
use crate::retry::RetryError;
use crate::tracker::OrderHandler;

/// One scripted outcome of a `read_message` call
pub enum ScriptStep {
    /// Deliver this message
    Deliver(InboundMessage),
    /// Behave like a read timeout
    Timeout,
    /// Fail with this transport error
    Fail(Error),
}

/// A consumer that replays a scripted sequence of read outcomes.
///
/// Once the script runs dry, every further read behaves like a timeout, so
/// a tracker under test idles until it is stopped.
pub struct ScriptedConsumer {
    script: Mutex<VecDeque<ScriptStep>>,
    subscribed: Arc<Mutex<Option<String>>>,
}

impl ScriptedConsumer {
    pub fn new() -> Self {
        Self::with_steps(Vec::new())
    }

    pub fn with_steps(steps: Vec<ScriptStep>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            subscribed: Arc::new(Mutex::new(None)),
        }
    }

    pub fn push(&self, step: ScriptStep) {
        self.script.lock().unwrap().push_back(step);
    }

    /// Handle to the subscribed topic, valid after the consumer is boxed
    pub fn subscription(&self) -> Arc<Mutex<Option<String>>> {
        Arc::clone(&self.subscribed)
    }
}

impl Default for ScriptedConsumer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageConsumer for ScriptedConsumer {
    fn subscribe(&self, topic: &str) -> Result<()> {
        *self.subscribed.lock().unwrap() = Some(topic.to_string());
        Ok(())
    }

    async fn read_message(&self, timeout: Duration) -> Result<Option<InboundMessage>> {
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(ScriptStep::Deliver(msg)) => Ok(Some(msg)),
            Some(ScriptStep::Fail(e)) => Err(e),
            Some(ScriptStep::Timeout) | None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            },
        }
    }
}

/// Build an inbound message on the `orders` topic with the given offset
pub fn inbound_message(offset: i64, payload: &[u8]) -> InboundMessage {
    InboundMessage {
        topic: "orders".to_string(),
        partition: 0,
        offset,
        timestamp: None,
        key: None,
        payload: payload.to_vec(),
    }
}

/// A DLQ transport that records every produced record in memory
pub struct CaptureTransport {
    records: Arc<Mutex<Vec<OutboundRecord>>>,
    fail_sends: bool,
}

impl CaptureTransport {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            fail_sends: false,
        }
    }

    /// A transport whose produce calls all fail at enqueue time
    pub fn failing() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            fail_sends: true,
        }
    }

    /// Handle to the captured records, valid after the transport is boxed
    pub fn records(&self) -> Arc<Mutex<Vec<OutboundRecord>>> {
        Arc::clone(&self.records)
    }
}

impl Default for CaptureTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl DlqTransport for CaptureTransport {
    fn produce(&self, record: OutboundRecord) -> Result<DeliveryConfirmation> {
        if self.fail_sends {
            return Err(Error::kafka("queue full"));
        }
        self.records.lock().unwrap().push(record);
        Ok(Box::pin(async { Ok(()) }))
    }

    fn flush(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}

/// An order handler that fails a configurable number of times
pub struct FlakyHandler {
    failures_remaining: AtomicU32,
    permanent: bool,
    calls: AtomicU32,
}

impl FlakyHandler {
    /// Fail with a transient error `n` times, then succeed
    pub fn failing_times(n: u32) -> Self {
        Self {
            failures_remaining: AtomicU32::new(n),
            permanent: false,
            calls: AtomicU32::new(0),
        }
    }

    /// Fail with a transient error on every call
    pub fn always_failing() -> Self {
        Self::failing_times(u32::MAX)
    }

    /// Fail with a permanent error on every call
    pub fn permanent_failure() -> Self {
        Self {
            failures_remaining: AtomicU32::new(u32::MAX),
            permanent: true,
            calls: AtomicU32::new(0),
        }
    }

    /// How many times `handle` was invoked
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderHandler for FlakyHandler {
    async fn handle(&self, _order: &Order) -> std::result::Result<(), RetryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining == 0 {
            return Ok(());
        }
        if remaining != u32::MAX {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
        }

        if self.permanent {
            Err(RetryError::permanent(Error::handler("rejected for good")))
        } else {
            Err(RetryError::transient(Error::handler("temporary failure")))
        }
    }
}
