//! In-process performance counters for the consumer

use chrono::{DateTime, Utc};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug, Default, Clone)]
struct Counters {
    received: u64,
    processed: u64,
    failed: u64,
    last_message_at: Option<DateTime<Utc>>,
}

/// Consumer performance counters, guarded by a read/write lock.
///
/// Writers go through [`SystemMetrics::record`]; the periodic metrics task
/// takes read snapshots.
pub struct SystemMetrics {
    start_time: Instant,
    counters: RwLock<Counters>,
}

/// A point-in-time copy of the counters with derived rates
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Time since the metrics block was created
    pub uptime: Duration,

    /// Messages read from the broker
    pub messages_received: u64,

    /// Messages handled successfully
    pub messages_processed: u64,

    /// Messages that failed deserialization or handling
    pub messages_failed: u64,

    /// When the last message arrived
    pub last_message_at: Option<DateTime<Utc>>,

    /// processed / received, as a percentage (0 when nothing received)
    pub success_rate_percent: f64,

    /// received / uptime seconds (0 while uptime is zero)
    pub messages_per_second: f64,
}

impl SystemMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            counters: RwLock::new(Counters::default()),
        }
    }

    /// Count one message. Every message increments `received`; it lands in
    /// at most one of the processed/failed buckets.
    pub fn record(&self, processed: bool, failed: bool) {
        let mut counters = self
            .counters
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        counters.received += 1;
        if processed {
            counters.processed += 1;
        }
        if failed {
            counters.failed += 1;
        }
        counters.last_message_at = Some(Utc::now());
    }

    /// Take a consistent snapshot with derived rates
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self
            .counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let uptime = self.start_time.elapsed();

        let success_rate_percent = if counters.received > 0 {
            counters.processed as f64 / counters.received as f64 * 100.0
        } else {
            0.0
        };
        let uptime_secs = uptime.as_secs_f64();
        let messages_per_second = if uptime_secs > 0.0 {
            counters.received as f64 / uptime_secs
        } else {
            0.0
        };

        MetricsSnapshot {
            uptime,
            messages_received: counters.received,
            messages_processed: counters.processed,
            messages_failed: counters.failed,
            last_message_at: counters.last_message_at,
            success_rate_percent,
            messages_per_second,
        }
    }
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self::new()
    }
}
