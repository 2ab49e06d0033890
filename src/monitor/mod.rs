//! Terminal monitor for the tracker's log files
//!
//! Tails the health log and the audit trail, aggregates them into rolling
//! statistics and renders a periodic status block on stdout. Message
//! counters are derived from the audit event stream only; the cumulative
//! counters inside periodic health metrics entries are not re-added, so a
//! message is never counted twice.

mod tail;

pub use tail::LogTailer;

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::models::{AuditEntry, HealthEntry, LogLevel};

/// Recent entries kept for display
const MAX_RECENT: usize = 20;

/// How often the files are polled for new lines
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How often the status block is re-rendered
const RENDER_INTERVAL: Duration = Duration::from_millis(500);

/// Rolling aggregation of both log streams
pub struct Dashboard {
    start_time: Instant,
    messages_received: u64,
    messages_processed: u64,
    messages_failed: u64,
    error_count: u64,
    last_error: Option<String>,
    recent_logs: VecDeque<HealthEntry>,
    recent_events: VecDeque<AuditEntry>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            messages_received: 0,
            messages_processed: 0,
            messages_failed: 0,
            error_count: 0,
            last_error: None,
            recent_logs: VecDeque::with_capacity(MAX_RECENT),
            recent_events: VecDeque::with_capacity(MAX_RECENT),
        }
    }

    /// Ingest one line of the health log. Lines that fail to parse are
    /// skipped.
    pub fn ingest_health_line(&mut self, line: &str) {
        let Ok(entry) = serde_json::from_str::<HealthEntry>(line) else {
            return;
        };
        if entry.level == LogLevel::Error {
            self.error_count += 1;
            self.last_error = Some(entry.error.clone().unwrap_or_else(|| entry.message.clone()));
        }
        push_capped(&mut self.recent_logs, entry);
    }

    /// Ingest one line of the audit trail. This is the single source of
    /// truth for the message counters.
    pub fn ingest_audit_line(&mut self, line: &str) {
        let Ok(entry) = serde_json::from_str::<AuditEntry>(line) else {
            return;
        };
        self.messages_received += 1;
        if entry.deserialized {
            self.messages_processed += 1;
        } else {
            self.messages_failed += 1;
        }
        push_capped(&mut self.recent_events, entry);
    }

    /// processed / received as a percentage, zero-safe
    pub fn success_rate(&self) -> f64 {
        if self.messages_received == 0 {
            return 0.0;
        }
        self.messages_processed as f64 / self.messages_received as f64 * 100.0
    }

    /// received / uptime seconds, zero-safe
    pub fn throughput(&self) -> f64 {
        let secs = self.start_time.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.messages_received as f64 / secs
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    pub fn messages_failed(&self) -> u64 {
        self.messages_failed
    }

    /// Render the status block
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&"=".repeat(70));
        out.push('\n');
        out.push_str(&format!(
            "ORDER PIPELINE MONITOR | uptime {:.0}s\n",
            self.start_time.elapsed().as_secs_f64()
        ));
        out.push_str(&format!(
            "messages: {} received, {} ok, {} failed | success {:.1}% | {:.2} msg/s | {} errors\n",
            self.messages_received,
            self.messages_processed,
            self.messages_failed,
            self.success_rate(),
            self.throughput(),
            self.error_count,
        ));
        if let Some(err) = &self.last_error {
            out.push_str(&format!("last error: {}\n", truncate(err, 60)));
        }
        out.push_str(&"-".repeat(70));
        out.push('\n');
        for entry in self.recent_logs.iter().rev().take(5) {
            let level = match entry.level {
                LogLevel::Info => "INFO ",
                LogLevel::Error => "ERROR",
            };
            out.push_str(&format!(
                "{} {} {}\n",
                entry.timestamp,
                level,
                truncate(&entry.message, 48)
            ));
        }
        out.push_str(&"=".repeat(70));
        out.push('\n');
        out
    }
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new()
    }
}

fn push_capped<T>(ring: &mut VecDeque<T>, entry: T) {
    if ring.len() == MAX_RECENT {
        ring.pop_front();
    }
    ring.push_back(entry);
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}

/// The monitor service: two tailers feeding one dashboard
pub struct Monitor {
    health_tailer: LogTailer,
    audit_tailer: LogTailer,
    dashboard: Dashboard,
}

impl Monitor {
    pub fn new(config: &Config) -> Self {
        Self {
            health_tailer: LogTailer::new(&config.tracker.log_file),
            audit_tailer: LogTailer::new(&config.tracker.events_file),
            dashboard: Dashboard::new(),
        }
    }

    /// Poll the files and render until the token fires
    pub async fn run(&mut self, cancel: &CancellationToken) {
        let mut last_render = Instant::now();

        loop {
            for line in self.health_tailer.poll() {
                self.dashboard.ingest_health_line(&line);
            }
            for line in self.audit_tailer.poll() {
                self.dashboard.ingest_audit_line(&line);
            }

            if last_render.elapsed() >= RENDER_INTERVAL {
                print!("{}", self.dashboard.render());
                last_render = Instant::now();
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }
}
