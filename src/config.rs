//! Configuration module for the order pipeline
//!
//! Configuration is layered: built-in defaults, overridden by an optional
//! YAML file, overridden in turn by environment variables. All three
//! binaries load the same [`Config`] and pick the sections they need.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Main configuration structure for the pipeline
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// General application settings
    #[serde(default)]
    pub app: AppSettings,

    /// Kafka connection settings
    #[serde(default)]
    pub kafka: KafkaSettings,

    /// Producer settings
    #[serde(default)]
    pub producer: ProducerSettings,

    /// Tracker (consumer) settings
    #[serde(default)]
    pub tracker: TrackerSettings,

    /// Retry policy settings
    #[serde(default)]
    pub retry: RetrySettings,

    /// Dead letter queue settings
    #[serde(default)]
    pub dlq: DlqSettings,
}

/// General application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppSettings {
    /// Environment (development, staging, production)
    #[serde(default = "default_env")]
    pub env: String,

    /// Log level for console diagnostics
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Kafka connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaSettings {
    /// Kafka broker address
    #[serde(default = "default_broker")]
    pub broker: String,

    /// Primary topic
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Consumer group ID
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
}

/// Producer settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProducerSettings {
    /// Interval between generated messages in milliseconds
    #[serde(default = "default_producer_interval_ms")]
    pub interval_ms: u64,

    /// Timeout for the final flush on shutdown in milliseconds
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
}

/// Tracker settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerSettings {
    /// Path of the structured health log
    #[serde(default = "default_log_file")]
    pub log_file: String,

    /// Path of the audit trail file
    #[serde(default = "default_events_file")]
    pub events_file: String,

    /// Interval between periodic metrics entries in seconds
    #[serde(default = "default_metrics_interval_seconds")]
    pub metrics_interval_seconds: u64,

    /// Kafka read timeout in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Consecutive read errors tolerated before the loop stops
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
}

/// Retry policy settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySettings {
    /// Maximum attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

/// Dead letter queue settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DlqSettings {
    /// Enable or disable the DLQ
    #[serde(default = "default_dlq_enabled")]
    pub enabled: bool,

    /// DLQ topic
    #[serde(default = "default_dlq_topic")]
    pub topic: String,
}

// Default value functions
fn default_env() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_broker() -> String {
    "localhost:9092".to_string()
}

fn default_topic() -> String {
    "orders".to_string()
}

fn default_consumer_group() -> String {
    "order-tracker-group".to_string()
}

fn default_producer_interval_ms() -> u64 {
    2000
}

fn default_flush_timeout_ms() -> u64 {
    15000
}

fn default_log_file() -> String {
    "tracker.log".to_string()
}

fn default_events_file() -> String {
    "tracker.events".to_string()
}

fn default_metrics_interval_seconds() -> u64 {
    30
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_max_consecutive_errors() -> u32 {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_dlq_enabled() -> bool {
    true
}

fn default_dlq_topic() -> String {
    "orders-dlq".to_string()
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            env: default_env(),
            log_level: default_log_level(),
        }
    }
}

impl Default for KafkaSettings {
    fn default() -> Self {
        Self {
            broker: default_broker(),
            topic: default_topic(),
            consumer_group: default_consumer_group(),
        }
    }
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_producer_interval_ms(),
            flush_timeout_ms: default_flush_timeout_ms(),
        }
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            events_file: default_events_file(),
            metrics_interval_seconds: default_metrics_interval_seconds(),
            read_timeout_ms: default_read_timeout_ms(),
            max_consecutive_errors: default_max_consecutive_errors(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl Default for DlqSettings {
    fn default() -> Self {
        Self {
            enabled: default_dlq_enabled(),
            topic: default_dlq_topic(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: AppSettings::default(),
            kafka: KafkaSettings::default(),
            producer: ProducerSettings::default(),
            tracker: TrackerSettings::default(),
            retry: RetrySettings::default(),
            dlq: DlqSettings::default(),
        }
    }
}

impl ProducerSettings {
    /// Get the message interval as Duration
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Get the final flush timeout as Duration
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

impl TrackerSettings {
    /// Get the metrics interval as Duration
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_seconds)
    }

    /// Get the Kafka read timeout as Duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl RetrySettings {
    /// Get the initial backoff delay as Duration
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Get the maximum backoff delay as Duration
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Config {
    /// Load configuration from defaults, an optional YAML file and the
    /// environment, in that order of precedence (lowest first).
    ///
    /// A missing file is not an error; the defaults simply apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Load .env if present (for local development)
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) => match std::fs::read_to_string(p) {
                Ok(contents) => serde_yaml::from_str(&contents)
                    .map_err(|e| Error::config(format!("invalid config file: {}", e)))?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
                Err(e) => return Err(Error::Io(e)),
            },
            None => Config::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from defaults and the environment only
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Overlay recognized environment variables onto the current values
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("APP_ENV") {
            self.app.env = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.app.log_level = v;
        }

        if let Ok(v) = std::env::var("KAFKA_BROKER") {
            self.kafka.broker = v;
        }
        if let Ok(v) = std::env::var("KAFKA_TOPIC") {
            self.kafka.topic = v;
        }
        if let Ok(v) = std::env::var("KAFKA_CONSUMER_GROUP") {
            self.kafka.consumer_group = v;
        }

        if let Ok(v) = std::env::var("PRODUCER_INTERVAL_MS") {
            if let Ok(ms) = v.parse() {
                self.producer.interval_ms = ms;
            }
        }

        if let Ok(v) = std::env::var("TRACKER_LOG_FILE") {
            self.tracker.log_file = v;
        }
        if let Ok(v) = std::env::var("TRACKER_EVENTS_FILE") {
            self.tracker.events_file = v;
        }

        if let Ok(v) = std::env::var("RETRY_MAX_ATTEMPTS") {
            if let Ok(n) = v.parse() {
                self.retry.max_attempts = n;
            }
        }

        if let Ok(v) = std::env::var("DLQ_ENABLED") {
            self.dlq.enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("DLQ_TOPIC") {
            self.dlq.topic = v;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.kafka.broker.is_empty() {
            return Err(Error::config("Kafka broker cannot be empty"));
        }
        if self.kafka.topic.is_empty() {
            return Err(Error::config("Kafka topic cannot be empty"));
        }
        if self.tracker.read_timeout_ms == 0 {
            return Err(Error::config("Tracker read timeout must be at least 1 ms"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("Retry max attempts must be at least 1"));
        }
        if self.retry.multiplier < 1.0 {
            return Err(Error::config("Retry multiplier must be at least 1.0"));
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(Error::config(
                "Retry max delay must be at least the initial delay",
            ));
        }
        Ok(())
    }

    /// Log the effective configuration through tracing
    pub fn log_config(&self) {
        tracing::info!(
            env = %self.app.env,
            log_level = %self.app.log_level,
            "Application configuration"
        );

        tracing::info!(
            broker = %self.kafka.broker,
            topic = %self.kafka.topic,
            consumer_group = %self.kafka.consumer_group,
            "Kafka configuration"
        );

        tracing::info!(
            log_file = %self.tracker.log_file,
            events_file = %self.tracker.events_file,
            metrics_interval_seconds = %self.tracker.metrics_interval_seconds,
            read_timeout_ms = %self.tracker.read_timeout_ms,
            "Tracker configuration"
        );

        tracing::info!(
            max_attempts = %self.retry.max_attempts,
            initial_delay_ms = %self.retry.initial_delay_ms,
            max_delay_ms = %self.retry.max_delay_ms,
            multiplier = %self.retry.multiplier,
            "Retry configuration"
        );

        tracing::info!(
            enabled = %self.dlq.enabled,
            topic = %self.dlq.topic,
            "DLQ configuration"
        );
    }
}
