//! Health log writer
//!
//! Structured operational events: startup, shutdown, read errors, handler
//! failures and periodic metrics. One JSON object per line, designed for
//! ingestion by the monitor and external alerting tools.

use std::fmt::Display;
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use crate::error::Result;
use crate::models::{HealthEntry, LogLevel};

/// Append-only writer for the health log file
pub struct HealthLog {
    file: Mutex<File>,
    service: String,
}

impl HealthLog {
    /// Open the health log in append mode, creating it if needed
    pub fn open(path: impl AsRef<Path>, service: impl Into<String>) -> Result<Self> {
        let file = super::open_append(path.as_ref())?;
        Ok(Self {
            file: Mutex::new(file),
            service: service.into(),
        })
    }

    /// Write an INFO entry
    pub fn info(&self, message: &str, metadata: Option<serde_json::Value>) {
        self.write(LogLevel::Info, message, None, metadata);
    }

    /// Write an ERROR entry with its cause
    pub fn error(&self, message: &str, error: &dyn Display, metadata: Option<serde_json::Value>) {
        self.write(LogLevel::Error, message, Some(error.to_string()), metadata);
    }

    fn write(
        &self,
        level: LogLevel,
        message: &str,
        error: Option<String>,
        metadata: Option<serde_json::Value>,
    ) {
        let entry = HealthEntry {
            timestamp: super::rfc3339_now(),
            level,
            message: message.to_string(),
            service: self.service.clone(),
            error,
            metadata,
        };
        super::append_line(&self.file, &entry, "Health log");
    }

    /// Flush buffered entries to disk
    pub fn flush(&self) {
        super::flush_file(&self.file, "Health log");
    }
}
