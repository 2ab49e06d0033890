//! Append-only JSON-lines log files written by the tracker
//!
//! Two files with the same storage contract but different schemas: the audit
//! trail ([`AuditLog`]) records every received message, and the health log
//! ([`HealthLog`]) records operational events. Writers serialize concurrent
//! callers with an internal lock and never surface write failures to the
//! consumer; problems are reported on stderr so message handling cannot
//! stall on logging.

mod audit;
mod health;

pub use audit::AuditLog;
pub use health::HealthLog;

use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::error::Result;

/// Open a file for appending, creating it if needed
fn open_append(path: &Path) -> Result<File> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(file)
}

/// Serialize one entry and append it as a single line.
///
/// Encoding and writing happen under the caller-held lock so lines from
/// concurrent writers never interleave. Failures are printed to stderr and
/// swallowed.
fn append_line<T: Serialize>(file: &Mutex<File>, entry: &T, label: &str) {
    let mut line = match serde_json::to_vec(entry) {
        Ok(line) => line,
        Err(e) => {
            eprintln!("{} encoding error: {}", label, e);
            return;
        },
    };
    line.push(b'\n');

    let mut guard = file.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(e) = guard.write_all(&line) {
        eprintln!("{} write error: {}", label, e);
    }
}

/// Flush buffered data to disk, reporting failures on stderr
fn flush_file(file: &Mutex<File>, label: &str) {
    let mut guard = file.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(e) = guard.flush() {
        eprintln!("{} flush error: {}", label, e);
    }
}

/// Format the current instant the way both log files expect it
fn rfc3339_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
