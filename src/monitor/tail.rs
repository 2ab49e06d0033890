//! Rotation-aware file tailing

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Tails a line-oriented file, following it across truncation and
/// recreation.
///
/// The tailer remembers its byte position between polls. When the file
/// shrinks below that position or disappears, the position resets to the
/// start so a rotated or recreated file is picked up from its first line.
/// Only complete lines are returned; a trailing partial line stays pending
/// until its newline arrives.
pub struct LogTailer {
    path: PathBuf,
    position: u64,
}

impl LogTailer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            position: 0,
        }
    }

    /// The file being tailed
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read any new complete lines appended since the last poll. Blank
    /// lines are skipped. I/O problems yield an empty batch; the next poll
    /// retries.
    pub fn poll(&mut self) -> Vec<String> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(_) => {
                // file gone; start over when it reappears
                self.position = 0;
                return Vec::new();
            },
        };

        if metadata.len() < self.position {
            // truncated or rotated in place
            self.position = 0;
        }
        if metadata.len() == self.position {
            return Vec::new();
        }

        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(_) => return Vec::new(),
        };
        if file.seek(SeekFrom::Start(self.position)).is_err() {
            return Vec::new();
        }

        let mut buf = Vec::new();
        if file.read_to_end(&mut buf).is_err() {
            return Vec::new();
        }

        // consume up to the last complete line only
        let consumed = match buf.iter().rposition(|&b| b == b'\n') {
            Some(i) => i + 1,
            None => return Vec::new(),
        };
        self.position += consumed as u64;

        String::from_utf8_lossy(&buf[..consumed])
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect()
    }
}
