//! Bounded output capture for background sessions.
//!
//! Every inbound channel chunk is retained as one entry. When the entry
//! count exceeds the configured maximum, the buffer drops its oldest
//! entries and keeps the newest `trim_to`, so a chatty remote command can
//! run indefinitely without growing memory without bound.

use std::collections::VecDeque;

use super::error::{Result, SshToolError};

/// Default maximum number of retained entries.
pub const DEFAULT_MAX_SIZE: usize = 10_000;

/// Default entry count kept after an overflow trim.
pub const DEFAULT_TRIM_TO: usize = 5_000;

/// Append-only chunk buffer with overflow trimming.
#[derive(Debug)]
pub struct BoundedBuffer {
    entries: VecDeque<String>,
    max_size: usize,
    trim_to: usize,
}

impl BoundedBuffer {
    pub fn new(max_size: usize, trim_to: usize) -> Self {
        // A trim target above the cap would make trimming a no-op loop.
        let trim_to = trim_to.min(max_size);
        Self {
            entries: VecDeque::new(),
            max_size,
            trim_to,
        }
    }

    /// Append one chunk, trimming to the newest `trim_to` entries when the
    /// cap is exceeded.
    pub fn push(&mut self, chunk: String) {
        self.entries.push_back(chunk);
        if self.entries.len() > self.max_size {
            let excess = self.entries.len() - self.trim_to;
            self.entries.drain(..excess);
        }
    }

    /// Copy out the last `lines` entries, or all of them when unspecified.
    /// A requested count of zero is a caller bug.
    pub fn tail(&self, lines: Option<usize>) -> Result<Vec<String>> {
        match lines {
            Some(0) => Err(SshToolError::InvalidArgument(
                "lines must be at least 1".into(),
            )),
            Some(n) => {
                let skip = self.entries.len().saturating_sub(n);
                Ok(self.entries.iter().skip(skip).cloned().collect())
            }
            None => Ok(self.entries.iter().cloned().collect()),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for BoundedBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE, DEFAULT_TRIM_TO)
    }
}
