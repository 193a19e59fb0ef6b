//! Per-run download statistics.

use std::time::{Duration, Instant};

use serde::Serialize;

/// A single item that could not be added to the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// URL of the failed item.
    pub url: String,
    /// Human-readable failure reason.
    pub error: String,
}

/// Statistics for a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    /// Names of archived entries, in the order they were added.
    pub used_filenames: Vec<String>,
    /// Items that failed, in completion order.
    pub failures: Vec<ItemFailure>,
    /// Total archived payload in bytes.
    pub total_bytes: u64,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl RunStats {
    /// Number of items added to the archive.
    #[must_use]
    pub fn files_successful(&self) -> usize {
        self.used_filenames.len()
    }

    /// Number of items that failed.
    #[must_use]
    pub fn files_failed(&self) -> usize {
        self.failures.len()
    }
}

/// Builder for accumulating run statistics while items complete.
#[derive(Debug)]
pub struct RunStatsBuilder {
    used_filenames: Vec<String>,
    failures: Vec<ItemFailure>,
    total_bytes: u64,
    start_time: Instant,
}

impl Default for RunStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStatsBuilder {
    /// Creates a new builder; the run clock starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            used_filenames: Vec::new(),
            failures: Vec::new(),
            total_bytes: 0,
            start_time: Instant::now(),
        }
    }

    /// Records an archived entry.
    pub fn add_success(&mut self, name: String, size: u64) {
        self.used_filenames.push(name);
        self.total_bytes += size;
    }

    /// Records a failed item.
    pub fn add_failure(&mut self, url: &str, error: &str) {
        self.failures.push(ItemFailure {
            url: url.to_string(),
            error: error.to_string(),
        });
    }

    /// Number of items recorded so far, successful or not.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.used_filenames.len() + self.failures.len()
    }

    /// Builds the final run statistics.
    #[must_use]
    pub fn build(self) -> RunStats {
        RunStats {
            used_filenames: self.used_filenames,
            failures: self.failures,
            total_bytes: self.total_bytes,
            elapsed: self.start_time.elapsed(),
        }
    }
}
