//! Progress reporting for batch downloads.

use serde::Serialize;

/// Phase of a bulk download, reported around the per-item snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadPhase {
    /// Before any item has been fetched.
    Preparing,
    /// Items are being fetched and archived.
    Downloading,
    /// The archive was produced and saved.
    Complete,
}

/// Progress emitted once per completed item, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Number of items completed so far, including this one.
    pub current: usize,
    /// Total number of items in the run.
    pub total: usize,
    /// `round(current / total * 100)`.
    pub percentage: u8,
    /// Archive name of the item, when it was added successfully.
    pub filename: Option<String>,
}

impl ProgressSnapshot {
    /// Creates a snapshot and computes its percentage.
    #[must_use]
    pub fn new(current: usize, total: usize, filename: Option<String>) -> Self {
        Self {
            current,
            total,
            percentage: percentage(current, total),
            filename,
        }
    }
}

/// Returns `round(current / total * 100)`, or 100 when `total` is zero.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentage(current: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (current.min(total) as f64 / total as f64 * 100.0).round();
    pct as u8
}

/// Trait for receiving progress updates.
///
/// Callbacks run synchronously on the downloading task, so keep them cheap.
/// All methods have default no-op implementations.
pub trait ProgressSink: Send + Sync {
    /// Called once per completed item.
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}

    /// Called when a bulk download changes phase.
    fn on_phase(&self, _phase: DownloadPhase, _total: usize) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressSnapshot) + Send + Sync,
{
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self(snapshot);
    }
}
