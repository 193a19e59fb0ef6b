//! Progress bar and summary reporting for CLI downloads.

use std::time::Duration;

use console::style;
use indicatif::{HumanBytes, HumanDuration, ProgressBar, ProgressStyle};

use crate::{BulkDownloadResult, DownloadPhase, ProgressSink, ProgressSnapshot, ResultStatus};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates the item counter bar for a batch of `total` items.
pub fn make_progress_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::with_template(
        "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {elapsed_precise} - {msg}",
    )
    .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars("━━╌"));
    bar.set_style(style);
    bar
}

/// [`ProgressSink`] that drives an `indicatif` bar.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub const fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl ProgressSink for BarProgress {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_length(snapshot.total as u64);
        self.bar.set_position(snapshot.current as u64);
        match &snapshot.filename {
            Some(name) => self.bar.set_message(name.clone()),
            None => self.bar.set_message("(failed)"),
        }
    }

    fn on_phase(&self, phase: DownloadPhase, total: usize) {
        match phase {
            DownloadPhase::Preparing => {
                self.bar.set_length(total as u64);
                self.bar.set_message("preparing");
            }
            DownloadPhase::Downloading => {
                self.bar.enable_steady_tick(Duration::from_millis(250));
                self.bar.set_message("downloading");
            }
            DownloadPhase::Complete => self.bar.finish_and_clear(),
        }
    }
}

/// Returns the average throughput in bytes per second.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn average_speed(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

/// Prints a summary of a finished bulk download.
pub fn print_summary(result: &BulkDownloadResult, size: Option<u64>, elapsed: Duration) {
    println!("\n{SEPARATOR}");
    println!("Download Summary");
    println!("{SEPARATOR}");

    let status = match result.status {
        ResultStatus::Success => style("complete").green(),
        ResultStatus::Partial => style("partial").yellow(),
        ResultStatus::Error => style("failed").red(),
        ResultStatus::Cancelled => style("cancelled").red(),
    };
    println!("  Status:            {status}");
    println!(
        "  Files saved:       {}/{}",
        result.files_successful, result.files_processed
    );
    if let Some(path) = &result.path {
        println!("  Output:            {}", path.display());
    }
    if result.total_bytes > 0 {
        println!("  Total size:        {}", HumanBytes(result.total_bytes));
    }
    if let Some(size) = size {
        println!("  Output size:       {}", HumanBytes(size));
    }
    println!("  Total time:        {}", HumanDuration(elapsed));
    if result.total_bytes > 0 {
        println!(
            "  Average speed:     {}/s",
            HumanBytes(average_speed(result.total_bytes, elapsed))
        );
    }

    if !result.failures.is_empty() {
        println!("  Failed items:");
        for failure in &result.failures {
            println!("    {} ({})", failure.url, failure.error);
        }
    }
    if let Some(error) = &result.error {
        println!("  Error:             {error}");
    }

    println!("{SEPARATOR}");
}
