//! media-bundle - A library for downloading batches of media into one archive.
//!
//! Items are fetched by a bounded pool of cooperative workers with retry and
//! exponential backoff, deduplicated by name, and written into a single ZIP.
//! Runs report per-item progress and can be cancelled at any point.
//!
//! # Example
//!
//! ```no_run
//! use media_bundle::{DownloadConfig, DownloadItem, Orchestrator, OrchestratorOptions};
//!
//! # async fn example() -> media_bundle::Result<()> {
//! let orchestrator = Orchestrator::new(DownloadConfig::default())?;
//!
//! let items = vec![
//!     DownloadItem::new("https://example.com/1.jpg", "1.jpg"),
//!     DownloadItem::new("https://example.com/2.jpg", "1.jpg"),
//! ];
//!
//! let outcome = orchestrator
//!     .run(&items, OrchestratorOptions::new().with_concurrency(2))
//!     .await?;
//! println!("Archived {:?} ({} bytes)", outcome.used_filenames, outcome.archive.len());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod archive;
pub mod bulk;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod fs;
pub mod naming;
pub mod orchestrator;
pub mod progress;
pub mod stats;

// Re-export main types for convenience
pub use archive::{ArchiveWriter, ZipArchiveWriter};
pub use bulk::{
    BulkDownloadResult, BulkDownloader, BulkOptions, ErrorCode, LogNotifier, Notifier,
    ResultStatus,
};
pub use config::{AppConfig, Compression, DownloadConfig, PathConfig};
pub use error::{Error, Result};
pub use fetch::{Fetch, HttpFetcher};
pub use fs::{FileSystem, TokioFileSystem};
pub use orchestrator::{
    DownloadItem, DownloadOutcome, Orchestrator, OrchestratorOptions, Prefetched,
};
pub use progress::{DownloadPhase, NoProgress, ProgressSink, ProgressSnapshot};
pub use stats::{ItemFailure, RunStats};
