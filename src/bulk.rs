//! Bulk download service: single files are saved directly, batches as ZIP.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::clamp_retries;
use crate::error::{Error, Result};
use crate::fetch::{Fetch, HttpFetcher};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::naming::{sanitize_filename, zip_filename};
use crate::orchestrator::{DownloadItem, Orchestrator, OrchestratorOptions};
use crate::progress::{DownloadPhase, NoProgress, ProgressSink, ProgressSnapshot};
use crate::stats::ItemFailure;

/// Default prefix for generated archive names.
pub const DEFAULT_NAME_PREFIX: &str = "media_bundle";

/// Upper bound on workers when retrying failed items.
const RETRY_CONCURRENCY: i64 = 2;

/// Overall status of a bulk download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    /// Every item was saved.
    Success,
    /// Some items failed; the rest were saved.
    Partial,
    /// Nothing was saved.
    Error,
    /// The user cancelled the download.
    Cancelled,
}

/// Machine-readable reason attached to a [`BulkDownloadResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Nothing went wrong.
    None,
    /// Some items failed.
    PartialFailed,
    /// Every item failed.
    AllFailed,
    /// The download was cancelled.
    Cancelled,
    /// No items were given.
    EmptyInput,
    /// Any other failure, such as an unreadable output directory.
    Unknown,
}

/// Summary of a bulk download.
#[derive(Debug, Clone, Serialize)]
pub struct BulkDownloadResult {
    /// Overall status.
    pub status: ResultStatus,
    /// Reason code matching `status`.
    pub code: ErrorCode,
    /// Number of items handed in.
    pub files_processed: usize,
    /// Number of items saved.
    pub files_successful: usize,
    /// Payload bytes saved, before archiving.
    pub total_bytes: u64,
    /// Name of the saved file or archive.
    pub filename: Option<String>,
    /// Where the file or archive was written.
    pub path: Option<PathBuf>,
    /// Items that could not be downloaded.
    pub failures: Vec<ItemFailure>,
    /// Message of the error that ended the download, if any.
    pub error: Option<String>,
}

impl BulkDownloadResult {
    /// Returns true when at least part of the batch was saved.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, ResultStatus::Success | ResultStatus::Partial)
    }

    fn failed(processed: usize, code: ErrorCode, error: &Error) -> Self {
        let status = if code == ErrorCode::Cancelled {
            ResultStatus::Cancelled
        } else {
            ResultStatus::Error
        };
        Self {
            status,
            code,
            files_processed: processed,
            files_successful: 0,
            total_bytes: 0,
            filename: None,
            path: None,
            failures: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Options for one bulk download.
#[derive(Clone, Default)]
pub struct BulkOptions {
    /// Worker count; the orchestrator config applies when unset.
    pub concurrency: Option<i64>,
    /// Retries per network item; the orchestrator config applies when unset.
    pub retries: Option<i64>,
    /// Archive name; generated from `name_prefix` when unset.
    pub zip_filename: Option<String>,
    /// Prefix for generated archive names.
    pub name_prefix: Option<String>,
    /// Receives phases and per-item snapshots.
    pub progress: Option<Arc<dyn ProgressSink>>,
    /// External token; cancelling it cancels this download.
    pub cancel: Option<CancellationToken>,
}

/// Clears the downloader's current token when the download ends or is
/// dropped mid-flight.
struct ActiveDownload<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
}

impl<'a> ActiveDownload<'a> {
    fn start(slot: &'a Mutex<Option<CancellationToken>>, token: CancellationToken) -> Self {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
        Self { slot }
    }
}

impl Drop for ActiveDownload<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Sink for user-facing notifications.
pub trait Notifier: Send + Sync {
    /// Neutral news, such as a cancelled download.
    fn info(&self, title: &str, body: &str);
    /// Something the user may want to act on, such as failed items.
    fn warning(&self, title: &str, body: &str);
    /// The download produced nothing.
    fn error(&self, title: &str, body: &str);
}

/// Notifier that writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn info(&self, title: &str, body: &str) {
        log::info!("{title}: {body}");
    }

    fn warning(&self, title: &str, body: &str) {
        log::warn!("{title}: {body}");
    }

    fn error(&self, title: &str, body: &str) {
        log::error!("{title}: {body}");
    }
}

/// Downloads batches of media and saves them to an output directory.
///
/// One item is saved as a plain file; several items are bundled into a ZIP
/// archive through the [`Orchestrator`]. A download in progress can be
/// cancelled from another task with [`cancel`](Self::cancel).
pub struct BulkDownloader<F: Fetch = HttpFetcher, S: FileSystem = TokioFileSystem> {
    orchestrator: Orchestrator<F, S>,
    notifier: Arc<dyn Notifier>,
    output_dir: PathBuf,
    current: Mutex<Option<CancellationToken>>,
}

impl<F: Fetch, S: FileSystem> BulkDownloader<F, S> {
    /// Creates a downloader saving into `output_dir`, notifying via the log.
    #[must_use]
    pub fn new(orchestrator: Orchestrator<F, S>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            orchestrator,
            notifier: Arc::new(LogNotifier),
            output_dir: output_dir.into(),
            current: Mutex::new(None),
        }
    }

    /// Replaces the notification sink.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Returns the output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Returns true while a download is running.
    #[must_use]
    pub fn is_downloading(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Cancels the running download, if any.
    pub fn cancel(&self) {
        let token = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(token) = token {
            token.cancel();
            log::debug!("Current download cancelled");
        }
    }

    /// Downloads `items` and saves the result.
    ///
    /// Failures are reported through the returned status and code rather
    /// than as an error.
    pub async fn download(&self, items: &[DownloadItem], options: BulkOptions) -> BulkDownloadResult {
        let total = items.len();
        if total == 0 {
            return BulkDownloadResult::failed(0, ErrorCode::EmptyInput, &Error::EmptyInput);
        }

        let token = options
            .cancel
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);
        let active = ActiveDownload::start(&self.current, token.clone());
        let progress = options
            .progress
            .clone()
            .unwrap_or_else(|| Arc::new(NoProgress));
        log::info!("Download session started: {total} item(s)");
        progress.on_phase(DownloadPhase::Preparing, total);
        progress.on_phase(DownloadPhase::Downloading, total);

        let result = if let [item] = items {
            self.download_single(item, &options, &token, progress.as_ref())
                .await
        } else {
            self.download_zip(items, options, &token).await
        };
        drop(active);

        match result {
            Ok(result) => {
                if result.is_success() {
                    progress.on_phase(DownloadPhase::Complete, total);
                }
                result
            }
            Err(e) if e.is_cancelled() => {
                self.notifier
                    .info("Download cancelled", "The download was cancelled.");
                BulkDownloadResult::failed(total, ErrorCode::Cancelled, &e)
            }
            Err(e) => {
                self.notifier.error("Download failed", &e.to_string());
                BulkDownloadResult::failed(total, ErrorCode::Unknown, &e)
            }
        }
    }

    async fn download_single(
        &self,
        item: &DownloadItem,
        options: &BulkOptions,
        token: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<BulkDownloadResult> {
        let retries = clamp_retries(options.retries.unwrap_or(self.orchestrator.config().retries));
        let bytes = self
            .orchestrator
            .resolve_bytes(item, retries, token)
            .await?;
        let filename = sanitize_filename(&item.desired_name);
        let path = self.save(&filename, &bytes).await?;
        progress.on_progress(&ProgressSnapshot::new(1, 1, Some(filename.clone())));

        Ok(BulkDownloadResult {
            status: ResultStatus::Success,
            code: ErrorCode::None,
            files_processed: 1,
            files_successful: 1,
            total_bytes: bytes.len() as u64,
            filename: Some(filename),
            path: Some(path),
            failures: Vec::new(),
            error: None,
        })
    }

    async fn download_zip(
        &self,
        items: &[DownloadItem],
        options: BulkOptions,
        token: &CancellationToken,
    ) -> Result<BulkDownloadResult> {
        let total = items.len();
        let mut run_options = OrchestratorOptions::new().with_cancel(token.clone());
        run_options.concurrency = options.concurrency;
        run_options.retries = options.retries;
        run_options.progress = options.progress;

        let sanitized: Vec<DownloadItem> = items
            .iter()
            .map(|item| DownloadItem {
                desired_name: sanitize_filename(&item.desired_name),
                ..item.clone()
            })
            .collect();
        let outcome = self.orchestrator.run(&sanitized, run_options).await?;

        if outcome.files_successful == 0 {
            self.notifier
                .error("Download failed", "None of the files could be downloaded.");
            return Ok(BulkDownloadResult {
                status: ResultStatus::Error,
                code: ErrorCode::AllFailed,
                files_processed: total,
                files_successful: 0,
                total_bytes: 0,
                filename: None,
                path: None,
                failures: outcome.failures,
                error: Some(Error::AllFailed.to_string()),
            });
        }

        let filename = options.zip_filename.map_or_else(
            || {
                let prefix = options.name_prefix.as_deref().unwrap_or(DEFAULT_NAME_PREFIX);
                zip_filename(prefix, Utc::now())
            },
            |name| sanitize_filename(&name),
        );
        let path = self.save(&filename, &outcome.archive).await?;

        let (status, code) = if outcome.failures.is_empty() {
            (ResultStatus::Success, ErrorCode::None)
        } else {
            self.notifier.warning(
                "Partial download",
                &format!("{} of {total} file(s) could not be downloaded.", outcome.files_failed),
            );
            (ResultStatus::Partial, ErrorCode::PartialFailed)
        };
        log::info!(
            "ZIP download complete: {filename} ({}/{total} files)",
            outcome.files_successful
        );

        Ok(BulkDownloadResult {
            status,
            code,
            files_processed: total,
            files_successful: outcome.files_successful,
            total_bytes: outcome.total_bytes,
            filename: Some(filename),
            path: Some(path),
            failures: outcome.failures,
            error: None,
        })
    }

    /// Downloads again the items of `items` whose URL is listed in
    /// `failures`, with at most two workers.
    ///
    /// Retries default to zero unless `options` sets them. Items that still
    /// fail are reported in the returned result.
    pub async fn retry_failures(
        &self,
        items: &[DownloadItem],
        failures: &[ItemFailure],
        mut options: BulkOptions,
    ) -> BulkDownloadResult {
        let failed: Vec<DownloadItem> = items
            .iter()
            .filter(|item| failures.iter().any(|f| f.url == item.url))
            .cloned()
            .collect();
        log::info!("Retrying {} failed item(s)", failed.len());

        options.concurrency = Some(
            options
                .concurrency
                .map_or(RETRY_CONCURRENCY, |c| c.min(RETRY_CONCURRENCY)),
        );
        options.retries = Some(options.retries.unwrap_or(0));
        self.download(&failed, options).await
    }

    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let fs = self.orchestrator.fs();
        fs.create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(filename);
        if fs.file_exists(&path).await {
            log::warn!("Overwriting existing file {}", path.display());
        }
        fs.write_file(&path, bytes).await?;
        log::info!("Saved {}", path.display());
        Ok(path)
    }
}
