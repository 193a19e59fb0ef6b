//! Bounded-concurrency batch download into a single archive.
//!
//! The [`Orchestrator`] pulls items from a shared cursor with a fixed pool of
//! cooperative workers. Each worker resolves an item's bytes (pre-fetched or
//! over the network with retries), then adds it to the archive, records the
//! outcome, and reports progress in one synchronous step before taking the
//! next item. The archive is finalized once, after every worker is done.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;

use crate::archive::{ArchiveWriter, ZipArchiveWriter};
use crate::config::{DownloadConfig, clamp_concurrency, clamp_retries};
use crate::error::{Error, Result};
use crate::fetch::{Fetch, HttpFetcher};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::naming::unique_filename;
use crate::progress::{NoProgress, ProgressSink, ProgressSnapshot};
use crate::stats::{ItemFailure, RunStatsBuilder};

/// Entry name used when an item has no desired name.
const FALLBACK_ENTRY_NAME: &str = "file.bin";

/// Bytes for an item that are already available without a network request.
#[derive(Debug, Clone)]
pub enum Prefetched {
    /// Bytes held in memory.
    Bytes(Bytes),
    /// Bytes stored in a local file, read when the item is processed.
    File(PathBuf),
}

/// One resource to include in the archive.
#[derive(Debug, Clone)]
pub struct DownloadItem {
    /// Remote location of the resource.
    pub url: String,
    /// Entry name before collision resolution.
    pub desired_name: String,
    /// Bytes that bypass the network entirely.
    pub prefetched: Option<Prefetched>,
}

impl DownloadItem {
    /// Creates an item fetched from `url`.
    #[must_use]
    pub fn new(url: impl Into<String>, desired_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            desired_name: desired_name.into(),
            prefetched: None,
        }
    }

    /// Attaches in-memory bytes, skipping the network for this item.
    #[must_use]
    pub fn with_bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.prefetched = Some(Prefetched::Bytes(bytes.into()));
        self
    }

    /// Attaches a local file holding the item's bytes.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.prefetched = Some(Prefetched::File(path.into()));
        self
    }
}

/// Per-run options. Unset values fall back to the orchestrator's config.
#[derive(Clone, Default)]
pub struct OrchestratorOptions {
    /// Worker count, clamped into `[1, 8]`.
    pub concurrency: Option<i64>,
    /// Retries per network item, clamped to `>= 0`.
    pub retries: Option<i64>,
    /// Token that aborts the whole run.
    pub cancel: Option<CancellationToken>,
    /// Receives one snapshot per completed item.
    pub progress: Option<Arc<dyn ProgressSink>>,
}

impl OrchestratorOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the requested concurrency.
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: i64) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Sets the requested retry count.
    #[must_use]
    pub const fn with_retries(mut self, retries: i64) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Sets the progress sink.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    /// The finalized archive.
    pub archive: Bytes,
    /// Number of items added to the archive.
    pub files_successful: usize,
    /// Number of items that failed.
    pub files_failed: usize,
    /// Entry names in the order they were added.
    pub used_filenames: Vec<String>,
    /// Failed items with their errors, in completion order.
    pub failures: Vec<ItemFailure>,
    /// Total archived payload in bytes.
    pub total_bytes: u64,
    /// Wall time of the run.
    pub elapsed: Duration,
}

/// Mutable state shared by all workers of one run.
struct Shared<W> {
    writer: W,
    used: HashSet<String>,
    stats: RunStatsBuilder,
}

struct RunState<'a, W> {
    items: &'a [DownloadItem],
    cursor: AtomicUsize,
    shared: Mutex<Shared<W>>,
    progress: &'a dyn ProgressSink,
}

impl<W: ArchiveWriter> RunState<'_, W> {
    fn lock(&self) -> MutexGuard<'_, Shared<W>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the next unprocessed item, if any.
    fn next_item(&self) -> Option<&DownloadItem> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(index)
    }

    /// Records the outcome of one item and reports progress.
    ///
    /// Runs without suspending, so no other worker can interleave between
    /// naming, writing, and reporting.
    fn complete(&self, item: &DownloadItem, resolved: Result<Bytes>) -> Result<()> {
        let mut shared = self.lock();
        let filename = match resolved {
            Ok(bytes) => {
                let desired = if item.desired_name.is_empty() {
                    FALLBACK_ENTRY_NAME
                } else {
                    item.desired_name.as_str()
                };
                let name = unique_filename(desired, &shared.used);
                shared.writer.add_file(&name, &bytes)?;
                shared.used.insert(name.clone());
                shared.stats.add_success(name.clone(), bytes.len() as u64);
                log::debug!("Added {name} ({} bytes) from {}", bytes.len(), item.url);
                Some(name)
            }
            Err(e) => {
                log::warn!("Download failed for {}: {e}", item.url);
                shared.stats.add_failure(&item.url, &e.to_string());
                None
            }
        };
        let snapshot = ProgressSnapshot::new(shared.stats.completed(), self.items.len(), filename);
        self.progress.on_progress(&snapshot);
        Ok(())
    }
}

/// Drives a batch of [`DownloadItem`]s into one archive.
pub struct Orchestrator<F: Fetch = HttpFetcher, S: FileSystem = TokioFileSystem> {
    fetcher: F,
    fs: S,
    config: DownloadConfig,
}

impl Orchestrator<HttpFetcher, TokioFileSystem> {
    /// Creates an orchestrator using HTTP and the local file system.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: DownloadConfig) -> Result<Self> {
        Ok(Self::with_parts(
            HttpFetcher::new(&config)?,
            TokioFileSystem,
            config,
        ))
    }
}

impl<F: Fetch, S: FileSystem> Orchestrator<F, S> {
    /// Creates an orchestrator from custom collaborators.
    #[must_use]
    pub const fn with_parts(fetcher: F, fs: S, config: DownloadConfig) -> Self {
        Self {
            fetcher,
            fs,
            config,
        }
    }

    /// Returns the fetcher.
    #[must_use]
    pub const fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Returns the file system.
    #[must_use]
    pub const fn fs(&self) -> &S {
        &self.fs
    }

    /// Returns the download configuration.
    #[must_use]
    pub const fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Downloads `items` into a ZIP archive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the token fires before the run ends,
    /// or the archive writer's error if writing fails. Individual item
    /// failures are recorded in the outcome instead.
    pub async fn run(
        &self,
        items: &[DownloadItem],
        options: OrchestratorOptions,
    ) -> Result<DownloadOutcome> {
        let writer = ZipArchiveWriter::with_compression(self.config.compression);
        self.run_with_writer(items, options, writer).await
    }

    /// Downloads `items` into the given archive writer.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub async fn run_with_writer<W: ArchiveWriter>(
        &self,
        items: &[DownloadItem],
        options: OrchestratorOptions,
        writer: W,
    ) -> Result<DownloadOutcome> {
        let concurrency = clamp_concurrency(options.concurrency.unwrap_or(self.config.concurrency));
        let retries = clamp_retries(options.retries.unwrap_or(self.config.retries));
        let cancel = options.cancel.unwrap_or_default();
        let progress = options.progress.unwrap_or_else(|| Arc::new(NoProgress));

        let workers = concurrency.min(items.len()).max(1);
        log::info!(
            "Starting run: {} item(s), {workers} worker(s), up to {retries} retries each",
            items.len()
        );

        let state = RunState {
            items,
            cursor: AtomicUsize::new(0),
            shared: Mutex::new(Shared {
                writer,
                used: HashSet::new(),
                stats: RunStatsBuilder::new(),
            }),
            progress: progress.as_ref(),
        };

        try_join_all((0..workers).map(|id| self.worker(id, &state, retries, &cancel))).await?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let Shared { writer, stats, .. } = state
            .shared
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let archive = writer.finalize()?;
        let stats = stats.build();

        log::info!(
            "Run finished: {} succeeded, {} failed, {} bytes in {:?}",
            stats.files_successful(),
            stats.files_failed(),
            stats.total_bytes,
            stats.elapsed
        );

        Ok(DownloadOutcome {
            archive,
            files_successful: stats.files_successful(),
            files_failed: stats.files_failed(),
            used_filenames: stats.used_filenames,
            failures: stats.failures,
            total_bytes: stats.total_bytes,
            elapsed: stats.elapsed,
        })
    }

    async fn worker<W: ArchiveWriter>(
        &self,
        id: usize,
        state: &RunState<'_, W>,
        retries: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                log::debug!("Worker {id} stopping: cancelled");
                return Err(Error::Cancelled);
            }
            let Some(item) = state.next_item() else {
                log::trace!("Worker {id} idle: queue drained");
                return Ok(());
            };
            let resolved = match self.resolve_bytes(item, retries, cancel).await {
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                other => other,
            };
            state.complete(item, resolved)?;
        }
    }

    /// Returns the item's bytes, preferring pre-fetched data over the network.
    ///
    /// Retries apply to network fetches only.
    pub(crate) async fn resolve_bytes(
        &self,
        item: &DownloadItem,
        retries: u32,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        match &item.prefetched {
            Some(Prefetched::Bytes(bytes)) => Ok(bytes.clone()),
            Some(Prefetched::File(path)) => tokio::select! {
                biased;
                () = cancel.cancelled() => Err(Error::Cancelled),
                res = self.fs.read_file(path) => res.map_err(Error::from),
            },
            None => self.fetcher.fetch(&item.url, retries, cancel).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Scripted fetcher that records calls and tracks concurrency.
    #[derive(Default)]
    struct MockFetcher {
        responses: HashMap<String, std::result::Result<&'static [u8], u16>>,
        delay: Duration,
        calls: Mutex<Vec<(String, u32)>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockFetcher {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        fn ok(mut self, url: &str, body: &'static [u8]) -> Self {
            self.responses.insert(url.to_string(), Ok(body));
            self
        }

        fn status(mut self, url: &str, status: u16) -> Self {
            self.responses.insert(url.to_string(), Err(status));
            self
        }

        fn calls(&self) -> Vec<(String, u32)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetch for MockFetcher {
        async fn fetch(&self, url: &str, retries: u32, cancel: &CancellationToken) -> Result<Bytes> {
            self.calls.lock().unwrap().push((url.to_string(), retries));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let outcome = tokio::select! {
                () = cancel.cancelled() => Err(Error::Cancelled),
                () = tokio::time::sleep(self.delay) => match self.responses.get(url) {
                    Some(Ok(body)) => Ok(Bytes::from_static(*body)),
                    Some(Err(status)) => Err(Error::Status { url: url.to_string(), status: *status }),
                    None => Err(Error::Status { url: url.to_string(), status: 404 }),
                },
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            outcome
        }
    }

    /// Archive writer that records entries and finalize calls.
    #[derive(Clone, Default)]
    struct RecordingWriter {
        entries: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
        finalized: Arc<AtomicUsize>,
        fail_on: Option<&'static str>,
    }

    impl ArchiveWriter for RecordingWriter {
        fn add_file(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
            if self.fail_on == Some(name) {
                return Err(Error::Archive("disk full".to_string()));
            }
            self.entries
                .lock()
                .unwrap()
                .push((name.to_string(), bytes.to_vec()));
            Ok(())
        }

        fn finalize(self) -> Result<Bytes> {
            self.finalized.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(b"archive"))
        }
    }

    fn orchestrator(fetcher: MockFetcher) -> Orchestrator<MockFetcher, TokioFileSystem> {
        Orchestrator::with_parts(fetcher, TokioFileSystem, DownloadConfig::default())
    }

    fn recording_progress() -> (Arc<Mutex<Vec<ProgressSnapshot>>>, Arc<dyn ProgressSink>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let sink: Arc<dyn ProgressSink> =
            Arc::new(move |s: &ProgressSnapshot| recorder.lock().unwrap().push(s.clone()));
        (seen, sink)
    }

    fn urls(n: usize) -> Vec<DownloadItem> {
        (0..n)
            .map(|i| DownloadItem::new(format!("https://example.com/{i}.jpg"), format!("{i}.jpg")))
            .collect()
    }

    fn fetcher_for(items: &[DownloadItem], delay: Duration) -> MockFetcher {
        items
            .iter()
            .fold(MockFetcher::new(delay), |f, item| f.ok(&item.url, b"data"))
    }

    #[tokio::test]
    async fn non_positive_concurrency_still_processes_items() {
        let items = urls(3);
        for requested in [0, -4] {
            let dl = orchestrator(fetcher_for(&items, Duration::from_millis(5)));
            let outcome = dl
                .run_with_writer(
                    &items,
                    OrchestratorOptions::new().with_concurrency(requested),
                    RecordingWriter::default(),
                )
                .await
                .unwrap();
            assert_eq!(outcome.files_successful, 3);
            assert_eq!(dl.fetcher().max_in_flight.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn concurrency_one_never_overlaps() {
        let items = urls(5);
        let dl = orchestrator(fetcher_for(&items, Duration::from_millis(50)));
        dl.run_with_writer(
            &items,
            OrchestratorOptions::new().with_concurrency(1),
            RecordingWriter::default(),
        )
        .await
        .unwrap();
        assert_eq!(dl.fetcher().max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn high_concurrency_is_capped_at_eight() {
        let items = urls(20);
        let dl = orchestrator(fetcher_for(&items, Duration::from_millis(50)));
        let outcome = dl
            .run_with_writer(
                &items,
                OrchestratorOptions::new().with_concurrency(64),
                RecordingWriter::default(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.files_successful, 20);
        assert_eq!(dl.fetcher().max_in_flight.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn negative_retries_are_passed_as_zero() {
        let items = urls(1);
        let dl = orchestrator(fetcher_for(&items, Duration::ZERO));
        dl.run_with_writer(
            &items,
            OrchestratorOptions::new().with_retries(-5),
            RecordingWriter::default(),
        )
        .await
        .unwrap();
        assert_eq!(dl.fetcher().calls(), vec![(items[0].url.clone(), 0)]);
    }

    #[tokio::test]
    async fn default_retries_come_from_config() {
        let items = urls(1);
        let dl = Orchestrator::with_parts(
            fetcher_for(&items, Duration::ZERO),
            TokioFileSystem,
            DownloadConfig::default().with_retries(2),
        );
        dl.run_with_writer(&items, OrchestratorOptions::new(), RecordingWriter::default())
            .await
            .unwrap();
        assert_eq!(dl.fetcher().calls()[0].1, 2);
    }

    #[tokio::test]
    async fn progress_counts_every_item_in_order() {
        let items = urls(6);
        let dl = orchestrator(fetcher_for(&items, Duration::from_millis(5)));
        let (seen, sink) = recording_progress();
        dl.run_with_writer(
            &items,
            OrchestratorOptions::new()
                .with_concurrency(3)
                .with_progress(sink),
            RecordingWriter::default(),
        )
        .await
        .unwrap();

        let seen = seen.lock().unwrap();
        let currents: Vec<_> = seen.iter().map(|s| s.current).collect();
        assert_eq!(currents, vec![1, 2, 3, 4, 5, 6]);
        assert!(seen.iter().all(|s| s.total == 6));
        assert_eq!(seen.last().unwrap().percentage, 100);
    }

    #[tokio::test]
    async fn two_items_report_half_then_full() {
        let items = urls(2);
        let dl = orchestrator(fetcher_for(&items, Duration::ZERO));
        let (seen, sink) = recording_progress();
        dl.run_with_writer(
            &items,
            OrchestratorOptions::new()
                .with_concurrency(1)
                .with_progress(sink),
            RecordingWriter::default(),
        )
        .await
        .unwrap();
        let pcts: Vec<_> = seen.lock().unwrap().iter().map(|s| s.percentage).collect();
        assert_eq!(pcts, vec![50, 100]);
    }

    #[tokio::test]
    async fn failed_item_still_reports_progress() {
        let items = urls(2);
        let fetcher = MockFetcher::new(Duration::ZERO)
            .status(&items[0].url, 500)
            .ok(&items[1].url, b"ok");
        let dl = orchestrator(fetcher);
        let (seen, sink) = recording_progress();
        let outcome = dl
            .run_with_writer(
                &items,
                OrchestratorOptions::new()
                    .with_concurrency(1)
                    .with_retries(0)
                    .with_progress(sink),
                RecordingWriter::default(),
            )
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].filename, None);
        assert_eq!(seen[1].percentage, 100);
        assert_eq!(outcome.files_successful, 1);
        assert_eq!(outcome.files_failed, 1);
        assert_eq!(outcome.failures[0].url, items[0].url);
        assert!(outcome.failures[0].error.contains("500"));
    }

    #[tokio::test]
    async fn prefetched_bytes_bypass_network() {
        let items = vec![
            DownloadItem::new("https://example.com/cached.jpg", "cached.jpg")
                .with_bytes(Bytes::from_static(b"cached-bytes")),
        ];
        let dl = orchestrator(MockFetcher::new(Duration::ZERO));
        let writer = RecordingWriter::default();
        let entries = Arc::clone(&writer.entries);
        let outcome = dl
            .run_with_writer(&items, OrchestratorOptions::new(), writer)
            .await
            .unwrap();

        assert!(dl.fetcher().calls().is_empty());
        assert_eq!(outcome.files_successful, 1);
        assert_eq!(
            *entries.lock().unwrap(),
            vec![("cached.jpg".to_string(), b"cached-bytes".to_vec())]
        );
    }

    #[tokio::test]
    async fn prefetched_file_is_read_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("local.png");
        std::fs::write(&path, b"png-bytes").unwrap();

        let items = vec![
            DownloadItem::new("https://example.com/a.png", "a.png").with_file(&path),
            DownloadItem::new("https://example.com/b.png", "b.png")
                .with_file(dir.path().join("missing.png")),
        ];
        let dl = orchestrator(MockFetcher::new(Duration::ZERO));
        let writer = RecordingWriter::default();
        let entries = Arc::clone(&writer.entries);
        let outcome = dl
            .run_with_writer(&items, OrchestratorOptions::new().with_concurrency(1), writer)
            .await
            .unwrap();

        assert!(dl.fetcher().calls().is_empty());
        assert_eq!(outcome.files_successful, 1);
        assert_eq!(outcome.files_failed, 1);
        assert_eq!(entries.lock().unwrap()[0].1, b"png-bytes".to_vec());
    }

    #[tokio::test]
    async fn cancellation_rejects_the_run() {
        let items = urls(4);
        let dl = orchestrator(fetcher_for(&items, Duration::from_secs(30)));
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let writer = RecordingWriter::default();
        let finalized = Arc::clone(&writer.finalized);
        let err = dl
            .run_with_writer(
                &items,
                OrchestratorOptions::new()
                    .with_concurrency(1)
                    .with_cancel(token),
                writer,
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("cancelled"));
        assert!(err.is_cancelled());
        assert_eq!(dl.fetcher().calls().len(), 1);
        assert_eq!(finalized.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn already_cancelled_token_fetches_nothing() {
        let items = urls(3);
        let dl = orchestrator(fetcher_for(&items, Duration::ZERO));
        let token = CancellationToken::new();
        token.cancel();
        let err = dl
            .run_with_writer(
                &items,
                OrchestratorOptions::new().with_cancel(token),
                RecordingWriter::default(),
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(dl.fetcher().calls().is_empty());
    }

    #[tokio::test]
    async fn duplicate_names_get_distinct_entries() {
        let items = vec![
            DownloadItem::new("https://example.com/a", "1.jpg"),
            DownloadItem::new("https://example.com/b", "1.jpg"),
        ];
        let fetcher = fetcher_for(&items, Duration::ZERO);
        let dl = orchestrator(fetcher);
        let outcome = dl
            .run_with_writer(&items, OrchestratorOptions::new(), RecordingWriter::default())
            .await
            .unwrap();

        let names = &outcome.used_filenames;
        assert_eq!(names.len(), 2);
        assert_ne!(names[0], names[1]);
        assert!(names.iter().all(|n| n.starts_with('1') && n.ends_with(".jpg")));
        assert!(names.contains(&"1.jpg".to_string()));
    }

    #[tokio::test]
    async fn empty_input_still_finalizes_once() {
        let dl = orchestrator(MockFetcher::new(Duration::ZERO));
        let writer = RecordingWriter::default();
        let finalized = Arc::clone(&writer.finalized);
        let (seen, sink) = recording_progress();
        let outcome = dl
            .run_with_writer(&[], OrchestratorOptions::new().with_progress(sink), writer)
            .await
            .unwrap();

        assert_eq!(outcome.files_successful, 0);
        assert_eq!(outcome.files_failed, 0);
        assert!(outcome.used_filenames.is_empty());
        assert!(!outcome.archive.is_empty());
        assert_eq!(finalized.load(Ordering::SeqCst), 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn all_failures_still_finalize() {
        let items = urls(3);
        let dl = orchestrator(MockFetcher::new(Duration::ZERO));
        let writer = RecordingWriter::default();
        let finalized = Arc::clone(&writer.finalized);
        let outcome = dl
            .run_with_writer(&items, OrchestratorOptions::new().with_retries(0), writer)
            .await
            .unwrap();
        assert_eq!(outcome.files_failed, 3);
        assert_eq!(finalized.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn writer_failure_aborts_the_run() {
        let items = urls(3);
        let dl = orchestrator(fetcher_for(&items, Duration::ZERO));
        let writer = RecordingWriter {
            fail_on: Some("1.jpg"),
            ..RecordingWriter::default()
        };
        let finalized = Arc::clone(&writer.finalized);
        let err = dl
            .run_with_writer(&items, OrchestratorOptions::new().with_concurrency(1), writer)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Archive(_)));
        assert_eq!(finalized.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_desired_name_uses_fallback() {
        let items = vec![DownloadItem::new("https://example.com/x", "").with_bytes(&b"x"[..])];
        let dl = orchestrator(MockFetcher::new(Duration::ZERO));
        let outcome = dl
            .run_with_writer(&items, OrchestratorOptions::new(), RecordingWriter::default())
            .await
            .unwrap();
        assert_eq!(outcome.used_filenames, vec!["file.bin"]);
    }

    #[tokio::test]
    async fn zip_run_produces_readable_archive() {
        let items = vec![
            DownloadItem::new("https://example.com/a", "a.jpg"),
            DownloadItem::new("https://example.com/b", "a.jpg"),
        ];
        let fetcher = MockFetcher::new(Duration::ZERO)
            .ok("https://example.com/a", b"first")
            .ok("https://example.com/b", b"second");
        let dl = orchestrator(fetcher);
        let outcome = dl
            .run(&items, OrchestratorOptions::new().with_concurrency(1))
            .await
            .unwrap();

        let archive = zip::ZipArchive::new(std::io::Cursor::new(outcome.archive)).unwrap();
        let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["a-1.jpg", "a.jpg"]);
        assert_eq!(outcome.total_bytes, 11);
    }
}
