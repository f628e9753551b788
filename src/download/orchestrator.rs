//! Download orchestrator for concurrent bulk downloads with retry support.
//!
//! # Concurrency Model
//!
//! - Every record in a batch runs as its own future, driven together so the
//!   result list stays order-aligned with the input
//! - A gate slot is acquired per attempt and released when the attempt ends
//!   (RAII), success or failure
//! - One shared HTTP client serves all items and attempts
//!
//! # Retry Behavior
//!
//! - Non-200 statuses, transport errors, and disk-write failures are
//!   recorded and retried with linear backoff
//! - A 404 aborts the item's retries immediately
//! - An item that ends in failure - abort or exhaustion - lands in the
//!   failed-download list and yields `false`; errors never escalate out of
//!   `download_batch`, so N inputs always produce N outcomes

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::join_all;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use super::error::DownloadError;
use crate::fsio;
use crate::limit::ConcurrencyGate;
use crate::report::{ErrorKind, ErrorTracker, ProgressTracker};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default concurrency for bulk downloads.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 50;

/// Default buffer size for streaming writes.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Connect timeout for download requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Progress update cadence for bulk downloads.
const PROGRESS_UPDATE_FREQUENCY: u64 = 100;

/// Error type for downloader construction.
#[derive(Debug, thiserror::Error)]
pub enum DownloaderError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// A (source URL, destination path) pair tracked by the downloader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// The URL to download from.
    pub url: String,
    /// The file path to stream the body to.
    pub dest: PathBuf,
}

impl DownloadRecord {
    /// Creates a record from a URL and destination path.
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            dest: dest.into(),
        }
    }
}

/// Tuning knobs for a [`Downloader`].
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Maximum number of concurrent downloads (1-100).
    pub concurrency: usize,
    /// Buffer size for streaming writes.
    pub chunk_size: usize,
    /// Total per-request timeout.
    pub timeout: Duration,
    /// Attempts per item before it is recorded as failed.
    pub max_retries: u32,
    /// Base delay under the linear backoff increment.
    pub base_delay: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Concurrent bulk downloader aggregating per-item outcomes.
///
/// Designed for one batch run at a time: counters, the progress tracker, and
/// the failed-download list reset at the start of each
/// [`download_batch`](Self::download_batch).
#[derive(Debug)]
pub struct Downloader {
    client: Client,
    gate: ConcurrencyGate,
    chunk_size: usize,
    max_retries: u32,
    base_delay: Duration,
    total: AtomicUsize,
    completed: AtomicUsize,
    failed: Mutex<Vec<DownloadRecord>>,
    tracker: ErrorTracker,
    progress: Mutex<Option<ProgressTracker>>,
    show_progress: bool,
}

impl Downloader {
    /// Creates a downloader sharing one HTTP client across all items.
    ///
    /// # Errors
    ///
    /// Returns [`DownloaderError::InvalidConcurrency`] if the concurrency
    /// value is outside the valid range (1-100).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[allow(clippy::expect_used)]
    #[instrument(skip(options), fields(concurrency = options.concurrency))]
    pub fn new(options: DownloadOptions) -> Result<Self, DownloaderError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&options.concurrency) {
            return Err(DownloaderError::InvalidConcurrency {
                value: options.concurrency,
            });
        }

        let client = Client::builder()
            .timeout(options.timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");

        debug!(
            concurrency = options.concurrency,
            max_retries = options.max_retries,
            chunk_size = options.chunk_size,
            "creating downloader"
        );

        Ok(Self {
            client,
            gate: ConcurrencyGate::new(options.concurrency),
            chunk_size: options.chunk_size.max(1),
            max_retries: options.max_retries.max(1),
            base_delay: options.base_delay,
            total: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: Mutex::new(Vec::new()),
            tracker: ErrorTracker::new(),
            progress: Mutex::new(None),
            show_progress: false,
        })
    }

    /// Makes the progress bar draw to stderr instead of staying hidden.
    #[must_use]
    pub fn with_progress_bar(mut self, visible: bool) -> Self {
        self.show_progress = visible;
        self
    }

    /// Total items in the current batch.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Items downloaded successfully in the current batch.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Snapshot of the failed-download list.
    #[must_use]
    pub fn failed_downloads(&self) -> Vec<DownloadRecord> {
        self.lock_failed().clone()
    }

    /// The downloader's error tracker.
    #[must_use]
    pub fn error_tracker(&self) -> &ErrorTracker {
        &self.tracker
    }

    /// The shared concurrency gate.
    #[must_use]
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Downloads every record concurrently, bounded by the gate, and returns
    /// one outcome per record, order-aligned with the input.
    ///
    /// Waits for all items to finish; individual failures never escalate. A
    /// final zero-step progress update signals batch completion.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn download_batch(&self, items: &[DownloadRecord]) -> Vec<bool> {
        self.total.store(items.len(), Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        self.lock_failed().clear();

        let total = items.len() as u64;
        let tracker = if self.show_progress {
            ProgressTracker::new(total, PROGRESS_UPDATE_FREQUENCY)
        } else {
            ProgressTracker::hidden(total, PROGRESS_UPDATE_FREQUENCY)
        };
        *self.lock_progress() = Some(tracker);

        info!(count = items.len(), "starting batch download");
        let results = join_all(items.iter().map(|record| self.download_file(record))).await;

        if let Some(progress) = &*self.lock_progress() {
            progress.update(0, Some("batch download complete"));
        }

        let failed = results.iter().filter(|ok| !**ok).count();
        info!(
            completed = self.completed(),
            failed,
            total = results.len(),
            "batch download complete"
        );
        results
    }

    /// Downloads one record with retry; returns whether it succeeded.
    ///
    /// Every failure path - 404 abort, gate teardown, or retry exhaustion -
    /// appends the record to the failed-download list.
    #[instrument(skip(self, record), fields(url = %record.url))]
    pub async fn download_file(&self, record: &DownloadRecord) -> bool {
        for attempt in 0..self.max_retries {
            let outcome = match self.gate.enter().await {
                Ok(slot) => {
                    let result = self.attempt_download(&record.url, &record.dest).await;
                    drop(slot);
                    result
                }
                Err(closed) => {
                    self.tracker
                        .record_attempt(ErrorKind::Unexpected, &closed, attempt + 1);
                    break;
                }
            };

            match outcome {
                Ok(()) => {
                    self.completed.fetch_add(1, Ordering::SeqCst);
                    if let Some(progress) = &*self.lock_progress() {
                        progress.update(1, Some(&format!("downloaded {}", record.url)));
                    }
                    debug!(attempt = attempt + 1, "download succeeded");
                    return true;
                }
                Err(e) => {
                    self.tracker.record_attempt(e.kind(), &e, attempt + 1);
                    if e.is_not_found() {
                        debug!("404 response, not retrying");
                        break;
                    }
                }
            }

            if attempt + 1 < self.max_retries {
                tokio::time::sleep(backoff_delay(self.base_delay, attempt)).await;
            }
        }

        warn!(dest = %record.dest.display(), "download failed; recording for later retry");
        self.lock_failed().push(record.clone());
        false
    }

    /// One download attempt: request, then stream the body to disk.
    async fn attempt_download(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_request_error(url, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        fsio::ensure_parent_dir(dest).await?;
        let file = File::create(dest)
            .await
            .map_err(|e| DownloadError::io(dest, e))?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| classify_request_error(url, e))?;
            writer
                .write_all(&bytes)
                .await
                .map_err(|e| DownloadError::io(dest, e))?;
        }
        writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(dest, e))?;

        debug!(dest = %dest.display(), "wrote download");
        Ok(())
    }

    /// Serializes the failed-download list to a timestamped TSV record in
    /// `dir` (`url<TAB>destination` per line).
    ///
    /// Best-effort: a persistence failure is logged on the tracker, not
    /// raised. Returns the record path when written, `None` when the list is
    /// empty or the write failed.
    #[instrument(skip(self, dir), fields(dir = %dir.display()))]
    pub async fn save_failed_downloads(&self, dir: &Path) -> Option<PathBuf> {
        let failed = self.failed_downloads();
        if failed.is_empty() {
            return None;
        }

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("failed_downloads_{timestamp}.tsv"));

        let mut contents = String::new();
        for record in &failed {
            contents.push_str(&format!("{}\t{}\n", record.url, record.dest.display()));
        }

        match fsio::write_text(&path, &contents).await {
            Ok(()) => {
                info!(path = %path.display(), count = failed.len(), "saved failed downloads");
                Some(path)
            }
            Err(e) => {
                self.tracker.record(
                    ErrorKind::Persistence,
                    format_args!("failed to save failed-download record: {e}"),
                );
                None
            }
        }
    }

    fn lock_failed(&self) -> MutexGuard<'_, Vec<DownloadRecord>> {
        self.failed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_progress(&self) -> MutexGuard<'_, Option<ProgressTracker>> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Linear backoff: `base + (attempt + 1)` seconds, with `attempt` 0-indexed.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base + Duration::from_secs(u64::from(attempt) + 1)
}

/// Maps a reqwest failure onto the download error taxonomy.
fn classify_request_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn options_with_concurrency(concurrency: usize) -> DownloadOptions {
        DownloadOptions {
            concurrency,
            ..DownloadOptions::default()
        }
    }

    #[test]
    fn test_new_valid_concurrency() {
        assert!(Downloader::new(options_with_concurrency(1)).is_ok());
        assert!(Downloader::new(options_with_concurrency(50)).is_ok());
        assert!(Downloader::new(options_with_concurrency(100)).is_ok());
    }

    #[test]
    fn test_new_invalid_concurrency_zero() {
        let result = Downloader::new(options_with_concurrency(0));
        assert!(matches!(
            result,
            Err(DownloaderError::InvalidConcurrency { value: 0 })
        ));
    }

    #[test]
    fn test_new_invalid_concurrency_too_high() {
        let result = Downloader::new(options_with_concurrency(101));
        assert!(matches!(
            result,
            Err(DownloaderError::InvalidConcurrency { value: 101 })
        ));
    }

    #[test]
    fn test_counters_start_at_zero() {
        let downloader = Downloader::new(DownloadOptions::default()).unwrap();
        assert_eq!(downloader.total(), 0);
        assert_eq!(downloader.completed(), 0);
        assert!(downloader.failed_downloads().is_empty());
    }

    #[test]
    fn test_gate_capacity_matches_options() {
        let downloader = Downloader::new(options_with_concurrency(7)).unwrap();
        assert_eq!(downloader.gate().capacity(), 7);
    }

    #[test]
    fn test_download_record_round_trips_through_json() {
        let record = DownloadRecord::new("https://example.com/a.pdf", "out/a.pdf");
        let json = serde_json::to_string(&record).unwrap();
        let back: DownloadRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_backoff_delay_is_linear() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(3));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(4));
    }

    #[test]
    fn test_downloader_error_display() {
        let error = DownloaderError::InvalidConcurrency { value: 0 };
        let msg = error.to_string();
        assert!(msg.contains("invalid concurrency"));
        assert!(msg.contains('0'));
    }
}
