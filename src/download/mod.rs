//! Concurrent bulk downloading with streaming writes to disk.
//!
//! This module provides the [`Downloader`] which runs many independent
//! retrying downloads concurrently, bounded by a shared
//! [`crate::limit::ConcurrencyGate`], and aggregates one outcome per item.
//!
//! # Features
//!
//! - Streaming downloads (memory-efficient for large files)
//! - One shared HTTP client across all items and attempts
//! - Linear retry backoff with status-aware abort on 404
//! - Append-only failed-download list with a best-effort timestamped record
//!
//! # Example
//!
//! ```no_run
//! use fetchkit::download::{DownloadOptions, DownloadRecord, Downloader};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Downloader::new(DownloadOptions::default())?;
//! let items = vec![
//!     DownloadRecord::new("https://example.com/a.pdf", "out/a.pdf"),
//!     DownloadRecord::new("https://example.com/b.pdf", "out/b.pdf"),
//! ];
//! let results = downloader.download_batch(&items).await;
//! println!("{} of {} downloaded", downloader.completed(), results.len());
//! # Ok(())
//! # }
//! ```

mod error;
mod orchestrator;

pub use error::DownloadError;
pub use orchestrator::{
    DEFAULT_CHUNK_SIZE, DEFAULT_DOWNLOAD_CONCURRENCY, DownloadOptions, DownloadRecord, Downloader,
    DownloaderError,
};
