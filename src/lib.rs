//! Fetchkit Core Library
//!
//! This library fetches and downloads remote resources over HTTP under
//! strict concurrency and rate bounds, with automatic retry on transient
//! failure.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`limit`] - Rate limiting and bounded-concurrency admission
//! - [`crawl`] - Session lifecycle and retrying page fetches
//! - [`batch`] - Fixed-size batch processing with failure requeueing
//! - [`download`] - Concurrent bulk downloads streaming to disk
//! - [`parser`] - HTML parsing and CSS-selector extraction
//! - [`fsio`] - Filesystem persistence helpers
//! - [`report`] - Error tracking and progress reporting

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod crawl;
pub mod download;
pub mod fsio;
pub mod limit;
pub mod parser;
pub mod report;

// Re-export commonly used types
pub use batch::{BatchError, BatchProcessor, DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE};
pub use crawl::{
    CrawlError, CrawlOptions, Crawler, DEFAULT_BASE_DELAY, DEFAULT_FETCH_RETRIES, Session,
    SessionNotStarted,
};
pub use download::{
    DownloadError, DownloadOptions, DownloadRecord, Downloader, DownloaderError,
};
pub use fsio::FileError;
pub use limit::{ConcurrencyGate, GateClosed, GatePermit, RateError, RateLimiter};
pub use parser::{
    FieldSelector, ImageRef, Link, extract_images, extract_links, extract_metadata,
    parse_document,
};
pub use report::{ErrorKind, ErrorSummary, ErrorTracker, ProgressTracker};
