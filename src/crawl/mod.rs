//! Crawl session and bounded-concurrency page fetching.
//!
//! A [`Crawler`] wraps one [`Session`] (the shared HTTP client and timeout
//! policy), a [`crate::limit::RateLimiter`], and a
//! [`crate::limit::ConcurrencyGate`], and pulls page content through all
//! three with retry and linear backoff.

mod fetch;
mod session;

pub use fetch::{CrawlError, CrawlOptions, Crawler, DEFAULT_BASE_DELAY, DEFAULT_FETCH_RETRIES};
pub use session::{DEFAULT_SESSION_TIMEOUT, Session, SessionNotStarted};
