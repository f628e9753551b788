//! Bounded-concurrency page fetching with retry and linear backoff.
//!
//! # Overview
//!
//! [`Crawler::fetch_page`] pulls one page through the crawl's shared
//! throttling state: the rate limiter spaces request issuance, the
//! concurrency gate bounds how many requests are in flight, and the session
//! supplies the shared client and timeout. Failures during an attempt are
//! recorded on the crawler's error tracker and retried with a linearly
//! increasing delay; a 404 aborts retrying immediately.
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 200 | Return body immediately |
//! | HTTP 404 | Record `http_error`, stop retrying |
//! | Other status | Record `http_error`, retry |
//! | Transport error | Record `network_error`, retry |
//! | Anything else | Record `unexpected_error`, retry |
//!
//! Between attempts the crawler sleeps `base_delay + (attempt + 1)` seconds.
//! Exhausting all attempts yields `Ok(None)`: absence of content is the
//! failure signal, never an empty-but-valid body.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use super::session::{DEFAULT_SESSION_TIMEOUT, Session, SessionNotStarted};
use crate::limit::{ConcurrencyGate, DEFAULT_WAIT_TIMEOUT, GateClosed, RateError, RateLimiter};
use crate::report::{ErrorKind, ErrorTracker};

/// Default number of fetch attempts per page.
pub const DEFAULT_FETCH_RETRIES: u32 = 3;

/// Default base delay under the linear backoff increment.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Errors that abort a page fetch outright.
///
/// Per-attempt failures (bad status, transport errors) are not errors at
/// this level; they are recorded on the crawler's tracker and retried.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The configured base URL is not a valid absolute URL.
    #[error("invalid base URL: {url}")]
    InvalidBaseUrl {
        /// The rejected URL string.
        url: String,
    },

    /// A fetch was issued while the session was closed.
    #[error(transparent)]
    SessionNotStarted(#[from] SessionNotStarted),

    /// The rate limiter rejected the configuration or timed out a wait.
    #[error(transparent)]
    RateLimit(#[from] RateError),

    /// The concurrency gate was closed while fetches were outstanding.
    #[error(transparent)]
    Gate(#[from] GateClosed),
}

/// Tuning knobs for a [`Crawler`].
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Maximum number of in-flight fetches.
    pub concurrency: usize,
    /// Total per-request timeout.
    pub timeout: Duration,
    /// Request issuance rate in requests per second.
    pub requests_per_second: f64,
    /// Bound on how long a fetch may be parked behind the rate limiter.
    pub rate_wait_timeout: Duration,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            timeout: DEFAULT_SESSION_TIMEOUT,
            requests_per_second: 1.0,
            rate_wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

/// Fetches pages for one site under shared rate and concurrency bounds.
///
/// The crawler owns the session, the rate limiter, the concurrency gate,
/// the visited-URL set, and an error tracker; discovery logic layered on
/// top drives them through the accessors and [`fetch_page`](Self::fetch_page).
#[derive(Debug)]
pub struct Crawler {
    /// The configured base URL string, used for prefix validation.
    base_url: String,
    /// Parsed form of the base URL, used for joining and the domain.
    base: Url,
    session: Session,
    gate: ConcurrencyGate,
    limiter: RateLimiter,
    visited: Mutex<HashSet<String>>,
    tracker: ErrorTracker,
}

impl Crawler {
    /// Creates a crawler for the given site.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidBaseUrl`] if `base_url` does not parse
    /// as an absolute URL, or [`CrawlError::RateLimit`] if the configured
    /// rate is invalid.
    pub fn new(base_url: &str, options: CrawlOptions) -> Result<Self, CrawlError> {
        let base = Url::parse(base_url).map_err(|_| CrawlError::InvalidBaseUrl {
            url: base_url.to_string(),
        })?;
        let limiter =
            RateLimiter::with_wait_timeout(options.requests_per_second, options.rate_wait_timeout)?;

        Ok(Self {
            base_url: base_url.to_string(),
            base,
            session: Session::new(options.timeout),
            gate: ConcurrencyGate::new(options.concurrency),
            limiter,
            visited: Mutex::new(HashSet::new()),
            tracker: ErrorTracker::new(),
        })
    }

    /// Opens the session. Idempotent.
    pub fn start(&self) {
        self.session.start();
    }

    /// Closes the session. Idempotent; no fetch may execute afterwards
    /// without a fresh `start()`.
    pub fn stop(&self) {
        self.session.stop();
    }

    /// The configured base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The domain of the base URL.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.base.host_str().unwrap_or("")
    }

    /// The session owning the shared client handle.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The shared rate limiter.
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// The shared concurrency gate.
    #[must_use]
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// The crawler's error tracker.
    #[must_use]
    pub fn error_tracker(&self) -> &ErrorTracker {
        &self.tracker
    }

    /// Fetches page content with retry and linear backoff.
    ///
    /// Each attempt acquires the rate limiter, then a gate slot (released
    /// unconditionally when the attempt ends), then issues the request under
    /// the session timeout. A 200 returns the body; a 404 aborts retrying;
    /// all other failures are recorded and retried. `Ok(None)` means the
    /// page could not be fetched; callers must treat absence as failure.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::SessionNotStarted`] while the session is
    /// closed, and [`CrawlError::RateLimit`] if a limiter wait exceeds its
    /// bound.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_page(
        &self,
        url: &str,
        retries: u32,
        base_delay: Duration,
    ) -> Result<Option<String>, CrawlError> {
        let client = self.session.client()?;

        for attempt in 0..retries {
            self.limiter.acquire().await?;

            {
                let _slot = self.gate.enter().await?;

                match client.get(url).send().await {
                    Ok(response) => {
                        let status = response.status();
                        if status == StatusCode::OK {
                            match response.text().await {
                                Ok(body) => {
                                    debug!(attempt = attempt + 1, "fetch succeeded");
                                    return Ok(Some(body));
                                }
                                Err(e) => self.tracker.record_attempt(
                                    ErrorKind::Network,
                                    format_args!("failed to read body for {url}: {e}"),
                                    attempt + 1,
                                ),
                            }
                        } else {
                            self.tracker.record_attempt(
                                ErrorKind::Http,
                                format_args!("status {status} for {url}"),
                                attempt + 1,
                            );
                            if status == StatusCode::NOT_FOUND {
                                debug!("404 response, not retrying");
                                return Ok(None);
                            }
                        }
                    }
                    Err(e) if is_transport_error(&e) => self.tracker.record_attempt(
                        ErrorKind::Network,
                        format_args!("{e}"),
                        attempt + 1,
                    ),
                    Err(e) => self.tracker.record_attempt(
                        ErrorKind::Unexpected,
                        format_args!("{e}"),
                        attempt + 1,
                    ),
                }
            }

            if attempt + 1 < retries {
                tokio::time::sleep(backoff_delay(base_delay, attempt)).await;
            }
        }

        warn!(retries, "fetch attempts exhausted");
        Ok(None)
    }

    /// Checks whether a URL belongs to the target site.
    ///
    /// This is a string-prefix match against the configured base URL; it has
    /// no network effect.
    #[must_use]
    pub fn is_valid_url(&self, url: &str) -> bool {
        url.starts_with(&self.base_url)
    }

    /// Resolves a possibly-relative URL against the crawl base (or an
    /// explicit override) per standard URL joining rules.
    #[must_use]
    pub fn normalize_url(&self, url: &str, base: Option<&Url>) -> Option<String> {
        base.unwrap_or(&self.base)
            .join(url)
            .ok()
            .map(|joined| joined.to_string())
    }

    /// Extracts the path component of a URL, trimmed of surrounding slashes.
    #[must_use]
    pub fn extract_relative_path(url: &str) -> String {
        Url::parse(url)
            .ok()
            .map(|parsed| parsed.path().trim_matches('/').to_string())
            .unwrap_or_default()
    }

    /// Marks a URL as visited; returns `true` when it was newly inserted.
    pub fn mark_visited(&self, url: &str) -> bool {
        self.lock_visited().insert(url.to_string())
    }

    /// Returns whether a URL has been visited this session.
    #[must_use]
    pub fn is_visited(&self, url: &str) -> bool {
        self.lock_visited().contains(url)
    }

    /// Number of URLs visited this session.
    #[must_use]
    pub fn visited_count(&self) -> usize {
        self.lock_visited().len()
    }

    fn lock_visited(&self) -> MutexGuard<'_, HashSet<String>> {
        self.visited.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Linear backoff: `base + (attempt + 1)` seconds, with `attempt` 0-indexed.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base + Duration::from_secs(u64::from(attempt) + 1)
}

/// Splits reqwest failures into transport-level errors and everything else.
fn is_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout()
        || error.is_connect()
        || error.is_request()
        || error.is_body()
        || error.is_decode()
        || error.is_redirect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_crawler() -> Crawler {
        Crawler::new("https://example.com/docs", CrawlOptions::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_base_url() {
        let result = Crawler::new("not a url", CrawlOptions::default());
        assert!(matches!(result, Err(CrawlError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn test_new_rejects_invalid_rate() {
        let options = CrawlOptions {
            requests_per_second: 0.0,
            ..CrawlOptions::default()
        };
        let result = Crawler::new("https://example.com/", options);
        assert!(matches!(result, Err(CrawlError::RateLimit(_))));
    }

    #[test]
    fn test_domain_from_base_url() {
        let crawler = test_crawler();
        assert_eq!(crawler.domain(), "example.com");
    }

    #[tokio::test]
    async fn test_fetch_before_start_fails_fast() {
        let crawler = test_crawler();
        let result = crawler
            .fetch_page("https://example.com/docs/page", 3, DEFAULT_BASE_DELAY)
            .await;
        assert!(matches!(result, Err(CrawlError::SessionNotStarted(_))));
    }

    #[tokio::test]
    async fn test_fetch_after_stop_fails_fast() {
        let crawler = test_crawler();
        crawler.start();
        crawler.stop();

        let result = crawler
            .fetch_page("https://example.com/docs/page", 3, DEFAULT_BASE_DELAY)
            .await;
        assert!(matches!(result, Err(CrawlError::SessionNotStarted(_))));
    }

    #[test]
    fn test_stop_idempotent_without_start() {
        let crawler = test_crawler();
        crawler.stop();
        crawler.stop();
        assert!(!crawler.session().is_open());
    }

    #[test]
    fn test_is_valid_url_prefix_match() {
        let crawler = test_crawler();
        assert!(crawler.is_valid_url("https://example.com/docs/page"));
        assert!(!crawler.is_valid_url("https://example.com/blog/post"));
        assert!(!crawler.is_valid_url("https://other.com/docs/page"));
    }

    #[test]
    fn test_normalize_url_against_base() {
        let crawler = Crawler::new("https://example.com/docs/", CrawlOptions::default()).unwrap();
        assert_eq!(
            crawler.normalize_url("page.html", None).unwrap(),
            "https://example.com/docs/page.html"
        );
        assert_eq!(
            crawler.normalize_url("/root.html", None).unwrap(),
            "https://example.com/root.html"
        );
        assert_eq!(
            crawler
                .normalize_url("https://other.com/abs", None)
                .unwrap(),
            "https://other.com/abs"
        );
    }

    #[test]
    fn test_normalize_url_with_override_base() {
        let crawler = test_crawler();
        let other = Url::parse("https://mirror.example.net/archive/").unwrap();
        assert_eq!(
            crawler.normalize_url("item", Some(&other)).unwrap(),
            "https://mirror.example.net/archive/item"
        );
    }

    #[test]
    fn test_extract_relative_path() {
        assert_eq!(
            Crawler::extract_relative_path("https://example.com/a/b/"),
            "a/b"
        );
        assert_eq!(Crawler::extract_relative_path("https://example.com/"), "");
        assert_eq!(Crawler::extract_relative_path("not a url"), "");
    }

    #[test]
    fn test_visited_set_grows_monotonically() {
        let crawler = test_crawler();
        assert!(!crawler.is_visited("https://example.com/docs/a"));
        assert!(crawler.mark_visited("https://example.com/docs/a"));
        assert!(!crawler.mark_visited("https://example.com/docs/a"));
        assert!(crawler.is_visited("https://example.com/docs/a"));
        assert_eq!(crawler.visited_count(), 1);
    }

    #[test]
    fn test_backoff_delay_is_linear() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(3));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(4));
    }
}
