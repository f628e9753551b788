//! Request-rate limiting for outbound requests.
//!
//! This module provides the [`RateLimiter`] struct which spaces granted
//! acquisitions at least `1/rate` seconds apart, independent of how many
//! tasks contend for it.
//!
//! # Overview
//!
//! All callers share one limiter instance. The last-grant timestamp lives
//! behind a single async mutex and the pre-grant wait happens while the lock
//! is held, so concurrent callers serialize into a strict sequence of grants
//! with the configured spacing between each pair. There is no ordering
//! guarantee among waiters beyond the fairness of the underlying lock, but a
//! caller parked longer than the wait bound gets a [`RateError::Timeout`]
//! rather than a silent hang.
//!
//! # Example
//!
//! ```no_run
//! use fetchkit::limit::RateLimiter;
//!
//! # async fn example() -> Result<(), fetchkit::limit::RateError> {
//! // At most two requests per second.
//! let limiter = RateLimiter::new(2.0)?;
//!
//! limiter.acquire().await?; // first grant is immediate
//! limiter.acquire().await?; // waits ~500ms
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Default bound on how long a caller may be parked behind the limiter.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from rate limiter construction and acquisition.
#[derive(Debug, Error)]
pub enum RateError {
    /// The configured rate is not a positive, finite number.
    #[error("invalid request rate {value}: must be a positive, finite requests-per-second value")]
    InvalidRate {
        /// The rejected rate value.
        value: f64,
    },

    /// Waiting for a grant exceeded the configured bound.
    #[error("rate limiter wait exceeded {}s", timeout.as_secs())]
    Timeout {
        /// The bound that was exceeded.
        timeout: Duration,
    },
}

/// Serializes request issuance to at most one per fixed interval.
///
/// Designed to be shared (`Arc` or borrowed) across all tasks of one crawl
/// or download run. Mutation of the last-grant timestamp is serialized by
/// the internal mutex; each successful `acquire()` updates it exactly once.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum time between two granted acquisitions.
    min_interval: Duration,

    /// Upper bound on the time a caller may wait for a grant.
    wait_timeout: Duration,

    /// Timestamp of the last granted acquisition.
    /// `None` until the first grant, which proceeds immediately. The lock is
    /// held across the pre-grant sleep so grants are strictly serialized.
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `requests_per_second` grants per second,
    /// with the default wait bound.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::InvalidRate`] if the rate is zero, negative, or
    /// not finite.
    pub fn new(requests_per_second: f64) -> Result<Self, RateError> {
        Self::with_wait_timeout(requests_per_second, DEFAULT_WAIT_TIMEOUT)
    }

    /// Creates a limiter with an explicit wait bound.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::InvalidRate`] if the rate is zero, negative, or
    /// not finite.
    pub fn with_wait_timeout(
        requests_per_second: f64,
        wait_timeout: Duration,
    ) -> Result<Self, RateError> {
        if !requests_per_second.is_finite() || requests_per_second <= 0.0 {
            return Err(RateError::InvalidRate {
                value: requests_per_second,
            });
        }

        let min_interval = Duration::from_secs_f64(1.0 / requests_per_second);
        debug!(interval_ms = min_interval.as_millis(), "creating rate limiter");

        Ok(Self {
            min_interval,
            wait_timeout,
            last_grant: Mutex::new(None),
        })
    }

    /// Returns the minimum spacing between grants.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Returns the configured wait bound.
    #[must_use]
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Blocks until the rate limit allows the next request, then records the
    /// grant.
    ///
    /// The first acquisition proceeds immediately. Subsequent acquisitions
    /// wait out the remainder of the interval since the previous grant.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::Timeout`] if the total wait (lock contention
    /// plus interval spacing) exceeds the configured bound. The last-grant
    /// timestamp is not updated in that case.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<(), RateError> {
        let timeout = self.wait_timeout;
        match tokio::time::timeout(timeout, self.wait_for_grant()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "rate limiter wait timed out");
                Err(RateError::Timeout { timeout })
            }
        }
    }

    async fn wait_for_grant(&self) {
        let mut last_grant = self.last_grant.lock().await;

        if let Some(last) = *last_grant {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis(), "spacing next grant");
                tokio::time::sleep(wait).await;
            }
        } else {
            debug!("first grant - no delay");
        }

        *last_grant = Some(Instant::now());
    }
}
