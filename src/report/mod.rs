//! Error tracking and progress reporting for pipeline components.
//!
//! Trackers are plain values constructed by the component that uses them and
//! exposed through accessors; there is no process-wide registry, so tests
//! stay hermetic. [`ErrorTracker`] counts failures by [`ErrorKind`] and emits
//! a structured `tracing` event per failure; [`ProgressTracker`] wraps an
//! `indicatif` bar with an update cadence.
//!
//! # Example
//!
//! ```
//! use fetchkit::report::{ErrorKind, ErrorTracker};
//!
//! let tracker = ErrorTracker::new();
//! tracker.record(ErrorKind::Network, "connection reset by peer");
//! assert_eq!(tracker.count(ErrorKind::Network), 1);
//! assert_eq!(tracker.summary().total, 1);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

/// Classification of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Non-200 HTTP response.
    Http,
    /// Transport-level failure (DNS, connect, timeout, mid-stream drop).
    Network,
    /// Anything that fits no other bucket.
    Unexpected,
    /// Waiting behind the rate limiter exceeded its bound.
    RateLimit,
    /// Storage write failure.
    Persistence,
}

impl ErrorKind {
    /// Returns the wire name used in log output and summaries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http_error",
            Self::Network => "network_error",
            Self::Unexpected => "unexpected_error",
            Self::RateLimit => "rate_limit_error",
            Self::Persistence => "persistence_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind failure counts captured by an [`ErrorTracker`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorSummary {
    /// Total failures recorded across all kinds.
    pub total: u64,
    /// Failure count per kind; kinds with zero failures are absent.
    pub by_kind: HashMap<ErrorKind, u64>,
}

/// Counts failures per kind and emits a structured warning per failure.
///
/// One tracker per component instance; components expose theirs through an
/// accessor so callers can read the summary after a run.
#[derive(Debug, Default)]
pub struct ErrorTracker {
    counts: Mutex<HashMap<ErrorKind, u64>>,
}

impl ErrorTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure.
    pub fn record(&self, kind: ErrorKind, message: impl fmt::Display) {
        warn!(kind = kind.as_str(), "{message}");
        self.bump(kind);
    }

    /// Records a failure observed on a specific attempt (1-indexed).
    pub fn record_attempt(&self, kind: ErrorKind, message: impl fmt::Display, attempt: u32) {
        warn!(kind = kind.as_str(), attempt, "{message}");
        self.bump(kind);
    }

    /// Returns the failure count for one kind.
    #[must_use]
    pub fn count(&self, kind: ErrorKind) -> u64 {
        self.lock_counts().get(&kind).copied().unwrap_or(0)
    }

    /// Returns the total failure count across all kinds.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.lock_counts().values().sum()
    }

    /// Returns a snapshot of the per-kind counts.
    #[must_use]
    pub fn summary(&self) -> ErrorSummary {
        let by_kind = self.lock_counts().clone();
        ErrorSummary {
            total: by_kind.values().sum(),
            by_kind,
        }
    }

    fn bump(&self, kind: ErrorKind) {
        *self.lock_counts().entry(kind).or_insert(0) += 1;
    }

    fn lock_counts(&self) -> std::sync::MutexGuard<'_, HashMap<ErrorKind, u64>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Progress reporter with an update cadence.
///
/// Wraps an `indicatif` bar; the position advances on every update, but the
/// message/log line refreshes only at the cadence, on an explicit zero-step
/// update, or on completion. Library components use the hidden variant so
/// nothing draws unless the binary opts in.
pub struct ProgressTracker {
    bar: ProgressBar,
    total: u64,
    update_every: u64,
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("position", &self.bar.position())
            .field("total", &self.total)
            .field("update_every", &self.update_every)
            .finish()
    }
}

impl ProgressTracker {
    /// Creates a tracker that draws to stderr.
    #[must_use]
    pub fn new(total: u64, update_every: u64) -> Self {
        Self::with_bar(ProgressBar::new(total), total, update_every)
    }

    /// Creates a tracker that renders nowhere (library callers and tests).
    #[must_use]
    pub fn hidden(total: u64, update_every: u64) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total);
        Self::with_bar(bar, total, update_every)
    }

    fn with_bar(bar: ProgressBar, total: u64, update_every: u64) -> Self {
        bar.set_style(
            ProgressStyle::with_template("{pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self {
            bar,
            total,
            update_every: update_every.max(1),
        }
    }

    /// Advances the position by `increment`.
    ///
    /// A zero increment forces a refresh without moving the position (used
    /// for end-of-run status messages).
    pub fn update(&self, increment: u64, message: Option<&str>) {
        self.bar.inc(increment);
        let position = self.bar.position();
        if increment == 0 || position % self.update_every == 0 || position >= self.total {
            if let Some(message) = message {
                self.bar.set_message(message.to_string());
            }
            debug!(position, total = self.total, "progress");
        }
    }

    /// Current position.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Total expected units.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Closes the bar with a final message.
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}
