//! Crawl session lifecycle around a shared HTTP client.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, instrument};

/// Default total timeout for session requests.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout for session requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error returned when an operation requires an open session.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("session not started: call start() before fetching")]
pub struct SessionNotStarted;

/// Lifecycle state of the session's client handle.
#[derive(Debug)]
enum SessionState {
    Closed,
    Open(Client),
}

/// Owns the shared network-client handle and timeout policy for one crawl.
///
/// The client is created on [`start`](Self::start), shared read-only by all
/// concurrent fetches, and released on [`stop`](Self::stop). Fetching while
/// Closed fails fast with [`SessionNotStarted`] rather than going through an
/// informally-checked nullable handle. `start()` and `stop()` are both
/// idempotent; after a stop, a fresh `start()` reopens the session.
#[derive(Debug)]
pub struct Session {
    state: Mutex<SessionState>,
    timeout: Duration,
}

impl Session {
    /// Creates a closed session with the given request timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(SessionState::Closed),
            timeout,
        }
    }

    /// Opens the session, building the shared client if none exists.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[allow(clippy::expect_used)]
    #[instrument(skip(self))]
    pub fn start(&self) {
        let mut state = self.lock_state();
        if matches!(*state, SessionState::Closed) {
            let client = Client::builder()
                .timeout(self.timeout)
                .connect_timeout(CONNECT_TIMEOUT)
                .gzip(true)
                .build()
                .expect("failed to build HTTP client with static configuration");
            *state = SessionState::Open(client);
            debug!(timeout_secs = self.timeout.as_secs(), "session started");
        }
    }

    /// Closes the session, releasing the client handle.
    ///
    /// A no-op when the session is already closed.
    #[instrument(skip(self))]
    pub fn stop(&self) {
        let mut state = self.lock_state();
        if matches!(*state, SessionState::Open(_)) {
            *state = SessionState::Closed;
            debug!("session stopped");
        }
    }

    /// Returns whether the session currently holds a client handle.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(*self.lock_state(), SessionState::Open(_))
    }

    /// Returns a handle to the shared client.
    ///
    /// The handle is a cheap clone backed by the session's connection pool;
    /// the session retains exclusive ownership of creation and teardown.
    ///
    /// # Errors
    ///
    /// Returns [`SessionNotStarted`] while the session is closed.
    pub fn client(&self) -> Result<Client, SessionNotStarted> {
        match &*self.lock_state() {
            SessionState::Open(client) => Ok(client.clone()),
            SessionState::Closed => Err(SessionNotStarted),
        }
    }

    /// Returns the configured request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_closed() {
        let session = Session::new(DEFAULT_SESSION_TIMEOUT);
        assert!(!session.is_open());
        assert_eq!(session.client().unwrap_err(), SessionNotStarted);
    }

    #[test]
    fn test_start_opens_and_is_idempotent() {
        let session = Session::new(DEFAULT_SESSION_TIMEOUT);
        session.start();
        assert!(session.is_open());
        assert!(session.client().is_ok());

        session.start();
        assert!(session.is_open());
    }

    #[test]
    fn test_stop_without_handle_is_noop() {
        let session = Session::new(DEFAULT_SESSION_TIMEOUT);
        session.stop();
        session.stop();
        assert!(!session.is_open());
    }

    #[test]
    fn test_stop_then_restart() {
        let session = Session::new(DEFAULT_SESSION_TIMEOUT);
        session.start();
        session.stop();
        assert!(!session.is_open());
        assert_eq!(session.client().unwrap_err(), SessionNotStarted);

        session.start();
        assert!(session.client().is_ok());
    }

    #[test]
    fn test_timeout_accessor() {
        let session = Session::new(Duration::from_secs(5));
        assert_eq!(session.timeout(), Duration::from_secs(5));
    }
}
