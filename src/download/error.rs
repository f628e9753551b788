//! Error types for the download module.
//!
//! Structured errors for single download attempts, providing context-rich
//! messages for debugging and failure records.

use std::path::PathBuf;

use thiserror::Error;

use crate::fsio::FileError;
use crate::report::ErrorKind;

/// Errors that can occur during one download attempt.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors,
    /// mid-stream drops).
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (anything other than 200).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while streaming to disk.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns `true` for the one status that aborts an item's retries.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 404, .. })
    }

    /// Maps the error onto the reporting taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::HttpStatus { .. } => ErrorKind::Http,
            Self::Network { .. } | Self::Timeout { .. } => ErrorKind::Network,
            Self::Io { .. } => ErrorKind::Persistence,
            Self::InvalidUrl { .. } => ErrorKind::Unexpected,
        }
    }
}

// Storage-layer failures keep their path context when crossing into the
// download taxonomy; serialization errors cannot occur on this path.
impl From<FileError> for DownloadError {
    fn from(error: FileError) -> Self {
        match error {
            FileError::Io { path, source } => Self::Io { path, source },
            FileError::Serialize { path, source } => Self::Io {
                path,
                source: std::io::Error::other(source),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display() {
        let error = DownloadError::http_status("https://example.com/file.pdf", 503);
        let msg = error.to_string();
        assert!(msg.contains("503"), "expected '503' in: {msg}");
        assert!(
            msg.contains("https://example.com/file.pdf"),
            "expected URL in: {msg}"
        );
    }

    #[test]
    fn test_timeout_display() {
        let error = DownloadError::timeout("https://example.com/file.pdf");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://example.com/file.pdf"));
    }

    #[test]
    fn test_io_display_includes_path() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::io(PathBuf::from("/tmp/out.pdf"), io_error);
        assert!(error.to_string().contains("/tmp/out.pdf"));
    }

    #[test]
    fn test_invalid_url_display() {
        let error = DownloadError::invalid_url("not-a-url");
        let msg = error.to_string();
        assert!(msg.contains("invalid URL"), "expected prefix in: {msg}");
        assert!(msg.contains("not-a-url"), "expected URL in: {msg}");
    }

    #[test]
    fn test_is_not_found_only_for_404() {
        assert!(DownloadError::http_status("u", 404).is_not_found());
        assert!(!DownloadError::http_status("u", 403).is_not_found());
        assert!(!DownloadError::timeout("u").is_not_found());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(DownloadError::http_status("u", 500).kind(), ErrorKind::Http);
        assert_eq!(DownloadError::timeout("u").kind(), ErrorKind::Network);
        assert_eq!(
            DownloadError::io("p", std::io::Error::other("boom")).kind(),
            ErrorKind::Persistence
        );
        assert_eq!(
            DownloadError::invalid_url("u").kind(),
            ErrorKind::Unexpected
        );
    }

    #[test]
    fn test_from_file_error_keeps_path() {
        let file_error = FileError::io("/tmp/x", std::io::Error::other("disk full"));
        let error: DownloadError = file_error.into();
        assert!(matches!(error, DownloadError::Io { .. }));
        assert!(error.to_string().contains("/tmp/x"));
    }
}
