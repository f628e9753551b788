//! Filesystem persistence helpers.
//!
//! Chunked byte-stream writes, text/JSON writers routed through them,
//! line-oriented reads for input lists, and URL-to-filename flattening.
//! All operations create missing parent directories and report failures as
//! [`FileError`] with the offending path attached.

use std::path::{Path, PathBuf};

use futures_util::{Stream, StreamExt, stream};
use serde::Serialize;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, instrument};

/// Buffer size for chunked file writes.
const WRITE_BUFFER_SIZE: usize = 8192;

/// Errors from filesystem persistence operations.
#[derive(Debug, Error)]
pub enum FileError {
    /// File system error (create, write, read).
    #[error("IO error for {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Value could not be serialized to JSON.
    #[error("serialization error for {path}: {source}")]
    Serialize {
        /// The destination path of the failed write.
        path: PathBuf,
        /// The underlying serialization error.
        #[source]
        source: serde_json::Error,
    },
}

impl FileError {
    /// Creates an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a serialization error with path context.
    pub fn serialize(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Serialize {
            path: path.into(),
            source,
        }
    }
}

/// Creates the directory (and any missing parents).
///
/// # Errors
///
/// Returns [`FileError::Io`] if creation fails.
pub async fn ensure_dir(path: &Path) -> Result<(), FileError> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| FileError::io(path, e))
}

/// Creates the parent directory of a file path if it is missing.
///
/// # Errors
///
/// Returns [`FileError::Io`] if creation fails.
pub async fn ensure_parent_dir(path: &Path) -> Result<(), FileError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_dir(parent).await?;
    }
    Ok(())
}

/// Writes a stream of byte chunks to a file, creating parent directories.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// Returns [`FileError::Io`] if directory creation, the write, or the final
/// flush fails.
#[instrument(skip(chunks), fields(path = %path.display()))]
pub async fn write_chunks<S, B>(path: &Path, mut chunks: S) -> Result<u64, FileError>
where
    S: Stream<Item = B> + Unpin,
    B: AsRef<[u8]>,
{
    ensure_parent_dir(path).await?;

    let file = File::create(path)
        .await
        .map_err(|e| FileError::io(path, e))?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);

    let mut written = 0u64;
    while let Some(chunk) = chunks.next().await {
        let bytes = chunk.as_ref();
        writer
            .write_all(bytes)
            .await
            .map_err(|e| FileError::io(path, e))?;
        written += bytes.len() as u64;
    }

    writer.flush().await.map_err(|e| FileError::io(path, e))?;
    debug!(bytes = written, "wrote file");
    Ok(written)
}

/// Writes text content to a file.
///
/// # Errors
///
/// Returns [`FileError::Io`] if the write fails.
pub async fn write_text(path: &Path, content: &str) -> Result<(), FileError> {
    write_chunks(path, stream::iter([content.as_bytes()]))
        .await
        .map(|_| ())
}

/// Writes a value to a file as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`FileError::Serialize`] if the value cannot be serialized and
/// [`FileError::Io`] if the write fails.
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), FileError> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| FileError::serialize(path, e))?;
    write_chunks(path, stream::iter([json])).await.map(|_| ())
}

/// Reads a file into trimmed, non-empty lines.
///
/// # Errors
///
/// Returns [`FileError::Io`] if the file cannot be opened or read.
pub async fn read_lines(path: &Path) -> Result<Vec<String>, FileError> {
    let file = File::open(path).await.map_err(|e| FileError::io(path, e))?;
    let mut lines = BufReader::new(file).lines();

    let mut out = Vec::new();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| FileError::io(path, e))?
    {
        let line = line.trim();
        if !line.is_empty() {
            out.push(line.to_string());
        }
    }
    Ok(out)
}

/// Flattens a URL into a single filename.
///
/// The last path segment becomes the filename; the remaining path (with the
/// scheme, the given domain, and any `wp-content/` segment stripped) is
/// folded into a `_`-joined prefix.
#[must_use]
pub fn clean_filename(url: &str, domain: &str) -> String {
    let filename = url.rsplit('/').next().unwrap_or(url);
    let path = url.strip_suffix(filename).unwrap_or("");
    let path = path
        .replace("wp-content/", "")
        .replace("https://", "")
        .replace("http://", "")
        .replace(domain, "");
    let path = path.trim_start_matches('/').replace('/', "_");
    format!("{path}{filename}")
}
