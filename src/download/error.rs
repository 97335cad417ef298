//! Error types for the download module.
//!
//! This module defines structured errors for probing, transferring and
//! verifying downloads. Every variant carries the URL or path it concerns so
//! the message shown next to a failed item is self-explanatory.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while moving bytes from an origin to disk.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The transfer finished but produced no bytes.
    #[error("empty body downloading {url}")]
    EmptyBody {
        /// The URL whose body was empty.
        url: String,
    },

    /// File system error during download (create file, write, rename, etc.)
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

    /// One range of a chunked transfer failed.
    #[error("chunk {index} of {url} failed: {reason}")]
    ChunkFailed {
        /// The URL being chunked.
        url: String,
        /// Zero-based chunk index.
        index: usize,
        /// What went wrong with the chunk.
        reason: String,
    },

    /// A chunk returned a different number of bytes than its range covers.
    #[error("chunk {index} of {url}: expected {expected_bytes} bytes, got {actual_bytes}")]
    ChunkLength {
        /// The URL being chunked.
        url: String,
        /// Zero-based chunk index.
        index: usize,
        /// Length of the requested range.
        expected_bytes: u64,
        /// Bytes actually received.
        actual_bytes: u64,
    },

    /// The remux binary could not be started.
    #[error("failed to start remux process {binary}: {source}")]
    RemuxSpawn {
        /// Binary that was invoked.
        binary: String,
        /// The underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The remux process exited unsuccessfully.
    #[error("remux of {url} failed (exit={code:?}){}", detail_suffix(.detail))]
    RemuxExit {
        /// Input URL of the remux.
        url: String,
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
        /// Last diagnostic line printed by the process, if any.
        detail: Option<String>,
    },

    /// The remux process exited cleanly but wrote nothing.
    #[error("remux of {url} produced an empty file at {path}")]
    RemuxEmptyOutput {
        /// Input URL of the remux.
        url: String,
        /// Output path that was empty or missing.
        path: PathBuf,
    },

    /// The owning download was canceled while the transfer was in flight.
    #[error("transfer of {url} canceled")]
    Canceled {
        /// The URL whose transfer was abandoned.
        url: String,
    },
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

impl TransportError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an empty-body error.
    pub fn empty_body(url: impl Into<String>) -> Self {
        Self::EmptyBody { url: url.into() }
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

    /// Creates a chunk failure error.
    pub fn chunk_failed(url: impl Into<String>, index: usize, reason: impl Into<String>) -> Self {
        Self::ChunkFailed {
            url: url.into(),
            index,
            reason: reason.into(),
        }
    }

    /// Creates a chunk length mismatch error.
    pub fn chunk_length(
        url: impl Into<String>,
        index: usize,
        expected_bytes: u64,
        actual_bytes: u64,
    ) -> Self {
        Self::ChunkLength {
            url: url.into(),
            index,
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates a remux spawn error.
    pub fn remux_spawn(binary: impl Into<String>, source: std::io::Error) -> Self {
        Self::RemuxSpawn {
            binary: binary.into(),
            source,
        }
    }

    /// Creates a remux exit error.
    pub fn remux_exit(url: impl Into<String>, code: Option<i32>, detail: Option<String>) -> Self {
        Self::RemuxExit {
            url: url.into(),
            code,
            detail,
        }
    }

    /// Creates a remux empty-output error.
    pub fn remux_empty_output(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::RemuxEmptyOutput {
            url: url.into(),
            path: path.into(),
        }
    }

    /// Creates a cancellation error.
    pub fn canceled(url: impl Into<String>) -> Self {
        Self::Canceled { url: url.into() }
    }

    /// Returns true if the transfer stopped because its item was canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled { .. })
    }
}

/// Errors raised while classifying a URL. Never fatal: the probe falls back
/// to "not a manifest".
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe request could not be completed.
    #[error("probe of {url} failed: {source}")]
    Network {
        /// The probed URL.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The probe request returned a non-success status.
    #[error("probe of {url} returned HTTP {status}")]
    Status {
        /// The probed URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },
}

/// Post-transfer verification failures.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// The transport reported success but the file is not there.
    #[error("file not found after download: {path}")]
    Missing {
        /// Expected output path.
        path: PathBuf,
    },

    /// The file exists but has no content.
    #[error("file is empty after download: {path}")]
    Empty {
        /// Expected output path.
        path: PathBuf,
    },

    /// The file could not be inspected.
    #[error("cannot inspect {path}: {source}")]
    Io {
        /// Expected output path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display() {
        let error = TransportError::http_status("https://cdn.example.com/a.mp4", 403);
        let msg = error.to_string();
        assert!(msg.contains("403"), "Expected '403' in: {msg}");
        assert!(msg.contains("https://cdn.example.com/a.mp4"));
    }

    #[test]
    fn test_chunk_failed_display_names_index() {
        let error = TransportError::chunk_failed("https://cdn.example.com/a.mp4", 3, "HTTP 500");
        let msg = error.to_string();
        assert!(msg.contains("chunk 3"), "Expected chunk index in: {msg}");
        assert!(msg.contains("HTTP 500"));
    }

    #[test]
    fn test_remux_exit_display_with_and_without_detail() {
        let with_detail = TransportError::remux_exit(
            "https://cdn.example.com/index.m3u8",
            Some(1),
            Some("Server returned 403 Forbidden".to_string()),
        );
        let msg = with_detail.to_string();
        assert!(msg.contains("exit=Some(1)"), "{msg}");
        assert!(msg.ends_with("Server returned 403 Forbidden"), "{msg}");

        let bare = TransportError::remux_exit("https://cdn.example.com/index.m3u8", None, None);
        assert!(bare.to_string().ends_with("(exit=None)"));
    }

    #[test]
    fn test_canceled_is_canceled() {
        assert!(TransportError::canceled("https://x.test/a").is_canceled());
        assert!(!TransportError::empty_body("https://x.test/a").is_canceled());
    }

    #[test]
    fn test_verification_error_display() {
        let error = VerificationError::Empty {
            path: PathBuf::from("/downloads/Movie (2020).mp4"),
        };
        assert!(error.to_string().contains("Movie (2020).mp4"));
    }
}
