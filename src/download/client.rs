//! HTTP client wrapper shared by the probe and the direct transport.
//!
//! Connection establishment is bounded by a timeout, reads are not: a single
//! media transfer may legitimately stream for hours.

use std::time::Duration;

use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderMap, RANGE};
use reqwest::{Client, Response};
use tracing::{debug, instrument};

use super::constants::CONNECT_TIMEOUT_SECS;
use super::error::TransportError;
use crate::user_agent::BROWSER_USER_AGENT;

/// Inclusive byte range `start..=end`, rendered as `bytes=start-end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered by the range.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A range always covers at least one byte.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Value for the `Range` request header.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// What a metadata (HEAD) request revealed about a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteMetadata {
    /// `Accept-Ranges: bytes` was advertised.
    pub accepts_ranges: bool,
    /// Declared `Content-Length`, when present and parseable.
    pub content_length: Option<u64>,
}

/// HTTP client for probing and streaming media resources.
///
/// Create once and clone freely; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with the default connect timeout.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
    }

    /// Creates a client with an explicit connect timeout and no read timeout.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialized.
    pub fn with_connect_timeout(connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// Issues a HEAD request and reports range support and declared size.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` on network failure or a non-success status.
    #[instrument(level = "debug", skip(self, headers), fields(url = %url))]
    pub async fn head_metadata(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<RemoteMetadata, TransportError> {
        let response = self
            .client
            .head(url)
            .headers(without_range(headers))
            .send()
            .await
            .map_err(|e| TransportError::network(url, e))?;
        if !response.status().is_success() {
            return Err(TransportError::http_status(url, response.status().as_u16()));
        }

        let metadata = metadata_from_headers(response.headers());
        debug!(
            accepts_ranges = metadata.accepts_ranges,
            content_length = ?metadata.content_length,
            "metadata probe complete"
        );
        Ok(metadata)
    }

    /// Sends a GET with the caller's headers and an optional byte range.
    ///
    /// The status is not checked; callers decide which statuses they accept.
    ///
    /// # Errors
    ///
    /// Returns the underlying reqwest error when the request cannot be sent.
    pub async fn get(
        &self,
        url: &str,
        headers: &HeaderMap,
        range: Option<ByteRange>,
    ) -> Result<Response, reqwest::Error> {
        let mut request = self.client.get(url).headers(headers.clone());
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }
        request.send().await
    }

    /// Sends a GET and fails on anything but a 2xx status.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Network` or `TransportError::HttpStatus`.
    pub async fn get_success(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<Response, TransportError> {
        let response = self
            .get(url, headers, None)
            .await
            .map_err(|e| TransportError::network(url, e))?;
        if !response.status().is_success() {
            return Err(TransportError::http_status(url, response.status().as_u16()));
        }
        Ok(response)
    }
}

/// Copies `headers` without any `Range` entry.
#[must_use]
pub fn without_range(headers: &HeaderMap) -> HeaderMap {
    let mut cleaned = headers.clone();
    cleaned.remove(RANGE);
    cleaned
}

fn metadata_from_headers(headers: &HeaderMap) -> RemoteMetadata {
    let accepts_ranges = headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|unit| unit.trim().eq_ignore_ascii_case("bytes")));
    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    RemoteMetadata {
        accepts_ranges,
        content_length,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, USER_AGENT};

    #[test]
    fn test_byte_range_header_value_and_len() {
        let range = ByteRange { start: 0, end: 2047 };
        assert_eq!(range.header_value(), "bytes=0-2047");
        assert_eq!(range.len(), 2048);
    }

    #[test]
    fn test_metadata_from_headers_reads_ranges_and_length() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("52428800"));
        let metadata = metadata_from_headers(&headers);
        assert!(metadata.accepts_ranges);
        assert_eq!(metadata.content_length, Some(52_428_800));
    }

    #[test]
    fn test_metadata_from_headers_accept_ranges_none() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("none"));
        let metadata = metadata_from_headers(&headers);
        assert!(!metadata.accepts_ranges);
        assert_eq!(metadata.content_length, None);
    }

    #[test]
    fn test_without_range_strips_only_range() {
        let mut headers = HeaderMap::new();
        headers.insert(RANGE, HeaderValue::from_static("bytes=0-"));
        headers.insert(USER_AGENT, HeaderValue::from_static("custom"));
        let cleaned = without_range(&headers);
        assert!(!cleaned.contains_key(RANGE));
        assert!(cleaned.contains_key(USER_AGENT));
    }

    #[test]
    fn test_client_builds_with_custom_timeout() {
        assert!(HttpClient::with_connect_timeout(Duration::from_secs(5)).is_ok());
    }
}
