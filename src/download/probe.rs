//! Classifies a source URL as an adaptive-streaming manifest or a direct file.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use tracing::{debug, instrument};
use url::Url;

use super::client::{ByteRange, HttpClient, without_range};
use super::constants::{MANIFEST_EXTENSION, MANIFEST_SIGNATURE, PROBE_SNIFF_BYTES};
use super::error::ProbeError;

/// Decides whether a URL points at an adaptive-streaming manifest.
#[async_trait]
pub trait TransportProbe: Send + Sync {
    /// Returns true for a manifest. Never fails: anything inconclusive is
    /// reported as "not a manifest".
    async fn is_manifest(&self, url: &str, headers: &HeaderMap) -> bool;
}

/// Probe that checks the URL extension, then sniffs the first bytes over HTTP.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: HttpClient,
}

impl HttpProbe {
    /// Creates a probe sharing `client`'s connection pool.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    /// Ranged read of the first bytes, inspecting `Content-Type` and the body
    /// signature.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError` when the request fails or the status is not 2xx.
    pub async fn sniff(&self, url: &str, headers: &HeaderMap) -> Result<bool, ProbeError> {
        let range = ByteRange {
            start: 0,
            end: PROBE_SNIFF_BYTES as u64 - 1,
        };
        let response = self
            .client
            .get(url, &without_range(headers), Some(range))
            .await
            .map_err(|source| ProbeError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if content_type.as_deref().is_some_and(is_manifest_content_type) {
            return Ok(true);
        }

        // Origins that ignore Range would send the whole body; stop early.
        let mut head = Vec::with_capacity(PROBE_SNIFF_BYTES);
        let mut stream = response.bytes_stream();
        while head.len() < PROBE_SNIFF_BYTES {
            match stream.next().await {
                Some(Ok(bytes)) => head.extend_from_slice(&bytes),
                Some(Err(source)) => {
                    return Err(ProbeError::Network {
                        url: url.to_string(),
                        source,
                    });
                }
                None => break,
            }
        }
        Ok(has_manifest_signature(&head))
    }
}

#[async_trait]
impl TransportProbe for HttpProbe {
    #[instrument(level = "debug", skip(self, headers), fields(url = %url))]
    async fn is_manifest(&self, url: &str, headers: &HeaderMap) -> bool {
        if has_manifest_extension(url) {
            debug!("manifest detected by extension");
            return true;
        }
        match self.sniff(url, headers).await {
            Ok(is_manifest) => {
                debug!(is_manifest, "probe complete");
                is_manifest
            }
            Err(error) => {
                debug!(error = %error, "probe failed, assuming direct file");
                false
            }
        }
    }
}

/// True when the URL path (query and fragment excluded) ends in `.m3u8`.
#[must_use]
pub fn has_manifest_extension(url: &str) -> bool {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    path.to_ascii_lowercase().ends_with(MANIFEST_EXTENSION)
}

/// True for any `mpegurl` media type (`application/vnd.apple.mpegurl`,
/// `application/x-mpegURL`, `audio/mpegurl`, ...).
#[must_use]
pub fn is_manifest_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("mpegurl")
}

/// True when the body starts with `#EXTM3U`, ignoring a UTF-8 BOM and
/// leading whitespace.
#[must_use]
pub fn has_manifest_signature(head: &[u8]) -> bool {
    let head = head.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(head);
    let start = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(head.len());
    head[start..].starts_with(MANIFEST_SIGNATURE.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_manifest_extension_ignores_query() {
        assert!(has_manifest_extension("https://cdn.test/live/index.m3u8?token=abc"));
        assert!(has_manifest_extension("https://cdn.test/live/INDEX.M3U8"));
        assert!(!has_manifest_extension("https://cdn.test/video.mp4"));
        assert!(!has_manifest_extension("https://cdn.test/video.mp4?next=a.m3u8"));
    }

    #[test]
    fn test_has_manifest_extension_unparseable_url() {
        assert!(has_manifest_extension("not a url/playlist.m3u8?x=1"));
        assert!(!has_manifest_extension("not a url"));
    }

    #[test]
    fn test_is_manifest_content_type_variants() {
        assert!(is_manifest_content_type("application/vnd.apple.mpegurl"));
        assert!(is_manifest_content_type("application/x-mpegURL; charset=utf-8"));
        assert!(is_manifest_content_type("AUDIO/MPEGURL"));
        assert!(!is_manifest_content_type("video/mp4"));
    }

    #[test]
    fn test_has_manifest_signature() {
        assert!(has_manifest_signature(b"#EXTM3U\n#EXT-X-VERSION:3\n"));
        assert!(has_manifest_signature(b"\xEF\xBB\xBF  #EXTM3U\n"));
        assert!(!has_manifest_signature(b"\x00\x00\x00\x18ftypmp42"));
        assert!(!has_manifest_signature(b""));
    }
}
