//! Content provider contract and the built-in direct-link provider.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use url::Url;

use super::error::ProviderError;
use super::item::{MediaKind, MediaUnit};

/// What a provider needs to know to resolve one unit.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Title of the owning item.
    pub title: &'a str,
    /// Movie or series.
    pub kind: MediaKind,
    /// The unit being resolved.
    pub unit: &'a MediaUnit,
    /// Requested quality.
    pub quality: &'a str,
    /// Item-level locator URL.
    pub locator: Option<&'a str>,
}

/// A resolved source URL plus the headers the origin expects.
#[derive(Debug, Clone)]
pub struct ResolvedTransfer {
    /// Direct file or manifest URL.
    pub url: String,
    /// Request headers (cookies, referer, user agent, ...).
    pub headers: HeaderMap,
}

/// Per-site collaborator that turns media units into fetchable URLs.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &str;

    /// True when the provider lays out files itself; verification is then
    /// skipped for its items.
    fn manages_own_layout(&self) -> bool {
        false
    }

    /// Resolves one unit. Called once per unit, just before its transfer.
    async fn resolve_transfer(
        &self,
        ctx: &ResolveContext<'_>,
    ) -> Result<ResolvedTransfer, ProviderError>;
}

/// Provider for URLs that already point at media: the unit's own URL wins,
/// otherwise the item's locator is used.
#[derive(Debug, Clone, Default)]
pub struct DirectLinkProvider {
    headers: HeaderMap,
}

impl DirectLinkProvider {
    /// A provider that sends no extra headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider that attaches `headers` to every transfer.
    #[must_use]
    pub fn with_headers(headers: HeaderMap) -> Self {
        Self { headers }
    }
}

#[async_trait]
impl ContentProvider for DirectLinkProvider {
    fn name(&self) -> &str {
        "direct-link"
    }

    async fn resolve_transfer(
        &self,
        ctx: &ResolveContext<'_>,
    ) -> Result<ResolvedTransfer, ProviderError> {
        let url = ctx
            .unit
            .url
            .as_deref()
            .or(ctx.locator)
            .ok_or_else(|| ProviderError::missing_url(self.name(), &ctx.unit.title))?;

        let parsed = Url::parse(url).map_err(|_| ProviderError::invalid_url(self.name(), url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProviderError::invalid_url(self.name(), url));
        }

        Ok(ResolvedTransfer {
            url: parsed.to_string(),
            headers: self.headers.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, REFERER};

    fn ctx<'a>(unit: &'a MediaUnit, locator: Option<&'a str>) -> ResolveContext<'a> {
        ResolveContext {
            title: "Clip",
            kind: MediaKind::Movie,
            unit,
            quality: "720p",
            locator,
        }
    }

    #[tokio::test]
    async fn test_unit_url_takes_precedence_over_locator() {
        let unit = MediaUnit::new("1", "1", "Clip").with_url("https://cdn.test/unit.mp4");
        let resolved = DirectLinkProvider::new()
            .resolve_transfer(&ctx(&unit, Some("https://cdn.test/item.mp4")))
            .await
            .unwrap();
        assert_eq!(resolved.url, "https://cdn.test/unit.mp4");
    }

    #[tokio::test]
    async fn test_locator_used_when_unit_has_no_url() {
        let unit = MediaUnit::new("1", "1", "Clip");
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, HeaderValue::from_static("https://site.test/"));
        let resolved = DirectLinkProvider::with_headers(headers)
            .resolve_transfer(&ctx(&unit, Some("https://cdn.test/item.mp4")))
            .await
            .unwrap();
        assert_eq!(resolved.url, "https://cdn.test/item.mp4");
        assert_eq!(resolved.headers.get(REFERER).unwrap(), "https://site.test/");
    }

    #[tokio::test]
    async fn test_missing_and_invalid_urls_are_errors() {
        let unit = MediaUnit::new("1", "1", "Clip");
        let provider = DirectLinkProvider::new();
        assert!(matches!(
            provider.resolve_transfer(&ctx(&unit, None)).await,
            Err(ProviderError::MissingUrl { .. })
        ));
        assert!(matches!(
            provider.resolve_transfer(&ctx(&unit, Some("ftp://x.test/a"))).await,
            Err(ProviderError::InvalidUrl { .. })
        ));
    }
}
