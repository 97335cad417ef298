//! Shared User-Agent and Referer defaults for HTTP and remux traffic.
//!
//! Media origins commonly reject tool-identifying agents, so both transports
//! present the same browser UA unless the content provider supplies its own.

use url::Url;

/// Browser User-Agent sent when no provider header overrides it.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Origin-root referer for `url`: `scheme://host[:port]/`.
///
/// Returns `None` for URLs without a host (e.g. `file:` or `data:`).
#[must_use]
pub fn referer_for(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}://{host}:{port}/", url.scheme()),
        None => format!("{}://{host}/", url.scheme()),
    })
}
