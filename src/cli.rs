//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use mediafetch_core::SpeedLevel;

/// Download media files and streams with per-source queueing.
///
/// Each URL becomes one queued download. Direct file URLs are fetched over
/// HTTP (in parallel byte ranges when the server allows it); playlist
/// manifests and failed direct transfers are stream-copied through ffmpeg.
#[derive(Parser, Debug)]
#[command(name = "mediafetch")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download (reads stdin when omitted and stdin is piped)
    pub urls: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Directory downloads are written to [default: current directory]
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Remux speed level: 1, 2, 4 or 8 [default: 2]
    #[arg(short = 's', long)]
    pub speed_level: Option<SpeedLevel>,

    /// Quality requested from providers [default: 720p]
    #[arg(long)]
    pub quality: Option<String>,

    /// Extra request header as "Name: Value" (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(HeaderName, HeaderValue)>,

    /// Parallel byte ranges for large direct downloads (1-32, 1 disables chunking) [default: 8]
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub chunk_count: Option<u8>,

    /// Size in bytes above which direct downloads are chunked [default: 10000000]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub chunk_threshold: Option<u64>,

    /// Connection timeout in seconds (1-3600) [default: 30]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub connect_timeout: Option<u64>,

    /// Path or name of the ffmpeg binary used for stream copies [default: ffmpeg]
    #[arg(long)]
    pub remux_binary: Option<PathBuf>,

    /// Config file to load instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print one JSON line per item when all downloads settle
    #[arg(long)]
    pub json: bool,
}

impl Args {
    /// Collects the `--header` values into a header map.
    #[must_use]
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            map.append(name.clone(), value.clone());
        }
        map
    }
}

/// Parses `Name: Value` into a header pair.
fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected \"Name: Value\", got '{raw}'"))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|e| format!("invalid header name '{}': {e}", name.trim()))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|e| format!("invalid header value for '{name}': {e}"))?;
    Ok((name, value))
}
