//! CLI entry point for the mediafetch tool.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use mediafetch_core::download::filename::title_from_url;
use mediafetch_core::{
    DirectLinkProvider, DownloadStatus, NewDownload, Scheduler, SchedulerSettings,
    TransportConfig, TransportSelector,
};
use tracing::{debug, info, warn};
use url::Url;

mod app_config;
mod cli;

use app_config::{FileConfig, load_file_config};
use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Config is loaded before tracing so its verbosity can seed the filter.
    let file_config = load_file_config(args.config.as_deref())?.unwrap_or_default();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config verbosity > info
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => file_config
                .verbosity
                .map_or("info", app_config::VerbositySetting::filter_directive),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, ?file_config, "CLI arguments parsed");
    info!("mediafetch starting");

    // Read input: from positional args or stdin
    let input_text = if !args.urls.is_empty() {
        args.urls.join("\n")
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        info!("No input provided. Pipe URLs via stdin or pass as arguments.");
        info!("Example: echo 'https://cdn.example.com/clip.mp4' | mediafetch");
        return Ok(());
    };

    let urls = parse_urls(&input_text);
    if urls.is_empty() {
        info!("No valid URLs found in input");
        return Ok(());
    }

    let transport_config = transport_config(&args, &file_config);
    debug!(?transport_config, "transport configuration");
    let selector =
        TransportSelector::from_config(&transport_config).context("Failed to build HTTP client")?;

    let settings = scheduler_settings(&args, &file_config);
    info!(output_dir = %settings.download_dir.display(), speed_level = %settings.speed_level, "Output settings");
    let scheduler = Scheduler::with_default_naming(settings, selector);

    let provider = Arc::new(DirectLinkProvider::with_headers(args.header_map()));
    for url in &urls {
        let source_key = source_key_for(url);
        let title = title_from_url(url).unwrap_or_else(|| source_key.clone());
        let id = scheduler.enqueue(
            NewDownload::movie(title, source_key, provider.clone()).with_locator(url.as_str()),
        );
        debug!(item_id = %id, url = %url, "Enqueued URL");
    }

    let admitted = scheduler.start_all()?;
    info!(queued = urls.len(), admitted, "Downloads started");

    tokio::select! {
        () = scheduler.wait_all() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for interrupt")?;
            warn!("Interrupted, canceling downloads");
            for item in scheduler.items() {
                scheduler.cancel(item.id())?;
            }
            scheduler.wait_all().await;
        }
    }

    let items = scheduler.items();
    let mut completed = 0usize;
    let mut failed = 0usize;
    for item in &items {
        let state = item.state();
        match state.status {
            DownloadStatus::Completed => completed += 1,
            DownloadStatus::Failed => {
                failed += 1;
                warn!(
                    title = %item.title(),
                    error = state.last_error.as_deref().unwrap_or_default(),
                    "Download failed"
                );
            }
            _ => {}
        }
        if args.json {
            let line = serde_json::json!({
                "id": item.id(),
                "title": item.title(),
                "source_key": item.source_key(),
                "state": state,
            });
            println!("{line}");
        }
    }

    info!(
        completed,
        failed,
        canceled = items.len() - completed - failed,
        total = items.len(),
        "Download complete"
    );

    if failed > 0 {
        bail!("{failed} of {} downloads failed", items.len());
    }
    Ok(())
}

/// One URL per whitespace-separated token; `#` lines are comments.
fn parse_urls(input: &str) -> Vec<Url> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(str::split_whitespace)
        .filter_map(|token| match Url::parse(token) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
            _ => {
                warn!(input = %token, "Skipped unrecognized input");
                None
            }
        })
        .collect()
}

/// Host (plus explicit port) of `url`; one download runs per host at a time.
fn source_key_for(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn transport_config(args: &Args, file: &FileConfig) -> TransportConfig {
    let mut config = TransportConfig::default();
    if let Some(secs) = args.connect_timeout.or(file.connect_timeout_secs) {
        config.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(count) = args.chunk_count.map(usize::from).or(file.chunk_count) {
        config.chunk_count = count;
    }
    if let Some(threshold) = args.chunk_threshold.or(file.chunk_threshold_bytes) {
        config.chunk_threshold_bytes = threshold;
    }
    if let Some(binary) = args.remux_binary.clone().or_else(|| file.remux_binary.clone()) {
        config.remux_binary = binary;
    }
    config
}

fn scheduler_settings(args: &Args, file: &FileConfig) -> SchedulerSettings {
    let dir = args
        .output_dir
        .clone()
        .or_else(|| file.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let mut settings = SchedulerSettings::new(dir);
    if let Some(level) = args.speed_level.or(file.speed_level) {
        settings.speed_level = level;
    }
    if let Some(quality) = args.quality.clone().or_else(|| file.default_quality.clone()) {
        settings.default_quality = quality;
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediafetch_core::SpeedLevel;

    #[test]
    fn test_parse_urls_skips_comments_and_non_http() {
        let urls = parse_urls(
            "# list\nhttps://a.test/one.mp4\n\nftp://b.test/x\nnot a url\nhttp://c.test:8080/two.m3u8",
        );
        let urls: Vec<_> = urls.iter().map(Url::as_str).collect();
        assert_eq!(urls, vec!["https://a.test/one.mp4", "http://c.test:8080/two.m3u8"]);
    }

    #[test]
    fn test_source_key_includes_explicit_port() {
        let url = Url::parse("http://127.0.0.1:4000/a.mp4").unwrap();
        assert_eq!(source_key_for(&url), "127.0.0.1:4000");
        let url = Url::parse("https://cdn.test/a.mp4").unwrap();
        assert_eq!(source_key_for(&url), "cdn.test");
    }

    #[test]
    fn test_cli_flags_override_config_values() {
        let args = Args::try_parse_from(["mediafetch", "--chunk-count", "2", "-s", "8"]).unwrap();
        let file = FileConfig {
            chunk_count: Some(16),
            chunk_threshold_bytes: Some(1_000),
            speed_level: Some(SpeedLevel::X4),
            default_quality: Some("1080p".to_string()),
            ..FileConfig::default()
        };

        let config = transport_config(&args, &file);
        assert_eq!(config.chunk_count, 2);
        assert_eq!(config.chunk_threshold_bytes, 1_000);

        let settings = scheduler_settings(&args, &file);
        assert_eq!(settings.speed_level, SpeedLevel::X8);
        assert_eq!(settings.default_quality, "1080p");
        assert_eq!(settings.download_dir, PathBuf::from("."));
    }
}
