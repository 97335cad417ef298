//! Remux transport: delegates to an external stream-copy process.
//!
//! The process reads the source (adaptive manifest or raw stream), copies the
//! codecs without transcoding into `<dest>.remux.part`, and reports progress
//! as `key=value` lines on its stdout. The temp file is renamed to the
//! destination only after a clean exit with non-empty output.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, RANGE, REFERER, USER_AGENT};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{PROGRESS_INTERVAL, REMUX_PART_SUFFIX};
use super::error::TransportError;
use super::filename::{extension_of, with_suffix};
use super::progress::{ProgressSample, ProgressSink, Throttle, format_elapsed};
use super::transport::{SpeedLevel, Transport, TransferJob, TransportConfig};
use crate::user_agent::{BROWSER_USER_AGENT, referer_for};

/// `out_time=HH:MM:SS.micro`
#[allow(clippy::expect_used)]
static OUT_TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+):(\d{2}):(\d{2})(?:\.\d+)?$").expect("out_time regex is valid") // Static pattern, safe to panic
});

/// Runs the stream-copy binary for manifests and as the direct fallback.
#[derive(Debug, Clone)]
pub struct RemuxTransport {
    binary: PathBuf,
    rw_timeout: Duration,
}

impl RemuxTransport {
    /// Creates a remux transport from the binary and timeout in `config`.
    #[must_use]
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            binary: config.remux_binary.clone(),
            rw_timeout: config.remux_rw_timeout,
        }
    }

    /// Full argument list for one remux of `job` into `output`.
    #[must_use]
    pub fn build_args(&self, job: &TransferJob, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-nostdin", "-loglevel", "info", "-progress", "pipe:1"]
            .into_iter()
            .map(String::from)
            .collect();

        args.extend(speed_input_args(job.speed_level).iter().map(|s| (*s).to_string()));
        args.extend([
            "-rw_timeout".to_string(),
            self.rw_timeout.as_micros().to_string(),
            "-threads".to_string(),
            "0".to_string(),
        ]);

        let (user_agent, referer, header_block) = header_args(&job.url, &job.headers);
        args.extend(["-user_agent".to_string(), user_agent]);
        if let Some(referer) = referer {
            args.extend(["-referer".to_string(), referer]);
        }
        if !header_block.is_empty() {
            args.extend(["-headers".to_string(), header_block]);
        }

        if job.manifest {
            args.extend(["-f", "hls", "-allowed_extensions", "ALL"].map(String::from));
        }
        args.extend(["-i".to_string(), job.url.clone(), "-c".to_string(), "copy".to_string()]);
        args.extend(speed_output_args(job.speed_level).iter().map(|s| (*s).to_string()));

        let format = output_format(&job.dest);
        if matches!(format, "mp4" | "mov") {
            args.extend(["-bsf:a", "aac_adtstoasc"].map(String::from));
        }
        args.extend(["-f".to_string(), format.to_string()]);
        args.push(output.to_string_lossy().into_owned());
        args
    }

    async fn run(
        &self,
        job: &TransferJob,
        part: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<(), TransportError> {
        let args = self.build_args(job, part);
        debug!(binary = %self.binary.display(), ?args, "spawning remux process");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::remux_spawn(self.binary.display().to_string(), e))?;

        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(drain_stderr(stderr)));
        let stdout = child.stdout.take();

        let status = tokio::select! {
            biased;
            () = job.cancel.cancelled() => {
                if let Err(error) = child.kill().await {
                    warn!(error = %error, "failed to kill remux process");
                }
                return Err(TransportError::canceled(&job.url));
            }
            status = async {
                if let Some(stdout) = stdout {
                    forward_progress(stdout, sink).await;
                }
                child.wait().await
            } => status.map_err(|e| TransportError::io(part, e))?,
        };

        let detail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => None,
        };
        if !status.success() {
            return Err(TransportError::remux_exit(&job.url, status.code(), detail));
        }

        let size = tokio::fs::metadata(part).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(TransportError::remux_empty_output(&job.url, part));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for RemuxTransport {
    fn name(&self) -> &'static str {
        "remux"
    }

    #[instrument(skip(self, job, sink), fields(url = %job.url, dest = %job.dest.display(), manifest = job.manifest))]
    async fn fetch(
        &self,
        job: &TransferJob,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf, TransportError> {
        if job.cancel.is_cancelled() {
            return Err(TransportError::canceled(&job.url));
        }

        let part = with_suffix(&job.dest, REMUX_PART_SUFFIX);
        if let Err(error) = self.run(job, &part, sink).await {
            remove_quietly(&part).await;
            return Err(error);
        }

        if let Err(error) = tokio::fs::rename(&part, &job.dest).await {
            remove_quietly(&part).await;
            return Err(TransportError::io(&job.dest, error));
        }

        info!(path = %job.dest.display(), "remux complete");
        Ok(job.dest.clone())
    }
}

/// Input options for `level`. Every level contains all options of the levels
/// below it.
#[must_use]
pub fn speed_input_args(level: SpeedLevel) -> Vec<&'static str> {
    let mut args = vec![
        "-http_persistent",
        "1",
        "-multiple_requests",
        "1",
        "-reconnect",
        "1",
    ];
    if level >= SpeedLevel::X2 {
        args.extend(["-reconnect_on_network_error", "1"]);
    }
    if level >= SpeedLevel::X4 {
        args.extend([
            "-http_seekable",
            "0",
            "-fflags",
            "+genpts+igndts",
            "-reconnect_streamed",
            "1",
            "-reconnect_delay_max",
            "5",
        ]);
    }
    if level >= SpeedLevel::X8 {
        args.extend(["-thread_queue_size", "2048"]);
    }
    args
}

/// Output options for `level`, placed after `-i`.
#[must_use]
pub fn speed_output_args(level: SpeedLevel) -> Vec<&'static str> {
    if level >= SpeedLevel::X8 {
        vec!["-max_muxing_queue_size", "9999"]
    } else {
        Vec::new()
    }
}

/// Container format for the destination's extension (mp4 when unknown).
#[must_use]
pub fn output_format(dest: &Path) -> &'static str {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match extension_of(&name).as_deref() {
        Some("mkv") => "matroska",
        Some("ts") => "mpegts",
        Some("mov") => "mov",
        Some("webm") => "webm",
        Some("m4a") => "ipod",
        _ => "mp4",
    }
}

/// Splits provider headers into the User-Agent, Referer and the remaining
/// `Name: Value\r\n` block. `Range` is never forwarded.
fn header_args(url: &str, headers: &HeaderMap) -> (String, Option<String>, String) {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| BROWSER_USER_AGENT.to_string(), str::to_string);
    let referer = headers
        .get(REFERER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| Url::parse(url).ok().as_ref().and_then(referer_for));

    let mut block = String::new();
    for (name, value) in headers {
        if name == USER_AGENT || name == REFERER || name == RANGE {
            continue;
        }
        let Ok(value) = value.to_str() else { continue };
        block.push_str(name.as_str());
        block.push_str(": ");
        block.push_str(value);
        block.push_str("\r\n");
    }
    (user_agent, referer, block)
}

/// Parses one line of the `-progress` channel.
#[must_use]
pub fn parse_progress_line(line: &str) -> Option<ProgressSample> {
    let (key, value) = line.trim().split_once('=')?;
    let value = value.trim();
    match key {
        // out_time_ms carries microseconds as well.
        "out_time_us" | "out_time_ms" => value
            .parse::<u64>()
            .ok()
            .map(|micros| ProgressSample::Elapsed(micros / 1_000_000)),
        "out_time" => {
            let caps = OUT_TIME_PATTERN.captures(value)?;
            let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
            Some(ProgressSample::Elapsed(part(1)? * 3600 + part(2)? * 60 + part(3)?))
        }
        "speed" if !value.is_empty() && value != "N/A" => {
            Some(ProgressSample::Speed(value.to_string()))
        }
        _ => None,
    }
}

/// Reads progress lines, forwarding elapsed time at most once per interval and
/// speed samples immediately.
async fn forward_progress<R>(stdout: R, sink: &dyn ProgressSink)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    let mut throttle = Throttle::new(PROGRESS_INTERVAL);
    let mut last_elapsed = 0u64;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                debug!(error = %error, "remux progress channel closed");
                break;
            }
        };
        match parse_progress_line(&line) {
            Some(ProgressSample::Elapsed(seconds)) => {
                // Time never goes backwards for observers.
                last_elapsed = last_elapsed.max(seconds);
                if throttle.ready(Instant::now()) {
                    sink.on_progress(&format_elapsed(last_elapsed));
                }
            }
            Some(ProgressSample::Speed(speed)) => sink.on_speed(&speed),
            None => {}
        }
    }
}

/// Logs stderr at debug level and keeps the last non-empty line as the
/// failure detail.
async fn drain_stderr<R>(stderr: R) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    let mut last = None;
    while let Ok(Some(line)) = lines.next_line().await {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        debug!(target: "mediafetch_core::remux", "{trimmed}");
        last = Some(trimmed.to_string());
    }
    last
}

async fn remove_quietly(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await
        && error.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %error, "failed to remove remux temp file");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use reqwest::header::{COOKIE, HeaderValue};
    use tokio_util::sync::CancellationToken;

    fn job(url: &str, dest: &str, manifest: bool, level: SpeedLevel, headers: HeaderMap) -> TransferJob {
        TransferJob {
            url: url.to_string(),
            dest: PathBuf::from(dest),
            headers,
            manifest,
            speed_level: level,
            cancel: CancellationToken::new(),
        }
    }

    fn position(args: &[String], flag: &str) -> usize {
        args.iter().position(|a| a == flag).unwrap()
    }

    #[test]
    fn test_speed_profiles_are_strict_supersets() {
        for pair in SpeedLevel::ALL.windows(2) {
            let lower = speed_input_args(pair[0]);
            let higher = speed_input_args(pair[1]);
            assert!(higher.len() > lower.len(), "{:?} adds nothing over {:?}", pair[1], pair[0]);
            assert_eq!(&higher[..lower.len()], lower.as_slice());
        }
        assert!(speed_output_args(SpeedLevel::X4).is_empty());
        assert_eq!(speed_output_args(SpeedLevel::X8), vec!["-max_muxing_queue_size", "9999"]);
    }

    #[test]
    fn test_every_speed_profile_reconnects() {
        for level in SpeedLevel::ALL {
            let args = speed_input_args(level);
            let reconnect = args.iter().position(|a| *a == "-reconnect").unwrap();
            assert_eq!(args[reconnect + 1], "1", "{level}");
        }
        assert!(speed_input_args(SpeedLevel::X2).contains(&"-reconnect_on_network_error"));
        assert!(!speed_input_args(SpeedLevel::X1).contains(&"-reconnect_on_network_error"));
    }

    #[test]
    fn test_build_args_manifest_layout() {
        let transport = RemuxTransport::new(&TransportConfig::default());
        let job = job(
            "https://cdn.test/hls/index.m3u8",
            "/out/Show 01x02.mp4",
            true,
            SpeedLevel::X1,
            HeaderMap::new(),
        );
        let args = transport.build_args(&job, Path::new("/out/Show 01x02.mp4.remux.part"));

        assert_eq!(&args[..6], &["-y", "-nostdin", "-loglevel", "info", "-progress", "pipe:1"]);
        assert!(position(&args, "hls") < position(&args, "-i"));
        assert_eq!(args[position(&args, "-i") + 1], "https://cdn.test/hls/index.m3u8");
        assert_eq!(args[position(&args, "-c") + 1], "copy");
        assert_eq!(args[position(&args, "-rw_timeout") + 1], "10000000");
        assert_eq!(args[position(&args, "-referer") + 1], "https://cdn.test/");
        assert_eq!(args[position(&args, "-user_agent") + 1], BROWSER_USER_AGENT);
        assert!(args.contains(&"aac_adtstoasc".to_string()));
        assert_eq!(args[args.len() - 2], "mp4");
        assert_eq!(args.last().unwrap(), "/out/Show 01x02.mp4.remux.part");
        assert!(!args.contains(&"-headers".to_string()));
    }

    #[test]
    fn test_build_args_raw_stream_has_no_hls_flags() {
        let transport = RemuxTransport::new(&TransportConfig::default());
        let job = job("https://cdn.test/a.mkv", "/out/a.mkv", false, SpeedLevel::X8, HeaderMap::new());
        let args = transport.build_args(&job, Path::new("/out/a.mkv.remux.part"));

        assert!(!args.contains(&"hls".to_string()));
        assert!(!args.contains(&"aac_adtstoasc".to_string()));
        assert!(position(&args, "-thread_queue_size") < position(&args, "-i"));
        assert!(position(&args, "-max_muxing_queue_size") > position(&args, "-i"));
        assert_eq!(args[args.len() - 2], "matroska");
    }

    #[test]
    fn test_build_args_header_overrides_and_block() {
        let transport = RemuxTransport::new(&TransportConfig::default());
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("ProviderUA/1.0"));
        headers.insert(REFERER, HeaderValue::from_static("https://site.test/watch/1"));
        headers.insert(COOKIE, HeaderValue::from_static("session=abc"));
        headers.insert(RANGE, HeaderValue::from_static("bytes=0-"));
        let job = job("https://cdn.test/a.mp4", "/out/a.mp4", false, SpeedLevel::X1, headers);
        let args = transport.build_args(&job, Path::new("/out/a.mp4.remux.part"));

        assert_eq!(args[position(&args, "-user_agent") + 1], "ProviderUA/1.0");
        assert_eq!(args[position(&args, "-referer") + 1], "https://site.test/watch/1");
        assert_eq!(args[position(&args, "-headers") + 1], "cookie: session=abc\r\n");
    }

    #[test]
    fn test_output_format_by_extension() {
        assert_eq!(output_format(Path::new("/o/a.mp4")), "mp4");
        assert_eq!(output_format(Path::new("/o/a.MKV")), "matroska");
        assert_eq!(output_format(Path::new("/o/a.ts")), "mpegts");
        assert_eq!(output_format(Path::new("/o/noext")), "mp4");
    }

    #[test]
    fn test_parse_progress_line_time_variants() {
        assert_eq!(parse_progress_line("out_time_us=62500000"), Some(ProgressSample::Elapsed(62)));
        assert_eq!(parse_progress_line("out_time_ms=62500000"), Some(ProgressSample::Elapsed(62)));
        assert_eq!(
            parse_progress_line("out_time=01:02:03.500000"),
            Some(ProgressSample::Elapsed(3723))
        );
        assert_eq!(parse_progress_line("out_time_us=N/A"), None);
    }

    #[test]
    fn test_parse_progress_line_speed_and_noise() {
        assert_eq!(
            parse_progress_line("speed=2.51x"),
            Some(ProgressSample::Speed("2.51x".to_string()))
        );
        assert_eq!(parse_progress_line("speed=N/A"), None);
        assert_eq!(parse_progress_line("progress=continue"), None);
        assert_eq!(parse_progress_line("garbage"), None);
    }
}
