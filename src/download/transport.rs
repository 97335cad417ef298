//! Transport contract, per-attempt job description and tuning knobs.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CHUNK_COUNT, DEFAULT_CHUNK_THRESHOLD_BYTES, DEFAULT_REMUX_BINARY,
    REMUX_RW_TIMEOUT_MICROS, WRITE_BUFFER_SIZE,
};
use super::error::TransportError;
use super::progress::ProgressSink;

/// Remux reconnection aggressiveness. Each level adds flags on top of the
/// previous one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedLevel {
    /// Persistent connections with reconnect on failure.
    X1,
    /// Adds reconnect on network errors.
    #[default]
    X2,
    /// Adds streamed reconnects and timestamp tolerance.
    X4,
    /// Adds larger internal queues.
    X8,
}

impl SpeedLevel {
    /// All levels, lowest first.
    pub const ALL: [Self; 4] = [Self::X1, Self::X2, Self::X4, Self::X8];

    /// Numeric multiplier (1, 2, 4 or 8).
    #[must_use]
    pub fn multiplier(self) -> u8 {
        match self {
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
            Self::X8 => 8,
        }
    }
}

impl fmt::Display for SpeedLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.multiplier())
    }
}

impl FromStr for SpeedLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_ascii_lowercase();
        let digits = trimmed.strip_prefix('x').unwrap_or(&trimmed);
        match digits {
            "1" => Ok(Self::X1),
            "2" => Ok(Self::X2),
            "4" => Ok(Self::X4),
            "8" => Ok(Self::X8),
            _ => Err(format!("invalid speed level '{s}' (expected 1, 2, 4 or 8)")),
        }
    }
}

/// Tuning shared by the HTTP client and both transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Bound on connection establishment. Reads are unbounded.
    pub connect_timeout: Duration,
    /// Number of parallel ranges for chunked transfers.
    pub chunk_count: usize,
    /// Resources strictly larger than this are chunked when ranges are supported.
    pub chunk_threshold_bytes: u64,
    /// Write buffer for streamed copies.
    pub write_buffer_size: usize,
    /// Stream-copy binary, looked up on `PATH` when not absolute.
    pub remux_binary: PathBuf,
    /// Remux network I/O timeout.
    pub remux_rw_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            chunk_count: DEFAULT_CHUNK_COUNT,
            chunk_threshold_bytes: DEFAULT_CHUNK_THRESHOLD_BYTES,
            write_buffer_size: WRITE_BUFFER_SIZE,
            remux_binary: PathBuf::from(DEFAULT_REMUX_BINARY),
            remux_rw_timeout: Duration::from_micros(REMUX_RW_TIMEOUT_MICROS),
        }
    }
}

/// One transfer attempt, with its destination already resolved.
#[derive(Debug, Clone)]
pub struct TransferJob {
    /// Resolved source URL.
    pub url: String,
    /// Final destination. Transports write to a suffixed temp file next to it
    /// and rename on success.
    pub dest: PathBuf,
    /// Request headers supplied by the content provider.
    pub headers: HeaderMap,
    /// Whether the source was classified as an adaptive manifest.
    pub manifest: bool,
    /// Remux tuning profile.
    pub speed_level: SpeedLevel,
    /// Fires when the owning item is canceled.
    pub cancel: CancellationToken,
}

/// A strategy for moving one resource to disk.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Performs a single attempt and returns the final path on success.
    ///
    /// Implementations never leave their temp files behind on failure and
    /// return [`TransportError::Canceled`] once `job.cancel` fires.
    async fn fetch(
        &self,
        job: &TransferJob,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf, TransportError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_level_from_str() {
        assert_eq!("1".parse::<SpeedLevel>().unwrap(), SpeedLevel::X1);
        assert_eq!("x4".parse::<SpeedLevel>().unwrap(), SpeedLevel::X4);
        assert_eq!(" X8 ".parse::<SpeedLevel>().unwrap(), SpeedLevel::X8);
        assert!("3".parse::<SpeedLevel>().is_err());
    }

    #[test]
    fn test_speed_level_display_roundtrip() {
        for level in SpeedLevel::ALL {
            assert_eq!(level.to_string().parse::<SpeedLevel>().unwrap(), level);
        }
    }

    #[test]
    fn test_default_speed_level_is_x2() {
        assert_eq!(SpeedLevel::default(), SpeedLevel::X2);
    }

    #[test]
    fn test_transport_config_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.chunk_count, 8);
        assert_eq!(config.chunk_threshold_bytes, 10_000_000);
        assert_eq!(config.write_buffer_size, 1024 * 1024);
        assert_eq!(config.remux_binary, PathBuf::from("ffmpeg"));
        assert_eq!(config.remux_rw_timeout.as_micros(), 10_000_000);
    }
}
