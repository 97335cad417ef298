//! Constants for the download module (timeouts, chunking, buffers).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
///
/// Reads are deliberately unbounded: media transfers may stream for hours.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default number of parallel byte ranges for chunked direct transfers.
pub const DEFAULT_CHUNK_COUNT: usize = 8;

/// Files larger than this (in bytes) are fetched in parallel chunks when the
/// origin advertises range support.
pub const DEFAULT_CHUNK_THRESHOLD_BYTES: u64 = 10_000_000;

/// Write buffer for streamed copies (1 MiB).
pub const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// Number of leading bytes requested when sniffing for a manifest signature.
pub const PROBE_SNIFF_BYTES: usize = 2048;

/// Minimum interval between progress/speed publications for one transfer.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Default remux binary name, resolved through `PATH`.
pub const DEFAULT_REMUX_BINARY: &str = "ffmpeg";

/// Remux network I/O timeout in microseconds (10 seconds).
pub const REMUX_RW_TIMEOUT_MICROS: u64 = 10_000_000;

/// Suffix for the in-progress file of a direct transfer.
pub const PART_SUFFIX: &str = ".part";

/// Suffix for the per-transfer chunk directory.
pub const CHUNK_DIR_SUFFIX: &str = ".chunks";

/// Suffix for the in-progress file of a remux transfer.
pub const REMUX_PART_SUFFIX: &str = ".remux.part";

/// Adaptive-manifest file extension.
pub const MANIFEST_EXTENSION: &str = ".m3u8";

/// Leading marker of an adaptive-streaming manifest body.
pub const MANIFEST_SIGNATURE: &str = "#EXTM3U";
