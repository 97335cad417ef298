//! Transport engine: moves one resolved media URL to a file on disk.
//!
//! This module provides the probe that classifies a source, the direct HTTP
//! transport (sequential or range-chunked), the remux transport that drives
//! an external stream-copy process, and the selector that ties them together
//! with a direct-to-remux fallback.
//!
//! # Features
//!
//! - Streaming copies with a 1 MiB write buffer and no read timeout
//! - Parallel byte-range chunks for large files, merged in index order
//! - Adaptive-manifest detection by extension, `Content-Type` or signature
//! - Temp-file-then-rename promotion, never overwriting an existing file
//! - Cooperative cancellation through a `CancellationToken`
//!
//! # Example
//!
//! ```no_run
//! use mediafetch_core::download::{
//!     NullSink, SpeedLevel, TransferRequest, TransportConfig, TransportSelector,
//! };
//! use reqwest::header::HeaderMap;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let selector = TransportSelector::from_config(&TransportConfig::default())?;
//! let request = TransferRequest {
//!     url: "https://cdn.example.com/clip.mp4".to_string(),
//!     dest_dir: "./downloads".into(),
//!     file_name: "Clip.mp4".to_string(),
//!     headers: HeaderMap::new(),
//!     speed_level: SpeedLevel::X2,
//! };
//! let path = selector
//!     .transfer(&request, &CancellationToken::new(), &NullSink)
//!     .await?;
//! println!("Downloaded: {}", path.display());
//! # Ok(())
//! # }
//! ```

mod chunk;
mod client;
pub mod constants;
mod direct;
mod error;
pub mod filename;
mod probe;
mod progress;
mod remux;
mod selector;
mod transport;
mod verify;

pub use chunk::{ChunkPlan, chunk_path};
pub use client::{ByteRange, HttpClient, RemoteMetadata, without_range};
pub use direct::DirectTransport;
pub use error::{ProbeError, TransportError, VerificationError};
pub use filename::{DestinationReservations, Reservation, sanitize_filename};
pub use probe::{
    HttpProbe, TransportProbe, has_manifest_extension, has_manifest_signature,
    is_manifest_content_type,
};
pub use progress::{NullSink, ProgressSample, ProgressSink, format_elapsed, format_rate};
pub use remux::{
    RemuxTransport, output_format, parse_progress_line, speed_input_args, speed_output_args,
};
pub use selector::{TransferRequest, TransportSelector};
pub use transport::{SpeedLevel, TransferJob, Transport, TransportConfig};
pub use verify::verify_output;
