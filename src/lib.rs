//! mediafetch Core Library
//!
//! Download orchestration and transport engine: a queue of download items
//! with per-source admission control, and a transport layer that moves
//! bytes from a remote URL to a local file either directly over HTTP
//! (optionally in parallel byte ranges) or by stream-copying through an
//! external remuxer.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - Transports, probing, failover and output verification
//! - [`queue`] - Download items, content providers and the scheduler
//! - [`user_agent`] - Browser identity sent to media origins

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod queue;
pub mod user_agent;

// Re-export commonly used types
pub use download::{
    DirectTransport, HttpClient, HttpProbe, ProgressSink, RemuxTransport, SpeedLevel,
    TransferRequest, Transport, TransportConfig, TransportError, TransportSelector,
    VerificationError, verify_output,
};
pub use queue::{
    ContentProvider, DirectLinkProvider, DownloadItem, DownloadStatus, ItemId, ItemState,
    MediaKind, MediaUnit, NewDownload, Scheduler, SchedulerError, SchedulerSettings,
};
