//! In-process stand-ins for probes, transports and providers.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mediafetch_core::download::{ProgressSink, TransferJob, Transport, TransportError, TransportProbe};
use mediafetch_core::queue::{ContentProvider, ProviderError, ResolveContext, ResolvedTransfer};
use reqwest::header::HeaderMap;
use tokio::sync::Semaphore;

/// Probe with a fixed answer.
pub struct FixedProbe(pub bool);

#[async_trait]
impl TransportProbe for FixedProbe {
    async fn is_manifest(&self, _url: &str, _headers: &HeaderMap) -> bool {
        self.0
    }
}

/// What a [`FakeTransport`] does once it is allowed to proceed.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Writes these bytes to the destination.
    Write(Vec<u8>),
    /// Reports success without creating the file.
    NoFile,
    /// Fails with this HTTP status.
    Fail(u16),
    /// Panics inside the transfer task.
    Panic,
}

/// Scripted transport that records every job it receives.
///
/// When gated, each fetch waits for a permit (or cancellation) before acting.
pub struct FakeTransport {
    name: &'static str,
    outcome: Outcome,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
    jobs: Mutex<Vec<TransferJob>>,
}

impl FakeTransport {
    #[must_use]
    pub fn new(name: &'static str, outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcome,
            gate: None,
            calls: AtomicUsize::new(0),
            jobs: Mutex::new(Vec::new()),
        })
    }

    /// A transport whose fetches block until `gate` hands out a permit.
    #[must_use]
    pub fn gated(name: &'static str, outcome: Outcome, gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcome,
            gate: Some(gate),
            calls: AtomicUsize::new(0),
            jobs: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn jobs(&self) -> Vec<TransferJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(
        &self,
        job: &TransferJob,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().unwrap().push(job.clone());

        if let Some(gate) = &self.gate {
            tokio::select! {
                () = job.cancel.cancelled() => return Err(TransportError::canceled(&job.url)),
                permit = gate.acquire() => permit.expect("gate closed").forget(),
            }
        }

        sink.on_speed("1.00 MB/s");
        match &self.outcome {
            Outcome::Write(bytes) => {
                tokio::fs::write(&job.dest, bytes)
                    .await
                    .map_err(|e| TransportError::io(&job.dest, e))?;
                Ok(job.dest.clone())
            }
            Outcome::NoFile => Ok(job.dest.clone()),
            Outcome::Fail(status) => Err(TransportError::http_status(&job.url, *status)),
            Outcome::Panic => panic!("transport exploded"),
        }
    }
}

/// Provider that maps every unit to `<base>/<season>-<index>.mp4` and counts
/// resolutions.
pub struct CountingProvider {
    base: String,
    fail_with: Option<String>,
    own_layout: bool,
    resolutions: AtomicUsize,
}

impl CountingProvider {
    #[must_use]
    pub fn new(base: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            base: base.into(),
            fail_with: None,
            own_layout: false,
            resolutions: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            base: String::new(),
            fail_with: Some(message.into()),
            own_layout: false,
            resolutions: AtomicUsize::new(0),
        })
    }

    /// A provider that lays out files itself, so output verification is skipped.
    #[must_use]
    pub fn with_own_layout(base: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            base: base.into(),
            fail_with: None,
            own_layout: true,
            resolutions: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentProvider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    fn manages_own_layout(&self) -> bool {
        self.own_layout
    }

    async fn resolve_transfer(
        &self,
        ctx: &ResolveContext<'_>,
    ) -> Result<ResolvedTransfer, ProviderError> {
        self.resolutions.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_with {
            return Err(ProviderError::failed(self.name(), message));
        }
        Ok(ResolvedTransfer {
            url: format!("{}/{}-{}.mp4", self.base, ctx.unit.season, ctx.unit.index),
            headers: HeaderMap::new(),
        })
    }
}

/// Sink that keeps every message it receives.
#[derive(Default)]
pub struct RecordingSink {
    pub progress: Mutex<Vec<String>>,
    pub speeds: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn on_progress(&self, message: &str) {
        self.progress.lock().unwrap().push(message.to_string());
    }

    fn on_speed(&self, speed: &str) {
        self.speeds.lock().unwrap().push(speed.to_string());
    }
}
