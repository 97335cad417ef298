//! Picks a transport per source and falls back from direct to remux.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::{HttpClient, without_range};
use super::direct::DirectTransport;
use super::error::TransportError;
use super::filename::DestinationReservations;
use super::probe::{HttpProbe, TransportProbe};
use super::progress::ProgressSink;
use super::remux::RemuxTransport;
use super::transport::{SpeedLevel, Transport, TransferJob, TransportConfig};

/// Everything needed to fetch one media unit.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Resolved source URL (direct file or manifest).
    pub url: String,
    /// Directory the file lands in.
    pub dest_dir: PathBuf,
    /// Desired file name; made unique inside `dest_dir` before starting,
    /// including against other transfers still writing there.
    pub file_name: String,
    /// Provider-supplied request headers.
    pub headers: HeaderMap,
    /// Remux tuning profile.
    pub speed_level: SpeedLevel,
}

/// Selector states, in the order a transfer moves through them.
#[derive(Debug)]
enum SelectorState {
    Probing,
    DirectAttempt,
    FailedOverToRemux(TransportError),
    RemuxAttempt { after_fallback: bool },
    Succeeded(PathBuf),
    Failed(TransportError),
}

impl SelectorState {
    fn label(&self) -> &'static str {
        match self {
            Self::Probing => "probing",
            Self::DirectAttempt => "direct",
            Self::FailedOverToRemux(_) => "failover",
            Self::RemuxAttempt { .. } => "remux",
            Self::Succeeded(_) => "succeeded",
            Self::Failed(_) => "failed",
        }
    }
}

/// Routes a transfer to direct or remux and recovers direct failures through
/// remux.
#[derive(Clone)]
pub struct TransportSelector {
    probe: Arc<dyn TransportProbe>,
    direct: Arc<dyn Transport>,
    remux: Arc<dyn Transport>,
    destinations: DestinationReservations,
}

impl fmt::Debug for TransportSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSelector")
            .field("direct", &self.direct.name())
            .field("remux", &self.remux.name())
            .finish_non_exhaustive()
    }
}

impl TransportSelector {
    /// Builds a selector from explicit parts.
    #[must_use]
    pub fn new(
        probe: Arc<dyn TransportProbe>,
        direct: Arc<dyn Transport>,
        remux: Arc<dyn Transport>,
    ) -> Self {
        Self {
            probe,
            direct,
            remux,
            destinations: DestinationReservations::new(),
        }
    }

    /// Builds the standard HTTP probe, direct and remux transports.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the HTTP client cannot be created.
    pub fn from_config(config: &TransportConfig) -> Result<Self, reqwest::Error> {
        let client = HttpClient::with_connect_timeout(config.connect_timeout)?;
        Ok(Self::new(
            Arc::new(HttpProbe::new(client.clone())),
            Arc::new(DirectTransport::new(client, config)),
            Arc::new(RemuxTransport::new(config)),
        ))
    }

    /// Runs the transfer to completion and returns the final path.
    ///
    /// The destination name is resolved once, so a fallback attempt writes to
    /// the same path the direct attempt would have used. The name stays
    /// reserved until this call returns; concurrent transfers through this
    /// selector (or its clones) never share a destination.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] for a URL that does not parse,
    /// the remux error when both attempts fail (or the only attempt, for
    /// manifests), and [`TransportError::Canceled`] as soon as `cancel` fires.
    #[instrument(skip(self, request, cancel, sink), fields(url = %request.url))]
    pub async fn transfer(
        &self,
        request: &TransferRequest,
        cancel: &CancellationToken,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf, TransportError> {
        Url::parse(&request.url).map_err(|_| TransportError::invalid_url(&request.url))?;

        let reservation = self.destinations.reserve(&request.dest_dir, &request.file_name);
        let mut job = TransferJob {
            url: request.url.clone(),
            dest: reservation.path().to_path_buf(),
            headers: request.headers.clone(),
            manifest: false,
            speed_level: request.speed_level,
            cancel: cancel.clone(),
        };

        let mut state = SelectorState::Probing;
        loop {
            debug!(state = state.label(), "selector step");
            state = match state {
                SelectorState::Succeeded(path) => return Ok(path),
                SelectorState::Failed(error) => return Err(error),
                _ if cancel.is_cancelled() => {
                    SelectorState::Failed(TransportError::canceled(&request.url))
                }
                SelectorState::Probing => {
                    job.manifest = self.probe.is_manifest(&job.url, &job.headers).await;
                    if job.manifest {
                        SelectorState::RemuxAttempt {
                            after_fallback: false,
                        }
                    } else {
                        SelectorState::DirectAttempt
                    }
                }
                SelectorState::DirectAttempt => match self.direct.fetch(&job, sink).await {
                    Ok(path) => SelectorState::Succeeded(path),
                    Err(error) if error.is_canceled() => SelectorState::Failed(error),
                    Err(error) => SelectorState::FailedOverToRemux(error),
                },
                SelectorState::FailedOverToRemux(error) => {
                    warn!(error = %error, "direct transfer failed, falling back to remux");
                    job.headers = without_range(&job.headers);
                    SelectorState::RemuxAttempt {
                        after_fallback: true,
                    }
                }
                SelectorState::RemuxAttempt { after_fallback } => {
                    match self.remux.fetch(&job, sink).await {
                        Ok(path) => {
                            if after_fallback {
                                info!(path = %path.display(), "remux fallback recovered transfer");
                            }
                            SelectorState::Succeeded(path)
                        }
                        Err(error) => SelectorState::Failed(error),
                    }
                }
            };
        }
    }
}
