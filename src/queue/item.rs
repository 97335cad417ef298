//! Download item types and status definitions.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::provider::ContentProvider;
use crate::download::ProgressSink;

/// Opaque identifier of a download item.
pub type ItemId = Uuid;

/// Speed-field text shown while an item is admitted but has no sample yet.
pub const RUNNING_PLACEHOLDER: &str = "...";

/// Lifecycle status of a download item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Waiting for admission.
    Pending,
    /// Admitted; its transfer task is running.
    Running,
    /// Every unit was transferred and verified.
    Completed,
    /// A unit failed; the rest were skipped.
    Failed,
    /// Canceled by the caller.
    Canceled,
}

impl DownloadStatus {
    /// Returns the machine-readable representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Returns the human-readable label shown next to an item.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Waiting",
            Self::Running => "Downloading",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Canceled => "Canceled",
        }
    }

    /// True for `Completed`, `Failed` and `Canceled`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DownloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            _ => Err(format!("invalid download status: {s}")),
        }
    }
}

/// Completion of an item: a fraction in `[0, 1]`, or unknown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Progress {
    /// No meaningful fraction yet.
    Indeterminate,
    /// Completed units over total units.
    Fraction(f64),
}

impl Progress {
    /// The fraction, if determinate.
    #[must_use]
    pub fn fraction(&self) -> Option<f64> {
        match self {
            Self::Indeterminate => None,
            Self::Fraction(value) => Some(*value),
        }
    }
}

/// Single-asset or multi-episode content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// One asset; gets a synthetic unit when none is selected.
    #[default]
    Movie,
    /// Episodic content; needs explicit units.
    Series,
}

/// One transferable sub-unit of an item (an episode, or the movie itself).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUnit {
    /// Season number or label.
    pub season: String,
    /// Episode number or label within the season.
    pub index: String,
    /// Episode title.
    pub title: String,
    /// Direct URL for this unit, when the caller already knows it.
    pub url: Option<String>,
}

impl MediaUnit {
    /// Creates a unit without a known URL.
    #[must_use]
    pub fn new(season: impl Into<String>, index: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            season: season.into(),
            index: index.into(),
            title: title.into(),
            url: None,
        }
    }

    /// Sets the unit's URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Immutable snapshot of an item's observable state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemState {
    /// Lifecycle status.
    pub status: DownloadStatus,
    /// Unit-level completion.
    pub progress: Progress,
    /// Latest throughput sample, or a status message.
    pub speed: String,
    /// Latest free-text progress message from the transport.
    pub message: String,
    /// Error that failed the item, if any.
    pub last_error: Option<String>,
    /// Files produced so far, in unit order.
    pub outputs: Vec<PathBuf>,
}

impl Default for ItemState {
    fn default() -> Self {
        Self {
            status: DownloadStatus::Pending,
            progress: Progress::Fraction(0.0),
            speed: String::new(),
            message: String::new(),
            last_error: None,
            outputs: Vec::new(),
        }
    }
}

/// Everything needed to enqueue a download.
#[derive(Clone)]
pub struct NewDownload {
    /// Display title, also used for naming.
    pub title: String,
    /// Admission-control key (one running item per key).
    pub source_key: String,
    /// Movie or series.
    pub kind: MediaKind,
    /// Selected units, in transfer order.
    pub units: Vec<MediaUnit>,
    /// Requested quality; the scheduler default applies when `None`.
    pub quality: Option<String>,
    /// Release year, used by naming.
    pub year: Option<String>,
    /// Page or asset URL the provider resolves from.
    pub locator: Option<String>,
    /// Collaborator that turns units into URLs and headers.
    pub provider: Arc<dyn ContentProvider>,
}

impl NewDownload {
    /// A single-asset download with no explicit units.
    pub fn movie(
        title: impl Into<String>,
        source_key: impl Into<String>,
        provider: Arc<dyn ContentProvider>,
    ) -> Self {
        Self {
            title: title.into(),
            source_key: source_key.into(),
            kind: MediaKind::Movie,
            units: Vec::new(),
            quality: None,
            year: None,
            locator: None,
            provider,
        }
    }

    /// A series download over `units`.
    pub fn series(
        title: impl Into<String>,
        source_key: impl Into<String>,
        units: Vec<MediaUnit>,
        provider: Arc<dyn ContentProvider>,
    ) -> Self {
        Self {
            kind: MediaKind::Series,
            units,
            ..Self::movie(title, source_key, provider)
        }
    }

    /// Sets the locator URL.
    #[must_use]
    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }

    /// Sets the release year.
    #[must_use]
    pub fn with_year(mut self, year: impl Into<String>) -> Self {
        self.year = Some(year.into());
        self
    }

    /// Sets the requested quality.
    #[must_use]
    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }
}

impl fmt::Debug for NewDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewDownload")
            .field("title", &self.title)
            .field("source_key", &self.source_key)
            .field("kind", &self.kind)
            .field("units", &self.units.len())
            .field("provider", &self.provider.name())
            .finish_non_exhaustive()
    }
}

/// A download owned by the scheduler's queue.
///
/// Descriptive fields are immutable. Observable state lives in a `watch`
/// channel: every write is a publication, and status transitions are
/// compare-and-set under the channel's lock.
pub struct DownloadItem {
    id: ItemId,
    title: String,
    source_key: String,
    kind: MediaKind,
    units: Vec<MediaUnit>,
    quality: String,
    year: Option<String>,
    locator: Option<String>,
    provider: Arc<dyn ContentProvider>,
    cancel: CancellationToken,
    state: watch::Sender<ItemState>,
}

impl fmt::Debug for DownloadItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadItem")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("source_key", &self.source_key)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl DownloadItem {
    pub(crate) fn new(new: NewDownload, default_quality: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: new.title,
            source_key: new.source_key,
            kind: new.kind,
            units: new.units,
            quality: new.quality.unwrap_or_else(|| default_quality.to_string()),
            year: new.year,
            locator: new.locator,
            provider: new.provider,
            cancel: CancellationToken::new(),
            state: watch::Sender::new(ItemState::default()),
        }
    }

    /// Unique identifier.
    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Display title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Admission-control key.
    #[must_use]
    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    /// Movie or series.
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Units as selected at enqueue time.
    #[must_use]
    pub fn units(&self) -> &[MediaUnit] {
        &self.units
    }

    /// Requested quality.
    #[must_use]
    pub fn quality(&self) -> &str {
        &self.quality
    }

    /// Release year, if known.
    #[must_use]
    pub fn year(&self) -> Option<&str> {
        self.year.as_deref()
    }

    /// Locator URL, if any.
    #[must_use]
    pub fn locator(&self) -> Option<&str> {
        self.locator.as_deref()
    }

    /// The item's content provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn ContentProvider> {
        &self.provider
    }

    /// Units to transfer: the selection, or one synthetic unit for a movie
    /// with nothing selected. `None` for a series with nothing selected.
    #[must_use]
    pub fn effective_units(&self) -> Option<Vec<MediaUnit>> {
        match (self.kind, self.units.is_empty()) {
            (_, false) => Some(self.units.clone()),
            (MediaKind::Movie, true) => Some(vec![MediaUnit::new("1", "1", self.title.clone())]),
            (MediaKind::Series, true) => None,
        }
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> ItemState {
        self.state.borrow().clone()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> DownloadStatus {
        self.state.borrow().status
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ItemState> {
        self.state.subscribe()
    }

    /// Waits until the item reaches a terminal status and returns that state.
    pub async fn wait_terminal(&self) -> ItemState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| state.status.is_terminal()).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Pending → Running. Returns false if the item was not pending.
    pub(crate) fn mark_running(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.status != DownloadStatus::Pending {
                return false;
            }
            state.status = DownloadStatus::Running;
            state.progress = Progress::Indeterminate;
            state.speed = RUNNING_PLACEHOLDER.to_string();
            state.message.clear();
            state.last_error = None;
            true
        })
    }

    /// Moves a live item to `Canceled`. Returns the status it had, or `None`
    /// when it was already terminal.
    pub(crate) fn mark_canceled(&self) -> Option<DownloadStatus> {
        let mut previous = None;
        self.state.send_if_modified(|state| {
            let message = match state.status {
                DownloadStatus::Running => "Canceled by user",
                DownloadStatus::Pending => "Canceled",
                _ => return false,
            };
            previous = Some(state.status);
            state.status = DownloadStatus::Canceled;
            state.speed = message.to_string();
            true
        });
        if previous.is_some() {
            self.cancel.cancel();
        }
        previous
    }

    /// Running → Completed.
    pub(crate) fn mark_completed(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.status != DownloadStatus::Running {
                return false;
            }
            state.status = DownloadStatus::Completed;
            state.progress = Progress::Fraction(1.0);
            state.speed.clear();
            true
        })
    }

    /// Running → Failed, keeping `error` for display.
    pub(crate) fn mark_failed(&self, error: &str) -> bool {
        self.state.send_if_modified(|state| {
            if state.status != DownloadStatus::Running {
                return false;
            }
            state.status = DownloadStatus::Failed;
            state.speed = format!("Error: {error}");
            state.last_error = Some(error.to_string());
            true
        })
    }

    /// Records a finished unit while running.
    pub(crate) fn record_unit(&self, completed: usize, total: usize, output: PathBuf) {
        self.update_running(|state| {
            #[allow(clippy::cast_precision_loss)]
            let fraction = completed as f64 / total.max(1) as f64;
            state.progress = Progress::Fraction(fraction.clamp(0.0, 1.0));
            state.outputs.push(output);
        });
    }

    fn update_running(&self, update: impl FnOnce(&mut ItemState)) {
        self.state.send_if_modified(|state| {
            if state.status != DownloadStatus::Running {
                return false;
            }
            update(state);
            true
        });
    }
}

/// Routes transport progress into the item's state while it is running.
impl ProgressSink for DownloadItem {
    fn on_progress(&self, message: &str) {
        self.update_running(|state| state.message = message.to_string());
    }

    fn on_speed(&self, speed: &str) {
        self.update_running(|state| state.speed = speed.to_string());
    }
}
