//! Download queue and per-source admission scheduler.
//!
//! The scheduler owns every [`DownloadItem`] and guarantees that at most one
//! item per source key is `Running` at any instant. Each admitted item runs
//! on its own tokio task; when it settles, its source slot is released and
//! the next pending item for that source is admitted automatically.
//!
//! # Overview
//!
//! - [`Scheduler`] - queue operations and admission control
//! - [`DownloadItem`] - one requested download and its observable state
//! - [`ContentProvider`] - collaborator that resolves units to URLs
//! - [`NamingPolicy`] - collaborator that names output files
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mediafetch_core::download::{TransportConfig, TransportSelector};
//! use mediafetch_core::queue::{DirectLinkProvider, NewDownload, Scheduler, SchedulerSettings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let selector = TransportSelector::from_config(&TransportConfig::default())?;
//! let scheduler = Scheduler::with_default_naming(SchedulerSettings::new("./downloads"), selector);
//!
//! let provider = Arc::new(DirectLinkProvider::new());
//! let id = scheduler.enqueue(
//!     NewDownload::movie("Clip", "cdn.example.com", provider)
//!         .with_locator("https://cdn.example.com/clip.mp4"),
//! );
//! scheduler.start(id)?;
//! scheduler.wait_all().await;
//! # Ok(())
//! # }
//! ```

mod error;
mod item;
mod naming;
mod provider;

pub use error::{ProviderError, SchedulerError};
pub use item::{
    DownloadItem, DownloadStatus, ItemId, ItemState, MediaKind, MediaUnit, NewDownload, Progress,
    RUNNING_PLACEHOLDER,
};
pub use naming::{DefaultNaming, NamingInput, NamingPolicy, media_extension};
pub use provider::{ContentProvider, DirectLinkProvider, ResolveContext, ResolvedTransfer};

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::download::{SpeedLevel, TransferRequest, TransportError, TransportSelector, verify_output};
use error::ItemError;

/// Quality requested when an item does not name one.
pub const DEFAULT_QUALITY: &str = "720p";

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Settings injected by the caller. Items capture a copy when admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Directory output files land in.
    pub download_dir: PathBuf,
    /// Remux tuning profile.
    pub speed_level: SpeedLevel,
    /// Quality for items that do not request one.
    pub default_quality: String,
}

impl SchedulerSettings {
    /// Settings for `download_dir` with default speed level and quality.
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            speed_level: SpeedLevel::default(),
            default_quality: DEFAULT_QUALITY.to_string(),
        }
    }
}

/// Queue of download items with per-source admission control.
///
/// Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("items", &self.inner.lock_items().len())
            .field("running_sources", &self.inner.slots.len())
            .finish_non_exhaustive()
    }
}

struct Inner {
    items: Mutex<Vec<Arc<DownloadItem>>>,
    /// Source key → id of the item holding its slot.
    slots: DashMap<String, ItemId>,
    settings: RwLock<SchedulerSettings>,
    selector: TransportSelector,
    naming: Arc<dyn NamingPolicy>,
    /// Number of item tasks that have not finished yet.
    active: watch::Sender<usize>,
}

impl Scheduler {
    /// Creates a scheduler with explicit collaborators.
    #[must_use]
    pub fn new(
        settings: SchedulerSettings,
        selector: TransportSelector,
        naming: Arc<dyn NamingPolicy>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                items: Mutex::new(Vec::new()),
                slots: DashMap::new(),
                settings: RwLock::new(settings),
                selector,
                naming,
                active: watch::Sender::new(0),
            }),
        }
    }

    /// Creates a scheduler that names files with [`DefaultNaming`].
    #[must_use]
    pub fn with_default_naming(settings: SchedulerSettings, selector: TransportSelector) -> Self {
        Self::new(settings, selector, Arc::new(DefaultNaming))
    }

    /// Appends a new `Pending` item and returns its id. Does not start it.
    pub fn enqueue(&self, new: NewDownload) -> ItemId {
        let default_quality = self.settings().default_quality;
        let item = Arc::new(DownloadItem::new(new, &default_quality));
        let id = item.id();
        debug!(item_id = %id, source_key = %item.source_key(), title = %item.title(), "enqueued");
        self.inner.lock_items().push(item);
        id
    }

    /// Attempts to admit `id`.
    ///
    /// Returns `Ok(false)` when the item is not pending or its source already
    /// has a running item; the item then stays queued. Returns immediately
    /// after spawning the transfer task.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ItemNotFound`] for unknown ids and
    /// [`SchedulerError::NoRuntime`] outside a tokio runtime.
    pub fn start(&self, id: ItemId) -> Result<bool> {
        let item = self.get(id).ok_or(SchedulerError::ItemNotFound(id))?;
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        Ok(self.inner.try_admit(&item, &runtime))
    }

    /// Attempts admission for every pending item, in queue order. Returns how
    /// many were admitted.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoRuntime`] outside a tokio runtime.
    pub fn start_all(&self) -> Result<usize> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        Ok(self
            .items()
            .iter()
            .filter(|item| self.inner.try_admit(item, &runtime))
            .count())
    }

    /// Cancels a pending or running item. Returns false when it was already
    /// terminal.
    ///
    /// A running item's source slot is released right away and the next
    /// pending item for that source is admitted; the in-flight transfer stops
    /// at its next cancellation point and its result is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ItemNotFound`] for unknown ids.
    pub fn cancel(&self, id: ItemId) -> Result<bool> {
        let item = self.get(id).ok_or(SchedulerError::ItemNotFound(id))?;
        match item.mark_canceled() {
            Some(DownloadStatus::Running) => {
                info!(item_id = %id, source_key = %item.source_key(), "running download canceled");
                self.inner.release_slot(item.source_key(), id);
                self.inner.admit_next(item.source_key());
                Ok(true)
            }
            Some(_) => {
                debug!(item_id = %id, "pending download canceled");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes every terminal item from the queue. Returns how many were removed.
    pub fn prune_terminal(&self) -> usize {
        let mut items = self.inner.lock_items();
        let before = items.len();
        items.retain(|item| !item.status().is_terminal());
        before - items.len()
    }

    /// Snapshot of the queue, in enqueue order.
    #[must_use]
    pub fn items(&self) -> Vec<Arc<DownloadItem>> {
        self.inner.lock_items().clone()
    }

    /// Looks up an item by id.
    #[must_use]
    pub fn get(&self, id: ItemId) -> Option<Arc<DownloadItem>> {
        self.inner.find(id)
    }

    /// Id of the item currently holding `source_key`'s slot.
    #[must_use]
    pub fn slot_holder(&self, source_key: &str) -> Option<ItemId> {
        self.inner.slots.get(source_key).map(|holder| *holder)
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> SchedulerSettings {
        self.inner.settings()
    }

    /// Replaces the settings. Running items keep the copy they started with.
    pub fn update_settings(&self, settings: SchedulerSettings) {
        debug!(?settings, "scheduler settings updated");
        *self
            .inner
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// Waits until no item task is running, chained admissions included.
    ///
    /// Pending items that were never started (and have no running item for
    /// their source) are not waited for.
    pub async fn wait_all(&self) {
        let mut active = self.inner.active.subscribe();
        // The sender lives in `inner`, so the channel cannot close here.
        let _ = active.wait_for(|count| *count == 0).await;
    }
}

impl Inner {
    fn lock_items(&self) -> MutexGuard<'_, Vec<Arc<DownloadItem>>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn find(&self, id: ItemId) -> Option<Arc<DownloadItem>> {
        self.lock_items().iter().find(|item| item.id() == id).cloned()
    }

    fn settings(&self) -> SchedulerSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Atomic test-and-add of the item's source slot.
    fn claim_slot(&self, item: &DownloadItem) -> bool {
        match self.slots.entry(item.source_key().to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(item.id());
                true
            }
        }
    }

    /// Frees `source_key` only if `owner` still holds it.
    fn release_slot(&self, source_key: &str, owner: ItemId) -> bool {
        self.slots
            .remove_if(source_key, |_, holder| *holder == owner)
            .is_some()
    }

    fn try_admit(self: &Arc<Self>, item: &Arc<DownloadItem>, runtime: &Handle) -> bool {
        if item.status() != DownloadStatus::Pending || !self.claim_slot(item) {
            return false;
        }
        if !item.mark_running() {
            // Canceled between the status check and the claim.
            self.release_slot(item.source_key(), item.id());
            return false;
        }

        let settings = self.settings();
        let slot = SlotGuard {
            inner: Arc::clone(self),
            source_key: item.source_key().to_string(),
            owner: item.id(),
        };
        self.active.send_modify(|count| *count += 1);
        info!(
            item_id = %item.id(),
            source_key = %item.source_key(),
            title = %item.title(),
            "download admitted"
        );
        runtime.spawn(run_item(Arc::clone(self), Arc::clone(item), settings, slot));
        true
    }

    /// Admits the first pending item for `source_key`, if any.
    fn admit_next(self: &Arc<Self>, source_key: &str) {
        let Ok(runtime) = Handle::try_current() else {
            debug!(source_key, "no runtime, chained admission skipped");
            return;
        };
        let candidates: Vec<_> = self
            .lock_items()
            .iter()
            .filter(|item| {
                item.source_key() == source_key && item.status() == DownloadStatus::Pending
            })
            .cloned()
            .collect();
        for item in candidates {
            if self.try_admit(&item, &runtime) {
                break;
            }
        }
    }
}

/// Holds a source slot for one item task. Dropping it releases the slot and
/// admits the next pending item for the source, whatever way the task ended.
struct SlotGuard {
    inner: Arc<Inner>,
    source_key: String,
    owner: ItemId,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if self.inner.release_slot(&self.source_key, self.owner) {
            debug!(source_key = %self.source_key, item_id = %self.owner, "source slot released");
        }
        self.inner.admit_next(&self.source_key);
        self.inner
            .active
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

#[instrument(skip_all, fields(item_id = %item.id(), source_key = %item.source_key()))]
async fn run_item(
    inner: Arc<Inner>,
    item: Arc<DownloadItem>,
    settings: SchedulerSettings,
    slot: SlotGuard,
) {
    let outcome = AssertUnwindSafe(execute(&inner, &item, &settings))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {
            if item.mark_completed() {
                info!(outputs = item.state().outputs.len(), "download completed");
            } else {
                debug!("download finished after cancel, result discarded");
            }
        }
        Ok(Err(error)) if error.is_canceled() => debug!("download stopped after cancel"),
        Ok(Err(error)) => {
            warn!(error = %error, "download failed");
            item.mark_failed(&error.to_string());
        }
        Err(_) => {
            warn!("download task panicked");
            item.mark_failed("internal error: download task panicked");
        }
    }

    // Terminal state is published before the slot is handed on.
    drop(slot);
}

/// Transfers every unit of `item` in order, stopping at the first failure.
async fn execute(
    inner: &Inner,
    item: &DownloadItem,
    settings: &SchedulerSettings,
) -> std::result::Result<(), ItemError> {
    let units = item.effective_units().ok_or(ItemError::NoUnits)?;
    let provider = Arc::clone(item.provider());
    let cancel = item.cancel_token();
    let total = units.len();

    tokio::fs::create_dir_all(&settings.download_dir)
        .await
        .map_err(|e| TransportError::io(&settings.download_dir, e))?;

    for (position, unit) in units.iter().enumerate() {
        let ctx = ResolveContext {
            title: item.title(),
            kind: item.kind(),
            unit,
            quality: item.quality(),
            locator: item.locator(),
        };
        let resolved = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(TransportError::canceled(item.locator().unwrap_or(item.title())).into());
            }
            resolved = provider.resolve_transfer(&ctx) => resolved?,
        };

        let file_name = inner.naming.file_name(&NamingInput {
            title: item.title(),
            kind: item.kind(),
            unit,
            year: item.year(),
            extension: media_extension(&resolved.url),
        });
        debug!(unit = position + 1, total, url = %resolved.url, file_name = %file_name, "transferring unit");

        let request = TransferRequest {
            url: resolved.url,
            dest_dir: settings.download_dir.clone(),
            file_name,
            headers: resolved.headers,
            speed_level: settings.speed_level,
        };
        let path = inner.selector.transfer(&request, cancel, item).await?;

        if !provider.manages_own_layout() {
            verify_output(&path).await?;
        }
        item.record_unit(position + 1, total, path);
    }
    Ok(())
}
