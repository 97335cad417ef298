//! Error types for queue and scheduler operations.

use thiserror::Error;

use super::item::ItemId;
use crate::download::{TransportError, VerificationError};

/// Errors returned by [`Scheduler`](super::Scheduler) calls.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The requested item does not exist (never enqueued, or pruned).
    #[error("download item not found: {0}")]
    ItemNotFound(ItemId),

    /// Admission needs a tokio runtime to spawn the transfer task.
    #[error("no tokio runtime available to run downloads")]
    NoRuntime,
}

/// Failures reported by a content provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Nothing to resolve the unit from.
    #[error("{provider}: no URL available for '{unit}'")]
    MissingUrl {
        /// Provider name.
        provider: String,
        /// Title of the unit being resolved.
        unit: String,
    },

    /// The URL to resolve is malformed or uses an unsupported scheme.
    #[error("{provider}: invalid URL {url}")]
    InvalidUrl {
        /// Provider name.
        provider: String,
        /// Offending URL.
        url: String,
    },

    /// Any other provider-side failure.
    #[error("{provider}: {message}")]
    Failed {
        /// Provider name.
        provider: String,
        /// Human-readable reason.
        message: String,
    },
}

impl ProviderError {
    /// Creates a missing-URL error.
    pub fn missing_url(provider: impl Into<String>, unit: impl Into<String>) -> Self {
        Self::MissingUrl {
            provider: provider.into(),
            unit: unit.into(),
        }
    }

    /// Creates an invalid-URL error.
    pub fn invalid_url(provider: impl Into<String>, url: impl Into<String>) -> Self {
        Self::InvalidUrl {
            provider: provider.into(),
            url: url.into(),
        }
    }

    /// Creates a generic provider failure.
    pub fn failed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Why an admitted item stopped before completing.
#[derive(Debug, Error)]
pub(crate) enum ItemError {
    #[error("no media units selected")]
    NoUnits,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Verification(#[from] VerificationError),
}

impl ItemError {
    pub(crate) fn is_canceled(&self) -> bool {
        matches!(self, Self::Transport(error) if error.is_canceled())
    }
}
