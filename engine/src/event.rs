//! Terminal reconciliation outcomes published to subscribers.

use crate::{ModelName, MutationRecord};
use serde::{Deserialize, Serialize};

/// Why a remote model was dropped instead of applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DropReason {
    /// An in-flight local mutation for the same id has not been superseded
    SupersededByPending,
    /// The local store already holds this version or a newer one
    Stale,
    /// A remote delete arrived for an id never seen locally
    NothingToDelete,
    /// The operation was cancelled before this item was applied
    Cancelled,
    /// The store reported an error it classified as safe to ignore
    StorageIgnored,
    /// The storage collaborator was unavailable
    StorageUnavailable,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            DropReason::SupersededByPending => "superseded by pending local mutation",
            DropReason::Stale => "stale, already applied or superseded",
            DropReason::NothingToDelete => "nothing to delete",
            DropReason::Cancelled => "operation cancelled",
            DropReason::StorageIgnored => "storage error classified as ignorable",
            DropReason::StorageUnavailable => "storage unavailable",
        };
        write!(f, "{reason}")
    }
}

/// One terminal outcome per remote model in a reconciliation batch.
///
/// Every model delivered to a reconcile operation produces exactly one of
/// these; drops are reported, never silent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReconciliationEvent {
    /// The change was persisted to the local store
    Applied(MutationRecord),
    /// The change was discarded
    #[serde(rename_all = "camelCase")]
    Dropped {
        model_name: ModelName,
        reason: DropReason,
    },
}

impl ReconciliationEvent {
    /// Shorthand for a dropped event.
    pub fn dropped(model_name: impl Into<ModelName>, reason: DropReason) -> Self {
        ReconciliationEvent::Dropped {
            model_name: model_name.into(),
            reason,
        }
    }

    /// Whether this outcome is an application.
    pub fn is_applied(&self) -> bool {
        matches!(self, ReconciliationEvent::Applied(_))
    }
}
