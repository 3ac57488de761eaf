//! Model types for remote changes and per-row sync bookkeeping.

use crate::{ModelId, ModelName, MutationKind, Timestamp, Version};
use serde::{Deserialize, Serialize};

/// Sync bookkeeping for one model instance.
///
/// The same shape serves two roles: it arrives attached to a [`RemoteModel`]
/// as the remote side's view, and it is stored durably as the local record of
/// the last applied version. The local copy is only ever advanced by a
/// successful application, never by a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    /// Model this metadata belongs to
    pub model_name: ModelName,
    /// Identifier of the model instance
    pub model_id: ModelId,
    /// Version number, monotonically increasing per id
    pub version: Version,
    /// Soft delete flag (tombstone)
    pub deleted: bool,
    /// When the remote side last changed this instance (milliseconds since epoch)
    pub last_changed_at: Timestamp,
}

impl SyncMetadata {
    /// Create metadata for a model instance.
    pub fn new(
        model_name: impl Into<ModelName>,
        model_id: impl Into<ModelId>,
        version: Version,
        deleted: bool,
        last_changed_at: Timestamp,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            model_id: model_id.into(),
            version,
            deleted,
            last_changed_at,
        }
    }

    /// Check whether the instance is live (not tombstoned).
    pub fn is_active(&self) -> bool {
        !self.deleted
    }
}

/// A model instance as delivered by the remote sync transport.
///
/// Identity is (`model_name`, `model_id`). The payload is the full row; an
/// applied create or update replaces any local draft wholesale, since the
/// remote row is by definition newer once it passes reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteModel {
    /// The row data (JSON value)
    pub payload: serde_json::Value,
    /// Remote sync metadata for this instance
    pub sync_metadata: SyncMetadata,
}

impl RemoteModel {
    /// Create a remote model from a payload and its metadata.
    pub fn new(payload: serde_json::Value, sync_metadata: SyncMetadata) -> Self {
        Self {
            payload,
            sync_metadata,
        }
    }

    /// The model name this instance belongs to.
    pub fn model_name(&self) -> &ModelName {
        &self.sync_metadata.model_name
    }

    /// The identifier of this instance.
    pub fn model_id(&self) -> &ModelId {
        &self.sync_metadata.model_id
    }

    /// The remote version of this instance.
    pub fn version(&self) -> Version {
        self.sync_metadata.version
    }

    /// Whether the remote side has deleted this instance.
    pub fn is_deleted(&self) -> bool {
        self.sync_metadata.deleted
    }
}

/// Record of one successfully applied remote change, for event notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
    /// Identifier of the affected instance
    pub model_id: ModelId,
    /// Model the instance belongs to
    pub model_name: ModelName,
    /// What kind of change was applied
    pub kind: MutationKind,
    /// Version the local store now holds for this id
    pub version: Version,
    /// The row data that was written (or removed, for deletes)
    pub payload: serde_json::Value,
}
