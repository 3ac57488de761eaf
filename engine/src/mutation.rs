//! Pending mutation types for the outbox.
//!
//! Local writes are queued as pending mutations until the remote service
//! confirms them. While a pending mutation is in flight for an id, incoming
//! remote changes for that id must not clobber the local state.

use crate::{ModelId, ModelName, Timestamp, Version};
use serde::{Deserialize, Serialize};

/// The kind of change a mutation represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationKind::Create => write!(f, "create"),
            MutationKind::Update => write!(f, "update"),
            MutationKind::Delete => write!(f, "delete"),
        }
    }
}

/// A local mutation not yet acknowledged by the remote service.
///
/// `base_version` is the version the local side believed it was operating
/// against when the mutation was issued. A create has no base version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    /// Model the mutation targets
    pub model_name: ModelName,
    /// Identifier of the targeted instance
    pub model_id: ModelId,
    /// What kind of change is in flight
    pub kind: MutationKind,
    /// Version the mutation was issued against, if any
    pub base_version: Option<Version>,
    /// When the mutation was enqueued locally (milliseconds since epoch)
    pub created_at: Timestamp,
}

impl PendingMutation {
    /// Create a pending mutation entry.
    pub fn new(
        model_name: impl Into<ModelName>,
        model_id: impl Into<ModelId>,
        kind: MutationKind,
        base_version: Option<Version>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            model_id: model_id.into(),
            kind,
            base_version,
            created_at,
        }
    }

    /// Check whether a remote version supersedes this pending mutation.
    ///
    /// A remote change supersedes only if its version strictly exceeds the
    /// version this mutation was issued against. A pending create carries no
    /// base version and is never superseded.
    pub fn is_superseded_by(&self, remote_version: Version) -> bool {
        match self.base_version {
            Some(base) => remote_version > base,
            None => false,
        }
    }
}
