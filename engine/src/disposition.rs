//! Disposition resolution: classify filtered remote models against local
//! sync metadata.
//!
//! After the filter has removed remote models in conflict with in-flight
//! local mutations, each survivor is compared with the locally stored
//! version to decide whether it creates, updates, or deletes the local row,
//! or is stale and dropped. Equal versions are treated as stale: delivery is
//! assumed idempotent and an equal-version change is never reapplied.

use crate::{DropReason, ModelId, MutationKind, RemoteModel, SyncMetadata};
use std::collections::HashMap;

/// The decided action for one incoming remote model.
///
/// Consumed exactly once by the apply step; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// No local row exists; write the remote row
    Create(RemoteModel),
    /// The remote version is newer; replace the local row wholesale
    Update(RemoteModel),
    /// The remote side deleted a row the local store still holds
    Delete(RemoteModel),
}

impl Disposition {
    /// The remote model carried by this disposition.
    pub fn remote_model(&self) -> &RemoteModel {
        match self {
            Disposition::Create(m) | Disposition::Update(m) | Disposition::Delete(m) => m,
        }
    }

    /// The mutation kind this disposition applies.
    pub fn kind(&self) -> MutationKind {
        match self {
            Disposition::Create(_) => MutationKind::Create,
            Disposition::Update(_) => MutationKind::Update,
            Disposition::Delete(_) => MutationKind::Delete,
        }
    }

    /// Consume the disposition, yielding the remote model.
    pub fn into_remote_model(self) -> RemoteModel {
        match self {
            Disposition::Create(m) | Disposition::Update(m) | Disposition::Delete(m) => m,
        }
    }
}

/// Per-item resolver outcome: apply the change or drop it with a reason.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Apply(Disposition),
    Drop(DropReason),
}

/// Resolve one remote model against its local metadata, if any.
///
/// Decision table:
/// - no local metadata, remote live     -> create
/// - no local metadata, remote deleted  -> drop (nothing to delete)
/// - remote version > local, live       -> update
/// - remote version > local, deleted    -> delete
/// - remote version <= local            -> drop (stale)
pub fn resolve_one(remote: RemoteModel, local: Option<&SyncMetadata>) -> Resolution {
    match local {
        None => {
            if remote.is_deleted() {
                Resolution::Drop(DropReason::NothingToDelete)
            } else {
                Resolution::Apply(Disposition::Create(remote))
            }
        }
        Some(local) => {
            if remote.version() <= local.version {
                Resolution::Drop(DropReason::Stale)
            } else if remote.is_deleted() {
                Resolution::Apply(Disposition::Delete(remote))
            } else {
                Resolution::Apply(Disposition::Update(remote))
            }
        }
    }
}

/// Resolve a batch of remote models against their local metadata.
///
/// Metadata is matched by model id; ids never seen locally resolve as
/// absent. Drops are omitted from the output; callers that need per-item
/// drop reasons use [`resolve_one`]. Per-id outcomes are independent.
pub fn resolve(remote_models: Vec<RemoteModel>, local: &[SyncMetadata]) -> Vec<Disposition> {
    let local_by_id: HashMap<&ModelId, &SyncMetadata> =
        local.iter().map(|m| (&m.model_id, m)).collect();

    remote_models
        .into_iter()
        .filter_map(
            |remote| match resolve_one(remote.clone(), local_by_id.get(remote.model_id()).copied())
            {
                Resolution::Apply(disposition) => Some(disposition),
                Resolution::Drop(_) => None,
            },
        )
        .collect()
}
