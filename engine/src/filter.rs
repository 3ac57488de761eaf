//! Reconciliation filter: drops remote changes that conflict with in-flight
//! local mutations.
//!
//! Given a batch of remote models and the pending mutations queried for the
//! same ids, the filter removes every remote model whose id has a pending
//! mutation the remote change has not yet superseded. Retained models are
//! safe to reconcile against local metadata; excluded models are reported as
//! dropped by the caller.

use crate::{ModelId, PendingMutation, RemoteModel};
use std::collections::HashMap;

/// Filter a batch of remote models against pending local mutations.
///
/// A remote model is retained if no pending mutation exists for its id, or
/// if its version strictly exceeds the version the pending mutation was
/// issued against (the remote side has already absorbed the local write).
/// Input order is preserved. Pure and deterministic.
pub fn filter(remote_models: Vec<RemoteModel>, pending: &[PendingMutation]) -> Vec<RemoteModel> {
    if remote_models.is_empty() || pending.is_empty() {
        return remote_models;
    }

    let pending_by_id: HashMap<&ModelId, &PendingMutation> =
        pending.iter().map(|p| (&p.model_id, p)).collect();

    remote_models
        .into_iter()
        .filter(|remote| match pending_by_id.get(remote.model_id()) {
            Some(pending) => pending.is_superseded_by(remote.version()),
            None => true,
        })
        .collect()
}
