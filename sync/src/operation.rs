//! The reconcile operation: merges one batch of remote models for one model
//! type into local storage.
//!
//! The pipeline runs as explicit sequential async stages — query the outbox,
//! filter, query local metadata, resolve dispositions, apply — with each
//! stage awaited before the next, so ordering within an operation comes from
//! the control flow itself. Operations for different model types run
//! concurrently and share nothing but the storage collaborators.
//!
//! Cancellation is cooperative: a shared flag is checked at the start of
//! every stage and before every row write. Once observed, no further writes
//! or `Applied` events are produced; already-applied rows stay applied, and
//! the operation still runs to a terminal state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use quay_engine::{
    filter, resolve_one, Disposition, DropReason, ModelName, MutationRecord, ReconciliationEvent,
    RemoteModel, Resolution, SyncMetadata,
};

use crate::error::{Result, StorageError, SyncError};
use crate::hub::EventHub;
use crate::storage::{ModelStorage, MutationOutbox, StorageOp};

/// Lifecycle states of a reconcile operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Constructed, not yet started
    Waiting,
    /// Pipeline running
    Reconciling,
    /// Terminal: the batch was processed
    Finished,
    /// Terminal: a fatal error stopped the batch
    InError,
}

/// Actions that drive state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Started,
    Reconciled,
    Errored,
}

impl State {
    /// Pure transition function. Terminal states absorb every action.
    pub fn next(self, action: Action) -> State {
        match (self, action) {
            (State::Waiting, Action::Started) => State::Reconciling,
            (State::Reconciling, Action::Reconciled) => State::Finished,
            (State::Waiting | State::Reconciling, Action::Errored) => State::InError,
            (state, _) => state,
        }
    }

    /// Whether this state ends the operation.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Finished | State::InError)
    }
}

/// Counts of terminal outcomes for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationSummary {
    /// Changes persisted and announced as applied
    pub applied: usize,
    /// Changes discarded and announced as dropped
    pub dropped: usize,
}

/// Handle for cancelling an operation from another task.
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationHandle {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// An asynchronous, cancellable reconciliation of one remote batch.
///
/// Holds storage weakly: if the embedder tears the store down while
/// operations are queued, each item is reported dropped and the operation
/// ends in the error state instead of touching a half-dead store.
pub struct ReconcileOperation {
    model_name: ModelName,
    storage: Weak<dyn ModelStorage>,
    outbox: Arc<dyn MutationOutbox>,
    hub: Arc<EventHub>,
    cancellation: CancellationHandle,
    state: State,
}

impl ReconcileOperation {
    /// Create an operation scoped to one model type.
    pub fn new(
        model_name: impl Into<ModelName>,
        storage: &Arc<dyn ModelStorage>,
        outbox: Arc<dyn MutationOutbox>,
        hub: Arc<EventHub>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            storage: Arc::downgrade(storage),
            outbox,
            hub,
            cancellation: CancellationHandle::default(),
            state: State::Waiting,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.state
    }

    /// A handle that cancels this operation from another task.
    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancellation.clone()
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    fn transition(&mut self, action: Action) {
        let next = self.state.next(action);
        tracing::trace!(model = %self.model_name, ?action, from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    /// Run the pipeline for one batch.
    ///
    /// Starting after cancellation is a clean no-op. A batch containing a
    /// model of a different type is rejected before any stage runs.
    pub async fn start(&mut self, remote_models: Vec<RemoteModel>) -> Result<OperationSummary> {
        if self.is_cancelled() {
            tracing::debug!(model = %self.model_name, "start after cancel, nothing to do");
            self.transition(Action::Started);
            self.transition(Action::Reconciled);
            return Ok(OperationSummary::default());
        }
        if self.state != State::Waiting {
            return Err(SyncError::AlreadyStarted);
        }

        for model in &remote_models {
            if model.model_name() != &self.model_name {
                self.transition(Action::Errored);
                return Err(quay_engine::Error::MixedBatch {
                    expected: self.model_name.clone(),
                    got: model.model_name().clone(),
                }
                .into());
            }
            // A model row is always a JSON object; anything else means the
            // transport handed us garbage.
            if !model.payload.is_object() {
                self.transition(Action::Errored);
                return Err(quay_engine::Error::InvalidPayload {
                    model_id: model.model_id().clone(),
                    reason: "payload must be a JSON object".into(),
                }
                .into());
            }
        }

        self.transition(Action::Started);

        match self.reconcile(remote_models).await {
            Ok(summary) => {
                self.transition(Action::Reconciled);
                tracing::info!(
                    model = %self.model_name,
                    applied = summary.applied,
                    dropped = summary.dropped,
                    "reconciliation finished"
                );
                Ok(summary)
            }
            Err(error) => {
                self.transition(Action::Errored);
                tracing::error!(model = %self.model_name, %error, "reconciliation failed");
                Err(error)
            }
        }
    }

    async fn reconcile(&self, remote_models: Vec<RemoteModel>) -> Result<OperationSummary> {
        let mut summary = OperationSummary::default();

        if remote_models.is_empty() {
            return Ok(summary);
        }

        // Stage 1: pending mutations for the batch ids.
        let pending = match self.query_pending(&remote_models).await? {
            Some(pending) => pending,
            None => {
                // Cancelled: every item still gets a terminal outcome.
                self.drop_all(remote_models.len(), DropReason::Cancelled, &mut summary);
                return Ok(summary);
            }
        };

        // Stage 2: drop remote changes superseded by in-flight local writes.
        let before = remote_models.len();
        let retained = filter(remote_models, &pending);
        self.drop_all(
            before - retained.len(),
            DropReason::SupersededByPending,
            &mut summary,
        );

        // Stage 3: local metadata for what survived the filter.
        let local_metadata = match self.query_local_metadata(&retained).await? {
            Some(metadata) => metadata,
            None => {
                self.drop_all(retained.len(), DropReason::Cancelled, &mut summary);
                return Ok(summary);
            }
        };

        // Stages 4-7: resolve and apply each survivor.
        self.apply_remote_models(retained, &local_metadata, &mut summary)
            .await?;

        Ok(summary)
    }

    /// Stage 1. `None` means cancellation was observed.
    async fn query_pending(
        &self,
        remote_models: &[RemoteModel],
    ) -> Result<Option<Vec<quay_engine::PendingMutation>>> {
        if self.is_cancelled() {
            tracing::debug!(model = %self.model_name, "cancelled before outbox query");
            return Ok(None);
        }

        let ids: Vec<_> = remote_models
            .iter()
            .map(|m| m.model_id().clone())
            .collect();
        let pending = self.outbox.pending_mutations(&self.model_name, &ids).await?;

        tracing::debug!(
            model = %self.model_name,
            batch = remote_models.len(),
            pending = pending.len(),
            "queried outbox"
        );

        Ok(Some(pending))
    }

    /// Stage 3. `None` means cancellation was observed.
    async fn query_local_metadata(
        &self,
        remote_models: &[RemoteModel],
    ) -> Result<Option<Vec<SyncMetadata>>> {
        if self.is_cancelled() {
            tracing::debug!(model = %self.model_name, "cancelled before metadata query");
            return Ok(None);
        }
        if remote_models.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let storage = self.upgrade_storage(remote_models.len())?;
        let ids: Vec<_> = remote_models
            .iter()
            .map(|m| m.model_id().clone())
            .collect();
        let metadata = storage.query_metadata(&self.model_name, &ids).await?;

        Ok(Some(metadata))
    }

    /// Stages 4-7: per-item resolution, transactional apply, event emission.
    async fn apply_remote_models(
        &self,
        remote_models: Vec<RemoteModel>,
        local_metadata: &[SyncMetadata],
        summary: &mut OperationSummary,
    ) -> Result<()> {
        if remote_models.is_empty() {
            return Ok(());
        }

        let storage = self.upgrade_storage(remote_models.len())?;
        let mut remaining = remote_models.len();

        for remote in remote_models {
            if self.is_cancelled() {
                tracing::debug!(model = %self.model_name, remaining, "cancelled mid-apply");
                self.drop_all(remaining, DropReason::Cancelled, summary);
                return Ok(());
            }
            remaining -= 1;

            let local = local_metadata
                .iter()
                .find(|m| &m.model_id == remote.model_id());

            let disposition = match resolve_one(remote, local) {
                Resolution::Apply(disposition) => disposition,
                Resolution::Drop(reason) => {
                    self.notify_dropped(reason, summary);
                    continue;
                }
            };

            match self.apply_disposition(storage.as_ref(), disposition).await {
                Ok(Some(record)) => {
                    self.notify_applied(record, summary);
                }
                Ok(None) => {
                    // The store flagged the error as safe to absorb.
                    self.notify_dropped(DropReason::StorageIgnored, summary);
                }
                Err(error) => {
                    // Fatal: stop here, the caller may redeliver the batch.
                    return Err(error.into());
                }
            }
        }

        Ok(())
    }

    /// Apply one disposition as a single storage transaction: the row write
    /// and its metadata write commit together or not at all, which is what
    /// keeps the stored version monotonic.
    async fn apply_disposition(
        &self,
        storage: &dyn ModelStorage,
        disposition: Disposition,
    ) -> std::result::Result<Option<MutationRecord>, StorageError> {
        let kind = disposition.kind();
        let remote = disposition.into_remote_model();
        let metadata = remote.sync_metadata.clone();

        let record = MutationRecord {
            model_id: metadata.model_id.clone(),
            model_name: metadata.model_name.clone(),
            kind,
            version: metadata.version,
            payload: remote.payload.clone(),
        };

        let ops = match kind {
            quay_engine::MutationKind::Create | quay_engine::MutationKind::Update => vec![
                StorageOp::SaveModel(remote),
                StorageOp::SaveMetadata(metadata),
            ],
            quay_engine::MutationKind::Delete => vec![
                StorageOp::DeleteModel {
                    model_name: metadata.model_name.clone(),
                    model_id: metadata.model_id.clone(),
                },
                StorageOp::SaveMetadata(metadata),
            ],
        };

        match storage.transact(ops).await {
            Ok(()) => Ok(Some(record)),
            Err(error) if storage.is_ignorable(&error) => {
                tracing::debug!(model = %self.model_name, %error, "absorbed storage error");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    fn upgrade_storage(&self, outstanding: usize) -> Result<Arc<dyn ModelStorage>> {
        match self.storage.upgrade() {
            Some(storage) => Ok(storage),
            None => {
                tracing::warn!(model = %self.model_name, "storage collaborator is gone");
                let mut summary = OperationSummary::default();
                self.drop_all(outstanding, DropReason::StorageUnavailable, &mut summary);
                Err(StorageError::Unavailable.into())
            }
        }
    }

    fn notify_applied(&self, record: MutationRecord, summary: &mut OperationSummary) {
        summary.applied += 1;
        self.hub.publish(ReconciliationEvent::Applied(record));
    }

    fn notify_dropped(&self, reason: DropReason, summary: &mut OperationSummary) {
        summary.dropped += 1;
        self.hub
            .publish(ReconciliationEvent::dropped(self.model_name.clone(), reason));
    }

    fn drop_all(&self, count: usize, reason: DropReason, summary: &mut OperationSummary) {
        for _ in 0..count {
            self.notify_dropped(reason, summary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions() {
        assert_eq!(State::Waiting.next(Action::Started), State::Reconciling);
        assert_eq!(State::Reconciling.next(Action::Reconciled), State::Finished);
        assert_eq!(State::Waiting.next(Action::Errored), State::InError);
        assert_eq!(State::Reconciling.next(Action::Errored), State::InError);
    }

    #[test]
    fn terminal_states_absorb() {
        assert_eq!(State::Finished.next(Action::Started), State::Finished);
        assert_eq!(State::Finished.next(Action::Errored), State::Finished);
        assert_eq!(State::InError.next(Action::Reconciled), State::InError);
    }

    #[test]
    fn waiting_ignores_reconciled() {
        assert_eq!(State::Waiting.next(Action::Reconciled), State::Waiting);
    }

    #[test]
    fn terminal_predicate() {
        assert!(!State::Waiting.is_terminal());
        assert!(!State::Reconciling.is_terminal());
        assert!(State::Finished.is_terminal());
        assert!(State::InError.is_terminal());
    }

    #[test]
    fn cancellation_handle_is_shared() {
        let handle = CancellationHandle::default();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());
        handle.cancel();
        assert!(clone.is_cancelled());
    }
}
