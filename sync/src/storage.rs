//! Collaborator contracts for local persistence and the mutation outbox,
//! plus an in-memory implementation.
//!
//! The reconcile operation never talks to a concrete database; it drives
//! these traits. Stores must serialize concurrent writes to the same row —
//! different operations may touch the same underlying row through
//! cross-model references, and the orchestrator does not re-lock.

use std::collections::HashMap;

use async_trait::async_trait;
use quay_engine::{ModelId, ModelName, PendingMutation, RemoteModel, SyncMetadata};
use tokio::sync::Mutex;

use crate::error::StorageError;

/// A single write inside a storage transaction.
///
/// The apply step submits one row write and its metadata write as one
/// [`ModelStorage::transact`] call, which is what keeps the stored version
/// monotonic: the metadata cannot advance without the row, nor the row
/// without the metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageOp {
    /// Write a model row, replacing any existing row for the id
    SaveModel(RemoteModel),
    /// Remove a model row by id
    DeleteModel {
        model_name: ModelName,
        model_id: ModelId,
    },
    /// Persist sync metadata for an id
    SaveMetadata(SyncMetadata),
}

/// Local persistence for model rows and their sync metadata.
#[async_trait]
pub trait ModelStorage: Send + Sync {
    /// Query sync metadata for the given ids of one model type. Ids never
    /// seen locally are simply absent from the result.
    async fn query_metadata(
        &self,
        model_name: &str,
        ids: &[ModelId],
    ) -> Result<Vec<SyncMetadata>, StorageError>;

    /// Execute a group of writes atomically. Either every op is applied or
    /// none is.
    async fn transact(&self, ops: Vec<StorageOp>) -> Result<(), StorageError>;

    /// Whether an error from this store is safe to absorb as a per-item
    /// drop instead of failing the whole batch.
    fn is_ignorable(&self, error: &StorageError) -> bool;
}

/// Ordered log of local mutations awaiting remote acknowledgement.
#[async_trait]
pub trait MutationOutbox: Send + Sync {
    /// Query pending mutations for the given ids of one model type.
    async fn pending_mutations(
        &self,
        model_name: &str,
        ids: &[ModelId],
    ) -> Result<Vec<PendingMutation>, StorageError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: HashMap<(ModelName, ModelId), serde_json::Value>,
    metadata: HashMap<(ModelName, ModelId), SyncMetadata>,
    outbox: Vec<PendingMutation>,
}

/// In-memory storage implementing both collaborator traits.
///
/// Backed by a single mutex, so writes are fully serialized — the
/// coarse-grained version of the per-row locking a database adapter would
/// provide. Used by the test suite and by embedders that have no durable
/// store yet.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a model row and its metadata, as if previously applied.
    pub async fn seed(&self, model: RemoteModel) {
        let mut state = self.state.lock().await;
        let key = (model.model_name().clone(), model.model_id().clone());
        state.rows.insert(key.clone(), model.payload.clone());
        state.metadata.insert(key, model.sync_metadata);
    }

    /// Seed metadata only (e.g. a tombstone without a row).
    pub async fn seed_metadata(&self, metadata: SyncMetadata) {
        let mut state = self.state.lock().await;
        let key = (metadata.model_name.clone(), metadata.model_id.clone());
        state.metadata.insert(key, metadata);
    }

    /// Enqueue a pending mutation in the outbox.
    pub async fn enqueue_mutation(&self, mutation: PendingMutation) {
        let mut state = self.state.lock().await;
        state.outbox.push(mutation);
    }

    /// Look up a stored row.
    pub async fn row(&self, model_name: &str, id: &str) -> Option<serde_json::Value> {
        let state = self.state.lock().await;
        state
            .rows
            .get(&(model_name.to_string(), id.to_string()))
            .cloned()
    }

    /// Look up stored metadata.
    pub async fn metadata(&self, model_name: &str, id: &str) -> Option<SyncMetadata> {
        let state = self.state.lock().await;
        state
            .metadata
            .get(&(model_name.to_string(), id.to_string()))
            .cloned()
    }

    /// Number of stored rows.
    pub async fn row_count(&self) -> usize {
        self.state.lock().await.rows.len()
    }

    fn apply_op(state: &mut MemoryState, op: StorageOp) -> Result<(), StorageError> {
        match op {
            StorageOp::SaveModel(model) => {
                let key = (model.model_name().clone(), model.model_id().clone());
                state.rows.insert(key, model.payload);
                Ok(())
            }
            StorageOp::DeleteModel {
                model_name,
                model_id,
            } => {
                let key = (model_name, model_id);
                if state.rows.remove(&key).is_none() {
                    return Err(StorageError::NotFound(key.1));
                }
                Ok(())
            }
            StorageOp::SaveMetadata(metadata) => {
                let key = (metadata.model_name.clone(), metadata.model_id.clone());
                state.metadata.insert(key, metadata);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ModelStorage for MemoryStorage {
    async fn query_metadata(
        &self,
        model_name: &str,
        ids: &[ModelId],
    ) -> Result<Vec<SyncMetadata>, StorageError> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| {
                state
                    .metadata
                    .get(&(model_name.to_string(), id.clone()))
                    .cloned()
            })
            .collect())
    }

    async fn transact(&self, ops: Vec<StorageOp>) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;

        // Stage against copies so a failing op leaves nothing applied.
        let mut staged = MemoryState {
            rows: state.rows.clone(),
            metadata: state.metadata.clone(),
            outbox: Vec::new(),
        };
        for op in ops {
            Self::apply_op(&mut staged, op)?;
        }

        state.rows = staged.rows;
        state.metadata = staged.metadata;
        Ok(())
    }

    fn is_ignorable(&self, error: &StorageError) -> bool {
        matches!(error, StorageError::NotFound(_))
    }
}

#[async_trait]
impl MutationOutbox for MemoryStorage {
    async fn pending_mutations(
        &self,
        model_name: &str,
        ids: &[ModelId],
    ) -> Result<Vec<PendingMutation>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .outbox
            .iter()
            .filter(|p| p.model_name == model_name && ids.contains(&p.model_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_engine::MutationKind;
    use serde_json::json;

    fn model(id: &str, version: u64) -> RemoteModel {
        RemoteModel::new(
            json!({"title": "Post"}),
            SyncMetadata::new("Post", id, version, false, 1000),
        )
    }

    #[tokio::test]
    async fn transact_save_and_metadata() {
        let storage = MemoryStorage::new();
        let incoming = model("post-1", 1);

        storage
            .transact(vec![
                StorageOp::SaveModel(incoming.clone()),
                StorageOp::SaveMetadata(incoming.sync_metadata.clone()),
            ])
            .await
            .unwrap();

        assert_eq!(storage.row("Post", "post-1").await, Some(incoming.payload));
        assert_eq!(storage.metadata("Post", "post-1").await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn transact_is_atomic_on_failure() {
        let storage = MemoryStorage::new();
        let incoming = model("post-1", 1);

        // Second op fails: nothing may be applied.
        let result = storage
            .transact(vec![
                StorageOp::SaveModel(incoming),
                StorageOp::DeleteModel {
                    model_name: "Post".into(),
                    model_id: "missing".into(),
                },
            ])
            .await;

        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert_eq!(storage.row_count().await, 0);
    }

    #[tokio::test]
    async fn delete_absent_row_is_not_found_and_ignorable() {
        let storage = MemoryStorage::new();

        let err = storage
            .transact(vec![StorageOp::DeleteModel {
                model_name: "Post".into(),
                model_id: "ghost".into(),
            }])
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(storage.is_ignorable(&err));
        assert!(!storage.is_ignorable(&StorageError::Io("disk full".into())));
    }

    #[tokio::test]
    async fn query_metadata_skips_unknown_ids() {
        let storage = MemoryStorage::new();
        storage.seed(model("post-1", 2)).await;

        let found = storage
            .query_metadata("Post", &["post-1".into(), "post-2".into()])
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].model_id, "post-1");
    }

    #[tokio::test]
    async fn outbox_filters_by_model_and_id() {
        let storage = MemoryStorage::new();
        storage
            .enqueue_mutation(PendingMutation::new(
                "Post",
                "post-1",
                MutationKind::Update,
                Some(1),
                900,
            ))
            .await;
        storage
            .enqueue_mutation(PendingMutation::new(
                "Comment",
                "post-1",
                MutationKind::Create,
                None,
                900,
            ))
            .await;

        let pending = storage
            .pending_mutations("Post", &["post-1".into()])
            .await
            .unwrap();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].model_name, "Post");
    }
}
