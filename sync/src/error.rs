//! Error taxonomy for the reconciliation pipeline.
//!
//! Collaborator errors cross every stage boundary as values; the pipeline
//! classifies each storage error as fatal or absorbable using the store's
//! own [`is_ignorable`](crate::storage::ModelStorage::is_ignorable)
//! predicate rather than its own guesswork.

use thiserror::Error;

/// Errors reported by storage and outbox collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The targeted row does not exist
    #[error("row not found: {0}")]
    NotFound(String),

    /// The write lost a row-level race the store could not resolve
    #[error("write conflict on row: {0}")]
    Conflict(String),

    /// The store is not initialized or has been torn down
    #[error("storage unavailable")]
    Unavailable,

    /// Transaction or disk failure
    #[error("storage io error: {0}")]
    Io(String),
}

/// Errors that end a reconcile operation in the error state.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The storage collaborator reported a fatal error
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The batch violated an engine invariant
    #[error("engine error: {0}")]
    Engine(#[from] quay_engine::Error),

    /// The operation was started after being consumed or cancelled
    #[error("operation already started")]
    AlreadyStarted,

    /// The queue's worker has stopped and accepts no more batches
    #[error("reconciliation queue closed")]
    QueueClosed,

    /// No queue was ever registered for the batch's model type
    #[error("no reconciliation queue registered for model '{0}'")]
    UnroutedModel(quay_engine::ModelName),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, SyncError>;
