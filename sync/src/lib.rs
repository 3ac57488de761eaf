//! # Quay Sync
//!
//! The async half of the Quay reconciliation engine: everything that touches
//! a runtime, a store, or a subscriber. The pure decision logic lives in
//! `quay-engine`; this crate executes those decisions.
//!
//! ## Architecture
//!
//! ```text
//! remote batches ──> ReconciliationRouter ──> per-model ReconciliationQueue
//!                                                      │ one at a time
//!                                                      v
//!                                             ReconcileOperation
//!                                              │            │
//!                                    ModelStorage /      EventHub
//!                                    MutationOutbox    (applied/dropped)
//! ```
//!
//! A [`ReconcileOperation`] merges one batch of remote changes for one model
//! type: it asks the [`MutationOutbox`] what local writes are still in
//! flight, filters and resolves the batch with the engine, applies each
//! surviving change as one storage transaction, and publishes exactly one
//! [`ReconciliationEvent`](quay_engine::ReconciliationEvent) per incoming
//! model on the [`EventHub`].
//!
//! [`ReconciliationQueue`] serializes operations per model type so versions
//! only ever move forward; the [`ReconciliationRouter`] owns one queue per
//! syncable model type.

pub mod error;
pub mod hub;
pub mod operation;
pub mod queue;
pub mod storage;

pub use error::{Result, StorageError, SyncError};
pub use hub::{EventHub, EventReceiver, SubscriberId};
pub use operation::{Action, CancellationHandle, OperationSummary, ReconcileOperation, State};
pub use queue::{QueueConfig, ReconciliationQueue, ReconciliationRouter};
pub use storage::{MemoryStorage, ModelStorage, MutationOutbox, StorageOp};
