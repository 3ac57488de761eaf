//! Per-model-type serialization of reconcile operations.
//!
//! Each model type gets one [`ReconciliationQueue`]: a bounded channel of
//! incoming batches drained by a single worker task that runs one
//! [`ReconcileOperation`](crate::operation::ReconcileOperation) at a time.
//! One worker per queue is what guarantees batches for a model type apply in
//! arrival order; queues for different model types drain concurrently.
//!
//! The [`ReconciliationRouter`] owns the queues and routes batches by model
//! name.

use std::sync::Arc;

use dashmap::DashMap;
use quay_engine::{ModelName, RemoteModel};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, SyncError};
use crate::hub::EventHub;
use crate::operation::ReconcileOperation;
use crate::storage::{ModelStorage, MutationOutbox};

/// Tuning knobs for a reconciliation queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Batches buffered before `enqueue` applies backpressure
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

enum Command {
    Pause,
    Resume,
    Stop,
}

/// Serializes reconciliation for a single model type.
///
/// Dropping the queue stops its worker after the in-flight operation
/// completes; buffered batches are discarded.
pub struct ReconciliationQueue {
    model_name: ModelName,
    batches: mpsc::Sender<Vec<RemoteModel>>,
    commands: mpsc::UnboundedSender<Command>,
    worker: JoinHandle<()>,
}

impl ReconciliationQueue {
    /// Spawn a queue and its worker task.
    pub fn new(
        model_name: impl Into<ModelName>,
        config: QueueConfig,
        storage: Arc<dyn ModelStorage>,
        outbox: Arc<dyn MutationOutbox>,
        hub: Arc<EventHub>,
    ) -> Self {
        let model_name = model_name.into();
        let (batch_tx, batch_rx) = mpsc::channel(config.capacity.max(1));
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let worker = tokio::spawn(Worker {
            model_name: model_name.clone(),
            storage,
            outbox,
            hub,
            batches: batch_rx,
            commands: command_rx,
            paused: false,
        }
        .run());

        tracing::debug!(model = %model_name, capacity = config.capacity, "reconciliation queue started");

        Self {
            model_name,
            batches: batch_tx,
            commands: command_tx,
            worker,
        }
    }

    /// The model type this queue serves.
    pub fn model_name(&self) -> &ModelName {
        &self.model_name
    }

    /// Submit a batch for reconciliation. Waits when the buffer is full.
    pub async fn enqueue(&self, batch: Vec<RemoteModel>) -> Result<()> {
        self.batches
            .send(batch)
            .await
            .map_err(|_| SyncError::QueueClosed)
    }

    /// Stop draining; buffered batches are held until `resume`.
    pub fn pause(&self) {
        let _ = self.commands.send(Command::Pause);
    }

    /// Resume draining buffered batches.
    pub fn resume(&self) {
        let _ = self.commands.send(Command::Resume);
    }

    /// Stop the worker and wait for the in-flight operation to finish.
    /// Buffered batches are discarded.
    pub async fn stop(self) {
        let _ = self.commands.send(Command::Stop);
        let _ = self.worker.await;
    }
}

struct Worker {
    model_name: ModelName,
    storage: Arc<dyn ModelStorage>,
    outbox: Arc<dyn MutationOutbox>,
    hub: Arc<EventHub>,
    batches: mpsc::Receiver<Vec<RemoteModel>>,
    commands: mpsc::UnboundedReceiver<Command>,
    paused: bool,
}

enum Wake {
    Command(Option<Command>),
    Batch(Option<Vec<RemoteModel>>),
}

impl Worker {
    async fn run(mut self) {
        loop {
            let wake = if self.paused {
                // Only commands can wake a paused worker.
                Wake::Command(self.commands.recv().await)
            } else {
                tokio::select! {
                    // Commands win over batches so a pause or stop takes
                    // effect before the next operation starts.
                    biased;

                    command = self.commands.recv() => Wake::Command(command),
                    batch = self.batches.recv() => Wake::Batch(batch),
                }
            };

            match wake {
                Wake::Command(Some(command)) => {
                    if self.handle_command(command) {
                        break;
                    }
                }
                Wake::Batch(Some(batch)) => self.reconcile_batch(batch).await,
                Wake::Command(None) | Wake::Batch(None) => break,
            }
        }

        tracing::debug!(model = %self.model_name, "reconciliation queue worker stopped");
    }

    /// Returns true when the worker should exit.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Pause => {
                tracing::debug!(model = %self.model_name, "queue paused");
                self.paused = true;
                false
            }
            Command::Resume => {
                tracing::debug!(model = %self.model_name, "queue resumed");
                self.paused = false;
                false
            }
            Command::Stop => true,
        }
    }

    async fn reconcile_batch(&self, batch: Vec<RemoteModel>) {
        let mut operation = ReconcileOperation::new(
            self.model_name.clone(),
            &self.storage,
            Arc::clone(&self.outbox),
            Arc::clone(&self.hub),
        );

        // Terminal outcomes were already published per item; a fatal error
        // is logged here and the worker moves on to the next batch.
        if let Err(error) = operation.start(batch).await {
            tracing::error!(model = %self.model_name, %error, "batch reconciliation failed");
        }
    }
}

/// Routes incoming batches to per-model-type queues.
///
/// Queues are registered explicitly, one per syncable model type, before
/// batches start flowing.
pub struct ReconciliationRouter {
    config: QueueConfig,
    storage: Arc<dyn ModelStorage>,
    outbox: Arc<dyn MutationOutbox>,
    hub: Arc<EventHub>,
    queues: DashMap<ModelName, ReconciliationQueue>,
}

impl ReconciliationRouter {
    /// Create a router with shared collaborators.
    pub fn new(
        config: QueueConfig,
        storage: Arc<dyn ModelStorage>,
        outbox: Arc<dyn MutationOutbox>,
        hub: Arc<EventHub>,
    ) -> Self {
        Self {
            config,
            storage,
            outbox,
            hub,
            queues: DashMap::new(),
        }
    }

    /// Register a queue for a model type. Registering the same name twice
    /// replaces the old queue; its worker winds down on drop.
    pub fn register(&self, model_name: impl Into<ModelName>) {
        let model_name = model_name.into();
        let queue = ReconciliationQueue::new(
            model_name.clone(),
            self.config,
            Arc::clone(&self.storage),
            Arc::clone(&self.outbox),
            Arc::clone(&self.hub),
        );
        self.queues.insert(model_name, queue);
    }

    /// Whether a queue is registered for this model type.
    pub fn is_registered(&self, model_name: &str) -> bool {
        self.queues.contains_key(model_name)
    }

    /// Number of registered queues.
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Route a batch to its model type's queue.
    ///
    /// Batches for unregistered model types are rejected rather than applied
    /// out of band.
    pub async fn route(&self, model_name: &str, batch: Vec<RemoteModel>) -> Result<()> {
        match self.queues.get(model_name) {
            Some(queue) => queue.enqueue(batch).await,
            None => {
                tracing::warn!(model = %model_name, "no queue registered for model type");
                Err(SyncError::UnroutedModel(model_name.to_string()))
            }
        }
    }

    /// Pause every queue.
    pub fn pause_all(&self) {
        for queue in self.queues.iter() {
            queue.pause();
        }
    }

    /// Resume every queue.
    pub fn resume_all(&self) {
        for queue in self.queues.iter() {
            queue.resume();
        }
    }

    /// Stop every queue, waiting for in-flight operations to finish.
    pub async fn shutdown(&self) {
        let names: Vec<_> = self.queues.iter().map(|q| q.key().clone()).collect();
        for name in names {
            if let Some((_, queue)) = self.queues.remove(&name) {
                queue.stop().await;
            }
        }
        tracing::info!("reconciliation router shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use quay_engine::{ReconciliationEvent, RemoteModel, SyncMetadata};
    use serde_json::json;

    fn remote(id: &str, version: u64) -> RemoteModel {
        RemoteModel::new(
            json!({"title": "Post"}),
            SyncMetadata::new("Post", id, version, false, 1000),
        )
    }

    fn collaborators() -> (Arc<MemoryStorage>, Arc<EventHub>) {
        (Arc::new(MemoryStorage::new()), EventHub::new_shared())
    }

    #[tokio::test]
    async fn queue_applies_batches_in_order() {
        let (storage, hub) = collaborators();
        let (_sub, mut rx) = hub.subscribe();
        let queue = ReconciliationQueue::new(
            "Post",
            QueueConfig::default(),
            storage.clone() as Arc<dyn ModelStorage>,
            storage.clone() as Arc<dyn MutationOutbox>,
            hub,
        );

        queue.enqueue(vec![remote("post-1", 1)]).await.unwrap();
        queue.enqueue(vec![remote("post-1", 2)]).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        queue.stop().await;
        assert!(first.is_applied());
        assert!(second.is_applied());
        if let ReconciliationEvent::Applied(record) = second {
            assert_eq!(record.version, 2);
        }

        assert_eq!(storage.metadata("Post", "post-1").await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn paused_queue_holds_batches() {
        let (storage, hub) = collaborators();
        let (_sub, mut rx) = hub.subscribe();
        let queue = ReconciliationQueue::new(
            "Post",
            QueueConfig::default(),
            storage.clone() as Arc<dyn ModelStorage>,
            storage.clone() as Arc<dyn MutationOutbox>,
            hub,
        );

        queue.pause();
        queue.enqueue(vec![remote("post-1", 1)]).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(storage.row_count().await, 0);

        queue.resume();
        let event = rx.recv().await.unwrap();
        assert!(event.is_applied());
        queue.stop().await;
        assert_eq!(storage.row_count().await, 1);
    }

    #[tokio::test]
    async fn enqueue_after_stop_is_rejected() {
        let (storage, hub) = collaborators();
        let queue = ReconciliationQueue::new(
            "Post",
            QueueConfig::default(),
            storage.clone() as Arc<dyn ModelStorage>,
            storage as Arc<dyn MutationOutbox>,
            hub,
        );

        let batches = queue.batches.clone();
        queue.stop().await;

        let result = batches.send(vec![remote("post-1", 1)]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn router_routes_by_model_name() {
        let (storage, hub) = collaborators();
        let (_sub, mut rx) = hub.subscribe();
        let router = ReconciliationRouter::new(
            QueueConfig::default(),
            storage.clone() as Arc<dyn ModelStorage>,
            storage.clone() as Arc<dyn MutationOutbox>,
            hub,
        );

        router.register("Post");
        assert!(router.is_registered("Post"));
        assert_eq!(router.queue_count(), 1);

        router.route("Post", vec![remote("post-1", 1)]).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert!(event.is_applied());
        router.shutdown().await;

        assert_eq!(storage.row_count().await, 1);
        assert!(!router.is_registered("Post"));
    }

    #[tokio::test]
    async fn router_rejects_unregistered_model() {
        let (storage, hub) = collaborators();
        let router = ReconciliationRouter::new(
            QueueConfig::default(),
            storage.clone() as Arc<dyn ModelStorage>,
            storage as Arc<dyn MutationOutbox>,
            hub,
        );

        let result = router.route("Comment", vec![remote("post-1", 1)]).await;
        assert!(matches!(result, Err(SyncError::UnroutedModel(name)) if name == "Comment"));
    }
}
