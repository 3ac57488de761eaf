//! In-process event fan-out for reconciliation outcomes.
//!
//! Subscribers (the sync engine, UI observers) register for a stream of
//! [`ReconciliationEvent`]s. Delivery is best-effort: a subscriber that has
//! dropped its receiver is skipped, and publishing never blocks.

use std::sync::Arc;

use dashmap::DashMap;
use quay_engine::ReconciliationEvent;
use tokio::sync::mpsc;

/// Identifier handed out at subscription time, used to unsubscribe.
pub type SubscriberId = String;

/// Receiving half of a subscription.
pub type EventReceiver = mpsc::UnboundedReceiver<ReconciliationEvent>;

/// Publish/subscribe hub for reconciliation events.
///
/// Thread-safe and shared across operations via `Arc`.
#[derive(Debug, Default)]
pub struct EventHub {
    subscribers: DashMap<SubscriberId, mpsc::UnboundedSender<ReconciliationEvent>>,
}

impl EventHub {
    /// Create a new hub.
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    /// Create a new hub wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a subscriber. Returns its id and the event stream.
    pub fn subscribe(&self) -> (SubscriberId, EventReceiver) {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(id.clone(), tx);

        tracing::debug!(subscriber_id = %id, "event subscriber registered");

        (id, rx)
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&self, id: &str) {
        if self.subscribers.remove(id).is_some() {
            tracing::debug!(subscriber_id = %id, "event subscriber unregistered");
        }
    }

    /// Publish an event to all live subscribers.
    ///
    /// Returns the number of subscribers that received it. Subscribers whose
    /// receivers are gone are pruned.
    pub fn publish(&self, event: ReconciliationEvent) -> usize {
        let mut sent = 0;
        let mut dead = Vec::new();

        for entry in self.subscribers.iter() {
            if entry.value().send(event.clone()).is_ok() {
                sent += 1;
            } else {
                dead.push(entry.key().clone());
            }
        }

        for id in dead {
            self.subscribers.remove(&id);
        }

        sent
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
