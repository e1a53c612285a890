//! Lifecycle event publisher.
//!
//! The kernel publishes `BEFORE_PROCESS` / `AFTER_PROCESS` notifications
//! carrying a snapshot of the workitem. Observers (metrics counters, audit
//! trails, index feeders) subscribe through a broadcast channel; events are
//! published in kernel order, so a subscriber always sees `BEFORE_PROCESS`
//! ahead of the matching `AFTER_PROCESS`. Observers cannot mutate the
//! workitem — they receive a deep copy.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::document::ItemCollection;

/// A published lifecycle event.
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub name: String,
    /// Deep copy of the workitem at publication time.
    pub workitem: ItemCollection,
    pub published_at: DateTime<Utc>,
}

/// Broadcast publisher for workflow lifecycle events.
#[derive(Debug, Clone)]
pub struct LifecycleEventPublisher {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleEventPublisher {
    /// Creates a publisher with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event. Publishing without subscribers is not an error;
    /// lifecycle events are fire-and-forget from the kernel's view.
    pub fn publish(&self, name: &str, workitem: &ItemCollection) {
        let event = LifecycleEvent {
            name: name.to_string(),
            workitem: workitem.clone(),
            published_at: Utc::now(),
        };
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LifecycleEventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}
