//! Event fan-out: per-subscriber channels with explicit release.
//!
//! DESIGN
//! ======
//! An `EventHub<T>` keeps a registry of subscriber senders keyed by a
//! subscription id, the same shape as a board's connected-client map.
//! `subscribe()` hands back a `Subscription<T>` that owns the receiving end
//! and unregisters itself exactly once, either through `unsubscribe()` or on
//! drop. Late subscribers see only events emitted after they registered.
//!
//! Channels are unbounded so `emit` never suspends; callers that need
//! emission order to match mutation order can emit while still holding
//! their own write guard.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use uuid::Uuid;

type Registry<T> = HashMap<Uuid, mpsc::UnboundedSender<T>>;

fn lock<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    // Registry holds plain senders; a panic mid-insert cannot leave it torn.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// HUB
// =============================================================================

/// Fan-out point for events of type `T`.
pub struct EventHub<T> {
    subscribers: Arc<Mutex<Registry<T>>>,
}

impl<T: Clone> EventHub<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { subscribers: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Register a new subscriber. Only events emitted after this call are
    /// delivered to it.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        lock(&self.subscribers).insert(id, tx);
        Subscription { id, rx, registry: Arc::downgrade(&self.subscribers), released: false }
    }

    /// Deliver `event` to every live subscriber. Returns how many received it.
    pub fn emit(&self, event: &T) -> usize {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

impl<T: Clone> Default for EventHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Receiving side of an `EventHub` registration.
pub struct Subscription<T> {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<T>,
    registry: Weak<Mutex<Registry<T>>>,
    released: bool,
}

impl<T> Subscription<T> {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next event. Returns `None` once the hub is gone and the
    /// buffered events are drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take a buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Release the registration now instead of at drop.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(&self.id);
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[path = "events_test.rs"]
mod tests;
