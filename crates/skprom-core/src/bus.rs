//! Delta bus, the in-process event source deltas are published on.
//!
//! Handlers are registered with [`DeltaSource::subscribe`] and stay
//! registered for as long as the returned [`Subscription`] lives. Dropping
//! the subscription removes exactly that handler; once the drop returns,
//! the handler is never invoked again.

use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::debug;

use crate::types::Delta;

/// Callback invoked once per published delta.
pub type DeltaHandler = Arc<dyn Fn(&Delta) + Send + Sync>;

/// Anything that can deliver deltas to a handler.
pub trait DeltaSource: Send + Sync {
    fn subscribe(&self, handler: DeltaHandler) -> Subscription;
}

/// Guard for one registered handler. Unsubscribes on drop.
#[must_use = "dropping a Subscription unsubscribes its handler immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a removal function. It runs at most once.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribe now.
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, DeltaHandler)>,
}

/// Fan-out of deltas to registered handlers, in subscription order.
///
/// `publish` holds a read lock while handlers run and unsubscribing takes
/// the write lock, so removal waits for in-flight deliveries. Handlers must
/// not subscribe or unsubscribe from inside a delivery.
#[derive(Clone, Default)]
pub struct DeltaBus {
    registry: Arc<RwLock<Registry>>,
}

impl DeltaBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a delta to every handler. Returns how many were invoked.
    pub fn publish(&self, delta: &Delta) -> usize {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        for (_, handler) in &registry.handlers {
            handler(delta);
        }
        registry.handlers.len()
    }

    pub fn handler_count(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .len()
    }
}

impl DeltaSource for DeltaBus {
    fn subscribe(&self, handler: DeltaHandler) -> Subscription {
        let id = {
            let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.handlers.push((id, handler));
            id
        };
        debug!(id, "delta handler subscribed");

        let registry: Weak<RwLock<Registry>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .handlers
                    .retain(|(handler_id, _)| *handler_id != id);
                debug!(id, "delta handler unsubscribed");
            }
        })
    }
}

impl std::fmt::Debug for DeltaBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaBus")
            .field("handlers", &self.handler_count())
            .finish()
    }
}
