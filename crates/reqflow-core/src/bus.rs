//! In-process event bus.
//!
//! Handlers are registered per [`EventKind`] and invoked synchronously, in
//! subscription order, on the publishing task. A failing or panicking
//! handler is logged and counted; it never reaches the publisher and never
//! stops the remaining handlers. Every published event is also forwarded to
//! a broadcast channel for async consumers.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::events::{DomainEvent, EventKind};

/// Default capacity of the broadcast tap.
pub const DEFAULT_TAP_CAPACITY: usize = 256;

/// A subscriber callback.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&DomainEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Result of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

type HandlerTable = HashMap<EventKind, Vec<(SubscriptionId, Arc<dyn EventHandler>)>>;

/// Typed publish/subscribe channel.
pub struct EventBus {
    handlers: RwLock<HandlerTable>,
    next_id: AtomicU64,
    failures: AtomicU64,
    tap: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a bus whose broadcast tap buffers `tap_capacity` events.
    pub fn new(tap_capacity: usize) -> Self {
        let (tap, _rx) = broadcast::channel(tap_capacity.max(1));
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            failures: AtomicU64::new(0),
            tap,
        }
    }

    /// Register `handler` for events of `kind`.
    pub fn subscribe<H>(&self, kind: EventKind, handler: H) -> SubscriptionId
    where
        H: EventHandler + 'static,
    {
        self.subscribe_shared(kind, Arc::new(handler))
    }

    /// Register an already shared handler, e.g. one handler for many kinds.
    pub fn subscribe_shared(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, handler));
        trace!(kind = %kind, subscription = id.0, "Subscribed");
        id
    }

    /// Remove a subscription. Returns false if it was not registered for `kind`.
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut table = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(handlers) = table.get_mut(&kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            table.remove(&kind);
        }
        removed
    }

    /// Number of handlers currently registered for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to every handler subscribed to its kind right now.
    ///
    /// The handler list is snapshotted before delivery, so handlers may
    /// subscribe, unsubscribe or publish without deadlocking.
    pub fn publish(&self, event: DomainEvent) -> Delivery {
        let kind = event.kind();
        let handlers: Vec<(SubscriptionId, Arc<dyn EventHandler>)> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(|list| list.iter().map(|(id, h)| (*id, Arc::clone(h))).collect())
            .unwrap_or_default();

        let mut delivery = Delivery::default();
        for (id, handler) in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&event))) {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(e)) => {
                    delivery.failed += 1;
                    warn!(kind = %kind, subscription = id.0, error = %format!("{e:#}"), "Event handler failed");
                }
                Err(payload) => {
                    delivery.failed += 1;
                    warn!(
                        kind = %kind,
                        subscription = id.0,
                        panic = panic_message(payload.as_ref()),
                        "Event handler panicked"
                    );
                }
            }
        }

        if delivery.failed > 0 {
            self.failures.fetch_add(delivery.failed as u64, Ordering::Relaxed);
        }
        trace!(kind = %kind, delivered = delivery.delivered, failed = delivery.failed, "Published");

        // No receivers is not an error
        let _ = self.tap.send(event);
        delivery
    }

    /// Receive every published event asynchronously.
    pub fn tap(&self) -> broadcast::Receiver<DomainEvent> {
        self.tap.subscribe()
    }

    /// Total handler failures since the bus was created.
    pub fn failed_deliveries(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_TAP_CAPACITY)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
