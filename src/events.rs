/*============================================================
  Synavera Project: Syn-Store
  Module: storesync_core::events
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Typed multi-subscriber event bus. emit calls every
    subscriber in registration order before returning.

  Security / Safety Notes:
    The subscriber list is copied before delivery, so handlers
    may subscribe or unsubscribe without affecting the pass
    in progress.

  Dependencies:
    None beyond std.

  Operational Scope:
    Shared by the catalog client and every host subscriber.

  Revision History:
    2026-09-15 COD  Introduced synchronous event bus.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Synchronous, ordered delivery
    - No subscriber can wedge the bus
============================================================*/

use std::sync::{Arc, Mutex, MutexGuard};

use crate::downloads::DownloadProgress;
use crate::error::OperationError;
use crate::package::Package;
use crate::payload::ProductPage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    PackagesChanged(Vec<Package>),
    DownloadProgress(DownloadProgress),
    ListStart,
    ListFinish,
    OperationError(OperationError),
    ProductListFetched {
        page: ProductPage,
        fetch_details: bool,
    },
    ProductFetched(String),
    FetchDetailsStart,
    FetchDetailsFinish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&CatalogEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Handler)>,
}

/// Cheap to clone; clones share one subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&CatalogEvent) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.subscribers.push((id, Arc::new(handler)));
        id
    }

    /// Returns false when `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.lock();
        let before = registry.subscribers.len();
        registry.subscribers.retain(|(existing, _)| *existing != id);
        registry.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn emit(&self, event: CatalogEvent) {
        let handlers: Vec<Handler> = self
            .lock()
            .subscribers
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(&event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // A panicking subscriber must not take the bus down with it.
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Subscribe a recorder that keeps every event it sees.
#[cfg(test)]
pub(crate) fn record(bus: &EventBus) -> Arc<Mutex<Vec<CatalogEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.subscribe(move |_| order.lock().unwrap().push(tag));
        }

        bus.emit(CatalogEvent::ListStart);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn subscribing_during_delivery_waits_for_next_pass() {
        let bus = EventBus::new();
        let late_calls = Arc::new(Mutex::new(0));

        let inner_bus = bus.clone();
        let counter = Arc::clone(&late_calls);
        bus.subscribe(move |event| {
            if *event == CatalogEvent::ListStart {
                let counter = Arc::clone(&counter);
                inner_bus.subscribe(move |_| *counter.lock().unwrap() += 1);
            }
        });

        bus.emit(CatalogEvent::ListStart);
        assert_eq!(*late_calls.lock().unwrap(), 0);
        bus.emit(CatalogEvent::ListFinish);
        assert_eq!(*late_calls.lock().unwrap(), 1);
    }

    #[test]
    fn unsubscribing_during_delivery_keeps_current_pass() {
        let bus = EventBus::new();
        let victim_calls = Arc::new(Mutex::new(0));
        let victim_id = Arc::new(Mutex::new(None));

        let inner_bus = bus.clone();
        let target = Arc::clone(&victim_id);
        bus.subscribe(move |_| {
            if let Some(id) = target.lock().unwrap().take() {
                inner_bus.unsubscribe(id);
            }
        });
        let counter = Arc::clone(&victim_calls);
        let id = bus.subscribe(move |_| *counter.lock().unwrap() += 1);
        *victim_id.lock().unwrap() = Some(id);

        bus.emit(CatalogEvent::FetchDetailsStart);
        assert_eq!(*victim_calls.lock().unwrap(), 1);
        bus.emit(CatalogEvent::FetchDetailsFinish);
        assert_eq!(*victim_calls.lock().unwrap(), 1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn unknown_subscription_is_reported() {
        let bus = EventBus::new();
        let id = bus.subscribe(|_| {});
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
    }
}
