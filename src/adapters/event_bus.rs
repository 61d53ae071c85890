use crate::domain::event::{EventKind, HostEvent};
use crate::domain::ports::{EventListener, EventSubstrate, SubscriptionId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

struct Subscriber {
    kinds: Vec<EventKind>,
    listener: Arc<dyn EventListener>,
}

/// In-process event substrate. Listeners run in subscription order on the
/// dispatching thread.
pub struct LocalEventBus {
    next_id: AtomicU64,
    subscribers: RwLock<BTreeMap<SubscriptionId, Subscriber>>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            subscribers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Delivers `event` to every matching listener and hands it back so the
    /// host can check whether it was consumed.
    pub fn dispatch(&self, mut event: HostEvent) -> HostEvent {
        let kind = event.kind();
        // Listeners may unsubscribe while handling, so none run under the lock.
        let listeners: Vec<Arc<dyn EventListener>> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|subscriber| subscriber.kinds.contains(&kind))
            .map(|subscriber| Arc::clone(&subscriber.listener))
            .collect();

        for listener in listeners {
            listener.handle(&mut event);
        }
        event
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn subscribed_kinds(&self, subscription: SubscriptionId) -> Option<Vec<EventKind>> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&subscription)
            .map(|subscriber| subscriber.kinds.clone())
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSubstrate for LocalEventBus {
    fn subscribe(&self, kinds: &[EventKind], listener: Arc<dyn EventListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Subscriber {
                    kinds: kinds.to_vec(),
                    listener,
                },
            );
        tracing::trace!("Subscribed {} to {:?}", id, kinds);
        id
    }

    fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&subscription)
            .is_some()
    }
}
