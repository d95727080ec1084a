use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;
type Listeners<T> = DashMap<u64, Listener<T>>;

pub struct EventHub<T> {
    listeners: Arc<Listeners<T>>,
    next_id: AtomicU64,
}

impl<T: 'static> EventHub<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, Arc::new(listener));

        let listeners: Weak<Listeners<T>> = Arc::downgrade(&self.listeners);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(listeners) = listeners.upgrade() {
                    listeners.remove(&id);
                }
            })),
        }
    }

    pub fn publish(&self, event: &T) -> usize {
        // Snapshot first so listeners may unsubscribe while being called.
        let listeners: Vec<Listener<T>> = self
            .listeners
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn clear(&self) {
        self.listeners.clear();
    }
}

impl<T: 'static> Default for EventHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}
