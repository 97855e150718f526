//! Ordered, type-keyed callback multiplexer
//!
//! Dispatch order for one event: every callback registered for the event's
//! exact type, then every wildcard callback, each group in registration
//! order. The lock only guards registration; dispatch works on a snapshot.

use super::event::{EventKey, EventType, SubscriptionEvent};
use super::in_flight::InFlightSet;
use crate::traits::{EventCallback, Invocation};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque token returned by [`CallbackRegistry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle {
    key: EventKey,
    id: u64,
}

type Entry = (u64, Arc<dyn EventCallback>);

#[derive(Default)]
pub struct CallbackRegistry {
    next_id: AtomicU64,
    callbacks: RwLock<HashMap<EventKey, Vec<Entry>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a key → callbacks mapping
    pub fn from_map<I>(mapping: I) -> Self
    where
        I: IntoIterator<Item = (EventKey, Vec<Arc<dyn EventCallback>>)>,
    {
        let registry = Self::new();
        for (key, callbacks) in mapping {
            for callback in callbacks {
                registry.register(key, callback);
            }
        }
        registry
    }

    /// Append a callback for a key
    pub fn register(&self, key: impl Into<EventKey>, callback: Arc<dyn EventCallback>) -> CallbackHandle {
        let key = key.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.write().entry(key).or_default().push((id, callback));
        CallbackHandle { key, id }
    }

    /// Remove a callback; returns false if it was already gone
    pub fn unregister(&self, handle: &CallbackHandle) -> bool {
        let mut callbacks = self.callbacks.write();
        let Some(entries) = callbacks.get_mut(&handle.key) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(id, _)| *id != handle.id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            callbacks.remove(&handle.key);
        }
        removed
    }

    /// Chaining form of [`register`](Self::register)
    pub fn with(self, key: impl Into<EventKey>, callback: Arc<dyn EventCallback>) -> Self {
        self.register(key, callback);
        self
    }

    pub fn on_data(self, callback: Arc<dyn EventCallback>) -> Self {
        self.with(EventType::Data, callback)
    }

    pub fn on_error(self, callback: Arc<dyn EventCallback>) -> Self {
        self.with(EventType::Error, callback)
    }

    pub fn on_any(self, callback: Arc<dyn EventCallback>) -> Self {
        self.with(EventKey::Any, callback)
    }

    /// Snapshot of the callbacks registered under one key
    pub fn callbacks(&self, key: impl Into<EventKey>) -> Vec<Arc<dyn EventCallback>> {
        self.callbacks
            .read()
            .get(&key.into())
            .map(|entries| entries.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every matching callback; returns how many were invoked
    ///
    /// Synchronous callbacks run inline; suspending ones are spawned into
    /// `in_flight` and are not awaited here.
    pub fn dispatch(&self, event: &SubscriptionEvent, in_flight: &Arc<InFlightSet>) -> usize {
        let targets: Vec<Arc<dyn EventCallback>> = {
            let callbacks = self.callbacks.read();
            let specific = callbacks.get(&EventKey::Type(event.kind)).into_iter().flatten();
            let wildcard = callbacks.get(&EventKey::Any).into_iter().flatten();
            specific.chain(wildcard).map(|(_, cb)| Arc::clone(cb)).collect()
        };

        for callback in &targets {
            let mut deferred = None;
            in_flight.run_inline(event.kind, || match callback.invoke(event.clone()) {
                Invocation::Complete(result) => result,
                Invocation::Suspended(work) => {
                    deferred = Some(work);
                    Ok(())
                }
            });
            if let Some(work) = deferred {
                in_flight.spawn(event.kind, work);
            }
        }

        targets.len()
    }
}
