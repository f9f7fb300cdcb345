// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronous, in-process publish/subscribe event bus.
//!
//! Every component publishes state changes here; subscribers (the scaling
//! monitor, the adaptive lead, external UI/telemetry) react inline on the
//! publisher's thread. This gives every subscriber a strictly consistent
//! view of the system, at the cost of a slow handler blocking the
//! publisher.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An event published on the bus: a stable topic string, a timestamp set at
/// construction, and a JSON payload carrying whatever fields are specific
/// to that topic.
#[derive(Debug, Clone)]
pub struct Event {
    pub topic: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self { topic: topic.into(), timestamp: Utc::now(), payload }
    }
}

pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

enum Subscription {
    Topic { topic: String, handler: Handler },
    Wildcard { handler: Handler },
}

/// Synchronous topic pub/sub with wildcard subscribers.
///
/// Subscribers registered on the same topic are invoked in registration
/// order; wildcard subscribers fire after all topic-matching subscribers.
/// A handler that panics is caught and logged — it does not abort the
/// publisher thread or skip remaining subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64NotAtomic,
    subscriptions: HashMap<u64, Subscription>,
}

// parking_lot::Mutex already serializes access to BusInner, so the ID
// counter does not need its own atomic — kept as a plain u64 for clarity.
#[derive(Default)]
struct AtomicU64NotAtomic(u64);

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for one topic; returns a subscription ID usable
    /// with [`EventBus::unsubscribe`].
    pub fn subscribe(&self, topic: impl Into<String>, handler: impl Fn(&Event) + Send + Sync + 'static) -> SubscriptionId {
        self.insert(Subscription::Topic { topic: topic.into(), handler: Arc::new(handler) })
    }

    /// Registers a handler that receives every event regardless of topic.
    pub fn subscribe_all(&self, handler: impl Fn(&Event) + Send + Sync + 'static) -> SubscriptionId {
        self.insert(Subscription::Wildcard { handler: Arc::new(handler) })
    }

    fn insert(&self, sub: Subscription) -> SubscriptionId {
        let mut inner = self.inner.lock();
        let id = inner.next_id.0;
        inner.next_id.0 += 1;
        inner.subscriptions.insert(id, sub);
        SubscriptionId(id)
    }

    /// Removes a handler. Returns `false` if no such subscription exists.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.lock().subscriptions.remove(&id.0).is_some()
    }

    /// Invokes every subscriber matching the event's topic (in registration
    /// order), then every wildcard subscriber (in registration order),
    /// inline on the caller's thread.
    pub fn publish(&self, event: Event) {
        // Snapshot matching handlers under the lock, then invoke outside it
        // so a handler that re-enters the bus (subscribe/unsubscribe/publish)
        // does not deadlock on a re-entrant lock acquisition.
        let (topic_handlers, wildcard_handlers) = {
            let inner = self.inner.lock();
            let mut ids: Vec<&u64> = inner.subscriptions.keys().collect();
            ids.sort_unstable();
            let mut topic_handlers = Vec::new();
            let mut wildcard_handlers = Vec::new();
            for id in ids {
                match &inner.subscriptions[id] {
                    Subscription::Topic { topic, handler } if *topic == event.topic => {
                        topic_handlers.push(handler.clone());
                    }
                    Subscription::Topic { .. } => {}
                    Subscription::Wildcard { handler } => wildcard_handlers.push(handler.clone()),
                }
            }
            (topic_handlers, wildcard_handlers)
        };

        for handler in topic_handlers.iter().chain(wildcard_handlers.iter()) {
            let handler = handler.clone();
            let event_ref = &event;
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| handler(event_ref))) {
                tracing::error!(topic = %event.topic, ?panic, "event bus handler panicked");
            }
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    pub fn clear(&self) {
        self.inner.lock().subscriptions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn delivers_to_matching_topic_and_wildcard_in_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        bus.subscribe("queue.depth_changed", move |_e| o1.lock().push("topic"));
        let o2 = order.clone();
        bus.subscribe_all(move |_e| o2.lock().push("wildcard"));

        bus.publish(Event::new("queue.depth_changed", serde_json::json!({})));
        assert_eq!(*order.lock(), vec!["topic", "wildcard"]);
    }

    #[test]
    fn non_matching_topic_is_not_delivered() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe("filelock.claimed", move |_e| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(Event::new("filelock.released", serde_json::json!({})));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = bus.subscribe("topic", move |_e| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(bus.unsubscribe(id));
        bus.publish(Event::new("topic", serde_json::json!({})));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn panicking_handler_does_not_stop_later_handlers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe("t", |_e| panic!("boom"));
        let c = count.clone();
        bus.subscribe("t", move |_e| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(Event::new("t", serde_json::json!({})));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_removes_all_subscriptions() {
        let bus = EventBus::new();
        bus.subscribe("t", |_e| {});
        bus.subscribe_all(|_e| {});
        assert_eq!(bus.subscription_count(), 2);
        bus.clear();
        assert_eq!(bus.subscription_count(), 0);
    }

    #[test]
    fn publish_order_is_preserved_across_events() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        bus.subscribe_all(move |e| s.lock().push(e.topic.clone()));
        bus.publish(Event::new("a", serde_json::json!({})));
        bus.publish(Event::new("b", serde_json::json!({})));
        assert_eq!(*seen.lock(), vec!["a", "b"]);
    }
}
