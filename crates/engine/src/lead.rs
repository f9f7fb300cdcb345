// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-instance load balancing: caps claims per instance and periodically
//! reclaims stale ones.

use crate::gate::TaskGate;
use loom_core::bus::EventBus;
use loom_core::clock::Clock;
use loom_core::InstanceId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-instance load balancer. Subscribes to 4 bus topics tracking
/// claim/completion/instance lifecycle and caps per-instance in-flight
/// claims at `max_tasks_per_instance`.
pub struct AdaptiveLead<C: Clock + 'static> {
    gate: TaskGate<C>,
    bus: EventBus,
    max_tasks_per_instance: usize,
    counts: Arc<Mutex<HashMap<InstanceId, usize>>>,
    subscriptions: Mutex<Vec<loom_core::bus::SubscriptionId>>,
}

impl<C: Clock + 'static> AdaptiveLead<C> {
    pub fn new(gate: TaskGate<C>, bus: EventBus, max_tasks_per_instance: usize) -> Arc<Self> {
        let lead = Arc::new(Self {
            gate,
            bus,
            max_tasks_per_instance,
            counts: Arc::new(Mutex::new(HashMap::new())),
            subscriptions: Mutex::new(Vec::new()),
        });
        lead.subscribe();
        lead
    }

    /// Subscribes synchronously to `queue.task_claimed`, `queue.task_completed`,
    /// `instance.started`, `instance.stopped`. Called once from
    /// [`AdaptiveLead::new`] so subscription is guaranteed complete before
    /// this constructor returns.
    fn subscribe(self: &Arc<Self>) {
        let mut ids = self.subscriptions.lock();

        let counts = self.counts.clone();
        ids.push(self.bus.subscribe("queue.task_claimed", move |e| {
            if let Some(instance) = e.payload.get("instanceID").and_then(|v| v.as_str()) {
                *counts.lock().entry(InstanceId::from_string(instance)).or_insert(0) += 1;
            }
        }));

        let counts = self.counts.clone();
        ids.push(self.bus.subscribe("queue.task_completed", move |e| {
            if let Some(instance) = e.payload.get("instanceID").and_then(|v| v.as_str()) {
                if let Some(count) = counts.lock().get_mut(&InstanceId::from_string(instance)) {
                    *count = count.saturating_sub(1);
                }
            }
        }));

        let counts = self.counts.clone();
        ids.push(self.bus.subscribe("instance.started", move |e| {
            if let Some(instance) = e.payload.get("instanceID").and_then(|v| v.as_str()) {
                counts.lock().entry(InstanceId::from_string(instance)).or_insert(0);
            }
        }));

        let counts = self.counts.clone();
        ids.push(self.bus.subscribe("instance.stopped", move |e| {
            if let Some(instance) = e.payload.get("instanceID").and_then(|v| v.as_str()) {
                counts.lock().remove(&InstanceId::from_string(instance));
            }
        }));
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Current in-flight claim count for `instance`.
    pub fn load(&self, instance: &InstanceId) -> usize {
        self.counts.lock().get(instance).copied().unwrap_or(0)
    }

    /// Whether `instance` may be handed another task without exceeding the
    /// per-instance cap.
    pub fn can_claim(&self, instance: &InstanceId) -> bool {
        self.load(instance) < self.max_tasks_per_instance
    }

    /// One rebalance tick: reclaims stale claims. Intended to be driven by
    /// [`AdaptiveLead::spawn_rebalance_ticker`] on a timer, or called
    /// directly in tests.
    pub fn tick(&self) {
        self.gate.reclaim_stale();
    }

    /// Spawns a periodic ticker invoking [`AdaptiveLead::tick`] every
    /// `interval`. A negative/zero interval disables the tick entirely
    /// (useful for tests) — callers check this before calling.
    pub fn spawn_rebalance_ticker(self: &Arc<Self>, interval: Duration) -> RebalanceHandle {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let lead = self.clone();
        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => lead.tick(),
                }
            }
        });
        RebalanceHandle { token, join }
    }

    pub fn unsubscribe_all(&self) {
        let mut ids = self.subscriptions.lock();
        for id in ids.drain(..) {
            self.bus.unsubscribe(id);
        }
    }
}

pub struct RebalanceHandle {
    token: CancellationToken,
    join: tokio::task::JoinHandle<()>,
}

impl RebalanceHandle {
    pub async fn cancel(self) {
        self.token.cancel();
        let _ = self.join.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::TaskQueue;
    use loom_core::bus::Event;
    use loom_core::FakeClock;

    fn lead() -> (Arc<AdaptiveLead<FakeClock>>, EventBus) {
        let bus = EventBus::new();
        let queue = TaskQueue::new(Some(bus.clone()));
        let gate = TaskGate::new(queue, Some(bus.clone()), FakeClock::new(), chrono::Duration::minutes(5));
        (AdaptiveLead::new(gate, bus.clone(), 2), bus)
    }

    #[test]
    fn subscribes_to_four_topics_synchronously() {
        let (lead, _bus) = lead();
        assert_eq!(lead.subscription_count(), 4);
    }

    #[test]
    fn caps_claims_per_instance() {
        let (lead, bus) = lead();
        let inst = InstanceId::from_string("inst-1");
        assert!(lead.can_claim(&inst));

        bus.publish(Event::new("queue.task_claimed", serde_json::json!({ "taskID": "a", "instanceID": "inst-1" })));
        bus.publish(Event::new("queue.task_claimed", serde_json::json!({ "taskID": "b", "instanceID": "inst-1" })));
        assert!(!lead.can_claim(&inst));

        bus.publish(Event::new("queue.task_completed", serde_json::json!({ "taskID": "a", "instanceID": "inst-1" })));
        assert!(lead.can_claim(&inst));
    }

    #[test]
    fn instance_stopped_clears_load() {
        let (lead, bus) = lead();
        let inst = InstanceId::from_string("inst-1");
        bus.publish(Event::new("queue.task_claimed", serde_json::json!({ "taskID": "a", "instanceID": "inst-1" })));
        assert_eq!(lead.load(&inst), 1);
        bus.publish(Event::new("instance.stopped", serde_json::json!({ "instanceID": "inst-1" })));
        assert_eq!(lead.load(&inst), 0);
    }
}
