// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscribes to `queue.depth_changed`, evaluates the scaling policy, and
//! publishes `scaling.decision` plus registered callbacks when the
//! decision is actionable.

use crate::scaling::policy::ScalingPolicy;
use loom_core::bus::{Event, EventBus, SubscriptionId};
use loom_core::clock::Clock;
use loom_core::{QueueStatus, ScalingDecision};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type DecisionCallback = Box<dyn Fn(&ScalingDecision) + Send + Sync>;

pub struct ScalingMonitor<C: Clock + 'static> {
    policy: Arc<ScalingPolicy<C>>,
    bus: EventBus,
    current_instances: Arc<AtomicI64>,
    callbacks: Arc<Mutex<Vec<DecisionCallback>>>,
    subscription: Mutex<Option<SubscriptionId>>,
    token: Mutex<Option<CancellationToken>>,
}

impl<C: Clock + 'static> ScalingMonitor<C> {
    pub fn new(policy: ScalingPolicy<C>, bus: EventBus) -> Self {
        Self {
            policy: Arc::new(policy),
            bus,
            current_instances: Arc::new(AtomicI64::new(0)),
            callbacks: Arc::new(Mutex::new(Vec::new())),
            subscription: Mutex::new(None),
            token: Mutex::new(None),
        }
    }

    pub fn set_current_instances(&self, count: i64) {
        self.current_instances.store(count, Ordering::SeqCst);
    }

    pub fn register_decision_callback(&self, callback: impl Fn(&ScalingDecision) + Send + Sync + 'static) {
        self.callbacks.lock().push(Box::new(callback));
    }

    pub fn subscription_count(&self) -> usize {
        if self.subscription.lock().is_some() { 1 } else { 0 }
    }

    /// Subscribes to `queue.depth_changed` *synchronously* — before this
    /// function returns, `subscription_count()` reflects the new
    /// subscription — then awaits `token.cancelled()`, i.e. blocks until
    /// [`ScalingMonitor::stop`] is called. Callers that want `Start` to run
    /// in the background should `tokio::spawn` this future themselves.
    pub async fn start(&self, token: CancellationToken) {
        let policy = self.policy.clone();
        let bus = self.bus.clone();
        let current_instances = self.current_instances.clone();
        let callbacks = self.callbacks.clone();

        let id = self.bus.subscribe("queue.depth_changed", move |event: &Event| {
            // Guard: ignore events whose payload doesn't look like a depth
            // snapshot instead of treating a shape mismatch as fatal.
            let Ok(status) = serde_json::from_value::<QueueStatus>(event.payload.clone()) else {
                return;
            };
            let current = current_instances.load(Ordering::SeqCst);
            let decision = policy.evaluate(&status, current);
            if decision.is_actionable() {
                bus.publish(Event::new(
                    "scaling.decision",
                    serde_json::json!({
                        "action": decision.action.to_string(),
                        "delta": decision.delta,
                        "reason": decision.reason,
                        "currentInstances": current,
                    }),
                ));
                for callback in callbacks.lock().iter() {
                    callback(&decision);
                }
            }
        });
        *self.subscription.lock() = Some(id);

        *self.token.lock() = Some(token.clone());
        token.cancelled().await;
    }

    /// Unsubscribes and cancels any in-flight [`ScalingMonitor::start`].
    /// Idempotent.
    pub fn stop(&self) {
        if let Some(id) = self.subscription.lock().take() {
            self.bus.unsubscribe(id);
        }
        if let Some(token) = self.token.lock().take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaling::policy::ScalingPolicyConfig;
    use loom_core::FakeClock;
    use std::sync::Mutex as StdMutex;

    #[tokio::test]
    async fn scale_up_publishes_decision_and_invokes_callback() {
        let bus = EventBus::new();
        let policy = ScalingPolicy::new(
            ScalingPolicyConfig { cooldown_period: chrono::Duration::seconds(0), max_instances: 10, ..Default::default() },
            FakeClock::new(),
        );
        let monitor = Arc::new(ScalingMonitor::new(policy, bus.clone()));
        monitor.set_current_instances(2);

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let s = seen.clone();
        bus.subscribe("scaling.decision", move |e| s.lock().unwrap().push(e.payload.clone()));

        let callback_hits = Arc::new(StdMutex::new(0));
        let c = callback_hits.clone();
        monitor.register_decision_callback(move |_d| *c.lock().unwrap() += 1);

        let token = CancellationToken::new();
        let m = monitor.clone();
        let t = token.clone();
        let handle = tokio::spawn(async move { m.start(t).await });

        // Wait for subscription readiness before publishing.
        while monitor.subscription_count() == 0 {
            tokio::task::yield_now().await;
        }

        bus.publish(Event::new(
            "queue.depth_changed",
            serde_json::json!({ "pending": 5, "claimed": 0, "running": 1, "completed": 0, "failed": 0 }),
        ));

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(*callback_hits.lock().unwrap(), 1);

        monitor.stop();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_event_shape_is_ignored_not_fatal() {
        let bus = EventBus::new();
        let policy = ScalingPolicy::new(ScalingPolicyConfig::default(), FakeClock::new());
        let monitor = Arc::new(ScalingMonitor::new(policy, bus.clone()));

        let token = CancellationToken::new();
        let m = monitor.clone();
        let t = token.clone();
        let handle = tokio::spawn(async move { m.start(t).await });
        while monitor.subscription_count() == 0 {
            tokio::task::yield_now().await;
        }

        // Malformed payload — must not panic or kill the subscriber.
        bus.publish(Event::new("queue.depth_changed", serde_json::json!("not an object")));

        monitor.stop();
        handle.await.unwrap();
    }
}
