// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure scaling policy evaluation: (queue status, current instance count)
//! → decision.

use loom_core::clock::Clock;
use loom_core::{QueueStatus, ScalingDecision};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
pub struct ScalingPolicyConfig {
    pub min_instances: i64,
    pub max_instances: i64,
    pub scale_up_threshold: usize,
    pub scale_down_threshold: usize,
    pub cooldown_period: chrono::Duration,
}

impl Default for ScalingPolicyConfig {
    fn default() -> Self {
        Self {
            min_instances: 1,
            max_instances: 8,
            scale_up_threshold: 5,
            scale_down_threshold: 0,
            cooldown_period: chrono::Duration::seconds(30),
        }
    }
}

/// Pure evaluation of the scaling rules. The only state is the
/// last-decision timestamp used to enforce the cooldown; every other input
/// is passed to [`ScalingPolicy::evaluate`].
pub struct ScalingPolicy<C: Clock> {
    config: ScalingPolicyConfig,
    clock: C,
    last_decision: Mutex<Option<chrono::DateTime<chrono::Utc>>>,
}

impl<C: Clock> ScalingPolicy<C> {
    pub fn new(config: ScalingPolicyConfig, clock: C) -> Self {
        Self { config, clock, last_decision: Mutex::new(None) }
    }

    /// Evaluates the four ordered rules — cooldown, scale-up, scale-down,
    /// none — under a single mutex acquisition (the last-decision
    /// timestamp).
    pub fn evaluate(&self, status: &QueueStatus, current_instances: i64) -> ScalingDecision {
        let now = self.clock.now();
        let mut last_decision = self.last_decision.lock();

        if let Some(last) = *last_decision {
            if now - last < self.config.cooldown_period {
                tracing::trace!(pending = status.pending, running = status.running, "scaling decision skipped, in cooldown");
                return ScalingDecision::none("cooldown");
            }
        }

        if status.pending > self.config.scale_up_threshold
            && status.pending > status.running
            && current_instances < self.config.max_instances
        {
            let delta = std::cmp::min(
                (status.pending - status.running) as i64,
                self.config.max_instances - current_instances,
            );
            *last_decision = Some(now);
            tracing::info!(delta, current_instances, pending = status.pending, "scaling up");
            return ScalingDecision::scale_up(delta, "pending backlog exceeds threshold");
        }

        if status.pending == 0
            && status.running <= self.config.scale_down_threshold
            && current_instances > self.config.min_instances
        {
            let delta = -std::cmp::min(1, current_instances - self.config.min_instances);
            *last_decision = Some(now);
            tracing::info!(delta, current_instances, "scaling down");
            return ScalingDecision::scale_down(delta, "queue drained, scaling down conservatively");
        }

        tracing::trace!(pending = status.pending, running = status.running, current_instances, "no scaling needed");
        ScalingDecision::none("no scaling needed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::FakeClock;
    use proptest::prelude::*;

    fn status(pending: usize, running: usize) -> QueueStatus {
        QueueStatus { pending, claimed: 0, running, completed: 0, failed: 0 }
    }

    #[test]
    fn scale_up_when_backlog_exceeds_threshold() {
        let clock = FakeClock::new();
        let policy = ScalingPolicy::new(
            ScalingPolicyConfig { cooldown_period: chrono::Duration::seconds(0), ..Default::default() },
            clock,
        );
        let decision = policy.evaluate(&status(5, 1), 2);
        assert_eq!(decision.action, loom_core::ScalingAction::ScaleUp);
        assert!(decision.delta > 0);
    }

    #[test]
    fn scale_down_when_queue_drained() {
        let clock = FakeClock::new();
        let policy = ScalingPolicy::new(
            ScalingPolicyConfig { cooldown_period: chrono::Duration::seconds(0), min_instances: 1, ..Default::default() },
            clock,
        );
        let decision = policy.evaluate(&status(0, 0), 3);
        assert_eq!(decision.action, loom_core::ScalingAction::ScaleDown);
        assert_eq!(decision.delta, -1);
    }

    #[test]
    fn cooldown_blocks_second_decision() {
        let clock = FakeClock::new();
        let policy = ScalingPolicy::new(
            ScalingPolicyConfig { cooldown_period: chrono::Duration::seconds(30), ..Default::default() },
            clock.clone(),
        );
        let first = policy.evaluate(&status(10, 0), 1);
        assert_eq!(first.action, loom_core::ScalingAction::ScaleUp);

        let second = policy.evaluate(&status(10, 0), 1);
        assert_eq!(second.action, loom_core::ScalingAction::None);
        assert_eq!(second.reason, "cooldown");

        clock.advance(std::time::Duration::from_secs(31));
        let third = policy.evaluate(&status(10, 0), 1);
        assert_eq!(third.action, loom_core::ScalingAction::ScaleUp);
    }

    #[test]
    fn decision_never_exceeds_bounds() {
        let clock = FakeClock::new();
        let policy = ScalingPolicy::new(
            ScalingPolicyConfig {
                min_instances: 1,
                max_instances: 4,
                cooldown_period: chrono::Duration::seconds(0),
                ..Default::default()
            },
            clock,
        );
        let decision = policy.evaluate(&status(100, 0), 3);
        assert_eq!(decision.delta, 1);
        assert!(3 + decision.delta <= 4);
    }

    proptest! {
        #[test]
        fn resulting_instance_count_always_stays_within_bounds(
            pending in 0usize..200,
            running in 0usize..200,
            current_instances in 1i64..16,
            min_instances in 1i64..4,
        ) {
            let max_instances = min_instances + 8;
            let current_instances = current_instances.clamp(min_instances, max_instances);
            let clock = FakeClock::new();
            let policy = ScalingPolicy::new(
                ScalingPolicyConfig {
                    min_instances,
                    max_instances,
                    cooldown_period: chrono::Duration::seconds(0),
                    ..Default::default()
                },
                clock,
            );
            let decision = policy.evaluate(&status(pending, running), current_instances);
            let resulting = current_instances + decision.delta;
            prop_assert!(resulting >= min_instances);
            prop_assert!(resulting <= max_instances);
        }
    }
}
