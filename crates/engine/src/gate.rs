// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admission layer over the [`TaskQueue`]: dependency satisfaction,
//! approval, priority, and claim issuance.

use crate::queue::TaskQueue;
use loom_core::bus::{Event, EventBus};
use loom_core::clock::Clock;
use loom_core::error::{LoomError, Result};
use loom_core::{InstanceId, Task, TaskId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Caller-supplied approval policy: `(requires_approval, approved)` for a
/// given task. The default grants approval to everything.
pub type ApprovalPredicate = Arc<dyn Fn(&Task) -> (bool, bool) + Send + Sync>;

pub fn default_approval_predicate() -> ApprovalPredicate {
    Arc::new(|task: &Task| (task.requires_approval, true))
}

#[derive(Clone)]
pub struct TaskGate<C: Clock> {
    queue: TaskQueue,
    bus: Option<EventBus>,
    clock: C,
    stale_claim_timeout: chrono::Duration,
    approval: ApprovalPredicate,
    /// Tracks which instance currently holds each non-terminal task, so
    /// `Complete`/`Fail` can publish the instance ID on their bus events
    /// even though `TaskStatus::Running` itself carries none.
    claimants: Arc<Mutex<HashMap<TaskId, InstanceId>>>,
}

impl<C: Clock> TaskGate<C> {
    pub fn new(queue: TaskQueue, bus: Option<EventBus>, clock: C, stale_claim_timeout: chrono::Duration) -> Self {
        Self {
            queue,
            bus,
            clock,
            stale_claim_timeout,
            approval: default_approval_predicate(),
            claimants: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_approval_predicate(mut self, approval: ApprovalPredicate) -> Self {
        self.approval = approval;
        self
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Returns the highest-priority pending task whose dependencies are all
    /// `completed`, not currently claimed. Tie-break: shallowest
    /// dependency depth first, then insertion order, then lexical task ID.
    /// Transitions it to `claimed` and publishes `queue.task_claimed`.
    pub fn claim_next(&self, instance: &InstanceId) -> Result<Option<Task>> {
        let eligible = self.queue.eligible();
        if eligible.is_empty() {
            return Ok(None);
        }

        let depths = self.queue.dependency_depths();
        let insertion_order = self.queue.insertion_order();
        let order_index: HashMap<&TaskId, usize> =
            insertion_order.iter().enumerate().map(|(i, id)| (id, i)).collect();

        let Some(chosen) = eligible.into_iter().min_by_key(|t| {
            let depth = depths.get(&t.id).copied().unwrap_or(0);
            let order = order_index.get(&t.id).copied().unwrap_or(usize::MAX);
            (std::cmp::Reverse(t.priority), depth, order, t.id.to_string())
        }) else {
            return Ok(None);
        };

        let now = self.clock.now();
        self.queue.mark_claimed(&chosen.id, instance, now)?;
        self.claimants.lock().insert(chosen.id.clone(), instance.clone());
        tracing::debug!(task_id = %chosen.id, instance = %instance, "task claimed");

        self.publish(
            "queue.task_claimed",
            serde_json::json!({ "taskID": chosen.id.as_str(), "instanceID": instance.as_str() }),
        );

        Ok(self.queue.get(&chosen.id))
    }

    /// Transitions `claimed` → `running` iff the approval predicate permits
    /// it. Fails with a user-facing approval-required error otherwise.
    pub fn mark_running(&self, task_id: &TaskId) -> Result<()> {
        let task = self.queue.get(task_id).ok_or_else(|| LoomError::not_found(format!("task {task_id}")))?;
        let (requires_approval, approved) = (self.approval)(&task);
        if requires_approval && !approved {
            tracing::warn!(task_id = %task_id, "task denied, approval required");
            return Err(LoomError::coordinator(
                Some(task_id.to_string()),
                None,
                None,
                "approval required before this task may run",
            ));
        }
        tracing::info!(task_id = %task_id, "task running");
        self.queue.mark_running(task_id)
    }

    /// Transitions to `completed`; returns unblocked task IDs.
    pub fn complete(&self, task_id: &TaskId) -> Result<Vec<TaskId>> {
        let unblocked = self.queue.complete(task_id)?;
        let instance = self.claimants.lock().remove(task_id);
        tracing::info!(task_id = %task_id, unblocked = unblocked.len(), "task completed");
        self.publish(
            "queue.task_completed",
            serde_json::json!({
                "taskID": task_id.as_str(),
                "instanceID": instance.map(|i| i.to_string()).unwrap_or_default(),
            }),
        );
        Ok(unblocked)
    }

    /// Transitions to `failed`, cascading to dependents; returns every
    /// task ID the cascade touched.
    pub fn fail(&self, task_id: &TaskId, reason: impl Into<String>) -> Result<Vec<TaskId>> {
        let reason = reason.into();
        let failed = self.queue.fail(task_id, reason)?;
        let instance = self.claimants.lock().remove(task_id);
        for id in &failed {
            self.claimants.lock().remove(id);
        }
        tracing::error!(task_id = %task_id, cascaded = failed.len(), "task failed");
        self.publish(
            "queue.task_failed",
            serde_json::json!({
                "taskID": task_id.as_str(),
                "instanceID": instance.map(|i| i.to_string()).unwrap_or_default(),
            }),
        );
        Ok(failed)
    }

    /// Scans for claims older than the configured stale-claim timeout and
    /// returns them to `pending`. Intended to be called on a timer.
    pub fn reclaim_stale(&self) -> Vec<TaskId> {
        let reclaimed = self.queue.reclaim_stale(&self.clock, self.stale_claim_timeout);
        for id in &reclaimed {
            self.claimants.lock().remove(id);
            tracing::warn!(task_id = %id, "stale claim reclaimed");
            self.publish("queue.task_reclaimed", serde_json::json!({ "taskID": id.as_str() }));
        }
        reclaimed
    }

    fn publish(&self, topic: &str, payload: serde_json::Value) {
        if let Some(bus) = &self.bus {
            bus.publish(Event::new(topic, payload));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::FakeClock;

    fn task(id: &str, priority: i64, deps: &[&str]) -> Task {
        Task::new(id, id)
            .priority(priority)
            .dependencies(deps.iter().map(|d| TaskId::from_string(*d)).collect())
    }

    fn gate() -> TaskGate<FakeClock> {
        let queue = TaskQueue::new(None);
        TaskGate::new(queue, None, FakeClock::new(), chrono::Duration::minutes(5))
    }

    #[test]
    fn dispatch_scenario() {
        let gate = gate();
        gate.queue().seed([task("task-1", 0, &[])]);

        let inst = InstanceId::from_string("inst-1");
        let claimed = gate.claim_next(&inst).unwrap().unwrap();
        assert_eq!(claimed.id, TaskId::from_string("task-1"));

        gate.mark_running(&claimed.id).unwrap();
        let unblocked = gate.complete(&claimed.id).unwrap();
        assert!(unblocked.is_empty());
    }

    #[test]
    fn never_returns_task_with_incomplete_dependency() {
        let gate = gate();
        gate.queue().seed([task("a", 0, &[]), task("b", 0, &["a"])]);
        let inst = InstanceId::from_string("inst-1");

        let first = gate.claim_next(&inst).unwrap().unwrap();
        assert_eq!(first.id, TaskId::from_string("a"));
        assert!(gate.claim_next(&inst).unwrap().is_none());

        gate.mark_running(&first.id).unwrap();
        gate.complete(&first.id).unwrap();
        let second = gate.claim_next(&inst).unwrap().unwrap();
        assert_eq!(second.id, TaskId::from_string("b"));
    }

    #[test]
    fn tie_break_prefers_higher_priority_then_shallower_depth() {
        let gate = gate();
        gate.queue().seed([task("low", 1, &[]), task("high", 5, &[])]);
        let inst = InstanceId::from_string("inst-1");
        let chosen = gate.claim_next(&inst).unwrap().unwrap();
        assert_eq!(chosen.id, TaskId::from_string("high"));
    }

    #[test]
    fn approval_denial_is_user_facing_and_non_retryable() {
        let queue = TaskQueue::new(None);
        let task = Task::new("gated", "gated").requires_approval(true);
        queue.seed([task]);
        let gate = TaskGate::new(queue, None, FakeClock::new(), chrono::Duration::minutes(5))
            .with_approval_predicate(Arc::new(|t| (t.requires_approval, false)));

        let inst = InstanceId::from_string("inst-1");
        gate.claim_next(&inst).unwrap();
        let err = gate.mark_running(&TaskId::from_string("gated")).unwrap_err();
        assert!(err.is_user_facing());
        assert!(!err.is_retryable());
    }

    #[test]
    fn reclaim_stale_requeues_and_allows_reclaim() {
        let queue = TaskQueue::new(None);
        let clock = FakeClock::new();
        queue.seed([task("a", 0, &[])]);
        let gate = TaskGate::new(queue, None, clock.clone(), chrono::Duration::minutes(5));
        let inst1 = InstanceId::from_string("inst-1");
        gate.claim_next(&inst1).unwrap();

        clock.advance(std::time::Duration::from_secs(400));
        let reclaimed = gate.reclaim_stale();
        assert_eq!(reclaimed, vec![TaskId::from_string("a")]);

        let inst2 = InstanceId::from_string("inst-2");
        let reclaimed_task = gate.claim_next(&inst2).unwrap().unwrap();
        assert_eq!(reclaimed_task.id, TaskId::from_string("a"));
    }
}
