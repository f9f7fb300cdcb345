// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory task lifecycle table: `pending` → `claimed` → `running` →
//! {`completed`, `failed`}. Every state change publishes
//! `queue.depth_changed` with the updated counts.

use loom_core::bus::{Event, EventBus};
use loom_core::clock::Clock;
use loom_core::error::{LoomError, Result};
use loom_core::{InstanceId, QueueStatus, Task, TaskId, TaskStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

struct Inner {
    tasks: HashMap<TaskId, Task>,
    /// Insertion order, used as the gate's second tie-break key.
    insertion_order: Vec<TaskId>,
}

/// The in-memory lifecycle tracker. Thread-safe: every mutating operation
/// takes the single internal mutex, emits a depth event before releasing
/// it, so subscribers always observe a consistent snapshot.
#[derive(Clone)]
pub struct TaskQueue {
    bus: Option<EventBus>,
    inner: Arc<Mutex<Inner>>,
}

impl TaskQueue {
    pub fn new(bus: Option<EventBus>) -> Self {
        Self { bus, inner: Arc::new(Mutex::new(Inner { tasks: HashMap::new(), insertion_order: Vec::new() })) }
    }

    /// Seeds the queue with the planned task set. Intended for startup only
    /// — does not publish a depth event per task, only once at the end.
    pub fn seed(&self, tasks: impl IntoIterator<Item = Task>) {
        {
            let mut inner = self.inner.lock();
            for task in tasks {
                if !inner.tasks.contains_key(&task.id) {
                    inner.insertion_order.push(task.id.clone());
                }
                inner.tasks.insert(task.id.clone(), task);
            }
        }
        self.publish_depth();
    }

    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.inner.lock().tasks.get(id).cloned()
    }

    pub fn status(&self) -> QueueStatus {
        let inner = self.inner.lock();
        let mut status = QueueStatus::default();
        for task in inner.tasks.values() {
            match task.status {
                TaskStatus::Pending => status.pending += 1,
                TaskStatus::Claimed { .. } => status.claimed += 1,
                TaskStatus::Running => status.running += 1,
                TaskStatus::Completed => status.completed += 1,
                TaskStatus::Failed { .. } => status.failed += 1,
            }
        }
        status
    }

    pub fn insertion_order(&self) -> Vec<TaskId> {
        self.inner.lock().insertion_order.clone()
    }

    /// All tasks currently eligible for claiming: `pending` with every
    /// dependency `completed`.
    pub fn eligible(&self) -> Vec<Task> {
        let inner = self.inner.lock();
        inner
            .tasks
            .values()
            .filter(|t| matches!(t.status, TaskStatus::Pending))
            .filter(|t| {
                t.dependencies
                    .iter()
                    .all(|dep| matches!(inner.tasks.get(dep), Some(d) if d.status == TaskStatus::Completed))
            })
            .cloned()
            .collect()
    }

    /// Dependency depth of every task, memoized for the gate's tie-break.
    pub fn dependency_depths(&self) -> HashMap<TaskId, usize> {
        let inner = self.inner.lock();
        let mut depths = HashMap::new();
        fn depth_of(id: &TaskId, tasks: &HashMap<TaskId, Task>, memo: &mut HashMap<TaskId, usize>) -> usize {
            if let Some(d) = memo.get(id) {
                return *d;
            }
            let d = match tasks.get(id) {
                Some(t) if t.dependencies.is_empty() => 0,
                Some(t) => t
                    .dependencies
                    .iter()
                    .map(|dep| depth_of(dep, tasks, memo) + 1)
                    .max()
                    .unwrap_or(0),
                None => 0,
            };
            memo.insert(id.clone(), d);
            d
        }
        for id in inner.tasks.keys().cloned().collect::<Vec<_>>() {
            depth_of(&id, &inner.tasks, &mut depths);
        }
        depths
    }

    /// Transitions `task_id` to `Claimed { by, at }`. Fails if the task does
    /// not exist or is not `Pending`.
    pub fn mark_claimed(&self, task_id: &TaskId, instance: &InstanceId, now: chrono::DateTime<chrono::Utc>) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            let task = inner.tasks.get_mut(task_id).ok_or_else(|| LoomError::not_found(format!("task {task_id}")))?;
            if !matches!(task.status, TaskStatus::Pending) {
                return Err(LoomError::validation("status", "task is not pending"));
            }
            task.status = TaskStatus::Claimed { by: instance.clone(), at: now };
        }
        self.publish_depth();
        Ok(())
    }

    pub fn mark_running(&self, task_id: &TaskId) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            let task = inner.tasks.get_mut(task_id).ok_or_else(|| LoomError::not_found(format!("task {task_id}")))?;
            if !matches!(task.status, TaskStatus::Claimed { .. }) {
                return Err(LoomError::validation("status", "task is not claimed"));
            }
            task.status = TaskStatus::Running;
        }
        self.publish_depth();
        Ok(())
    }

    /// Marks `task_id` completed. A no-op if already terminal. Returns the
    /// IDs of tasks this completion unblocks (every dependent whose last
    /// outstanding dependency is now satisfied).
    pub fn complete(&self, task_id: &TaskId) -> Result<Vec<TaskId>> {
        let unblocked = {
            let mut inner = self.inner.lock();
            let task = inner.tasks.get_mut(task_id).ok_or_else(|| LoomError::not_found(format!("task {task_id}")))?;
            if task.status.is_terminal() {
                return Ok(Vec::new());
            }
            task.status = TaskStatus::Completed;

            inner
                .tasks
                .values()
                .filter(|t| matches!(t.status, TaskStatus::Pending))
                .filter(|t| t.dependencies.contains(task_id))
                .filter(|t| {
                    t.dependencies
                        .iter()
                        .all(|dep| matches!(inner.tasks.get(dep), Some(d) if d.status == TaskStatus::Completed))
                })
                .map(|t| t.id.clone())
                .collect()
        };
        self.publish_depth();
        Ok(unblocked)
    }

    /// Marks `task_id` failed with `reason`. A no-op if already terminal.
    /// Cascades the failure transitively to every downstream dependent.
    /// Returns every task ID that was newly marked failed (including
    /// `task_id` itself, unless it was already terminal).
    pub fn fail(&self, task_id: &TaskId, reason: impl Into<String>) -> Result<Vec<TaskId>> {
        let reason = reason.into();
        let mut failed = Vec::new();
        {
            let mut inner = self.inner.lock();
            if !inner.tasks.contains_key(task_id) {
                return Err(LoomError::not_found(format!("task {task_id}")));
            }
            let already_terminal = inner.tasks[task_id].status.is_terminal();
            if already_terminal {
                return Ok(Vec::new());
            }

            let mut frontier = vec![task_id.clone()];
            let mut first = true;
            while let Some(id) = frontier.pop() {
                let this_reason = if first { reason.clone() } else { format!("upstream dependency {task_id} failed") };
                first = false;
                let Some(task) = inner.tasks.get_mut(&id) else { continue };
                if task.status.is_terminal() {
                    continue;
                }
                task.status = TaskStatus::Failed { reason: this_reason };
                failed.push(id.clone());

                let dependents: Vec<TaskId> = inner
                    .tasks
                    .values()
                    .filter(|t| t.dependencies.contains(&id))
                    .map(|t| t.id.clone())
                    .collect();
                frontier.extend(dependents);
            }
        }
        self.publish_depth();
        Ok(failed)
    }

    /// Scans for claims older than `stale_timeout`, still in `Claimed`,
    /// and returns them to `Pending`. Returns the reclaimed task IDs.
    pub fn reclaim_stale<C: Clock>(&self, clock: &C, stale_timeout: chrono::Duration) -> Vec<TaskId> {
        let now = clock.now();
        let reclaimed = {
            let mut inner = self.inner.lock();
            let mut reclaimed = Vec::new();
            for task in inner.tasks.values_mut() {
                if let TaskStatus::Claimed { at, .. } = task.status {
                    if now - at > stale_timeout {
                        task.status = TaskStatus::Pending;
                        reclaimed.push(task.id.clone());
                    }
                }
            }
            reclaimed
        };
        if !reclaimed.is_empty() {
            self.publish_depth();
        }
        reclaimed
    }

    fn publish_depth(&self) {
        if let Some(bus) = &self.bus {
            let status = self.status();
            bus.publish(Event::new(
                "queue.depth_changed",
                serde_json::json!({
                    "pending": status.pending,
                    "claimed": status.claimed,
                    "running": status.running,
                    "completed": status.completed,
                    "failed": status.failed,
                    "total": status.total(),
                }),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::FakeClock;

    fn task(id: &str, deps: &[&str]) -> Task {
        Task::new(id, id).dependencies(deps.iter().map(|d| TaskId::from_string(*d)).collect())
    }

    #[test]
    fn dependency_unblock_scenario() {
        let queue = TaskQueue::new(None);
        queue.seed([task("a", &[]), task("b", &["a"])]);

        assert_eq!(queue.eligible().iter().map(|t| t.id.to_string()).collect::<Vec<_>>(), vec!["a"]);

        let inst = InstanceId::from_string("inst-1");
        queue.mark_claimed(&TaskId::from_string("a"), &inst, chrono::Utc::now()).unwrap();
        let unblocked = queue.complete(&TaskId::from_string("a")).unwrap();
        assert_eq!(unblocked, vec![TaskId::from_string("b")]);
        assert_eq!(queue.eligible().iter().map(|t| t.id.to_string()).collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn fail_cascades_to_dependents() {
        let queue = TaskQueue::new(None);
        queue.seed([task("a", &[]), task("b", &["a"]), task("c", &["b"])]);
        let failed = queue.fail(&TaskId::from_string("a"), "boom").unwrap();
        assert_eq!(failed.len(), 3);
        assert!(matches!(queue.get(&TaskId::from_string("c")).unwrap().status, TaskStatus::Failed { .. }));
    }

    #[test]
    fn complete_is_noop_on_terminal_task() {
        let queue = TaskQueue::new(None);
        queue.seed([task("a", &[])]);
        queue.complete(&TaskId::from_string("a")).unwrap();
        let unblocked = queue.complete(&TaskId::from_string("a")).unwrap();
        assert!(unblocked.is_empty());
    }

    #[test]
    fn reclaim_stale_returns_claim_to_pending() {
        let queue = TaskQueue::new(None);
        queue.seed([task("a", &[])]);
        let clock = FakeClock::new();
        let inst = InstanceId::from_string("inst-1");
        queue.mark_claimed(&TaskId::from_string("a"), &inst, clock.now()).unwrap();

        clock.advance(std::time::Duration::from_secs(400));
        let reclaimed = queue.reclaim_stale(&clock, chrono::Duration::minutes(5));
        assert_eq!(reclaimed, vec![TaskId::from_string("a")]);
        assert_eq!(queue.get(&TaskId::from_string("a")).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn claiming_nonexistent_task_fails() {
        let queue = TaskQueue::new(None);
        let inst = InstanceId::from_string("inst-1");
        let err = queue.mark_claimed(&TaskId::from_string("ghost"), &inst, chrono::Utc::now()).unwrap_err();
        assert!(err.sentinel() == Some(loom_core::error::Sentinel::NotFound));
    }
}
