// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task identifier, lifecycle state, and claim bookkeeping.

use crate::ids::{InstanceId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle state of a task. Transitions only move forward:
/// `Pending` → `Claimed` → `Running` → {`Completed`, `Failed`}.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Claimed { by: InstanceId, at: DateTime<Utc> },
    Running,
    Completed,
    Failed { reason: String },
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed { .. })
    }

    pub fn kind(&self) -> TaskStatusKind {
        match self {
            TaskStatus::Pending => TaskStatusKind::Pending,
            TaskStatus::Claimed { .. } => TaskStatusKind::Claimed,
            TaskStatus::Running => TaskStatusKind::Running,
            TaskStatus::Completed => TaskStatusKind::Completed,
            TaskStatus::Failed { .. } => TaskStatusKind::Failed,
        }
    }
}

/// Tag-only variant of [`TaskStatus`] for counting/matching without the
/// associated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatusKind {
    Pending,
    Claimed,
    Running,
    Completed,
    Failed,
}

crate::simple_display! {
    TaskStatusKind {
        Pending => "pending",
        Claimed => "claimed",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
    }
}

/// Resource hints attached to a task — paths the planner expects the task
/// to touch, surfaced to the file-lock registry and to telemetry; purely
/// advisory, never enforced by the gate itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHints {
    #[serde(default)]
    pub files: Vec<String>,
}

/// A task in the planned DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    /// Higher runs first.
    pub priority: i64,
    pub dependencies: Vec<TaskId>,
    pub requires_approval: bool,
    #[serde(default)]
    pub resource_hints: Option<ResourceHints>,
    pub status: TaskStatus,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            priority: 0,
            dependencies: Vec::new(),
            requires_approval: false,
            resource_hints: None,
            status: TaskStatus::Pending,
        }
    }

    crate::setters! {
        into { description: String }
        set { priority: i64, requires_approval: bool, dependencies: Vec<TaskId> }
        option { resource_hints: ResourceHints }
    }

    /// Depth of this task in the dependency graph among the given
    /// completed-dependency-depth map; used by the gate's tie-break rule
    /// (shallowest first).
    pub fn dependency_depth(&self, depths: &HashMap<TaskId, usize>) -> usize {
        self.dependencies
            .iter()
            .map(|d| depths.get(d).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0)
    }
}

/// The association (task ID, instance ID, acquired-at timestamp) — the
/// claim half of `Task::status`'s `Claimed` variant, surfaced separately
/// for staleness checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub task_id: TaskId,
    pub instance_id: InstanceId,
    pub acquired_at: DateTime<Utc>,
}

impl Claim {
    /// A claim is stale if `now - acquired_at > stale_claim_timeout` and
    /// the task has not advanced to `Running`.
    pub fn is_stale(&self, now: DateTime<Utc>, stale_claim_timeout: chrono::Duration) -> bool {
        now - self.acquired_at > stale_claim_timeout
    }
}
