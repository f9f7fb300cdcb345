// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validated, builder-style configuration for [`crate::hub::Hub`].

use loom_core::error::{LoomError, Result};
use loom_core::Task;
use loom_engine::{ApprovalPredicate, ScalingPolicyConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Every configurable item the hub needs: scaling policy bounds, max tasks
/// per instance, stale-claim timeout, rebalance interval (negative
/// disables), initial instance count, an optional approval callback, the
/// mailbox poll interval, and the session root directory/plan.
pub struct HubConfig {
    pub session_root: PathBuf,
    pub plan: Vec<Task>,
    pub scaling: ScalingPolicyConfig,
    pub max_tasks_per_instance: usize,
    pub stale_claim_timeout: chrono::Duration,
    /// A negative duration disables the rebalance ticker entirely.
    pub rebalance_interval: chrono::Duration,
    pub initial_instance_count: i64,
    pub approval: Option<ApprovalPredicate>,
    pub poll_interval: Duration,
}

impl HubConfig {
    pub fn new(session_root: impl Into<PathBuf>, plan: Vec<Task>) -> Self {
        Self {
            session_root: session_root.into(),
            plan,
            scaling: ScalingPolicyConfig::default(),
            max_tasks_per_instance: 3,
            stale_claim_timeout: chrono::Duration::minutes(5),
            rebalance_interval: chrono::Duration::seconds(30),
            initial_instance_count: 1,
            approval: None,
            poll_interval: loom_mailbox::DEFAULT_POLL_INTERVAL,
        }
    }

    loom_core::setters! {
        set {
            scaling: ScalingPolicyConfig,
            max_tasks_per_instance: usize,
            stale_claim_timeout: chrono::Duration,
            rebalance_interval: chrono::Duration,
            initial_instance_count: i64,
            poll_interval: Duration,
        }
        option {
            approval: ApprovalPredicate,
        }
    }

    /// Validates the required fields: a non-empty session root and a
    /// non-empty plan. The hub always owns its own bus, so unlike the
    /// original "bus required" check this validation is purely about the
    /// fields a caller actually supplies.
    pub fn validate(&self) -> Result<()> {
        if self.session_root.as_os_str().is_empty() {
            return Err(LoomError::validation("session_root", "must be non-empty"));
        }
        if self.plan.is_empty() {
            return Err(LoomError::validation("plan", "must contain at least one task"));
        }
        Ok(())
    }
}
