// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scaling decision type, produced by the (external-to-core) scaling policy.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingAction {
    ScaleUp,
    ScaleDown,
    None,
}

crate::simple_display! {
    ScalingAction {
        ScaleUp => "scale_up",
        ScaleDown => "scale_down",
        None => "none",
    }
}

/// (action, delta, reason) — the outcome of one scaling policy evaluation.
/// `delta` is signed: positive for scale up, negative for scale down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub action: ScalingAction,
    pub delta: i64,
    pub reason: String,
}

impl ScalingDecision {
    pub fn none(reason: impl Into<String>) -> Self {
        Self { action: ScalingAction::None, delta: 0, reason: reason.into() }
    }

    pub fn scale_up(delta: i64, reason: impl Into<String>) -> Self {
        Self { action: ScalingAction::ScaleUp, delta, reason: reason.into() }
    }

    pub fn scale_down(delta: i64, reason: impl Into<String>) -> Self {
        Self { action: ScalingAction::ScaleDown, delta, reason: reason.into() }
    }

    pub fn is_actionable(&self) -> bool {
        self.action != ScalingAction::None
    }
}
