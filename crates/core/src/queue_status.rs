// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue status snapshot — emitted on every task lifecycle transition to
//! drive the scaling policy.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub claimed: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueStatus {
    pub fn total(&self) -> usize {
        self.pending + self.claimed + self.running + self.completed + self.failed
    }
}
