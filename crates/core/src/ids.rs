// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entity identifiers used across the coordination core.

use std::sync::atomic::{AtomicU64, Ordering};

crate::define_id! {
    /// Identifies a single automated worker executing in an isolated workspace.
    pub struct InstanceId;
}

crate::define_id! {
    /// Identifies a task in the planned DAG.
    pub struct TaskId;
}

crate::define_id! {
    /// Identifies a mailbox message.
    pub struct MessageId;
}

crate::define_id! {
    /// Identifies a two-participant debate session (`debate-A-B`).
    pub struct DebateId;
}

/// The reserved recipient ID meaning "every instance reads this".
pub const BROADCAST_RECIPIENT: &str = "broadcast";

static MESSAGE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a [`MessageId`] combining wall-clock time, process ID, and a
/// monotonic in-process counter so IDs stay unique even when two messages
/// are created within the same millisecond.
pub fn generate_message_id() -> MessageId {
    let millis = chrono::Utc::now().timestamp_millis();
    let pid = std::process::id();
    let seq = MESSAGE_COUNTER.fetch_add(1, Ordering::Relaxed);
    MessageId::from_string(format!("msg-{millis:x}-{pid:x}-{seq:x}"))
}

/// Derives the debate ID for a pair of participants: `debate-A-B`.
pub fn debate_id(a: &InstanceId, b: &InstanceId) -> DebateId {
    DebateId::from_string(format!("debate-{a}-{b}"))
}
