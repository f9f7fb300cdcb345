// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! loom-engine: task admission and dispatch, file-lock arbitration,
//! adaptive load balancing, scaling policy, discovery/warning propagation,
//! debate sessions, and post-hoc context gathering — everything that
//! operates over `loom-core`'s data model and the shared event bus.

pub mod context;
pub mod debate;
pub mod filelock;
pub mod gate;
pub mod gatherer;
pub mod lead;
pub mod queue;
pub mod scaling;

pub use context::{ContextFilter, ContextPropagator};
pub use debate::{DebateSession, DebateState};
pub use filelock::FileLockRegistry;
pub use gate::{default_approval_predicate, ApprovalPredicate, TaskGate};
pub use gatherer::{ContextGatherer, GatheredContext, SynthesisRecord, TaskCompletionRecord};
pub use lead::{AdaptiveLead, RebalanceHandle};
pub use queue::TaskQueue;
pub use scaling::{ScalingMonitor, ScalingPolicy, ScalingPolicyConfig};
