// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! loom-core: foundational types for the Loom coordination core —
//! IDs, clock, error taxonomy, the data model (message/task/claim/queue
//! status/scaling decision), and the synchronous event bus every other
//! component publishes to.

pub mod macros;

pub mod bus;
pub mod clock;
pub mod error;
pub mod id;
pub mod ids;
pub mod message;
pub mod queue_status;
pub mod scaling;
pub mod task;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use bus::{Event, EventBus, SubscriptionId};
pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{DomainError, IoErrorMessage, LoomError, Result, SemanticError, Sentinel, Severity};
pub use id::{short, IdBuf};
pub use ids::{debate_id, generate_message_id, DebateId, InstanceId, MessageId, TaskId, BROADCAST_RECIPIENT};
pub use message::{Message, MessageType};
pub use queue_status::QueueStatus;
pub use scaling::{ScalingAction, ScalingDecision};
pub use task::{Claim, ResourceHints, Task, TaskStatus, TaskStatusKind};
