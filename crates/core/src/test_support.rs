// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared proptest strategies for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

pub mod strategies {
    use crate::message::MessageType;
    use proptest::prelude::*;

    /// Short, ID-safe ASCII strings — the shape every caller-supplied
    /// `InstanceId`/`TaskId` actually takes (planner-assigned slugs).
    pub fn arb_id_str() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,31}"
    }

    pub fn arb_message_type() -> impl Strategy<Value = MessageType> {
        prop_oneof![
            Just(MessageType::Discovery),
            Just(MessageType::Claim),
            Just(MessageType::Release),
            Just(MessageType::Warning),
            Just(MessageType::Question),
            Just(MessageType::Answer),
            Just(MessageType::Status),
            Just(MessageType::Challenge),
            Just(MessageType::Defense),
            Just(MessageType::Consensus),
        ]
    }

    /// Arbitrary JSON scalar/collection values for metadata round-trip
    /// testing — deliberately excludes floats wide enough to lose precision
    /// so the round-trip assertion isn't fighting `f64` rounding.
    pub fn arb_metadata_value() -> impl Strategy<Value = serde_json::Value> {
        prop_oneof![
            any::<bool>().prop_map(serde_json::Value::Bool),
            any::<i32>().prop_map(|n| serde_json::json!(n)),
            ".{0,16}".prop_map(serde_json::Value::String),
        ]
    }
}
