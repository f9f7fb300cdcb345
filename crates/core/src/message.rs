// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mailbox message type — the unit of inter-instance communication.

use crate::error::{LoomError, Result};
use crate::ids::{generate_message_id, InstanceId, MessageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The closed set of mailbox message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Discovery,
    Claim,
    Release,
    Warning,
    Question,
    Answer,
    Status,
    Challenge,
    Defense,
    Consensus,
}

crate::simple_display! {
    MessageType {
        Discovery => "discovery",
        Claim => "claim",
        Release => "release",
        Warning => "warning",
        Question => "question",
        Answer => "answer",
        Status => "status",
        Challenge => "challenge",
        Defense => "defense",
        Consensus => "consensus",
    }
}

/// A single inter-instance communication, appended immutably to the
/// recipient's mailbox log. Never updated or deleted after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub from: InstanceId,
    pub to: InstanceId,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl Message {
    /// Builds a new message, auto-filling the ID (if the caller leaves it
    /// unset — use [`Message::new`]) and timestamp, and validating that
    /// sender, recipient, and type are all present.
    pub fn new(from: InstanceId, to: InstanceId, kind: MessageType, body: impl Into<String>) -> Result<Self> {
        if from.is_empty() {
            return Err(LoomError::validation("from", "must be non-empty"));
        }
        if to.is_empty() {
            return Err(LoomError::validation("to", "must be non-empty"));
        }
        Ok(Self {
            id: generate_message_id(),
            from,
            to,
            kind,
            body: body.into(),
            timestamp: Utc::now(),
            metadata: None,
        })
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = if metadata.is_empty() { None } else { Some(metadata) };
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.to.as_str() == crate::ids::BROADCAST_RECIPIENT
    }

    /// Validates a message that may have arrived with a zero timestamp or
    /// missing ID (e.g. deserialized from a partially-written record, or
    /// constructed directly rather than through [`Message::new`]),
    /// filling in defaults the way the mailbox store does on `Send`.
    pub fn normalize(mut self) -> Result<Self> {
        if self.from.is_empty() {
            return Err(LoomError::validation("from", "must be non-empty"));
        }
        if self.to.is_empty() {
            return Err(LoomError::validation("to", "must be non-empty"));
        }
        if self.id.is_empty() {
            self.id = generate_message_id();
        }
        if self.timestamp == DateTime::<Utc>::UNIX_EPOCH {
            self.timestamp = Utc::now();
        }
        Ok(self)
    }
}
