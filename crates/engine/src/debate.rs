// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-participant debate session: `pending` → `active` → `resolved`, with
//! every exchange sent through the mailbox as a targeted message.

use loom_core::bus::{Event, EventBus};
use loom_core::error::{LoomError, Result};
use loom_core::{DebateId, InstanceId, Message, MessageType};
use loom_mailbox::Mailbox;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebateState {
    Pending,
    Active,
    Resolved,
}

struct Inner {
    state: DebateState,
    rounds: u32,
    messages: Vec<Message>,
}

/// A single two-participant debate, identified by [`DebateId`]. Exchanges
/// are delivered as targeted mailbox messages between the two participants;
/// `Resolve` additionally publishes `debate.resolved` on the bus.
pub struct DebateSession {
    id: DebateId,
    participants: (InstanceId, InstanceId),
    topic: String,
    mailbox: Mailbox,
    bus: Option<EventBus>,
    inner: Mutex<Inner>,
}

impl DebateSession {
    pub fn new(participants: (InstanceId, InstanceId), topic: impl Into<String>, mailbox: Mailbox, bus: Option<EventBus>) -> Self {
        let id = loom_core::debate_id(&participants.0, &participants.1);
        let topic = topic.into();
        if bus.is_some() {
            Self::announce_started(&bus, &id, &participants, &topic);
        }
        Self { id, participants, topic, mailbox, bus, inner: Mutex::new(Inner { state: DebateState::Pending, rounds: 0, messages: Vec::new() }) }
    }

    fn announce_started(bus: &Option<EventBus>, id: &DebateId, participants: &(InstanceId, InstanceId), topic: &str) {
        if let Some(bus) = bus {
            bus.publish(Event::new(
                "debate.started",
                serde_json::json!({
                    "debateId": id.as_str(),
                    "participants": [participants.0.as_str(), participants.1.as_str()],
                    "topic": topic,
                }),
            ));
        }
    }

    pub fn id(&self) -> &DebateId {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> DebateState {
        self.inner.lock().state
    }

    pub fn rounds(&self) -> u32 {
        self.inner.lock().rounds
    }

    /// Validates `from` is one of the two participants and returns the
    /// other one. Non-participants get a clear validation error.
    pub fn opponent(&self, from: &InstanceId) -> Result<InstanceId> {
        if *from == self.participants.0 {
            Ok(self.participants.1.clone())
        } else if *from == self.participants.1 {
            Ok(self.participants.0.clone())
        } else {
            Err(LoomError::validation("from", format!("{from} is not a participant in debate {}", self.id)))
        }
    }

    /// Rejects if the debate is already `resolved`. `pending` → `active` on
    /// the first challenge.
    pub fn challenge(&self, from: InstanceId, body: impl Into<String>, metadata: Option<HashMap<String, serde_json::Value>>) -> Result<Message> {
        let opponent = self.opponent(&from)?;
        let round = {
            let mut inner = self.inner.lock();
            if inner.state == DebateState::Resolved {
                return Err(LoomError::validation("state", "debate is already resolved"));
            }
            inner.state = DebateState::Active;
            inner.rounds + 1
        };
        self.send(from, opponent, MessageType::Challenge, body, metadata, round)
    }

    /// Rejects unless the debate is `active`.
    pub fn defend(&self, from: InstanceId, body: impl Into<String>, metadata: Option<HashMap<String, serde_json::Value>>) -> Result<Message> {
        let opponent = self.opponent(&from)?;
        let round = {
            let mut inner = self.inner.lock();
            if inner.state != DebateState::Active {
                return Err(LoomError::validation("state", "debate is not active"));
            }
            inner.rounds += 1;
            inner.rounds
        };
        self.send(from, opponent, MessageType::Defense, body, metadata, round)
    }

    /// Rejects unless the debate is `active`. Transitions to `resolved` and
    /// publishes `debate.resolved` carrying the final round count.
    pub fn resolve(&self, from: InstanceId, body: impl Into<String>) -> Result<Message> {
        let opponent = self.opponent(&from)?;
        let rounds = {
            let mut inner = self.inner.lock();
            if inner.state != DebateState::Active {
                return Err(LoomError::validation("state", "debate is not active"));
            }
            inner.state = DebateState::Resolved;
            inner.rounds
        };
        let message = self.send(from, opponent, MessageType::Consensus, body, None, rounds)?;
        if let Some(bus) = &self.bus {
            bus.publish(Event::new(
                "debate.resolved",
                serde_json::json!({ "debateId": self.id.as_str(), "rounds": rounds }),
            ));
        }
        Ok(message)
    }

    /// A defensive copy of the ordered exchange so far.
    pub fn messages(&self) -> Vec<Message> {
        self.inner.lock().messages.clone()
    }

    fn send(
        &self,
        from: InstanceId,
        to: InstanceId,
        kind: MessageType,
        body: impl Into<String>,
        metadata: Option<HashMap<String, serde_json::Value>>,
        round: u32,
    ) -> Result<Message> {
        let mut meta = metadata.unwrap_or_default();
        meta.insert("debate_id".to_string(), serde_json::json!(self.id.as_str()));
        meta.insert("round".to_string(), serde_json::json!(round));

        let message = Message::new(from, to, kind, body)?.with_metadata(meta);
        let stored = self.mailbox.send(message)?;
        self.inner.lock().messages.push(stored.clone());
        Ok(stored)
    }
}
