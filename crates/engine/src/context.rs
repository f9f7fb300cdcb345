// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Discovery/warning broadcasts and formatted context for prompt injection
//! into downstream worker agents.

use loom_core::bus::{Event, EventBus};
use loom_core::error::Result;
use loom_core::{InstanceId, Message, MessageType};
use loom_mailbox::{Mailbox, WatchHandle};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Filters applied by [`ContextPropagator::get_context_for_instance`].
#[derive(Debug, Clone, Default)]
pub struct ContextFilter {
    pub types: Option<HashSet<MessageType>>,
    /// Keep only messages strictly after this timestamp.
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    pub sender: Option<InstanceId>,
    /// Keep at most this many messages, preferring the most recent.
    pub max_count: Option<usize>,
}

/// Composes a mailbox and a bus to broadcast discoveries/warnings and to
/// render a human-readable context block for injection into a worker's
/// prompt.
pub struct ContextPropagator {
    mailbox: Mailbox,
    bus: EventBus,
}

impl ContextPropagator {
    pub fn new(mailbox: Mailbox, bus: EventBus) -> Self {
        Self { mailbox, bus }
    }

    pub fn share_discovery(
        &self,
        from: InstanceId,
        body: impl Into<String>,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<Message> {
        self.broadcast(from, MessageType::Discovery, body, metadata)
    }

    pub fn share_warning(&self, from: InstanceId, body: impl Into<String>) -> Result<Message> {
        self.broadcast(from, MessageType::Warning, body, None)
    }

    fn broadcast(
        &self,
        from: InstanceId,
        kind: MessageType,
        body: impl Into<String>,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<Message> {
        let mut message = Message::new(from.clone(), InstanceId::from_string(loom_core::BROADCAST_RECIPIENT), kind, body)?;
        if let Some(metadata) = metadata {
            message = message.with_metadata(metadata);
        }
        let stored = self.mailbox.send(message)?;
        // instanceCount is always 0 — broadcast senders do not know reader
        // count; downstream code must not depend on this field.
        self.bus.publish(Event::new(
            "context.propagated",
            serde_json::json!({ "from": from.as_str(), "instanceCount": 0, "messageType": kind.to_string() }),
        ));
        Ok(stored)
    }

    /// Reads `instance`'s mailbox, applies `filter`, and renders the result
    /// as a human-readable block grouped by message type, for injection
    /// into a downstream worker's prompt.
    pub fn get_context_for_instance(&self, instance: &InstanceId, filter: &ContextFilter) -> Result<String> {
        let mut messages = self.mailbox.receive(instance)?;

        if let Some(types) = &filter.types {
            messages.retain(|m| types.contains(&m.kind));
        }
        if let Some(since) = filter.since {
            messages.retain(|m| m.timestamp > since);
        }
        if let Some(sender) = &filter.sender {
            messages.retain(|m| &m.from == sender);
        }
        if let Some(max_count) = filter.max_count {
            if messages.len() > max_count {
                messages = messages.split_off(messages.len() - max_count);
            }
        }

        Ok(format_context(&messages))
    }

    pub fn watch<F>(&self, instance: InstanceId, handler: F) -> Result<WatchHandle>
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.mailbox.watch(instance, handler)
    }
}

/// Groups messages by type, in type-name order, each section newest-first
/// message omitted (chronological within the group), for readability.
fn format_context(messages: &[Message]) -> String {
    if messages.is_empty() {
        return String::new();
    }

    let mut groups: BTreeMap<String, Vec<&Message>> = BTreeMap::new();
    for message in messages {
        groups.entry(message.kind.to_string()).or_default().push(message);
    }

    let mut out = String::new();
    for (kind, group) in groups {
        out.push_str(&format!("## {kind}\n"));
        for message in group {
            out.push_str(&format!("- [{}] {}: {}\n", message.timestamp.to_rfc3339(), message.from, message.body));
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_mailbox::{MailboxConfig, MailboxStore};

    fn propagator() -> (tempfile::TempDir, ContextPropagator) {
        let dir = tempfile::tempdir().unwrap();
        let store = MailboxStore::new(dir.path());
        let bus = EventBus::new();
        let mailbox = Mailbox::new(store, MailboxConfig { bus: Some(bus.clone()), poll_interval: std::time::Duration::from_millis(20) });
        (dir, ContextPropagator::new(mailbox, bus))
    }

    #[test]
    fn share_discovery_publishes_context_propagated_with_zero_instance_count() {
        let (_dir, propagator) = propagator();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let s = seen.clone();
        propagator.bus.subscribe("context.propagated", move |e| s.lock().unwrap().push(e.payload.clone()));

        propagator.share_discovery(InstanceId::from_string("inst-1"), "found a bug", None).unwrap();

        let events = seen.lock().unwrap();
        assert_eq!(events[0]["instanceCount"], 0);
        assert_eq!(events[0]["messageType"], "discovery");
    }

    #[test]
    fn context_filters_by_type_sender_and_since() {
        let (_dir, propagator) = propagator();
        let inst_a = InstanceId::from_string("inst-a");
        let inst_b = InstanceId::from_string("inst-b");
        propagator.share_discovery(inst_a.clone(), "from a", None).unwrap();
        propagator.share_warning(inst_b.clone(), "from b").unwrap();

        let filter = ContextFilter { types: Some(HashSet::from([MessageType::Discovery])), ..Default::default() };
        let context = propagator.get_context_for_instance(&InstanceId::from_string("inst-c"), &filter).unwrap();
        assert!(context.contains("from a"));
        assert!(!context.contains("from b"));
    }

    #[test]
    fn empty_context_formats_to_empty_string() {
        let (_dir, propagator) = propagator();
        let context = propagator
            .get_context_for_instance(&InstanceId::from_string("nobody"), &ContextFilter::default())
            .unwrap();
        assert_eq!(context, "");
    }
}
