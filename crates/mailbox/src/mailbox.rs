// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! High-level mailbox: send/receive/watch over the [`MailboxStore`],
//! optionally publishing to an [`EventBus`] on every successful send.

use crate::store::MailboxStore;
use loom_core::bus::{Event, EventBus};
use loom_core::error::Result;
use loom_core::{InstanceId, Message};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Mailbox configuration: an optional event bus and the watcher poll
/// interval (defaults to 500ms).
pub struct MailboxConfig {
    pub bus: Option<EventBus>,
    pub poll_interval: Duration,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self { bus: None, poll_interval: DEFAULT_POLL_INTERVAL }
    }
}

#[derive(Clone)]
pub struct Mailbox {
    store: Arc<MailboxStore>,
    bus: Option<EventBus>,
    poll_interval: Duration,
}

impl Mailbox {
    pub fn new(store: MailboxStore, config: MailboxConfig) -> Self {
        Self { store: Arc::new(store), bus: config.bus, poll_interval: config.poll_interval }
    }

    /// Sends a message, delegating to the store, then — if a bus is
    /// attached — publishes `mailbox.message` after the append succeeds.
    pub fn send(&self, message: Message) -> Result<Message> {
        let stored = self.store.send(message)?;
        if let Some(bus) = &self.bus {
            bus.publish(Event::new(
                "mailbox.message",
                serde_json::json!({
                    "from": stored.from.as_str(),
                    "to": stored.to.as_str(),
                    "messageType": stored.kind.to_string(),
                    "body": stored.body,
                    "timestamp": stored.timestamp,
                }),
            ));
        }
        Ok(stored)
    }

    /// Equivalent to `ReadAll`: broadcast + targeted messages for
    /// `instance`, sorted by timestamp ascending.
    pub fn receive(&self, instance: &InstanceId) -> Result<Vec<Message>> {
        self.store.read_all(instance)
    }

    /// Starts a background watcher for `instance`.
    ///
    /// Takes an initial-count snapshot *synchronously* (before this
    /// function returns) so any `send` issued after `watch` returns is
    /// guaranteed to be delivered to `handler`. Previously-existing
    /// messages are never delivered. The returned [`WatchHandle`] cancels
    /// and joins the background task.
    pub fn watch<F>(&self, instance: InstanceId, handler: F) -> Result<WatchHandle>
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        let initial = self.store.read_all(&instance)?;
        let high_water = Arc::new(AtomicU64::new(initial.len() as u64));
        let consecutive_errors = Arc::new(AtomicU64::new(0));

        let store = self.store.clone();
        let poll_interval = self.poll_interval;
        let token = CancellationToken::new();
        let task_token = token.clone();

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }

                match store.read_all(&instance) {
                    Ok(messages) => {
                        consecutive_errors.store(0, Ordering::SeqCst);
                        let mark = high_water.load(Ordering::SeqCst) as usize;
                        if messages.len() > mark {
                            for message in &messages[mark..] {
                                handler(message.clone());
                            }
                            high_water.store(messages.len() as u64, Ordering::SeqCst);
                        }
                    }
                    Err(e) => {
                        // Re-delivers existing messages on the next
                        // successful read rather than silently losing them.
                        consecutive_errors.fetch_add(1, Ordering::SeqCst);
                        tracing::warn!(error = %e, "mailbox watcher read failed, will retry");
                    }
                }
            }
        });

        Ok(WatchHandle { token, join })
    }
}

/// Handle returned by [`Mailbox::watch`]. Dropping it leaves the watcher
/// running; call [`WatchHandle::cancel`] to stop and join it.
pub struct WatchHandle {
    token: CancellationToken,
    join: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    /// Signals the watcher to stop and blocks (via `.await`) until it has
    /// exited.
    pub async fn cancel(self) {
        self.token.cancel();
        let _ = self.join.await;
    }
}
