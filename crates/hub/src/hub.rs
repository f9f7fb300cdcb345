// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition root: wires every component together and owns the async
//! `Start`/`Stop` lifecycle.

use crate::config::HubConfig;
use loom_core::bus::EventBus;
use loom_core::clock::SystemClock;
use loom_core::error::{LoomError, Result};
use loom_core::InstanceId;
use loom_engine::{AdaptiveLead, ContextGatherer, ContextPropagator, FileLockRegistry, RebalanceHandle, ScalingMonitor, ScalingPolicy, TaskGate, TaskQueue};
use loom_mailbox::{Mailbox, MailboxConfig, MailboxStore};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a caller needs to drive the coordination core for one
/// session: the bus, the gate, the lead, the file-lock registry, the
/// mailbox-backed context propagator, the scaling monitor, and the context
/// gatherer, all wired together from one [`HubConfig`].
pub struct Hub {
    bus: EventBus,
    gate: TaskGate<SystemClock>,
    lead: Arc<AdaptiveLead<SystemClock>>,
    filelock: FileLockRegistry,
    mailbox: Mailbox,
    context: ContextPropagator,
    scaling_monitor: Arc<ScalingMonitor<SystemClock>>,
    gatherer: ContextGatherer,
    rebalance_interval: chrono::Duration,
    started: AtomicBool,
    monitor_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    rebalance_handle: Mutex<Option<RebalanceHandle>>,
}

impl Hub {
    /// Validates `config`, then constructs every subcomponent with the
    /// shared bus. Does not start anything — call [`Hub::start`] to wire
    /// subscriptions and begin background tasks.
    pub fn new(config: HubConfig) -> Result<Self> {
        config.validate()?;

        let bus = EventBus::new();
        let clock = SystemClock;

        let queue = TaskQueue::new(Some(bus.clone()));
        queue.seed(config.plan);

        let mut gate = TaskGate::new(queue, Some(bus.clone()), clock, config.stale_claim_timeout);
        if let Some(approval) = config.approval {
            gate = gate.with_approval_predicate(approval);
        }

        let lead = AdaptiveLead::new(gate.clone(), bus.clone(), config.max_tasks_per_instance);
        let filelock = FileLockRegistry::new(Some(bus.clone()));

        let store = MailboxStore::new(&config.session_root);
        let mailbox = Mailbox::new(store, MailboxConfig { bus: Some(bus.clone()), poll_interval: config.poll_interval });
        let context = ContextPropagator::new(mailbox.clone(), bus.clone());

        let policy = ScalingPolicy::new(config.scaling, SystemClock);
        let scaling_monitor = Arc::new(ScalingMonitor::new(policy, bus.clone()));
        scaling_monitor.set_current_instances(config.initial_instance_count);

        let gatherer = ContextGatherer::new(config.session_root.join("workspaces"));

        Ok(Self {
            bus,
            gate,
            lead,
            filelock,
            mailbox,
            context,
            scaling_monitor,
            gatherer,
            rebalance_interval: config.rebalance_interval,
            started: AtomicBool::new(false),
            monitor_task: Mutex::new(None),
            rebalance_handle: Mutex::new(None),
        })
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn gate(&self) -> &TaskGate<SystemClock> {
        &self.gate
    }

    /// Surfaces the next eligible task to `instance`, refusing if the
    /// adaptive lead's per-instance cap (`maxTasksPerInstance`) is already
    /// reached. This is the admission-controlled entry point callers should
    /// use instead of [`Hub::gate`] directly.
    pub fn claim_next(&self, instance: &InstanceId) -> Result<Option<loom_core::Task>> {
        if !self.lead.can_claim(instance) {
            tracing::debug!(instance = %instance, "claim refused, instance at cap");
            return Ok(None);
        }
        self.gate.claim_next(instance)
    }

    pub fn lead(&self) -> &Arc<AdaptiveLead<SystemClock>> {
        &self.lead
    }

    pub fn filelock(&self) -> &FileLockRegistry {
        &self.filelock
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn context(&self) -> &ContextPropagator {
        &self.context
    }

    pub fn gatherer(&self) -> &ContextGatherer {
        &self.gatherer
    }

    /// Forbids double-start. The lead's four subscriptions are already in
    /// place as of [`Hub::new`] (`AdaptiveLead::new` subscribes
    /// synchronously); this spawns the scaling monitor in the background
    /// and awaits its subscription becoming observable before returning, so
    /// a caller that publishes a `queue.depth_changed` event immediately
    /// after `start` returns is guaranteed the monitor sees it. It then
    /// spawns the rebalance ticker unless `rebalance_interval` is negative.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(LoomError::validation("hub", "already started"));
        }

        let monitor = self.scaling_monitor.clone();
        let token = CancellationToken::new();
        let monitor_token = token.clone();
        let join = tokio::spawn(async move { monitor.start(monitor_token).await });
        *self.monitor_task.lock() = Some(join);

        while self.scaling_monitor.subscription_count() == 0 {
            tokio::task::yield_now().await;
        }

        if self.rebalance_interval >= chrono::Duration::zero() {
            let interval = self.rebalance_interval.to_std().map_err(|_| LoomError::validation("rebalance_interval", "out of range"))?;
            *self.rebalance_handle.lock() = Some(self.lead.spawn_rebalance_ticker(interval));
        }

        Ok(())
    }

    /// Idempotent; safe to call before [`Hub::start`]. Tears down the
    /// lead's subscriptions, stops the scaling monitor, and cancels the
    /// rebalance ticker.
    pub async fn stop(&self) {
        if let Some(handle) = self.rebalance_handle.lock().take() {
            handle.cancel().await;
        }

        self.scaling_monitor.stop();
        if let Some(join) = self.monitor_task.lock().take() {
            let _ = join.await;
        }

        self.lead.unsubscribe_all();
        self.started.store(false, Ordering::SeqCst);
    }

    /// Releases every file lock and drops per-instance load tracking for a
    /// terminating instance.
    pub fn retire_instance(&self, instance: &InstanceId) {
        self.filelock.release_all(instance);
    }
}
