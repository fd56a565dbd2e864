// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! delegate-scheduler: the TurnScheduler (§4.3), the concurrency heart of
//! the system. Dispatches a turn whenever a message reaches `delivered`,
//! a task's stage `assign`s to a given agent, or an operator requests one
//! directly; serializes turns per agent while running different agents'
//! turns in parallel up to a global cap; applies the resulting actions
//! through the Store, MessageBus, and WorkflowEngine; and quarantines an
//! agent after three consecutive turn failures.
//!
//! Grounded in the teacher's `engine::executor` shape — a small number of
//! `Arc`-shared collaborators driving independent async workers — adapted
//! from the teacher's job-dispatch domain to this one's per-agent turns.

mod actions;
mod state;
mod turn;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use delegate_adapters::AgentAdapter;
use delegate_bus::{BusError, DeliveryObserver, MessageBus};
use delegate_core::{Clock, SystemClock, TaskId, TeamId};
use delegate_events::{DelegateEvent, EventBus};
use delegate_store::{Store, StoreError};
use delegate_workflow::WorkflowEngine;
use parking_lot::Mutex;
use smol_str::SmolStr;
use tokio::sync::Semaphore;
use tracing::info;

use state::AgentState;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Workflow(#[from] delegate_workflow::WorkflowError),
    #[error("agent adapter failed: {0}")]
    AdapterFailed(String),
}

/// Tunables for the scheduler's concurrency model (§4.3, §5).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Global cap on turns running concurrently across every agent on
    /// every team. Defaults to twice the available parallelism — agent
    /// turns spend most of their wall-clock time waiting on subprocess
    /// and network I/O, not burning CPU, so oversubscribing a little
    /// keeps the host busy without unbounded fan-out.
    pub parallelism_cap: usize,
    /// How long a cancelled turn's adapter call gets to return on its own
    /// before the scheduler hard-aborts the task (§4.3 cancellation).
    pub turn_cancel_grace: Duration,
    /// Consecutive turn failures before an agent is quarantined (§4.3).
    pub quarantine_threshold: u8,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Self {
            parallelism_cap: cores.saturating_mul(2),
            turn_cancel_grace: Duration::from_secs(10),
            quarantine_threshold: 3,
        }
    }
}

/// Dispatches and runs agent turns (§4.3).
///
/// Always held behind an `Arc` (constructed via [`TurnScheduler::new`] /
/// [`TurnScheduler::with_clock`], which return one directly) — turns are
/// driven by `tokio::spawn`'d run loops that need a `'static` handle back
/// to the scheduler, and the `DeliveryObserver` impl recovers that handle
/// from a stored `Weak` reference rather than requiring every caller to
/// thread an `Arc<Self>` through the bus's trait-object callback.
pub struct TurnScheduler<C: Clock = SystemClock> {
    self_ref: Weak<TurnScheduler<C>>,
    store: Arc<Store>,
    bus: Arc<MessageBus<C>>,
    events: Arc<EventBus>,
    workflow: Arc<WorkflowEngine>,
    adapter: Arc<dyn AgentAdapter>,
    clock: C,
    config: SchedulerConfig,
    semaphore: Arc<Semaphore>,
    agents: Mutex<HashMap<(TeamId, SmolStr), Arc<AgentState>>>,
    watched_teams: Mutex<HashSet<TeamId>>,
}

impl TurnScheduler<SystemClock> {
    pub fn new(
        store: Arc<Store>,
        bus: Arc<MessageBus<SystemClock>>,
        events: Arc<EventBus>,
        workflow: Arc<WorkflowEngine>,
        adapter: Arc<dyn AgentAdapter>,
    ) -> Arc<Self> {
        Self::with_clock(store, bus, events, workflow, adapter, SystemClock, SchedulerConfig::default())
    }
}

impl<C: Clock + 'static> TurnScheduler<C> {
    pub fn with_clock(
        store: Arc<Store>,
        bus: Arc<MessageBus<C>>,
        events: Arc<EventBus>,
        workflow: Arc<WorkflowEngine>,
        adapter: Arc<dyn AgentAdapter>,
        clock: C,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        let parallelism_cap = config.parallelism_cap.max(1);
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            store,
            bus,
            events,
            workflow,
            adapter,
            clock,
            config,
            semaphore: Arc::new(Semaphore::new(parallelism_cap)),
            agents: Mutex::new(HashMap::new()),
            watched_teams: Mutex::new(HashSet::new()),
        })
    }

    fn arc(&self) -> Option<Arc<Self>> {
        self.self_ref.upgrade()
    }

    /// Register this scheduler as the bus's delivery observer, so dispatch
    /// trigger (a) — "a message addressed to this agent reached
    /// `delivered`" — fires automatically (§4.3).
    pub fn attach_to_bus(self: &Arc<Self>) {
        self.bus.set_observer(self.clone());
    }

    /// Subscribe to a team's EventBus topic and react to `TaskUpdate`
    /// events whose new stage names an assignee (§4.3 dispatch trigger
    /// (b)). Idempotent: watching an already-watched team is a no-op.
    /// Intended to be called once per team at daemon boot and again
    /// whenever a new team is created.
    pub fn watch_team(self: &Arc<Self>, team_id: TeamId) {
        if !self.watched_teams.lock().insert(team_id) {
            return;
        }
        let (_subscriber_id, mut rx) = self.events.subscribe(team_id);
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let DelegateEvent::TaskUpdate { task_id, .. } = event {
                    this.on_task_update(team_id, task_id);
                }
            }
        });
    }

    fn on_task_update(self: &Arc<Self>, team_id: TeamId, task_id: TaskId) {
        let Ok(task) = self.store.get_task(team_id, task_id) else { return };
        if let Some(assignee) = task.assignee.clone() {
            self.trigger(team_id, assignee);
        }
    }

    /// Dispatch trigger (c): an operator or external integration requests
    /// a turn directly, bypassing message delivery or stage assignment.
    pub fn request_turn(self: &Arc<Self>, team_id: TeamId, agent: impl Into<SmolStr>) {
        self.trigger(team_id, agent.into());
    }

    /// Cancel whichever turn is currently running for `agent`, if any
    /// (§4.3 cancellation). Returns `true` if a running turn was found.
    pub fn request_cancel(&self, team_id: TeamId, agent: &str) -> bool {
        self.cancel_turn(team_id, agent)
    }

    /// Number of turns currently permitted to run concurrently (for
    /// health/metrics reporting).
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl<C: Clock + 'static> DeliveryObserver for TurnScheduler<C> {
    /// Dispatch trigger (a): a message reached `delivered`. Recovers the
    /// `Arc<Self>` this scheduler is always held behind via `self_ref` so
    /// the run loop `trigger` spawns can outlive this synchronous callback.
    fn on_delivered(&self, team_id: TeamId, recipient: &str, _task_id: Option<TaskId>) {
        let Some(this) = self.arc() else { return };
        info!(%team_id, agent = recipient, "message delivered, triggering turn");
        this.trigger(team_id, SmolStr::new(recipient));
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
