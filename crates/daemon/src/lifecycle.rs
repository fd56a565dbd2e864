// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon boot and shutdown (§2 system overview, §4.6 reconciliation),
//! grounded on the teacher's `lifecycle::startup` shape: acquire an
//! exclusive lock file first, create the on-disk layout, replay durable
//! state, reconcile worktrees against it, then wire and start every
//! component's run loop.

use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use delegate_adapters::{AgentAdapter, FakeAgentAdapter};
use delegate_bus::MessageBus;
use delegate_core::SystemClock;
use delegate_events::EventBus;
use delegate_merge::MergeWorker;
use delegate_resources::{reconcile, ResourceManager};
use delegate_scheduler::TurnScheduler;
use delegate_store::Store;
use delegate_workflow::WorkflowEngine;
use fs2::FileExt;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("another delegate daemon already holds the lock at {0}")]
    AlreadyRunning(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    #[error(transparent)]
    Store(#[from] delegate_store::StoreError),
    #[error(transparent)]
    Resource(#[from] delegate_resources::ResourceError),
}

/// The state home's fixed layout under one root directory (§6 "Persisted
/// state layout"), mirroring the teacher's `Config` path fields.
#[derive(Debug, Clone)]
pub struct Paths {
    pub state_dir: PathBuf,
    pub lock_path: PathBuf,
    pub log_dir: PathBuf,
    pub store_dir: PathBuf,
    pub resources_dir: PathBuf,
}

impl Paths {
    /// Fixed paths under `$XDG_STATE_HOME/delegate` (or
    /// `~/.local/state/delegate`), matching the teacher's single
    /// user-level daemon convention — one daemon serves every team.
    pub fn load() -> Result<Self, DaemonError> {
        let state_dir = dirs::state_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
            .unwrap_or_else(|| PathBuf::from(".local/state"))
            .join("delegate");
        Ok(Self::under(state_dir))
    }

    pub fn under(state_dir: PathBuf) -> Self {
        Self {
            lock_path: state_dir.join("daemon.lock"),
            log_dir: state_dir.join("logs"),
            store_dir: state_dir.join("store"),
            resources_dir: state_dir.join("resources"),
            state_dir,
        }
    }
}

/// Every long-lived component, wired and ready to run. Held for the
/// process lifetime; dropping `shutdown_tx` (via [`Daemon::shutdown`])
/// signals every spawned run loop to exit.
pub struct Daemon {
    pub store: Arc<Store>,
    pub events: Arc<EventBus>,
    pub resources: Arc<ResourceManager>,
    pub bus: Arc<MessageBus<SystemClock>>,
    pub workflow: Arc<WorkflowEngine>,
    pub merge: Arc<MergeWorker>,
    pub scheduler: Arc<TurnScheduler<SystemClock>>,
    shutdown_tx: watch::Sender<bool>,
    // Held only to keep the lock until the process exits; never read.
    #[allow(dead_code)]
    lock_file: File,
}

impl Daemon {
    /// Acquire the lock, open durable state, reconcile worktrees, wire
    /// every component, and spawn their run loops. Boot order follows §2:
    /// Store, EventBus, ResourceManager, MessageBus, then the
    /// WorkflowEngine/MergeWorker pair (constructed in the order forced by
    /// their mutual reference — see `delegate_workflow::WorkflowEngine::set_merge_queue`),
    /// then TurnScheduler.
    pub async fn start(paths: &Paths, config: Config, adapter: Arc<dyn AgentAdapter>) -> Result<Self, DaemonError> {
        std::fs::create_dir_all(&paths.state_dir)?;
        let lock_file = acquire_lock(&paths.lock_path)?;

        let store = Arc::new(Store::open(&paths.store_dir)?);
        let events = Arc::new(EventBus::new());
        let resources = Arc::new(ResourceManager::open(&paths.resources_dir)?);
        let bus = MessageBus::new(store.clone());

        let report = reconcile::reconcile(&resources, &store).await;
        info!(pruned = report.pruned.len(), recreated = report.recreated.len(), errored = report.errored.len(), "startup reconciliation complete");
        let now_ms = {
            use delegate_core::Clock;
            SystemClock.epoch_ms()
        };
        for task_id in &report.errored {
            for team_id in store.list_teams() {
                if store.get_task(team_id, *task_id).is_ok() {
                    if let Err(e) = store.transition_task(team_id, *task_id, delegate_core::TaskStatus::Error, now_ms, None) {
                        warn!(%team_id, %task_id, error = %e, "failed to move unrecoverable task to error");
                    }
                    break;
                }
            }
        }

        let workflow = Arc::new(WorkflowEngine::new(store.clone(), resources.clone(), events.clone()).with_review_attempt_cap(config.review_attempt_cap));
        let merge = MergeWorker::new(store.clone(), resources.clone(), events.clone(), workflow.clone(), config.test_commands.clone(), config.default_test_command.clone());
        workflow.set_merge_queue(merge.queue_sender());

        let scheduler = TurnScheduler::with_clock(store.clone(), bus.clone(), events.clone(), workflow.clone(), adapter, SystemClock, config.scheduler_config());
        scheduler.attach_to_bus();
        for team_id in store.list_teams() {
            scheduler.watch_team(team_id);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(bus.clone().run(shutdown_rx.clone()));
        tokio::spawn(merge.clone().run(shutdown_rx.clone()));

        Ok(Self { store, events, resources, bus, workflow, merge, scheduler, shutdown_tx, lock_file })
    }

    pub fn start_with_fake_adapter(paths: &Paths, config: Config) -> impl std::future::Future<Output = Result<Self, DaemonError>> + '_ {
        Self::start(paths, config, Arc::new(FakeAgentAdapter::new()))
    }

    /// Signal every spawned run loop to exit. Does not wait for them to
    /// finish — callers that need a clean drain should `tokio::join!` on
    /// the `JoinHandle`s `start` would need to return for that; this
    /// daemon's loops are idempotent to abandon mid-iteration since the
    /// Store's WAL is the durability boundary, not the loop's progress.
    pub fn shutdown(&self) {
        info!("daemon shutdown requested");
        let _ = self.shutdown_tx.send(true);
        for team_id in self.store.list_teams() {
            let _ = self.store.mark_shutdown(team_id);
        }
    }
}

fn acquire_lock(lock_path: &Path) -> Result<File, DaemonError> {
    let lock_file = std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(lock_path)?;
    lock_file.try_lock_exclusive().map_err(|_| DaemonError::AlreadyRunning(lock_path.to_path_buf()))?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    Ok(lock_file)
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
