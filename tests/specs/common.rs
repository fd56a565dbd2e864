// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the cross-crate end-to-end scenarios (§8). Each
//! scenario wires the same component set `delegate-daemon::lifecycle`
//! wires at boot — Store, EventBus, ResourceManager, MessageBus,
//! WorkflowEngine, MergeWorker, TurnScheduler — directly rather than
//! through `Daemon::start`, so a scenario can drive individual agents'
//! turns with a scripted [`FakeAgentAdapter`] instead of a real one.

#![allow(dead_code)]

use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use delegate_adapters::FakeAgentAdapter;
use delegate_bus::MessageBus;
use delegate_core::{MemberKind, MemberRole, SystemClock, Seniority, TaskId, TaskStatus, TeamId};
use delegate_events::EventBus;
use delegate_merge::MergeWorker;
use delegate_resources::ResourceManager;
use delegate_scheduler::{SchedulerConfig, TurnScheduler};
use delegate_store::Store;
use delegate_workflow::WorkflowEngine;
use tempfile::TempDir;

pub fn run_git(dir: &Path, args: &[&str]) {
    let status = Command::new("git").args(args).current_dir(dir).status().expect("spawn git");
    assert!(status.success(), "git {args:?} failed in {dir:?}");
}

/// A single-commit repo with `main` as its default branch.
pub fn init_repo(dir: &Path) {
    run_git(dir, &["init", "-q", "-b", "main"]);
    run_git(dir, &["config", "user.email", "test@example.com"]);
    run_git(dir, &["config", "user.name", "Test"]);
    std::fs::write(dir.join("README.md"), "hello\n").expect("write file");
    run_git(dir, &["add", "."]);
    run_git(dir, &["commit", "-q", "-m", "initial"]);
}

pub fn commit_file(dir: &Path, name: &str, contents: &str, message: &str) {
    std::fs::write(dir.join(name), contents).expect("write file");
    run_git(dir, &["add", "."]);
    run_git(dir, &["commit", "-q", "-m", message]);
}

/// Every long-lived component a scenario needs, wired the way
/// `delegate_daemon::lifecycle::Daemon::start` wires them (§2 boot
/// order), minus the daemon binary's lock file and logging.
pub struct Harness {
    pub _home: TempDir,
    pub _store_dir: TempDir,
    pub store: Arc<Store>,
    pub events: Arc<EventBus>,
    pub resources: Arc<ResourceManager>,
    pub workflow: Arc<WorkflowEngine>,
    pub merge: Arc<MergeWorker>,
    pub scheduler: Arc<TurnScheduler<SystemClock>>,
    pub adapter: FakeAgentAdapter,
    pub team_id: TeamId,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
}

impl Harness {
    /// Signal the spawned MergeWorker run loop to stop. Scenarios that
    /// don't restart a fresh harness can call this for a tidy exit; most
    /// just let the process-level test end and drop everything.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Build a harness with `team_name`'s team, one repo per `(name, path)`
/// pair registered with the ResourceManager, and the given members
/// `(name, kind, role)` added. Spawns the MergeWorker's run loop so
/// tasks that reach `merging` actually get processed without a scenario
/// having to call `merge.process` by hand.
pub fn build_harness(team_name: &str, repos: &[(&str, &Path)], members: &[(&str, MemberKind, MemberRole)]) -> Harness {
    let home = TempDir::new().expect("tempdir");
    let store_dir = TempDir::new().expect("tempdir");

    let resources = Arc::new(ResourceManager::open(home.path()).expect("open resources"));
    for (name, path) in repos {
        resources.register_repo(*name, path.to_path_buf()).expect("register repo");
    }
    let store = Arc::new(Store::open(store_dir.path()).expect("open store"));
    let events = Arc::new(EventBus::new());
    let bus = MessageBus::new(store.clone());

    let workflow = Arc::new(WorkflowEngine::new(store.clone(), resources.clone(), events.clone()));
    let merge = MergeWorker::new(store.clone(), resources.clone(), events.clone(), workflow.clone(), std::collections::HashMap::new(), "true");
    workflow.set_merge_queue(merge.queue_sender());

    let team = store.create_team(team_name, "ship working software", 1_000_000).expect("create team");
    for (name, kind, role) in members {
        store.add_member(team.team_id, *name, *kind, *role, Seniority::Senior).expect("add member");
    }

    let adapter = FakeAgentAdapter::new();
    let config = SchedulerConfig { parallelism_cap: 8, turn_cancel_grace: Duration::from_millis(200), quarantine_threshold: 3 };
    let scheduler = TurnScheduler::with_clock(store.clone(), bus.clone(), events.clone(), workflow.clone(), Arc::new(adapter.clone()), SystemClock, config);
    scheduler.attach_to_bus();
    scheduler.watch_team(team.team_id);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(bus.clone().run(shutdown_rx.clone()));
    tokio::spawn(merge.clone().run(shutdown_rx));

    Harness { _home: home, _store_dir: store_dir, store, events, resources, workflow, merge, scheduler, adapter, team_id: team.team_id, shutdown_tx }
}

/// Poll `f` until it returns `true` or `timeout` elapses.
pub async fn wait_for(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if f() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub async fn wait_for_status(store: &Store, team_id: TeamId, task_id: TaskId, want: TaskStatus, timeout: Duration) -> bool {
    wait_for(timeout, || store.get_task(team_id, task_id).map(|t| t.status == want).unwrap_or(false)).await
}

pub const SPEC_WAIT: Duration = Duration::from_secs(10);
