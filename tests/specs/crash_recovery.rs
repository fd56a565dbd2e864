// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! §8 scenario 6: the daemon disappears mid-task (no clean shutdown) and
//! restarts against the same state directory. A task that was
//! `in_progress` with a worktree on disk must still have that worktree
//! after restart; a task whose worktree directory went missing along
//! with the crash must come back either recreated from `base_sha` or
//! moved to `error` if that's no longer possible — never left claiming
//! an `in_progress` status with nothing to back it.
//!
//! Built directly on `delegate_daemon::lifecycle::Daemon`, not the
//! lighter harness the other scenarios use, since `Daemon::start`'s
//! reconciliation pass is exactly the behavior under test here.

use delegate_core::{Clock, MemberKind, MemberRole, Priority, Seniority, SystemClock, TaskStatus};
use delegate_daemon::config::Config;
use delegate_daemon::lifecycle::{Daemon, DaemonError, Paths};
use delegate_workflow::{DEFAULT_WORKFLOW_NAME, DEFAULT_WORKFLOW_VERSION};
use tempfile::TempDir;

use crate::common::{commit_file, init_repo};

#[tokio::test]
async fn restart_recreates_worktrees_still_reachable_from_base_sha() {
    let state = TempDir::new().expect("tempdir");
    let repo = TempDir::new().expect("tempdir");
    init_repo(repo.path());
    let paths = Paths::under(state.path().to_path_buf());

    let team_id;
    let task_id;
    {
        let daemon = Daemon::start_with_fake_adapter(&paths, Config::default()).await.expect("first start");
        daemon.resources.register_repo("svc", repo.path().to_path_buf()).expect("register repo");

        let team = daemon.store.create_team("acme", "ship things", 1_000_000).expect("create team");
        team_id = team.team_id;
        daemon.store.add_member(team_id, "alice", MemberKind::Agent, MemberRole::Worker, Seniority::Senior).expect("add member");

        let now_ms = SystemClock.epoch_ms();
        let task = daemon
            .store
            .create_task_deriving_branch(team_id, "acme", "add thing", "desc", vec!["svc".to_string()], DEFAULT_WORKFLOW_NAME, DEFAULT_WORKFLOW_VERSION, Priority::Normal, now_ms)
            .expect("create task");
        task_id = task.id;
        daemon.store.assign_task(team_id, task_id, Some("alice".into())).expect("assign");
        daemon.workflow.advance(team_id, task_id, TaskStatus::InProgress, SystemClock.epoch_ms()).await.expect("advance to in_progress");

        let wt_path = daemon.resources.worktree_path(team_id, task_id, "svc");
        assert!(wt_path.exists(), "worktree should exist before the crash");
        commit_file(&wt_path, "thing.txt", "work in flight\n", "wip");

        // Simulate a crash: no `daemon.shutdown()` call, just drop. The
        // lock file is released when `lock_file` drops with `daemon`.
    }

    let restarted = Daemon::start_with_fake_adapter(&paths, Config::default()).await.expect("restart after crash");

    let task = restarted.store.get_task(team_id, task_id).expect("get task");
    assert_eq!(task.status, TaskStatus::InProgress, "in-flight task survives a crash at its last durable stage");

    let wt_path = restarted.resources.worktree_path(team_id, task_id, "svc");
    assert!(wt_path.exists(), "worktree for an active task is still present (nothing pruned it)");
    assert_eq!(std::fs::read_to_string(wt_path.join("thing.txt")).expect("read file"), "work in flight\n", "uncommitted worktree state is untouched by restart");

    restarted.shutdown();
}

#[tokio::test]
async fn restart_recreates_a_worktree_whose_directory_was_lost_in_the_crash() {
    let state = TempDir::new().expect("tempdir");
    let repo = TempDir::new().expect("tempdir");
    init_repo(repo.path());
    let paths = Paths::under(state.path().to_path_buf());

    let team_id;
    let task_id;
    let wt_path;
    {
        let daemon = Daemon::start_with_fake_adapter(&paths, Config::default()).await.expect("first start");
        daemon.resources.register_repo("svc", repo.path().to_path_buf()).expect("register repo");

        let team = daemon.store.create_team("acme", "ship things", 1_000_000).expect("create team");
        team_id = team.team_id;
        daemon.store.add_member(team_id, "alice", MemberKind::Agent, MemberRole::Worker, Seniority::Senior).expect("add member");

        let now_ms = SystemClock.epoch_ms();
        let task = daemon
            .store
            .create_task_deriving_branch(team_id, "acme", "add thing", "desc", vec!["svc".to_string()], DEFAULT_WORKFLOW_NAME, DEFAULT_WORKFLOW_VERSION, Priority::Normal, now_ms)
            .expect("create task");
        task_id = task.id;
        daemon.store.assign_task(team_id, task_id, Some("alice".into())).expect("assign");
        daemon.workflow.advance(team_id, task_id, TaskStatus::InProgress, SystemClock.epoch_ms()).await.expect("advance to in_progress");

        wt_path = daemon.resources.worktree_path(team_id, task_id, "svc");
        assert!(wt_path.exists());

        // The crash took the worktree directory with it (e.g. a host
        // wiping /tmp) but the repo and the recorded base_sha survive.
        std::fs::remove_dir_all(&wt_path).expect("simulate lost worktree");
    }

    let restarted = Daemon::start_with_fake_adapter(&paths, Config::default()).await.expect("restart after crash");

    assert!(wt_path.exists(), "reconciliation should recreate the worktree from base_sha");
    let task = restarted.store.get_task(team_id, task_id).expect("get task");
    assert_eq!(task.status, TaskStatus::InProgress);

    restarted.shutdown();
}

#[tokio::test]
async fn a_second_daemon_cannot_start_against_a_live_state_dir() {
    let state = TempDir::new().expect("tempdir");
    let paths = Paths::under(state.path().to_path_buf());

    let first = Daemon::start_with_fake_adapter(&paths, Config::default()).await.expect("first start");
    let second = Daemon::start_with_fake_adapter(&paths, Config::default()).await;
    assert!(matches!(second, Err(DaemonError::AlreadyRunning(_))));

    first.shutdown();
}
