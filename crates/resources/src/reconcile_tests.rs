// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use delegate_core::{TaskId, TaskStatus};
use delegate_store::Store;
use std::process::Command;
use tempfile::TempDir;

fn init_repo(dir: &std::path::Path) {
    let run = |args: &[&str]| {
        let status = Command::new("git").args(args).current_dir(dir).status().expect("spawn git");
        assert!(status.success());
    };
    run(&["init", "-q", "-b", "main"]);
    run(&["config", "user.email", "test@example.com"]);
    run(&["config", "user.name", "Test"]);
    std::fs::write(dir.join("README.md"), "hello\n").expect("write");
    run(&["add", "."]);
    run(&["commit", "-q", "-m", "initial"]);
}

#[tokio::test]
async fn orphaned_worktree_is_pruned() {
    let home = TempDir::new().expect("tempdir");
    let store_root = TempDir::new().expect("tempdir");
    let manager = ResourceManager::open(home.path()).expect("open resources");
    let store = Store::open(store_root.path()).expect("open store");

    let team = store.create_team("acme", "charter", 1_000_000).expect("create team");
    // A worktree directory exists for a task that was never created (or
    // already completed) — it should be pruned on reconcile.
    let orphan_path = manager.worktree_path(team.team_id, TaskId::first(), "svc");
    tokio::fs::create_dir_all(&orphan_path).await.expect("mkdir");

    let report = reconcile(&manager, &store).await;

    assert_eq!(report.pruned.len(), 1);
    assert!(!orphan_path.exists());
}

#[tokio::test]
async fn missing_worktree_for_active_task_is_recreated_from_base_sha() {
    let home = TempDir::new().expect("tempdir");
    let repo = TempDir::new().expect("tempdir");
    let store_root = TempDir::new().expect("tempdir");
    init_repo(repo.path());

    let manager = ResourceManager::open(home.path()).expect("open resources");
    manager.register_repo("svc", repo.path()).expect("register");
    let store = Store::open(store_root.path()).expect("open store");

    let team = store.create_team("acme", "charter", 1_000_000).expect("create team");
    let task = store
        .create_task(team.team_id, "add /health", "desc", vec!["svc".to_string()], "delegate/x/acme/T0001", "default", 1, delegate_core::Priority::Normal, 1_000_000)
        .expect("create task");
    store.transition_task(team.team_id, task.id, TaskStatus::InProgress, 1_000_001, None).expect("transition");
    let sha = crate::worktree::head_sha(repo.path()).await.expect("head sha");
    store.set_task_base_sha(team.team_id, task.id, "svc", &sha).expect("set base sha");

    let report = reconcile(&manager, &store).await;

    assert_eq!(report.recreated, vec![task.id]);
    assert!(report.errored.is_empty());
    assert!(manager.worktree_path(team.team_id, task.id, "svc").join("README.md").exists());
}

#[tokio::test]
async fn missing_worktree_with_no_base_sha_is_reported_as_errored() {
    let home = TempDir::new().expect("tempdir");
    let store_root = TempDir::new().expect("tempdir");
    let manager = ResourceManager::open(home.path()).expect("open resources");
    let store = Store::open(store_root.path()).expect("open store");

    let team = store.create_team("acme", "charter", 1_000_000).expect("create team");
    let task = store
        .create_task(team.team_id, "add /health", "desc", vec!["svc".to_string()], "delegate/x/acme/T0001", "default", 1, delegate_core::Priority::Normal, 1_000_000)
        .expect("create task");
    store.transition_task(team.team_id, task.id, TaskStatus::InProgress, 1_000_001, None).expect("transition");

    let report = reconcile(&manager, &store).await;

    assert_eq!(report.errored, vec![task.id]);
    assert!(report.recreated.is_empty());
}
