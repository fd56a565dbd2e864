// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! §8 scenario 5: two distinct agents each own a task against the same
//! repo and advance in parallel. Each gets its own linked worktree off
//! `git worktree add`; concurrent `add`/`remove` calls against one repo
//! must not trip over git's own locking, and the two branches must stay
//! independent until each merges.

use crate::common::*;
use delegate_adapters::Action;
use delegate_core::{Clock, MemberKind, MemberRole, Priority, SystemClock, TaskStatus};
use delegate_workflow::{DEFAULT_WORKFLOW_NAME, DEFAULT_WORKFLOW_VERSION};
use tempfile::TempDir;

#[tokio::test]
async fn two_agents_advance_independent_tasks_in_parallel() {
    let repo = TempDir::new().expect("tempdir");
    init_repo(repo.path());

    let h = build_harness(
        "acme",
        &[("svc", repo.path())],
        &[("alice", MemberKind::Agent, MemberRole::Worker), ("bob", MemberKind::Agent, MemberRole::Worker)],
    );

    let now_ms = SystemClock.epoch_ms();
    let task_a = h
        .store
        .create_task_deriving_branch(h.team_id, "acme", "alice's task", "desc", vec!["svc".to_string()], DEFAULT_WORKFLOW_NAME, DEFAULT_WORKFLOW_VERSION, Priority::Normal, now_ms)
        .expect("create task a");
    h.store.assign_task(h.team_id, task_a.id, Some("alice".into())).expect("assign alice");

    let task_b = h
        .store
        .create_task_deriving_branch(h.team_id, "acme", "bob's task", "desc", vec!["svc".to_string()], DEFAULT_WORKFLOW_NAME, DEFAULT_WORKFLOW_VERSION, Priority::Normal, now_ms)
        .expect("create task b");
    h.store.assign_task(h.team_id, task_b.id, Some("bob".into())).expect("assign bob");

    // Both scripted responses land on one shared fake adapter queue, so
    // which physical agent pops which response is a race — each action
    // still only ever mutates the task_id it names, so both tasks reach
    // in_progress regardless of which agent happened to run first.
    h.adapter.push_actions(vec![Action::UpdateTaskStatus { task_id: task_a.id, status: TaskStatus::InProgress }]);
    h.adapter.push_actions(vec![Action::UpdateTaskStatus { task_id: task_b.id, status: TaskStatus::InProgress }]);
    h.scheduler.request_turn(h.team_id, "alice");
    h.scheduler.request_turn(h.team_id, "bob");

    assert!(wait_for_status(&h.store, h.team_id, task_a.id, TaskStatus::InProgress, SPEC_WAIT).await);
    assert!(wait_for_status(&h.store, h.team_id, task_b.id, TaskStatus::InProgress, SPEC_WAIT).await);

    let wt_a = h.resources.worktree_path(h.team_id, task_a.id, "svc");
    let wt_b = h.resources.worktree_path(h.team_id, task_b.id, "svc");
    assert!(wt_a.exists() && wt_b.exists());
    assert_ne!(wt_a, wt_b, "each task gets its own worktree directory");

    // Commit concurrently into both worktrees — exercises git's own
    // per-repo locking rather than anything this crate serializes itself.
    let (wt_a2, wt_b2) = (wt_a.clone(), wt_b.clone());
    let (r1, r2) = tokio::join!(
        tokio::task::spawn_blocking(move || commit_file(&wt_a2, "alice.txt", "alice's work\n", "alice commit")),
        tokio::task::spawn_blocking(move || commit_file(&wt_b2, "bob.txt", "bob's work\n", "bob commit")),
    );
    r1.expect("alice commit task");
    r2.expect("bob commit task");

    let out_a = std::process::Command::new("git").args(["-C", &wt_a.display().to_string(), "log", "--oneline", "-1"]).output().expect("git log a");
    let out_b = std::process::Command::new("git").args(["-C", &wt_b.display().to_string(), "log", "--oneline", "-1"]).output().expect("git log b");
    assert!(String::from_utf8_lossy(&out_a.stdout).contains("alice commit"));
    assert!(String::from_utf8_lossy(&out_b.stdout).contains("bob commit"));

    let task_a_final = h.store.get_task(h.team_id, task_a.id).expect("get task a");
    let task_b_final = h.store.get_task(h.team_id, task_b.id).expect("get task b");
    assert_ne!(task_a_final.branch, task_b_final.branch, "independent tasks keep independent branches");

    h.shutdown();
}
