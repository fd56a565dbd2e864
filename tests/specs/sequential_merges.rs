// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! §8 scenario 2: two tasks against the same repo complete independently
//! but must merge one after another — the second task's merge pipeline
//! has to rebase onto the `main` tip the first task's merge left behind,
//! not the tip that existed when the second task branched.

use crate::common::*;
use delegate_core::{Clock, MemberKind, MemberRole, Priority, ReviewVerdict, SystemClock, TaskStatus};
use delegate_workflow::{DEFAULT_WORKFLOW_NAME, DEFAULT_WORKFLOW_VERSION};
use std::process::Command;
use tempfile::TempDir;

async fn bring_to_merging(h: &Harness, title: &str, commit: impl FnOnce(&std::path::Path)) -> delegate_core::TaskId {
    let now_ms = SystemClock.epoch_ms();
    let task = h
        .store
        .create_task_deriving_branch(h.team_id, "acme", title, "desc", vec!["svc".to_string()], DEFAULT_WORKFLOW_NAME, DEFAULT_WORKFLOW_VERSION, Priority::Normal, now_ms)
        .expect("create task");
    h.store.assign_task(h.team_id, task.id, Some("alice".into())).expect("assign");

    h.workflow.advance(h.team_id, task.id, TaskStatus::InProgress, SystemClock.epoch_ms()).await.expect("advance to in_progress");
    let wt_path = h.resources.worktree_path(h.team_id, task.id, "svc");
    commit(&wt_path);
    h.workflow.advance(h.team_id, task.id, TaskStatus::InReview, SystemClock.epoch_ms()).await.expect("advance to in_review");
    h.workflow.decide_review(h.team_id, task.id, ReviewVerdict::Pass, "lgtm", SystemClock.epoch_ms()).await.expect("approve");
    h.workflow.advance(h.team_id, task.id, TaskStatus::Merging, SystemClock.epoch_ms()).await.expect("advance to merging");

    task.id
}

#[tokio::test]
async fn two_tasks_merge_one_after_another_onto_a_moving_main() {
    let repo = TempDir::new().expect("tempdir");
    init_repo(repo.path());

    let h = build_harness(
        "acme",
        &[("svc", repo.path())],
        &[
            ("alice", MemberKind::Agent, MemberRole::Worker),
            ("bob", MemberKind::Agent, MemberRole::Qa),
            ("carol", MemberKind::Human, MemberRole::Manager),
        ],
    );

    let first = bring_to_merging(&h, "add one.txt", |wt| commit_file(wt, "one.txt", "first\n", "add one")).await;
    assert!(wait_for_status(&h.store, h.team_id, first, TaskStatus::Done, SPEC_WAIT).await, "first task should merge");

    // The second task must have branched from the *original* main tip
    // (its worktree's base is fixed at in_progress entry) yet still
    // needs to rebase cleanly onto the tip the first merge produced.
    let second = bring_to_merging(&h, "add two.txt", |wt| commit_file(wt, "two.txt", "second\n", "add two")).await;
    assert!(wait_for_status(&h.store, h.team_id, second, TaskStatus::Done, SPEC_WAIT).await, "second task should merge onto the moved main");

    let repo_str = repo.path().display().to_string();
    for (file, expected) in [("one.txt", "first\n"), ("two.txt", "second\n")] {
        let out = Command::new("git").args(["-C", &repo_str, "show", &format!("main:{file}")]).output().expect("git show");
        assert_eq!(String::from_utf8_lossy(&out.stdout), expected, "main should contain {file}");
    }

    let log = Command::new("git").args(["-C", &repo_str, "log", "--oneline", "main"]).output().expect("git log");
    let line_count = String::from_utf8_lossy(&log.stdout).lines().count();
    assert!(line_count >= 3, "main should have the initial commit plus both merges, got:\n{}", String::from_utf8_lossy(&log.stdout));

    h.shutdown();
}
