// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! §8 scenario 1: create a task, drive it todo -> in_progress -> in_review
//! through real scheduler-dispatched turns (not direct `WorkflowEngine`
//! calls, unlike the per-crate workflow/merge tests), have a reviewer
//! approve it, a human approve the merge, and watch the already-spawned
//! MergeWorker fast-forward `main` and tear the worktree down — the one
//! path that exercises every component in §2's boot order together.

use crate::common::*;
use delegate_adapters::Action;
use delegate_core::{Clock, MemberKind, MemberRole, Priority, ReviewVerdict, SystemClock, TaskStatus};
use delegate_workflow::{DEFAULT_WORKFLOW_NAME, DEFAULT_WORKFLOW_VERSION};
use tempfile::TempDir;

#[tokio::test]
async fn task_goes_from_todo_to_done_and_main_advances() {
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

    let now_ms = SystemClock.epoch_ms();
    let task = h
        .store
        .create_task_deriving_branch(h.team_id, "acme", "add /health", "expose a health endpoint", vec!["svc".to_string()], DEFAULT_WORKFLOW_NAME, DEFAULT_WORKFLOW_VERSION, Priority::Normal, now_ms)
        .expect("create task");
    h.store.assign_task(h.team_id, task.id, Some("alice".into())).expect("assign alice");

    assert_eq!(task.branch, format!("delegate/{}/acme/{}", h.team_id, task.id));

    // Agent turn 1: pick the task up.
    h.adapter.push_actions(vec![Action::UpdateTaskStatus { task_id: task.id, status: TaskStatus::InProgress }]);
    h.scheduler.request_turn(h.team_id, "alice");
    assert!(wait_for_status(&h.store, h.team_id, task.id, TaskStatus::InProgress, SPEC_WAIT).await, "task should reach in_progress");

    let loaded = h.store.get_task(h.team_id, task.id).expect("get task");
    assert_eq!(loaded.dri.as_deref(), Some("alice"));
    assert!(loaded.base_sha.contains_key("svc"));

    // The agent's "work": commit a change into its worktree.
    let wt_path = h.resources.worktree_path(h.team_id, task.id, "svc");
    commit_file(&wt_path, "health.rs", "pub fn health() -> &'static str { \"ok\" }\n", "add /health");

    // Agent turn 2: send it to review.
    h.adapter.push_actions(vec![Action::UpdateTaskStatus { task_id: task.id, status: TaskStatus::InReview }]);
    h.scheduler.request_turn(h.team_id, "alice");
    assert!(wait_for_status(&h.store, h.team_id, task.id, TaskStatus::InReview, SPEC_WAIT).await, "task should reach in_review");

    let loaded = h.store.get_task(h.team_id, task.id).expect("get task");
    assert_eq!(loaded.assignee.as_deref(), Some("bob"), "the dedicated QA member should be assigned as reviewer");

    // Reviewer approves (a review verdict isn't one of the scheduler's
    // action kinds — it's applied directly, the way the out-of-scope
    // HTTP layer would call through to the WorkflowEngine on a human or
    // agent reviewer's decision).
    let now_ms = SystemClock.epoch_ms();
    h.workflow.decide_review(h.team_id, task.id, ReviewVerdict::Pass, "looks good", now_ms).await.expect("approve review");
    assert!(wait_for_status(&h.store, h.team_id, task.id, TaskStatus::InApproval, SPEC_WAIT).await);

    let loaded = h.store.get_task(h.team_id, task.id).expect("get task");
    assert_eq!(loaded.assignee.as_deref(), Some("carol"), "human approval gate assigns a human");

    // Human approves the merge.
    let now_ms = SystemClock.epoch_ms();
    h.workflow.advance(h.team_id, task.id, TaskStatus::Merging, now_ms).await.expect("advance to merging");

    // The already-running MergeWorker picks this up off its queue.
    assert!(wait_for_status(&h.store, h.team_id, task.id, TaskStatus::Done, SPEC_WAIT).await, "task should reach done");

    let final_task = h.store.get_task(h.team_id, task.id).expect("get task");
    assert!(final_task.completed_at_ms.is_some());
    assert!(!wt_path.exists(), "worktree should be torn down on done");

    let branch_still_exists = std::process::Command::new("git")
        .args(["-C", &repo.path().display().to_string(), "rev-parse", "--verify", &task.branch])
        .output()
        .expect("git rev-parse")
        .status
        .success();
    assert!(!branch_still_exists, "task branch should be deleted after merge");

    let contents = std::process::Command::new("git")
        .args(["-C", &repo.path().display().to_string(), "show", "main:health.rs"])
        .output()
        .expect("git show");
    assert!(String::from_utf8_lossy(&contents.stdout).contains("pub fn health"));

    h.shutdown();
}
