// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use delegate_core::{MemberKind, MemberRole, Priority, ReviewVerdict, Seniority, TaskStatus};
use delegate_workflow::{DEFAULT_WORKFLOW_NAME, DEFAULT_WORKFLOW_VERSION};
use std::process::Command;
use std::time::Duration as StdDuration;
use tempfile::TempDir;

fn run_git(dir: &std::path::Path, args: &[&str]) {
    let status = Command::new("git").args(args).current_dir(dir).status().expect("spawn git");
    assert!(status.success(), "git {args:?} failed in {dir:?}");
}

fn init_repo(dir: &std::path::Path) {
    run_git(dir, &["init", "-q", "-b", "main"]);
    run_git(dir, &["config", "user.email", "test@example.com"]);
    run_git(dir, &["config", "user.name", "Test"]);
    std::fs::write(dir.join("README.md"), "hello\n").expect("write file");
    run_git(dir, &["add", "."]);
    run_git(dir, &["commit", "-q", "-m", "initial"]);
}

struct Harness {
    _home: TempDir,
    repo: TempDir,
    _store_dir: TempDir,
    store: Arc<Store>,
    resources: Arc<ResourceManager>,
    events: Arc<EventBus>,
    team_id: TeamId,
}

fn harness() -> Harness {
    let home = TempDir::new().expect("tempdir");
    let repo = TempDir::new().expect("tempdir");
    let store_dir = TempDir::new().expect("tempdir");
    init_repo(repo.path());

    let resources = Arc::new(ResourceManager::open(home.path()).expect("open resources"));
    resources.register_repo("svc", repo.path()).expect("register");
    let store = Arc::new(Store::open(store_dir.path()).expect("open store"));
    let events = Arc::new(EventBus::new());

    let team = store.create_team("acme", "charter", 1_000_000).expect("create team");
    store.add_member(team.team_id, "alice", MemberKind::Agent, MemberRole::Worker, Seniority::Senior).expect("add worker");
    store.add_member(team.team_id, "bob", MemberKind::Agent, MemberRole::Qa, Seniority::Senior).expect("add qa");
    store.add_member(team.team_id, "carol", MemberKind::Human, MemberRole::Manager, Seniority::Staff).expect("add human");

    Harness { _home: home, repo, _store_dir: store_dir, store, resources, events, team_id: team.team_id }
}

/// Drive a freshly created task through `todo -> in_progress -> in_review
/// -> in_approval -> merging`, committing `commit_fn`'s changes in the
/// task worktree along the way, and return the wired-up engine + worker.
async fn bring_task_to_merging(h: &Harness, commit_fn: impl FnOnce(&std::path::Path)) -> (Arc<WorkflowEngine>, Arc<MergeWorker>, TaskId) {
    let task = h
        .store
        .create_task(h.team_id, "add endpoint", "desc", vec!["svc".to_string()], "delegate/abcdef/acme/T0001", DEFAULT_WORKFLOW_NAME, DEFAULT_WORKFLOW_VERSION, Priority::Normal, 1_000_000)
        .expect("create task");
    h.store.assign_task(h.team_id, task.id, Some("alice".into())).expect("assign");

    let engine = Arc::new(WorkflowEngine::new(h.store.clone(), h.resources.clone(), h.events.clone()));
    engine.advance(h.team_id, task.id, TaskStatus::InProgress, 1_000_001).await.expect("advance to in_progress");

    let wt_path = h.resources.worktree_path(h.team_id, task.id, "svc");
    commit_fn(&wt_path);

    engine.advance(h.team_id, task.id, TaskStatus::InReview, 1_000_002).await.expect("advance to in_review");
    engine.decide_review(h.team_id, task.id, ReviewVerdict::Pass, "lgtm", 1_000_003).await.expect("approve");

    let worker = MergeWorker::new(h.store.clone(), h.resources.clone(), h.events.clone(), engine.clone(), HashMap::new(), "true");
    let engine = Arc::new(WorkflowEngine::new(h.store.clone(), h.resources.clone(), h.events.clone()).with_merge_queue(worker.queue_sender()));
    // The engine used for the `merging` transition must be the one wired to
    // the worker's queue; earlier transitions didn't need the wiring.
    engine.advance(h.team_id, task.id, TaskStatus::Merging, 1_000_004).await.expect("advance to merging");

    (engine, worker, task.id)
}

fn commit_file(wt_path: &std::path::Path, name: &str, contents: &str, message: &str) {
    std::fs::write(wt_path.join(name), contents).expect("write file");
    run_git(wt_path, &["add", "."]);
    run_git(wt_path, &["commit", "-q", "-m", message]);
}

async fn wait_for_status(store: &Store, team_id: TeamId, task_id: TaskId, want: TaskStatus, timeout: StdDuration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if store.get_task(team_id, task_id).expect("get task").status == want {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(StdDuration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn happy_path_merge_fast_forwards_main() {
    let h = harness();
    let (_engine, worker, task_id) = bring_task_to_merging(&h, |wt| commit_file(wt, "feature.txt", "new feature\n", "add feature")).await;

    worker.process(h.team_id, task_id).await;

    let task = h.store.get_task(h.team_id, task_id).expect("get task");
    assert_eq!(task.status, TaskStatus::Done);
    assert!(task.completed_at_ms.is_some());

    let main_tip = git::rev_parse(h.repo.path(), "main", GIT_WORKTREE_TIMEOUT).await.expect("rev-parse");
    let contents = {
        let out = Command::new("git").args(["-C", &h.repo.path().display().to_string(), "show", &format!("{main_tip}:feature.txt")]).output().expect("show");
        String::from_utf8_lossy(&out.stdout).to_string()
    };
    assert_eq!(contents, "new feature\n");
}

#[tokio::test]
async fn conflicting_main_advance_surfaces_conflict_report() {
    let h = harness();
    let (_engine, worker, task_id) = bring_task_to_merging(&h, |wt| commit_file(wt, "README.md", "task branch change\n", "edit readme")).await;

    // Advance main out from under the task with a conflicting edit to the same file.
    std::fs::write(h.repo.path().join("README.md"), "operator advanced main\n").expect("write");
    run_git(h.repo.path(), &["add", "."]);
    run_git(h.repo.path(), &["commit", "-q", "-m", "operator change"]);
    let main_tip_before = git::rev_parse(h.repo.path(), "main", GIT_WORKTREE_TIMEOUT).await.expect("rev-parse");

    worker.process(h.team_id, task_id).await;

    let task = h.store.get_task(h.team_id, task_id).expect("get task");
    assert_eq!(task.status, TaskStatus::MergeFailed);
    let reason = task.rejection_reason.expect("reason recorded");
    assert!(reason.contains("CONFLICT"), "reason was: {reason}");
    assert!(reason.contains("README.md"));

    let main_tip_after = git::rev_parse(h.repo.path(), "main", GIT_WORKTREE_TIMEOUT).await.expect("rev-parse");
    assert_eq!(main_tip_before, main_tip_after, "main must be untouched on conflict");
}

#[tokio::test]
async fn dirty_main_retries_then_surfaces_failure() {
    let h = harness();
    let (_engine, worker, task_id) = bring_task_to_merging(&h, |wt| commit_file(wt, "feature.txt", "x\n", "add feature")).await;

    std::fs::write(h.repo.path().join("dirty.txt"), "uncommitted\n").expect("write");

    worker.process(h.team_id, task_id).await;

    let task = h.store.get_task(h.team_id, task_id).expect("get task");
    assert_eq!(task.status, TaskStatus::MergeFailed);
    let reason = task.rejection_reason.expect("reason recorded");
    assert!(reason.contains("DIRTY_MAIN"), "reason was: {reason}");
    assert_eq!(task.retry_count, MAX_RETRIES);
}

#[tokio::test]
async fn failing_tests_are_not_retried() {
    let h = harness();
    let task = h
        .store
        .create_task(h.team_id, "add endpoint", "desc", vec!["svc".to_string()], "delegate/abcdef/acme/T0002", DEFAULT_WORKFLOW_NAME, DEFAULT_WORKFLOW_VERSION, Priority::Normal, 1_000_000)
        .expect("create task");
    h.store.assign_task(h.team_id, task.id, Some("alice".into())).expect("assign");

    let setup_engine = Arc::new(WorkflowEngine::new(h.store.clone(), h.resources.clone(), h.events.clone()));
    setup_engine.advance(h.team_id, task.id, TaskStatus::InProgress, 1_000_001).await.expect("advance");
    let wt_path = h.resources.worktree_path(h.team_id, task.id, "svc");
    commit_file(&wt_path, "feature.txt", "x\n", "add feature");
    setup_engine.advance(h.team_id, task.id, TaskStatus::InReview, 1_000_002).await.expect("advance");
    setup_engine.decide_review(h.team_id, task.id, ReviewVerdict::Pass, "lgtm", 1_000_003).await.expect("approve");

    let worker = MergeWorker::new(h.store.clone(), h.resources.clone(), h.events.clone(), setup_engine.clone(), HashMap::new(), "false");
    let engine = Arc::new(WorkflowEngine::new(h.store.clone(), h.resources.clone(), h.events.clone()).with_merge_queue(worker.queue_sender()));
    engine.advance(h.team_id, task.id, TaskStatus::Merging, 1_000_004).await.expect("advance to merging");

    worker.process(h.team_id, task.id).await;

    let task = h.store.get_task(h.team_id, task.id).expect("get task");
    assert_eq!(task.status, TaskStatus::MergeFailed);
    assert_eq!(task.retry_count, 0, "test failures are not retried (§4.5 step 3)");
    let reason = task.rejection_reason.expect("reason recorded");
    assert!(reason.contains("TESTS_FAILED"));
}

#[tokio::test]
async fn queue_wiring_drains_through_run_loop() {
    let h = harness();
    let (_engine, worker, task_id) = bring_task_to_merging(&h, |wt| commit_file(wt, "feature.txt", "x\n", "add feature")).await;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker_clone = worker.clone();
    let handle = tokio::spawn(worker_clone.run(shutdown_rx));

    worker.queue_sender().send((h.team_id, task_id)).await.expect("send");

    assert!(wait_for_status(&h.store, h.team_id, task_id, TaskStatus::Done, StdDuration::from_secs(5)).await);

    shutdown_tx.send(true).expect("signal shutdown");
    handle.await.expect("worker task joined");
}
