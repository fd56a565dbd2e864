// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! delegate-merge: the serialized merge pipeline (§4.5). A single worker
//! drains the `merging`-stage FIFO queue `delegate-workflow` feeds and
//! runs each task through preflight, rebase, pre-merge tests, and an
//! atomic fast-forward of `main`, falling back to a squash-reapply when
//! the rebase itself conflicts.
//!
//! Grounded in the teacher's `workspace.rs` pattern of shelling out to
//! `git` via a timeout-wrapped `tokio::process::Command`
//! (`delegate_resources::subprocess::run_with_timeout`); this crate is
//! the other caller of that shared helper besides `delegate-resources`
//! itself.

mod git;

pub use git::ApplyOutcome;

use delegate_core::{Task, TaskId, TeamId};
use delegate_events::{DelegateEvent, EventBus};
use delegate_resources::subprocess::{GIT_REBASE_TIMEOUT, GIT_TEST_TIMEOUT, GIT_WORKTREE_TIMEOUT};
use delegate_resources::ResourceManager;
use delegate_store::Store;
use delegate_workflow::WorkflowEngine;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{info, warn};

/// Depth of the merge worker's FIFO input queue. Generous: a task only
/// sits here while actually being processed by the single worker, so
/// depth just needs to absorb a burst of simultaneous `merging` entries.
const MERGE_QUEUE_DEPTH: usize = 256;

/// Exponential backoff schedule for transient failures (§4.5 retry policy).
const RETRY_DELAYS_MS: [u64; 3] = [250, 1_000, 4_000];
const MAX_RETRIES: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("git error: {0}")]
    Git(String),
    #[error("{label} timed out after {timeout:?}")]
    Timeout { label: String, timeout: Duration },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] delegate_store::StoreError),
    #[error(transparent)]
    Workflow(#[from] delegate_workflow::WorkflowError),
}

/// One file's conflicting hunks from both sides of a failed rebase or
/// squash-reapply, as handed to the task's DRI (§4.5 step 6).
#[derive(Debug, Clone)]
pub struct ConflictHunk {
    pub file: String,
    pub ours: String,
    pub theirs: String,
}

/// The non-retryable conflict report a task's `merge_failed` carries when
/// both the rebase and the squash-reapply fallback conflicted.
#[derive(Debug, Clone)]
pub struct ConflictReport {
    pub repo: String,
    pub files: Vec<String>,
    pub hunks: Vec<ConflictHunk>,
    /// Reset-based resolution instructions for the DRI (§4.5 step 6).
    pub resolution_steps: String,
}

/// Why a merge attempt didn't reach `done` (§7 error taxonomy).
#[derive(Debug, Clone)]
pub enum FailureReason {
    /// §4.5 step 1: the real repo has uncommitted changes. Transient.
    DirtyMain { repo: String },
    /// §4.5 step 4: a concurrent writer advanced `main` between preflight
    /// and the fast-forward CAS. Transient.
    RefRace { repo: String },
    /// §4.5 step 3: the repo's configured test command exited non-zero.
    /// Not retried automatically — tests are deterministic in expectation.
    TestsFailed { repo: String, stdout: String, stderr: String },
    /// §4.5 step 6: both rebase and squash-reapply conflicted.
    Conflict(ConflictReport),
    /// A git invocation exceeded its configured budget (§5). Transient.
    Timeout { repo: String, op: String },
    /// Any other git failure not classified above. Not retried.
    GitError { repo: String, detail: String },
}

impl FailureReason {
    /// §7: dirty main, ref race, and timeouts are retried with backoff;
    /// test failures and content conflicts escalate immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureReason::DirtyMain { .. } | FailureReason::RefRace { .. } | FailureReason::Timeout { .. })
    }

    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::DirtyMain { .. } => "DIRTY_MAIN",
            FailureReason::RefRace { .. } => "REF_RACE",
            FailureReason::TestsFailed { .. } => "TESTS_FAILED",
            FailureReason::Conflict(_) => "CONFLICT",
            FailureReason::Timeout { .. } => "TIMEOUT",
            FailureReason::GitError { .. } => "GIT_ERROR",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::DirtyMain { repo } => write!(f, "{}: main has uncommitted changes in {repo}", self.code()),
            FailureReason::RefRace { repo } => write!(f, "{}: main advanced concurrently in {repo}", self.code()),
            FailureReason::TestsFailed { repo, stdout, stderr } => {
                write!(f, "{}: tests failed in {repo}\nstdout:\n{stdout}\nstderr:\n{stderr}", self.code())
            }
            FailureReason::Conflict(report) => {
                write!(f, "{}: {} in {} did not rebase or squash-reapply cleanly\n{}", self.code(), report.files.join(", "), report.repo, report.resolution_steps)
            }
            FailureReason::Timeout { repo, op } => write!(f, "{}: {op} timed out in {repo}", self.code()),
            FailureReason::GitError { repo, detail } => write!(f, "{}: {detail} in {repo}", self.code()),
        }
    }
}

fn io_failure(repo: &str, e: MergeError) -> FailureReason {
    match e {
        MergeError::Timeout { label, .. } => FailureReason::Timeout { repo: repo.to_string(), op: label },
        other => FailureReason::GitError { repo: repo.to_string(), detail: other.to_string() },
    }
}

/// One repo's successful rebase-or-squash + passing tests, parked and
/// waiting for the final all-or-nothing fast-forward pass (§4.5 multi-repo rule).
struct RepoAttempt {
    repo: String,
    repo_root: PathBuf,
    wt_path: PathBuf,
    expected_old_main: String,
    candidate_sha: String,
    temp_branch: String,
}

/// The serialized, single-worker merge pipeline (§4.5).
pub struct MergeWorker {
    store: Arc<Store>,
    resources: Arc<ResourceManager>,
    events: Arc<EventBus>,
    workflow: Arc<WorkflowEngine>,
    test_commands: HashMap<String, String>,
    default_test_command: String,
    tx: mpsc::Sender<(TeamId, TaskId)>,
    rx: AsyncMutex<Option<mpsc::Receiver<(TeamId, TaskId)>>>,
}

impl MergeWorker {
    pub fn new(
        store: Arc<Store>,
        resources: Arc<ResourceManager>,
        events: Arc<EventBus>,
        workflow: Arc<WorkflowEngine>,
        test_commands: HashMap<String, String>,
        default_test_command: impl Into<String>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(MERGE_QUEUE_DEPTH);
        Arc::new(Self {
            store,
            resources,
            events,
            workflow,
            test_commands,
            default_test_command: default_test_command.into(),
            tx,
            rx: AsyncMutex::new(Some(rx)),
        })
    }

    /// The sending half, wired into `WorkflowEngine::with_merge_queue` so
    /// the `merging` stage's `enter` hook can hand tasks off (§4.5 input queue).
    pub fn queue_sender(&self) -> mpsc::Sender<(TeamId, TaskId)> {
        self.tx.clone()
    }

    /// Drain the queue one task at a time until `shutdown` fires. Intended
    /// to be `tokio::spawn`'d once at daemon boot, after the WorkflowEngine
    /// it reports back into is wired up (§2 boot order).
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut rx = match self.rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                tracing::error!("MergeWorker::run called more than once");
                return;
            }
        };
        loop {
            tokio::select! {
                item = rx.recv() => {
                    let Some((team_id, task_id)) = item else { break };
                    self.process(team_id, task_id).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    fn test_command_for(&self, repo: &str) -> String {
        self.test_commands.get(repo).cloned().unwrap_or_else(|| self.default_test_command.clone())
    }

    fn publish_progress(&self, team_id: TeamId, task_id: TaskId, stage: &str, detail: &str, now_ms: u64) {
        self.events.publish(
            team_id,
            DelegateEvent::MergeProgress { task_id, stage: SmolStr::new(stage), detail: SmolStr::new(detail) },
        );
        let _ = self.store.record_activity(delegate_core::Activity {
            team_id,
            agent: SmolStr::new(delegate_core::SYSTEM_MEMBER),
            activity_type: delegate_core::ActivityType::MergeProgress,
            task_id: Some(task_id),
            payload: HashMap::from([("stage".to_string(), stage.to_string()), ("detail".to_string(), detail.to_string())]),
            timestamp_ms: now_ms,
        });
    }

    /// Run one task through the pipeline, retrying transient failures up
    /// to `MAX_RETRIES` times with exponential backoff before surfacing
    /// `merge_failed` (§4.5 retry policy, §8 scenario 4).
    async fn process(&self, team_id: TeamId, task_id: TaskId) {
        let mut attempt_no = 0u32;
        loop {
            let task = match self.store.get_task(team_id, task_id) {
                Ok(t) => t,
                Err(e) => {
                    warn!(%team_id, %task_id, error = %e, "merge worker could not load task");
                    return;
                }
            };
            let now_ms = {
                use delegate_core::Clock;
                delegate_core::SystemClock.epoch_ms()
            };

            match self.try_merge(team_id, &task, now_ms).await {
                Ok(()) => {
                    info!(%team_id, %task_id, "task merged");
                    return;
                }
                Err(reason) => {
                    let retryable = reason.is_transient() && attempt_no < MAX_RETRIES;
                    warn!(%team_id, %task_id, reason = %reason, retryable, "merge attempt failed");
                    if retryable {
                        let delay = RETRY_DELAYS_MS[attempt_no as usize];
                        attempt_no += 1;
                        let _ = self.store.set_task_retry_count(team_id, task_id, attempt_no);
                        self.publish_progress(team_id, task_id, "retrying", &reason.to_string(), now_ms);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        continue;
                    }
                    self.fail_task(team_id, task_id, &reason, now_ms).await;
                    return;
                }
            }
        }
    }

    async fn fail_task(&self, team_id: TeamId, task_id: TaskId, reason: &FailureReason, now_ms: u64) {
        let _ = self.store.reject_task(team_id, task_id, reason.to_string(), now_ms);
        if let Err(e) = self.workflow.advance(team_id, task_id, delegate_core::TaskStatus::MergeFailed, now_ms).await {
            warn!(%team_id, %task_id, error = %e, "failed to transition task to merge_failed");
        }
        self.publish_progress(team_id, task_id, "failed", &reason.to_string(), now_ms);
    }

    /// One full pass of the pipeline across every repo the task touches,
    /// then the all-or-nothing fast-forward commit (§4.5 multi-repo rule).
    async fn try_merge(&self, team_id: TeamId, task: &Task, now_ms: u64) -> Result<(), FailureReason> {
        let mut attempts = Vec::with_capacity(task.repo.len());
        for repo in &task.repo {
            self.publish_progress(team_id, task.id, "attempting", repo, now_ms);
            let attempt = self.attempt_repo(team_id, task, repo).await;
            match attempt {
                Ok(a) => attempts.push(a),
                Err(reason) => {
                    // Roll back any repo that already reached a parked,
                    // test-passed state before this one failed.
                    for a in &attempts {
                        git::abort_working_tree(&a.wt_path, &task.branch, GIT_WORKTREE_TIMEOUT).await;
                        git::delete_branch(&a.wt_path, &a.temp_branch, GIT_WORKTREE_TIMEOUT).await;
                    }
                    return Err(reason);
                }
            }
        }

        if !self.commit_all(&attempts).await {
            for a in &attempts {
                git::abort_working_tree(&a.wt_path, &task.branch, GIT_WORKTREE_TIMEOUT).await;
                git::delete_branch(&a.wt_path, &a.temp_branch, GIT_WORKTREE_TIMEOUT).await;
            }
            return Err(FailureReason::RefRace { repo: attempts.first().map(|a| a.repo.clone()).unwrap_or_default() });
        }

        for a in &attempts {
            git::abort_working_tree(&a.wt_path, &task.branch, GIT_WORKTREE_TIMEOUT).await;
            git::delete_branch(&a.wt_path, &a.temp_branch, GIT_WORKTREE_TIMEOUT).await;
            let wt = delegate_core::Worktree {
                task_id: task.id,
                repo: a.repo.clone(),
                path: a.wt_path.clone(),
                branch: task.branch.clone(),
                base_sha: task.base_sha.get(&a.repo).cloned().unwrap_or_default(),
            };
            let _ = self.resources.destroy(&wt).await;
        }

        self.workflow.advance(team_id, task.id, delegate_core::TaskStatus::Done, now_ms).await.map_err(|e| {
            FailureReason::GitError { repo: task.repo.first().cloned().unwrap_or_default(), detail: e.to_string() }
        })?;
        self.publish_progress(team_id, task.id, "merged", "main advanced", now_ms);
        Ok(())
    }

    /// Steps 1-3 of the pipeline for one repo: preflight, rebase (falling
    /// back to squash-reapply on conflict), then pre-merge tests. Leaves
    /// the repo's temp branch checked out with tests passing, ready for
    /// the all-or-nothing fast-forward pass.
    async fn attempt_repo(&self, team_id: TeamId, task: &Task, repo: &str) -> Result<RepoAttempt, FailureReason> {
        let repo_root = self
            .resources
            .repo_path(repo)
            .ok_or_else(|| FailureReason::GitError { repo: repo.to_string(), detail: "repo not registered".to_string() })?;
        let wt_path = self.resources.worktree_path(team_id, task.id, repo);

        if git::is_dirty(&repo_root, GIT_WORKTREE_TIMEOUT).await.map_err(|e| io_failure(repo, e))? {
            return Err(FailureReason::DirtyMain { repo: repo.to_string() });
        }

        let main_tip = git::rev_parse(&repo_root, "main", GIT_WORKTREE_TIMEOUT).await.map_err(|e| io_failure(repo, e))?;
        let task_tip = git::rev_parse(&wt_path, "HEAD", GIT_WORKTREE_TIMEOUT).await.map_err(|e| io_failure(repo, e))?;
        let base_sha = task.base_sha.get(repo).cloned().unwrap_or_else(|| main_tip.clone());
        let temp_branch = format!("{}-merge-tmp", task.branch);

        git::create_temp_branch(&wt_path, &temp_branch, &task_tip, GIT_REBASE_TIMEOUT).await.map_err(|e| io_failure(repo, e))?;

        let rebase_outcome = git::rebase_onto(&wt_path, &main_tip, GIT_REBASE_TIMEOUT).await.map_err(|e| io_failure(repo, e))?;
        let candidate_sha = if rebase_outcome == ApplyOutcome::Clean {
            git::rev_parse(&wt_path, "HEAD", GIT_WORKTREE_TIMEOUT).await.map_err(|e| io_failure(repo, e))?
        } else {
            // §4.5 step 5: squash-reapply fallback.
            git::delete_branch(&wt_path, &temp_branch, GIT_WORKTREE_TIMEOUT).await;
            git::abort_working_tree(&wt_path, &task.branch, GIT_WORKTREE_TIMEOUT).await;

            let diff = git::diff_range(&repo_root, &base_sha, &task_tip, GIT_REBASE_TIMEOUT).await.map_err(|e| io_failure(repo, e))?;
            git::create_temp_branch(&wt_path, &temp_branch, &main_tip, GIT_REBASE_TIMEOUT).await.map_err(|e| io_failure(repo, e))?;

            let message = format!("squash-reapply {}", task.id);
            let apply_outcome =
                git::apply_and_commit(&wt_path, &diff, &message, GIT_REBASE_TIMEOUT).await.map_err(|e| io_failure(repo, e))?;

            if apply_outcome == ApplyOutcome::Conflicted {
                let report = self.build_conflict_report(&wt_path, repo, &main_tip, GIT_WORKTREE_TIMEOUT).await;
                git::abort_working_tree(&wt_path, &task.branch, GIT_WORKTREE_TIMEOUT).await;
                git::delete_branch(&wt_path, &temp_branch, GIT_WORKTREE_TIMEOUT).await;
                return Err(FailureReason::Conflict(report));
            }
            git::rev_parse(&wt_path, "HEAD", GIT_WORKTREE_TIMEOUT).await.map_err(|e| io_failure(repo, e))?
        };

        // §4.5 step 3: pre-merge tests, run on the candidate commit.
        let test_command = self.test_command_for(repo);
        let output = git::run_tests(&wt_path, &test_command, GIT_TEST_TIMEOUT).await.map_err(|e| io_failure(repo, e))?;
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            git::abort_working_tree(&wt_path, &task.branch, GIT_WORKTREE_TIMEOUT).await;
            git::delete_branch(&wt_path, &temp_branch, GIT_WORKTREE_TIMEOUT).await;
            return Err(FailureReason::TestsFailed { repo: repo.to_string(), stdout, stderr });
        }

        Ok(RepoAttempt { repo: repo.to_string(), repo_root, wt_path, expected_old_main: main_tip, candidate_sha, temp_branch })
    }

    async fn build_conflict_report(&self, wt_path: &std::path::Path, repo: &str, onto: &str, timeout: Duration) -> ConflictReport {
        let files = git::conflicted_files(wt_path, timeout).await.unwrap_or_default();
        let mut hunks = Vec::with_capacity(files.len());
        for file in &files {
            if let Ok((ours, theirs)) = git::conflict_hunks(wt_path, file, timeout).await {
                hunks.push(ConflictHunk { file: file.clone(), ours, theirs });
            }
        }
        let resolution_steps = format!(
            "git fetch (if working from a clone)\ngit checkout <task_branch>\ngit reset --hard <task_branch>\ngit rebase {onto}\n# resolve conflicts in: {}\ngit add <resolved files>\ngit rebase --continue",
            files.join(", ")
        );
        ConflictReport { repo: repo.to_string(), files, hunks, resolution_steps }
    }

    /// §4.5 step 4, generalized to the multi-repo rule: verify every
    /// repo's `main` still sits at the sha this attempt rebased onto,
    /// then advance every repo's `main` in one tight pass. Any repo
    /// failing its CAS means the whole task is retried from step 1 for
    /// every repo — see DESIGN.md for why a failed mid-pass CAS here
    /// cannot be rolled back by un-advancing an already-moved ref.
    async fn commit_all(&self, attempts: &[RepoAttempt]) -> bool {
        for a in attempts {
            match git::rev_parse(&a.repo_root, "main", GIT_WORKTREE_TIMEOUT).await {
                Ok(tip) if tip == a.expected_old_main => {}
                _ => return false,
            }
        }
        for a in attempts {
            match git::update_ref_cas(&a.repo_root, "refs/heads/main", &a.expected_old_main, &a.candidate_sha, GIT_WORKTREE_TIMEOUT).await {
                Ok(true) => {}
                _ => return false,
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
