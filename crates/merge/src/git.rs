// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin `git` subprocess wrappers the merge pipeline composes (§4.5).
//! Every invocation goes through `delegate_resources::subprocess::run_with_timeout`,
//! the same wrapper `delegate-resources` uses for worktree add/remove, so
//! every blocking git call in the process shares one timeout policy (§5).

use crate::MergeError;
use delegate_resources::subprocess::run_with_timeout;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

fn stderr_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn git(dir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.args(["-C", &dir.display().to_string()]).env_remove("GIT_DIR").env_remove("GIT_WORK_TREE");
    cmd
}

/// `git rev-parse <rev>`, used both for `main`'s tip (`base_sha`) and for
/// capturing a task branch's tip before a squash-reapply diff is taken.
pub async fn rev_parse(dir: &Path, rev: &str, timeout: Duration) -> Result<String, MergeError> {
    let mut cmd = git(dir);
    cmd.args(["rev-parse", rev]);
    let output = run_with_timeout(cmd, timeout, "git rev-parse").await?;
    if !output.status.success() {
        return Err(MergeError::Git(stderr_of(&output)));
    }
    Ok(stdout_of(&output))
}

/// Whether the repo's working tree has uncommitted changes (§4.5 step 1).
pub async fn is_dirty(dir: &Path, timeout: Duration) -> Result<bool, MergeError> {
    let mut cmd = git(dir);
    cmd.args(["status", "--porcelain"]);
    let output = run_with_timeout(cmd, timeout, "git status --porcelain").await?;
    if !output.status.success() {
        return Err(MergeError::Git(stderr_of(&output)));
    }
    Ok(!output.stdout.is_empty())
}

/// Create `name` at `start_point` and check it out, giving the rebase and
/// squash-reapply attempts a disposable branch to work on without
/// disturbing the task's own branch (§4.5 step 2: "in a temporary branch
/// copied from the task branch").
pub async fn create_temp_branch(dir: &Path, name: &str, start_point: &str, timeout: Duration) -> Result<(), MergeError> {
    let mut cmd = git(dir);
    cmd.args(["checkout", "-b", name, start_point]);
    let output = run_with_timeout(cmd, timeout, "git checkout -b").await?;
    if !output.status.success() {
        return Err(MergeError::Git(stderr_of(&output)));
    }
    Ok(())
}

pub async fn checkout(dir: &Path, branch: &str, timeout: Duration) -> Result<(), MergeError> {
    let mut cmd = git(dir);
    cmd.args(["checkout", branch]);
    let output = run_with_timeout(cmd, timeout, "git checkout").await?;
    if !output.status.success() {
        return Err(MergeError::Git(stderr_of(&output)));
    }
    Ok(())
}

pub async fn delete_branch(dir: &Path, name: &str, timeout: Duration) {
    let mut cmd = git(dir);
    cmd.args(["branch", "-D", name]);
    if let Ok(output) = run_with_timeout(cmd, timeout, "git branch -D").await {
        if !output.status.success() {
            tracing::warn!(branch = name, stderr = %stderr_of(&output), "failed to delete temp branch (best-effort)");
        }
    }
}

/// Whether the last `rebase`/`apply` left the index with unmerged paths.
pub async fn conflicted_files(dir: &Path, timeout: Duration) -> Result<Vec<String>, MergeError> {
    let mut cmd = git(dir);
    cmd.args(["diff", "--name-only", "--diff-filter=U"]);
    let output = run_with_timeout(cmd, timeout, "git diff --diff-filter=U").await?;
    if !output.status.success() {
        return Err(MergeError::Git(stderr_of(&output)));
    }
    Ok(stdout_of(&output).lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
}

/// Per-hunk diff of `path` against both sides of a conflict, read off the
/// index's stage-2 (ours) and stage-3 (theirs) blobs. Used to build the
/// conflict report (§4.5 step 6) without needing the conflict markers
/// already written into the worktree.
pub async fn conflict_hunks(dir: &Path, path: &str, timeout: Duration) -> Result<(String, String), MergeError> {
    let ours = show_staged(dir, 2, path, timeout).await.unwrap_or_default();
    let theirs = show_staged(dir, 3, path, timeout).await.unwrap_or_default();
    Ok((ours, theirs))
}

async fn show_staged(dir: &Path, stage: u8, path: &str, timeout: Duration) -> Result<String, MergeError> {
    let mut cmd = git(dir);
    cmd.args(["show", &format!(":{stage}:{path}")]);
    let output = run_with_timeout(cmd, timeout, "git show").await?;
    if !output.status.success() {
        return Ok(String::new());
    }
    Ok(stdout_of(&output))
}

/// Outcome of an attempted rebase or patch application: either it landed
/// cleanly, or it left conflicts that must be aborted/reset before trying
/// the next fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Clean,
    Conflicted,
}

/// `git rebase <onto>` on whatever branch is currently checked out in
/// `dir`. On conflict, aborts the rebase so the working tree is left
/// clean for the next attempt (§4.5 step 2/5).
pub async fn rebase_onto(dir: &Path, onto: &str, timeout: Duration) -> Result<ApplyOutcome, MergeError> {
    let mut cmd = git(dir);
    cmd.args(["rebase", onto]);
    let output = run_with_timeout(cmd, timeout, "git rebase").await?;
    if output.status.success() {
        return Ok(ApplyOutcome::Clean);
    }
    let mut abort = git(dir);
    abort.args(["rebase", "--abort"]);
    let _ = run_with_timeout(abort, timeout, "git rebase --abort").await;
    Ok(ApplyOutcome::Conflicted)
}

/// `git diff base..tip`, the total diff a squash-reapply replays as one
/// patch (§4.5 step 5).
pub async fn diff_range(dir: &Path, base: &str, tip: &str, timeout: Duration) -> Result<Vec<u8>, MergeError> {
    let mut cmd = git(dir);
    cmd.args(["diff", &format!("{base}..{tip}")]);
    let output = run_with_timeout(cmd, timeout, "git diff").await?;
    if !output.status.success() {
        return Err(MergeError::Git(stderr_of(&output)));
    }
    Ok(output.stdout)
}

/// Apply `diff` to the index and working tree of whatever branch is
/// checked out in `dir`, then commit it as a single squash commit.
/// Returns `Conflicted` (and leaves the apply partially staged, mirroring
/// `git apply`'s own behavior) rather than erroring, so the caller can
/// build a conflict report from it.
pub async fn apply_and_commit(dir: &Path, diff: &[u8], message: &str, timeout: Duration) -> Result<ApplyOutcome, MergeError> {
    let patch_path = dir.join(".delegate-merge.patch");
    tokio::fs::write(&patch_path, diff).await?;

    let mut cmd = git(dir);
    cmd.args(["apply", "--index", "--3way", &patch_path.display().to_string()]);
    let output = run_with_timeout(cmd, timeout, "git apply").await?;
    let _ = tokio::fs::remove_file(&patch_path).await;
    if !output.status.success() {
        return Ok(ApplyOutcome::Conflicted);
    }

    let mut cmd = git(dir);
    cmd.args(["commit", "-m", message]);
    let output = run_with_timeout(cmd, timeout, "git commit").await?;
    if !output.status.success() {
        return Err(MergeError::Git(stderr_of(&output)));
    }
    Ok(ApplyOutcome::Clean)
}

/// Discard a failed rebase/apply attempt's working-tree state and return
/// to `branch`, so the next fallback (or the next retry from step 1)
/// starts from a clean tree.
pub async fn abort_working_tree(dir: &Path, branch: &str, timeout: Duration) {
    let mut cmd = git(dir);
    cmd.args(["checkout", "--force", branch]);
    let _ = run_with_timeout(cmd, timeout, "git checkout --force").await;
    let mut cmd = git(dir);
    cmd.args(["clean", "-fd"]);
    let _ = run_with_timeout(cmd, timeout, "git clean -fd").await;
}

/// Run the repo's configured test command in `dir` (§4.5 step 3).
pub async fn run_tests(dir: &Path, test_command: &str, timeout: Duration) -> Result<std::process::Output, MergeError> {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", test_command]).current_dir(dir);
    run_with_timeout(cmd, timeout, "pre-merge test command").await.map_err(Into::into)
}

/// Compare-and-swap `git update-ref <ref_name> <new> <expected_old>`: the
/// atomic fast-forward of `main` (§4.5 step 4). A non-zero exit means a
/// concurrent writer moved the ref first (§4.5: "triggers a reference
/// race; retry from step 1").
pub async fn update_ref_cas(repo_root: &Path, ref_name: &str, expected_old: &str, new_sha: &str, timeout: Duration) -> Result<bool, MergeError> {
    let mut cmd = git(repo_root);
    cmd.args(["update-ref", ref_name, new_sha, expected_old]);
    let output = run_with_timeout(cmd, timeout, "git update-ref").await?;
    Ok(output.status.success())
}

impl From<delegate_resources::ResourceError> for MergeError {
    fn from(e: delegate_resources::ResourceError) -> Self {
        match e {
            delegate_resources::ResourceError::Timeout { label, timeout } => MergeError::Timeout { label, timeout },
            other => MergeError::Git(other.to_string()),
        }
    }
}
