// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git worktree add/remove, grounded on the teacher's `engine::workspace`
//! module (linked, not cloned, worktrees).

use crate::subprocess::{run_with_timeout, GIT_WORKTREE_TIMEOUT};
use crate::ResourceError;
use std::path::Path;
use tokio::process::Command;

fn stderr_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Current `main` tip SHA of a repository, used to stamp a task's
/// `base_sha` at worktree-creation time (§3).
pub async fn head_sha(repo_root: &Path) -> Result<String, ResourceError> {
    let mut cmd = Command::new("git");
    cmd.args(["-C", &repo_root.display().to_string(), "rev-parse", "HEAD"]);
    let output = run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git rev-parse HEAD").await?;
    if !output.status.success() {
        return Err(ResourceError::GitFailed { stderr: stderr_of(&output) });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Whether the repo's working tree has uncommitted changes (§4.5 preflight).
pub async fn is_dirty(repo_root: &Path) -> Result<bool, ResourceError> {
    let mut cmd = Command::new("git");
    cmd.args(["-C", &repo_root.display().to_string(), "status", "--porcelain"]);
    let output = run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git status --porcelain").await?;
    if !output.status.success() {
        return Err(ResourceError::GitFailed { stderr: stderr_of(&output) });
    }
    Ok(!output.stdout.is_empty())
}

/// `git worktree add -b <branch> <path> <start_point>`, linked to
/// `repo_root` (§6: "linked to the operator's real repository; no clone").
pub async fn add(repo_root: &Path, path: &Path, branch: &str, start_point: &str) -> Result<(), ResourceError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut cmd = Command::new("git");
    cmd.args([
        "-C",
        &repo_root.display().to_string(),
        "worktree",
        "add",
        "-b",
        branch,
        &path.display().to_string(),
        start_point,
    ])
    .env_remove("GIT_DIR")
    .env_remove("GIT_WORK_TREE");
    let output = run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git worktree add").await?;
    if !output.status.success() {
        return Err(ResourceError::GitFailed { stderr: stderr_of(&output) });
    }
    Ok(())
}

/// Remove a worktree and its branch. Best-effort on the branch delete,
/// mirroring the teacher's `delete_workspace_files`: a dangling branch is
/// harmless, a dangling worktree registration blocks future `git worktree`
/// commands.
pub async fn remove(repo_root: &Path, path: &Path, branch: &str) {
    let mut cmd = Command::new("git");
    cmd.args(["-C", &repo_root.display().to_string(), "worktree", "remove", "--force", &path.display().to_string()]);
    if let Err(e) = run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git worktree remove").await {
        tracing::warn!(path = %path.display(), error = %e, "git worktree remove failed (best-effort)");
    }

    let mut cmd = Command::new("git");
    cmd.args(["-C", &repo_root.display().to_string(), "branch", "-D", branch])
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE");
    if let Err(e) = run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git branch -D").await {
        tracing::warn!(%branch, error = %e, "git branch delete failed (best-effort)");
    }

    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_dir_all(path).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove worktree directory (best-effort)");
        }
    }
}
