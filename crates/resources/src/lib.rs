// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! delegate-resources: per-task git worktree lifecycle (§4.6
//! ResourceManager), plus the subprocess timeout helper every git
//! invocation in this crate and `delegate-merge` shares.

pub mod reconcile;
pub mod subprocess;
pub mod worktree;

use delegate_core::{TaskId, TeamId, Worktree};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("worktree for task {0} already exists")]
    WorktreeExists(TaskId),
    #[error("repo {0:?} is not registered")]
    RepoNotFound(String),
    #[error("git operation failed: {stderr}")]
    GitFailed { stderr: String },
    #[error("{label} timed out after {timeout:?}")]
    Timeout { label: String, timeout: std::time::Duration },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Owns the on-disk layout §6 describes: a root home directory holding a
/// `repos/` registry of symlinks into local git repositories, and
/// per-team `worktrees/<repo>-T<NNNN>` directories.
pub struct ResourceManager {
    home_dir: PathBuf,
    repos: RwLock<HashMap<String, PathBuf>>,
}

impl ResourceManager {
    /// Open (creating if absent) the resource home at `home_dir`, loading
    /// the `repos/` registry from whatever symlinks already exist there.
    pub fn open(home_dir: impl Into<PathBuf>) -> Result<Self, ResourceError> {
        let home_dir = home_dir.into();
        std::fs::create_dir_all(home_dir.join("repos"))?;
        let mut repos = HashMap::new();
        for entry in std::fs::read_dir(home_dir.join("repos"))? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else { continue };
            if let Ok(target) = std::fs::canonicalize(entry.path()) {
                repos.insert(name, target);
            }
        }
        Ok(Self { home_dir, repos: RwLock::new(repos) })
    }

    fn repos_link(&self, name: &str) -> PathBuf {
        self.home_dir.join("repos").join(name)
    }

    /// Register a local git repository under `name`, symlinking it into
    /// the `repos/` registry (§6: "symlinks into local git repositories").
    pub fn register_repo(&self, name: impl Into<String>, path: impl Into<PathBuf>) -> Result<(), ResourceError> {
        let name = name.into();
        let path = path.into();
        let link = self.repos_link(&name);
        if link.exists() || link.symlink_metadata().is_ok() {
            let _ = std::fs::remove_file(&link);
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(&path, &link)?;
        #[cfg(not(unix))]
        std::fs::write(&link, path.display().to_string())?;
        self.repos.write().insert(name, path);
        Ok(())
    }

    pub fn repo_path(&self, name: &str) -> Option<PathBuf> {
        self.repos.read().get(name).cloned()
    }

    fn worktrees_dir(&self, team_id: TeamId) -> PathBuf {
        self.home_dir.join(team_id.to_string()).join("worktrees")
    }

    /// Directory for one task's worktree of one repo: `<repo>-T<NNNN>` (§6).
    pub fn worktree_path(&self, team_id: TeamId, task_id: TaskId, repo: &str) -> PathBuf {
        self.worktrees_dir(team_id).join(Worktree::dir_name(repo, task_id))
    }

    /// Create a worktree for `repo` at `branch`, anchored to the repo's
    /// current `main` tip, and return the recorded resource (§4.4: entering
    /// `in_progress` "atomically creates the worktree, records `base_sha`").
    pub async fn create(&self, team_id: TeamId, task_id: TaskId, repo: &str, branch: &str) -> Result<Worktree, ResourceError> {
        let repo_root = self.repo_path(repo).ok_or_else(|| ResourceError::RepoNotFound(repo.to_string()))?;
        let path = self.worktree_path(team_id, task_id, repo);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ResourceError::WorktreeExists(task_id));
        }
        let base_sha = worktree::head_sha(&repo_root).await?;
        worktree::add(&repo_root, &path, branch, &base_sha).await?;
        Ok(Worktree { task_id, repo: repo.to_string(), path, branch: branch.to_string(), base_sha })
    }

    /// Recreate a worktree whose `base_sha` is already known (crash
    /// recovery, §4.6 reconciliation: "recreated from `base_sha` if possible").
    pub async fn recreate(&self, wt: &Worktree) -> Result<(), ResourceError> {
        let repo_root = self.repo_path(&wt.repo).ok_or_else(|| ResourceError::RepoNotFound(wt.repo.clone()))?;
        worktree::add(&repo_root, &wt.path, &wt.branch, &wt.base_sha).await
    }

    /// Tear down a worktree: deterministic on `done`, `cancelled`, or a
    /// resolved `merge_failed` (§3).
    pub async fn destroy(&self, wt: &Worktree) -> Result<(), ResourceError> {
        let repo_root = self.repo_path(&wt.repo).ok_or_else(|| ResourceError::RepoNotFound(wt.repo.clone()))?;
        worktree::remove(&repo_root, &wt.path, &wt.branch).await;
        Ok(())
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
