// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `GitHost` external interface (§6): the git operations the
//! ResourceManager and MergeWorker rely on, behind a trait so a test
//! double can stand in for a real repository.
//!
//! `delegate-resources` and `delegate-merge` call `git` directly through
//! `delegate_resources::subprocess::run_with_timeout` rather than through
//! this trait — that's the hot path and it's already timeout-wrapped and
//! tested. This trait is the formal typed boundary §6 names, backed by
//! [`ProcessGitHost`], the same subprocess wrapper under a shared shape,
//! for callers (future backends, integration harnesses) that want to
//! swap the git backend without touching `delegate-merge`/`delegate-resources`.

use async_trait::async_trait;
use delegate_resources::subprocess::run_with_timeout;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// How a `GitHost` operation landed. Distinguishes clean success from the
/// three failure shapes §6 requires callers be able to tell apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitOutcome<T = ()> {
    Clean(T),
    Conflicted { files: Vec<String> },
    Transient { reason: String },
    Fatal { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum GitHostError {
    #[error("git host io error: {0}")]
    Io(String),
}

fn git_in(dir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.args(["-C", &dir.display().to_string()]);
    cmd
}

fn classify(output: &std::process::Output) -> GitOutcome<String> {
    if output.status.success() {
        return GitOutcome::Clean(String::from_utf8_lossy(&output.stdout).trim().to_string());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.contains("CONFLICT") || stderr.contains("conflict") {
        GitOutcome::Conflicted { files: Vec::new() }
    } else if stderr.contains("Could not resolve host") || stderr.contains("timed out") || stderr.contains("lock") {
        GitOutcome::Transient { reason: stderr }
    } else {
        GitOutcome::Fatal { reason: stderr }
    }
}

/// The git operations `ResourceManager` and `MergeWorker` are specified
/// to rely on (§6): worktree lifecycle, fetching, rebasing, patch
/// application, the ref compare-and-swap, and the repo's test command.
#[async_trait]
pub trait GitHost: Send + Sync + 'static {
    async fn worktree_add(&self, repo: &Path, path: &Path, branch: &str, start_point: &str) -> GitOutcome;
    async fn worktree_remove(&self, repo: &Path, path: &Path) -> GitOutcome;
    async fn fetch_head(&self, repo: &Path) -> GitOutcome<String>;
    async fn rebase(&self, repo: &Path, branch: &str, onto: &str) -> GitOutcome;
    async fn apply_diff(&self, repo: &Path, diff: &[u8]) -> GitOutcome;
    async fn update_ref_cas(&self, repo: &Path, ref_name: &str, expected: &str, new: &str) -> GitOutcome;
    async fn run_tests(&self, path: &Path, cmd: &str) -> GitOutcome<String>;
}

/// The real `GitHost`, shelling out to `git`/`sh` with the shared
/// timeout wrapper (§5: "all blocking git calls carry a configurable timeout").
pub struct ProcessGitHost {
    pub worktree_timeout: Duration,
    pub rebase_timeout: Duration,
    pub test_timeout: Duration,
}

impl Default for ProcessGitHost {
    fn default() -> Self {
        Self {
            worktree_timeout: delegate_resources::subprocess::GIT_WORKTREE_TIMEOUT,
            rebase_timeout: delegate_resources::subprocess::GIT_REBASE_TIMEOUT,
            test_timeout: delegate_resources::subprocess::GIT_TEST_TIMEOUT,
        }
    }
}

fn to_outcome<T>(result: Result<std::process::Output, delegate_resources::ResourceError>, ok: impl FnOnce(String) -> T) -> GitOutcome<T> {
    match result {
        Ok(output) => match classify(&output) {
            GitOutcome::Clean(stdout) => GitOutcome::Clean(ok(stdout)),
            GitOutcome::Conflicted { files } => GitOutcome::Conflicted { files },
            GitOutcome::Transient { reason } => GitOutcome::Transient { reason },
            GitOutcome::Fatal { reason } => GitOutcome::Fatal { reason },
        },
        Err(delegate_resources::ResourceError::Timeout { label, timeout }) => {
            GitOutcome::Transient { reason: format!("{label} timed out after {timeout:?}") }
        }
        Err(e) => GitOutcome::Fatal { reason: e.to_string() },
    }
}

#[async_trait]
impl GitHost for ProcessGitHost {
    async fn worktree_add(&self, repo: &Path, path: &Path, branch: &str, start_point: &str) -> GitOutcome {
        let mut cmd = git_in(repo);
        cmd.args(["worktree", "add", "-b", branch, &path.display().to_string(), start_point]);
        to_outcome(run_with_timeout(cmd, self.worktree_timeout, "git worktree add").await, |_| ())
    }

    async fn worktree_remove(&self, repo: &Path, path: &Path) -> GitOutcome {
        let mut cmd = git_in(repo);
        cmd.args(["worktree", "remove", "--force", &path.display().to_string()]);
        to_outcome(run_with_timeout(cmd, self.worktree_timeout, "git worktree remove").await, |_| ())
    }

    async fn fetch_head(&self, repo: &Path) -> GitOutcome<String> {
        let mut cmd = git_in(repo);
        cmd.args(["rev-parse", "HEAD"]);
        to_outcome(run_with_timeout(cmd, self.worktree_timeout, "git rev-parse HEAD").await, |s| s)
    }

    async fn rebase(&self, repo: &Path, branch: &str, onto: &str) -> GitOutcome {
        let mut cmd = git_in(repo);
        cmd.args(["rebase", "--onto", onto, branch]);
        to_outcome(run_with_timeout(cmd, self.rebase_timeout, "git rebase --onto").await, |_| ())
    }

    async fn apply_diff(&self, repo: &Path, diff: &[u8]) -> GitOutcome {
        let patch_path: PathBuf = repo.join(".delegate-githost.patch");
        if let Err(e) = tokio::fs::write(&patch_path, diff).await {
            return GitOutcome::Fatal { reason: e.to_string() };
        }
        let mut cmd = git_in(repo);
        cmd.args(["apply", "--index", "--3way", &patch_path.display().to_string()]);
        let result = run_with_timeout(cmd, self.rebase_timeout, "git apply").await;
        let _ = tokio::fs::remove_file(&patch_path).await;
        to_outcome(result, |_| ())
    }

    async fn update_ref_cas(&self, repo: &Path, ref_name: &str, expected: &str, new: &str) -> GitOutcome {
        let mut cmd = git_in(repo);
        cmd.args(["update-ref", ref_name, new, expected]);
        to_outcome(run_with_timeout(cmd, self.worktree_timeout, "git update-ref").await, |_| ())
    }

    async fn run_tests(&self, path: &Path, cmd: &str) -> GitOutcome<String> {
        let mut command = Command::new("sh");
        command.args(["-c", cmd]).current_dir(path);
        to_outcome(run_with_timeout(command, self.test_timeout, "pre-merge test command").await, |s| s)
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeGitHost;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// A scripted `GitHost` for merge-worker and resource-manager tests:
    /// queues the next outcome per method, defaulting to `Clean` once a
    /// queue runs dry.
    #[derive(Default)]
    pub struct FakeGitHost {
        rebase_script: Mutex<VecDeque<GitOutcome>>,
        apply_script: Mutex<VecDeque<GitOutcome>>,
        cas_script: Mutex<VecDeque<GitOutcome>>,
    }

    impl FakeGitHost {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn push_rebase(&self, outcome: GitOutcome) {
            self.rebase_script.lock().push_back(outcome);
        }

        pub fn push_apply(&self, outcome: GitOutcome) {
            self.apply_script.lock().push_back(outcome);
        }

        pub fn push_cas(&self, outcome: GitOutcome) {
            self.cas_script.lock().push_back(outcome);
        }
    }

    #[async_trait]
    impl GitHost for FakeGitHost {
        async fn worktree_add(&self, _repo: &Path, _path: &Path, _branch: &str, _start_point: &str) -> GitOutcome {
            GitOutcome::Clean(())
        }

        async fn worktree_remove(&self, _repo: &Path, _path: &Path) -> GitOutcome {
            GitOutcome::Clean(())
        }

        async fn fetch_head(&self, _repo: &Path) -> GitOutcome<String> {
            GitOutcome::Clean("0000000000000000000000000000000000000000".to_string())
        }

        async fn rebase(&self, _repo: &Path, _branch: &str, _onto: &str) -> GitOutcome {
            self.rebase_script.lock().pop_front().unwrap_or(GitOutcome::Clean(()))
        }

        async fn apply_diff(&self, _repo: &Path, _diff: &[u8]) -> GitOutcome {
            self.apply_script.lock().pop_front().unwrap_or(GitOutcome::Clean(()))
        }

        async fn update_ref_cas(&self, _repo: &Path, _ref_name: &str, _expected: &str, _new: &str) -> GitOutcome {
            self.cas_script.lock().pop_front().unwrap_or(GitOutcome::Clean(()))
        }

        async fn run_tests(&self, _path: &Path, _cmd: &str) -> GitOutcome<String> {
            GitOutcome::Clean(String::new())
        }
    }
}

#[cfg(test)]
#[path = "git_host_tests.rs"]
mod tests;
