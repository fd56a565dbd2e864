// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon-startup worktree reconciliation (§4.6), grounded on the
//! teacher's `daemon::lifecycle::reconcile` pass over sessions: compare
//! what the Store thinks is active against what's actually on disk.

use crate::ResourceManager;
use delegate_core::{Task, TaskId, TaskStatus, TeamId, Worktree};
use delegate_store::Store;
use std::collections::HashSet;
use tracing::{info, warn};

/// Statuses a task can be in while it's expected to own a live worktree
/// (§3: "lives from task entry into `in_progress` until termination").
fn owns_worktree(status: TaskStatus) -> bool {
    matches!(
        status,
        TaskStatus::InProgress
            | TaskStatus::InReview
            | TaskStatus::InApproval
            | TaskStatus::Merging
            | TaskStatus::MergeFailed
            | TaskStatus::Error
    )
}

/// Parse a `<repo>-T<NNNN>` worktree directory name back into its parts.
fn parse_dir_name(name: &str) -> Option<(String, TaskId)> {
    let idx = name.rfind("-T")?;
    let (repo, rest) = name.split_at(idx);
    let task_id = TaskId::parse(&rest[1..])?;
    if repo.is_empty() {
        return None;
    }
    Some((repo.to_string(), task_id))
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Worktree directories removed because their task is no longer active.
    pub pruned: Vec<std::path::PathBuf>,
    /// Tasks whose missing worktree was recreated from `base_sha`.
    pub recreated: Vec<TaskId>,
    /// Tasks whose worktree could not be recreated (repo gone, no
    /// `base_sha`) — the caller should move these to `error`.
    pub errored: Vec<TaskId>,
}

/// Reconcile every team's worktrees against the Store's view of which
/// tasks are active (§4.6: "any worktree on disk whose task is not in an
/// active stage is pruned; any active task whose worktree is missing has
/// it recreated from `base_sha` if possible, else marked `error`").
pub async fn reconcile(resources: &ResourceManager, store: &Store) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for team_id in store.list_teams() {
        let Ok(tasks) = store.list_tasks(team_id) else { continue };
        let active: Vec<&Task> = tasks.iter().filter(|t| owns_worktree(t.status)).collect();

        let mut expected: HashSet<(String, TaskId)> = HashSet::new();
        for task in &active {
            for repo in &task.repo {
                expected.insert((repo.clone(), task.id));
            }
        }

        let dir = resources.home_dir().join(team_id.to_string()).join("worktrees");
        let mut on_disk: HashSet<(String, TaskId)> = HashSet::new();
        if let Ok(mut entries) = tokio::fs::read_dir(&dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let Some(name) = entry.file_name().to_str().map(str::to_owned) else { continue };
                if let Some(parsed) = parse_dir_name(&name) {
                    on_disk.insert(parsed);
                }
            }
        }

        for (repo, task_id) in on_disk.difference(&expected) {
            let path = resources.worktree_path(team_id, *task_id, repo);
            info!(%team_id, %task_id, %repo, "pruning orphaned worktree");
            if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                warn!(path = %path.display(), error = %e, "failed to prune orphaned worktree (best-effort)");
            }
            report.pruned.push(path);
        }

        for task in &active {
            for repo in &task.repo {
                if on_disk.contains(&(repo.clone(), task.id)) {
                    continue;
                }
                let Some(base_sha) = task.base_sha.get(repo) else {
                    warn!(%team_id, task_id = %task.id, %repo, "missing worktree with no base_sha, cannot recreate");
                    report.errored.push(task.id);
                    continue;
                };
                let wt = Worktree {
                    task_id: task.id,
                    repo: repo.clone(),
                    path: resources.worktree_path(team_id, task.id, repo),
                    branch: task.branch.clone(),
                    base_sha: base_sha.clone(),
                };
                match resources.recreate(&wt).await {
                    Ok(()) => {
                        info!(%team_id, task_id = %task.id, %repo, "recreated missing worktree from base_sha");
                        report.recreated.push(task.id);
                    }
                    Err(e) => {
                        warn!(%team_id, task_id = %task.id, %repo, error = %e, "failed to recreate missing worktree");
                        report.errored.push(task.id);
                    }
                }
            }
        }
    }

    report
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
