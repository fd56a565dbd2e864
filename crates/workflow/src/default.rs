// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The built-in `default` workflow (§4.4): `todo -> in_progress ->
//! in_review -> in_approval -> merging -> done`, registered at daemon
//! boot. Each stage implements only the hooks its behavior needs.

use crate::stage::{GuardRejection, Stage, StageContext};
use crate::workflow::Workflow;
use crate::WorkflowError;
use async_trait::async_trait;
use delegate_core::{MemberRole, TaskStatus};
use smol_str::SmolStr;
use std::sync::Arc;

pub const DEFAULT_WORKFLOW_NAME: &str = "default";
pub const DEFAULT_WORKFLOW_VERSION: u32 = 1;

/// Build the built-in `default` workflow's stage sequence and side
/// transitions.
pub fn default_workflow() -> Workflow {
    let stages: Vec<Arc<dyn Stage>> = vec![
        Arc::new(TodoStage),
        Arc::new(InProgressStage),
        Arc::new(InReviewStage),
        Arc::new(InApprovalStage),
        Arc::new(MergingStage),
        Arc::new(DoneStage),
    ];
    let side_transitions = vec![
        (TaskStatus::InReview, TaskStatus::Rejected),
        (TaskStatus::InApproval, TaskStatus::Rejected),
        (TaskStatus::Rejected, TaskStatus::InProgress),
        (TaskStatus::Merging, TaskStatus::MergeFailed),
        (TaskStatus::MergeFailed, TaskStatus::InProgress),
        (TaskStatus::Error, TaskStatus::InProgress),
    ];
    Workflow::new(DEFAULT_WORKFLOW_NAME, DEFAULT_WORKFLOW_VERSION, stages, side_transitions)
}

struct TodoStage;

#[async_trait]
impl Stage for TodoStage {
    fn status(&self) -> TaskStatus {
        TaskStatus::Todo
    }
}

/// `in_progress`: owns worktree creation and `base_sha` capture.
/// Blocked if the task has an undone dependency (§3 `depends_on`).
struct InProgressStage;

#[async_trait]
impl Stage for InProgressStage {
    fn status(&self) -> TaskStatus {
        TaskStatus::InProgress
    }

    async fn guard(&self, ctx: &StageContext) -> Result<(), GuardRejection> {
        for dep in &ctx.task.depends_on {
            match ctx.store.get_task(ctx.team_id, *dep) {
                Ok(dep_task) if dep_task.status != TaskStatus::Done => {
                    return Err(GuardRejection::new(format!("blocked on dependency {dep} ({})", dep_task.status)));
                }
                Err(_) => return Err(GuardRejection::new(format!("dependency {dep} not found"))),
                Ok(_) => {}
            }
        }
        Ok(())
    }

    async fn enter(&self, ctx: &mut StageContext) -> Result<(), WorkflowError> {
        // `rejected -> in_progress` and `merge_failed -> in_progress` re-enter
        // this stage for a task that already owns a worktree (§3: a
        // worktree lives until task termination, not until one review
        // cycle ends). `base_sha` is only ever recorded on first creation,
        // so its presence is what makes re-entry idempotent instead of
        // erroring on `WorktreeExists`.
        for repo in ctx.task.repo.clone() {
            if ctx.task.base_sha.contains_key(&repo) {
                continue;
            }
            let wt = ctx.resources.create(ctx.team_id, ctx.task.id, &repo, &ctx.task.branch).await?;
            ctx.store.set_task_base_sha(ctx.team_id, ctx.task.id, repo, wt.base_sha)?;
        }
        if ctx.task.dri.is_none() {
            if let Some(assignee) = ctx.task.assignee.clone() {
                ctx.store.assign_dri(ctx.team_id, ctx.task.id, assignee)?;
            }
        }
        Ok(())
    }

    fn assign(&self, ctx: &StageContext) -> Option<SmolStr> {
        ctx.task.assignee.clone().or_else(|| ctx.task.dri.clone())
    }
}

struct InReviewStage;

#[async_trait]
impl Stage for InReviewStage {
    fn status(&self) -> TaskStatus {
        TaskStatus::InReview
    }

    async fn enter(&self, ctx: &mut StageContext) -> Result<(), WorkflowError> {
        let reviewer = self.assign(ctx).unwrap_or_else(|| SmolStr::new(delegate_core::SYSTEM_MEMBER));
        ctx.store.start_review(ctx.team_id, ctx.task.id, reviewer)?;
        Ok(())
    }

    /// Prefer a dedicated QA member over a generic reviewer (§9 open
    /// question on QA-role variants), falling back to any non-DRI worker.
    fn assign(&self, ctx: &StageContext) -> Option<SmolStr> {
        ctx.members
            .iter()
            .find(|m| m.role == MemberRole::Qa)
            .or_else(|| ctx.members.iter().find(|m| m.role == MemberRole::Reviewer))
            .or_else(|| ctx.members.iter().find(|m| m.role == MemberRole::Worker && Some(&m.name) != ctx.task.dri.as_ref()))
            .map(|m| m.name.clone())
    }
}

struct InApprovalStage;

#[async_trait]
impl Stage for InApprovalStage {
    fn status(&self) -> TaskStatus {
        TaskStatus::InApproval
    }

    /// Human approval gate: reassign to a human member so the scheduler
    /// doesn't try to wake an agent for a decision only a human can make.
    fn assign(&self, ctx: &StageContext) -> Option<SmolStr> {
        ctx.members.iter().find(|m| m.is_human()).map(|m| m.name.clone())
    }
}

/// `merging`: hands the task off to the `MergeWorker`'s FIFO queue (§4.5).
struct MergingStage;

#[async_trait]
impl Stage for MergingStage {
    fn status(&self) -> TaskStatus {
        TaskStatus::Merging
    }

    async fn enter(&self, ctx: &mut StageContext) -> Result<(), WorkflowError> {
        if let Some(queue) = &ctx.merge_queue {
            if queue.send((ctx.team_id, ctx.task.id)).await.is_err() {
                tracing::error!(task_id = %ctx.task.id, "merge queue receiver dropped, task will not be merged");
            }
        }
        Ok(())
    }
}

struct DoneStage;

#[async_trait]
impl Stage for DoneStage {
    fn status(&self) -> TaskStatus {
        TaskStatus::Done
    }
}
