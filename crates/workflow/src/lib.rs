// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! delegate-workflow: the task state machine (§4.4). A task progresses
//! through a stage sequence defined by a `(workflow_name,
//! workflow_version)` pair; each stage exposes `enter`/`exit`/`guard`/
//! `assign` hooks. The built-in `default` workflow ships in
//! [`default_workflow`]; custom ones register into a
//! [`WorkflowRegistry`].

pub mod default;
pub mod import;
mod stage;
mod workflow;

pub use default::{default_workflow, DEFAULT_WORKFLOW_NAME, DEFAULT_WORKFLOW_VERSION};
pub use stage::{GuardRejection, Stage, StageContext, StageRef};
pub use workflow::{Workflow, WorkflowRegistry};

use delegate_core::{ReviewVerdict, TaskId, TaskStatus, TeamId};
use delegate_events::{DelegateEvent, EventBus};
use delegate_resources::{ResourceError, ResourceManager};
use delegate_store::{Store, StoreError};
use parking_lot::Mutex as SyncMutex;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("no stage registered for status {0} in workflow")]
    UnknownStage(TaskStatus),
    #[error("guard rejected transition: {reason}")]
    GuardRejected { reason: String },
    #[error("stage hook panicked")]
    HookPanicked,
    #[error("transition is stale: task was already moved to {actual} by a concurrent caller")]
    StaleTransition { actual: TaskStatus },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl From<GuardRejection> for WorkflowError {
    fn from(rejection: GuardRejection) -> Self {
        WorkflowError::GuardRejected { reason: rejection.reason }
    }
}

/// Default cap on `in_review` rejections before human escalation (§4.4).
pub const DEFAULT_REVIEW_ATTEMPT_CAP: u32 = 3;

/// The task state machine driver: resolves `(workflow_name, version)` to
/// a registered [`Workflow`], serializes transitions per task, and runs
/// each stage's hooks.
pub struct WorkflowEngine {
    store: Arc<Store>,
    resources: Arc<ResourceManager>,
    events: Arc<EventBus>,
    registry: Arc<parking_lot::RwLock<WorkflowRegistry>>,
    task_locks: SyncMutex<HashMap<TaskId, Arc<AsyncMutex<()>>>>,
    review_attempt_cap: u32,
    // Interior mutability rather than a builder-only field: the merge
    // worker's `queue_sender` isn't available until after a `MergeWorker`
    // is constructed, and `MergeWorker::new` itself takes an
    // `Arc<WorkflowEngine>` so it can call back into `advance` on
    // completion (§4.5). Wiring the queue in after both sides exist (via
    // `set_merge_queue`) breaks that cycle without a dummy first instance.
    merge_queue: SyncMutex<Option<tokio::sync::mpsc::Sender<(TeamId, TaskId)>>>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<Store>, resources: Arc<ResourceManager>, events: Arc<EventBus>) -> Self {
        let mut registry = WorkflowRegistry::new();
        registry.register(default_workflow());
        Self {
            store,
            resources,
            events,
            registry: Arc::new(parking_lot::RwLock::new(registry)),
            task_locks: SyncMutex::new(HashMap::new()),
            review_attempt_cap: DEFAULT_REVIEW_ATTEMPT_CAP,
            merge_queue: SyncMutex::new(None),
        }
    }

    pub fn with_review_attempt_cap(mut self, cap: u32) -> Self {
        self.review_attempt_cap = cap;
        self
    }

    /// Wire up the `MergeWorker`'s input queue so the `merging` stage's
    /// `enter` hook can hand off tasks to it (§4.5). Builder form, for
    /// callers (mostly tests) that have the sender before the engine is
    /// shared behind an `Arc`.
    pub fn with_merge_queue(self, merge_queue: tokio::sync::mpsc::Sender<(TeamId, TaskId)>) -> Self {
        *self.merge_queue.lock() = Some(merge_queue);
        self
    }

    /// Same as [`Self::with_merge_queue`] but through `&self`, so the
    /// queue can be wired in after this engine is already behind an `Arc`
    /// shared with a `MergeWorker` that was constructed from that same
    /// `Arc` (§2 boot order: the two are mutually referential).
    pub fn set_merge_queue(&self, merge_queue: tokio::sync::mpsc::Sender<(TeamId, TaskId)>) {
        *self.merge_queue.lock() = Some(merge_queue);
    }

    pub fn register_workflow(&self, workflow: Workflow) {
        self.registry.write().register(workflow);
    }

    fn task_lock(&self, task_id: TaskId) -> Arc<AsyncMutex<()>> {
        self.task_locks.lock().entry(task_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    async fn build_context(&self, team_id: TeamId, task_id: TaskId, now_ms: u64) -> Result<StageContext, WorkflowError> {
        let task = self.store.get_task(team_id, task_id)?;
        let members = self.store.list_members(team_id)?;
        Ok(StageContext {
            store: self.store.clone(),
            resources: self.resources.clone(),
            events: self.events.clone(),
            team_id,
            task,
            members,
            now_ms,
            merge_queue: self.merge_queue.lock().clone(),
        })
    }

    /// Run a stage hook in a `tokio::spawn`'d task so a panicking hook
    /// becomes a `HookPanicked` error instead of taking the whole process
    /// down (§4.4: "unhandled hook exceptions put the task in an `error`
    /// state"). On panic the context is gone with the panicked task; the
    /// caller moves the task to `error` from the Store's still-current
    /// pre-transition state rather than reusing it.
    async fn run_enter(stage: StageRef, mut ctx: StageContext) -> Result<StageContext, WorkflowError> {
        let handle = tokio::spawn(async move {
            let result = stage.enter(&mut ctx).await;
            (ctx, result)
        });
        match handle.await {
            Ok((ctx, Ok(()))) => Ok(ctx),
            Ok((_ctx, Err(e))) => Err(e),
            Err(_join_err) => Err(WorkflowError::HookPanicked),
        }
    }

    async fn run_exit(stage: StageRef, mut ctx: StageContext) -> Result<StageContext, WorkflowError> {
        let handle = tokio::spawn(async move {
            let result = stage.exit(&mut ctx).await;
            (ctx, result)
        });
        match handle.await {
            Ok((ctx, Ok(()))) => Ok(ctx),
            Ok((_ctx, Err(e))) => Err(e),
            Err(_join_err) => Err(WorkflowError::HookPanicked),
        }
    }

    /// Advance `task_id` to `to`, running the outgoing stage's `exit`
    /// hook, the incoming stage's `guard` then `enter` hook, and
    /// committing the status transition (§4.4).
    pub async fn advance(&self, team_id: TeamId, task_id: TaskId, to: TaskStatus, now_ms: u64) -> Result<(), WorkflowError> {
        let lock = self.task_lock(task_id);
        let _guard = lock.lock().await;

        let ctx = self.build_context(team_id, task_id, now_ms).await?;
        let from = ctx.task.status;
        let workflow_name = ctx.task.workflow_name.clone();
        let workflow_version = ctx.task.workflow_version;
        let workflow = self
            .registry
            .read()
            .get(&workflow_name, workflow_version)
            .ok_or(WorkflowError::UnknownStage(to))?;

        if !workflow.allows(from, to) {
            return Err(WorkflowError::GuardRejected { reason: format!("workflow does not permit {from} -> {to}") });
        }

        let target_stage = workflow.stage_for(to).cloned();

        let ctx = if let Some(stage) = workflow.stage_for(from) {
            match Self::run_exit(stage.clone(), ctx).await {
                Ok(ctx) => ctx,
                Err(e) => return self.fail_into_error_state(team_id, task_id, now_ms, e).await,
            }
        } else {
            ctx
        };

        match self.do_transition(team_id, task_id, from, to, now_ms, ctx, target_stage).await {
            Ok(()) => Ok(()),
            Err(e @ WorkflowError::HookPanicked) | Err(e @ WorkflowError::Resource(_)) => {
                self.fail_into_error_state(team_id, task_id, now_ms, e).await
            }
            Err(e) => Err(e),
        }
    }

    /// Move a task into the `error` stage after an unhandled hook
    /// exception (§4.4), bypassing the normal `allows` check since this
    /// is a recovery action taken while already holding the task lock,
    /// not a caller-driven transition.
    async fn fail_into_error_state(&self, team_id: TeamId, task_id: TaskId, now_ms: u64, cause: WorkflowError) -> Result<(), WorkflowError> {
        warn!(%team_id, %task_id, error = %cause, "stage hook failed, moving task to error");
        self.store.transition_task(team_id, task_id, TaskStatus::Error, now_ms, None)?;
        self.store.record_activity(delegate_core::Activity {
            team_id,
            agent: SmolStr::new(delegate_core::SYSTEM_MEMBER),
            activity_type: delegate_core::ActivityType::TaskUpdate,
            task_id: Some(task_id),
            payload: HashMap::from([("hook_error".to_string(), cause.to_string())]),
            timestamp_ms: now_ms,
        })?;
        self.events.publish(team_id, DelegateEvent::TaskUpdate { task_id, status: TaskStatus::Error });
        Err(cause)
    }

    async fn do_transition(
        &self,
        team_id: TeamId,
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
        now_ms: u64,
        ctx: StageContext,
        target_stage: Option<StageRef>,
    ) -> Result<(), WorkflowError> {
        if let Some(stage) = &target_stage {
            if let Err(rejection) = stage.guard(&ctx).await {
                warn!(%team_id, %task_id, %from, %to, reason = %rejection.reason, "guard rejected transition");
                self.store.record_activity(delegate_core::Activity {
                    team_id,
                    agent: SmolStr::new(delegate_core::SYSTEM_MEMBER),
                    activity_type: delegate_core::ActivityType::TaskUpdate,
                    task_id: Some(task_id),
                    payload: HashMap::from([("guard_rejected".to_string(), rejection.reason.clone())]),
                    timestamp_ms: now_ms,
                })?;
                return Err(rejection.into());
            }
        }

        match self.store.transition_task(team_id, task_id, to, now_ms, Some(from)) {
            Ok(()) => {}
            Err(StoreError::StaleTransition { actual }) => return Err(WorkflowError::StaleTransition { actual }),
            Err(e) => return Err(e.into()),
        }
        info!(%team_id, %task_id, %from, %to, "task transitioned");

        let ctx = StageContext { task: self.store.get_task(team_id, task_id)?, ..ctx };
        if let Some(stage) = target_stage {
            let assignee = stage.assign(&ctx);
            if let Some(assignee) = assignee.clone() {
                self.store.assign_task(team_id, task_id, Some(assignee))?;
            }
            // Published only after the assignee is committed, so a
            // TurnScheduler reacting to this event by reading the task
            // back from the Store sees the member it should wake, not the
            // stage's outgoing assignee (§4.3 dispatch trigger (b)).
            self.events.publish(team_id, DelegateEvent::TaskUpdate { task_id, status: to });
            Self::run_enter(stage, ctx).await?;
        } else {
            self.events.publish(team_id, DelegateEvent::TaskUpdate { task_id, status: to });
        }
        Ok(())
    }

    /// Record a review verdict and drive the resulting transition:
    /// `pass` advances to `in_approval`, `fail` moves to `rejected` and
    /// may trigger the review-attempt-cap human escalation (§4.4).
    pub async fn decide_review(
        &self,
        team_id: TeamId,
        task_id: TaskId,
        verdict: ReviewVerdict,
        summary: impl Into<String>,
        now_ms: u64,
    ) -> Result<(), WorkflowError> {
        self.store.decide_review(team_id, task_id, verdict, summary)?;
        match verdict {
            ReviewVerdict::Pass => self.advance(team_id, task_id, TaskStatus::InApproval, now_ms).await,
            ReviewVerdict::Fail => {
                self.advance(team_id, task_id, TaskStatus::Rejected, now_ms).await?;
                let history = self.store.get_review_history(team_id, task_id)?;
                if history.should_escalate(self.review_attempt_cap) {
                    warn!(%team_id, %task_id, cap = self.review_attempt_cap, "review attempt cap reached, escalating to human");
                    let members = self.store.list_members(team_id)?;
                    if let Some(human) = members.iter().find(|m| m.is_human()) {
                        self.store.assign_task(team_id, task_id, Some(human.name.clone()))?;
                        self.store.record_activity(delegate_core::Activity {
                            team_id,
                            agent: SmolStr::new(delegate_core::SYSTEM_MEMBER),
                            activity_type: delegate_core::ActivityType::TaskUpdate,
                            task_id: Some(task_id),
                            payload: HashMap::from([("escalated_to".to_string(), human.name.to_string())]),
                            timestamp_ms: now_ms,
                        })?;
                    }
                }
                self.advance(team_id, task_id, TaskStatus::InProgress, now_ms).await
            }
            ReviewVerdict::Pending => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
