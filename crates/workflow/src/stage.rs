// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Stage` trait (§4.4): four hooks per stage, matching the teacher's
//! `AgentAdapter`/`NotifyAdapter` trait-object-injected-into-`Runtime`
//! shape — concrete stages override only the hooks they need.

use async_trait::async_trait;
use delegate_core::{Member, Task, TaskId, TeamId};
use delegate_events::EventBus;
use delegate_resources::ResourceManager;
use delegate_store::Store;
use smol_str::SmolStr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything a hook needs to act: the durable state it's transitioning,
/// plus the collaborators (Store, worktree manager, event bus) it's
/// allowed to touch. Built fresh for each `advance` call. Owns its
/// collaborators (rather than borrowing) so a hook invocation can be
/// `tokio::spawn`'d to catch a panicking hook (§4.4 "unhandled hook
/// exceptions put the task in an `error` state").
pub struct StageContext {
    pub store: Arc<Store>,
    pub resources: Arc<ResourceManager>,
    pub events: Arc<EventBus>,
    pub team_id: TeamId,
    pub task: Task,
    pub members: Vec<Member>,
    pub now_ms: u64,
    /// Feeds the `MergeWorker`'s FIFO input queue; the `merging` stage's
    /// `enter` hook is how a task's merge attempt gets queued (§4.5).
    /// Carries `TeamId` alongside `TaskId` because task ids are only
    /// dense per team (§3) — a single process-wide merge worker can't
    /// resolve a task from its id alone once more than one team exists.
    /// `None` in tests that don't exercise the merge handoff.
    pub merge_queue: Option<mpsc::Sender<(TeamId, TaskId)>>,
}

impl StageContext {
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name.as_str() == name)
    }
}

/// A guard's rejection: the task stays in its current stage and `reason`
/// is surfaced to the caller (§4.4: "rejects keeps the task in its
/// current stage and records the reason as a comment").
#[derive(Debug, Clone)]
pub struct GuardRejection {
    pub reason: String,
}

impl GuardRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// One stage in a workflow's sequence. All four hooks default to a no-op
/// so a concrete stage only implements the ones its behavior needs —
/// most stages override `guard` or `assign` alone.
#[async_trait]
pub trait Stage: Send + Sync {
    /// The status this stage represents. Used by `Workflow` to resolve
    /// which `Stage` governs a given `TaskStatus`.
    fn status(&self) -> delegate_core::TaskStatus;

    /// Called on transition into this stage, after the guard passes.
    async fn enter(&self, ctx: &mut StageContext) -> Result<(), crate::WorkflowError> {
        let _ = ctx;
        Ok(())
    }

    /// Called on transition out of this stage, before the next stage's guard runs.
    async fn exit(&self, ctx: &mut StageContext) -> Result<(), crate::WorkflowError> {
        let _ = ctx;
        Ok(())
    }

    /// Predicate checked before the transition into this stage is committed.
    async fn guard(&self, ctx: &StageContext) -> Result<(), GuardRejection> {
        let _ = ctx;
        Ok(())
    }

    /// The member who should be woken once this stage is entered, if any.
    fn assign(&self, ctx: &StageContext) -> Option<SmolStr> {
        let _ = ctx;
        None
    }
}

pub type StageRef = Arc<dyn Stage>;
