// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task entity and its status vocabulary (§3).
//!
//! The task *state machine* (stages, guards, hooks) lives in
//! `delegate-workflow`; this module only holds the durable record and the
//! closed set of statuses a workflow can drive it through, mirroring how
//! the teacher splits `StepStatus` (data) from the runtime that drives it.

use crate::ids::{MessageId, TaskId, TeamId};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashMap;

/// A task's current position in its workflow.
///
/// `done` and `cancelled` are terminal (§3: "A task in a terminal state is
/// immutable except for the `attachments` list").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    InReview,
    InApproval,
    Merging,
    Done,
    Rejected,
    MergeFailed,
    Cancelled,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Cancelled)
    }
}

crate::simple_display! {
    TaskStatus {
        Todo => "todo",
        InProgress => "in_progress",
        InReview => "in_review",
        InApproval => "in_approval",
        Merging => "merging",
        Done => "done",
        Rejected => "rejected",
        MergeFailed => "merge_failed",
        Cancelled => "cancelled",
        Error => "error",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

/// A reference attached to a task (a screenshot, a log excerpt, a design doc).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub uri: String,
    pub added_at_ms: u64,
}

/// A unit of work tracked and moved through a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub team_id: TeamId,
    pub title: String,
    pub description: String,
    /// Directly Responsible Individual. Set on first assignment, immutable after.
    pub dri: Option<SmolStr>,
    pub assignee: Option<SmolStr>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub repo: Vec<String>,
    /// `main` SHA of each repo at worktree creation time, keyed by repo.
    #[serde(default)]
    pub base_sha: HashMap<String, String>,
    pub branch: String,
    pub workflow_name: String,
    pub workflow_version: u32,
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub review_attempt: u32,
    #[serde(default)]
    pub retry_count: u32,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Highest-seen processed message id per peer, for in-cursor bookkeeping
    /// when the task's assignee changes. Not in the distilled §3 table but
    /// required to make "processed" durable across assignee rotation.
    #[serde(default)]
    pub in_cursor: HashMap<SmolStr, MessageId>,
}

impl Task {
    /// Branch name derived deterministically per §3: `delegate/<team_id>/<team>/T<NNNN>`.
    pub fn derive_branch(team_id: TeamId, team_name: &str, id: TaskId) -> String {
        format!("delegate/{team_id}/{team_name}/{id}")
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether this task is touching more than one repository (§4.5 multi-repo rule).
    pub fn is_multi_repo(&self) -> bool {
        self.repo.len() > 1
    }

    /// Assign the DRI if unset; no-op (and does not overwrite) otherwise (§3 invariant).
    pub fn assign_dri_if_unset(&mut self, member: SmolStr) {
        if self.dri.is_none() {
            self.dri = Some(member);
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
crate::builder! {
    pub struct TaskBuilder => Task {
        into {
            title: String = "add /health",
            description: String = "",
            branch: String = "delegate/abc123/acme/T0001",
            workflow_name: String = "default",
        }
        set {
            id: TaskId = TaskId::first(),
            team_id: TeamId = TeamId::new(),
            status: TaskStatus = TaskStatus::Todo,
            priority: Priority = Priority::Normal,
            repo: Vec<String> = vec!["svc".to_string()],
            base_sha: HashMap<String, String> = HashMap::new(),
            workflow_version: u32 = 1,
            depends_on: Vec<TaskId> = Vec::new(),
            attachments: Vec<Attachment> = Vec::new(),
            review_attempt: u32 = 0,
            retry_count: u32 = 0,
            created_at_ms: u64 = 1_000_000,
            updated_at_ms: u64 = 1_000_000,
            in_cursor: HashMap<SmolStr, MessageId> = HashMap::new(),
        }
        option {
            dri: SmolStr = None,
            assignee: SmolStr = None,
            completed_at_ms: u64 = None,
            rejection_reason: String = None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
