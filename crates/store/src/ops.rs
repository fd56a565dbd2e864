// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed set of mutations the WAL can record. Every write to a
//! team's state goes through one of these, so replay after a crash is
//! exactly "apply every `StoreOp` in order" (§4.1).

use delegate_core::{
    Attachment, Comment, Member, Message, MessageId, MessageLifecycle, Priority, ReviewVerdict,
    Task, TaskId, TaskStatus, Team, TeamId,
};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StoreOp {
    TeamCreated { team: Team },
    TeamDeleted { team_id: TeamId },

    MemberAdded { member: Member },
    MemberPidSet { team_id: TeamId, name: SmolStr, pid: Option<u32> },
    MemberQuarantined { team_id: TeamId, name: SmolStr, quarantined: bool },

    MessageSent { message: Message },
    MessageAdvanced { team_id: TeamId, id: MessageId, target: MessageLifecycle, at_ms: u64 },

    TaskCreated { task: Task },
    TaskTransitioned { team_id: TeamId, id: TaskId, status: TaskStatus, at_ms: u64 },
    TaskAssigned { team_id: TeamId, id: TaskId, assignee: Option<SmolStr> },
    TaskDriAssigned { team_id: TeamId, id: TaskId, dri: SmolStr },
    TaskPriorityChanged { team_id: TeamId, id: TaskId, priority: Priority },
    TaskAttachmentAdded { team_id: TeamId, id: TaskId, attachment: Attachment },
    TaskRejected { team_id: TeamId, id: TaskId, reason: String, at_ms: u64 },
    /// Sets the absolute retry count (not a bare increment) so replaying
    /// the same op twice during recovery can never double-count a retry.
    TaskRetryCountSet { team_id: TeamId, id: TaskId, retry_count: u32 },
    /// Records `main`'s SHA for one repo at worktree-creation time (§3 `base_sha`).
    TaskBaseShaSet { team_id: TeamId, id: TaskId, repo: String, sha: String },
    /// Advances the durable in-cursor for one peer, so a processed message
    /// stays processed across an assignee rotation (§3 `in_cursor`).
    TaskInCursorSet { team_id: TeamId, id: TaskId, peer: SmolStr, message_id: MessageId },

    ReviewStarted { team_id: TeamId, task_id: TaskId, reviewer: SmolStr },
    ReviewDecided { team_id: TeamId, task_id: TaskId, verdict: ReviewVerdict, summary: String },
    CommentAdded { team_id: TeamId, task_id: TaskId, comment: Comment },

    ActivityRecorded { activity: delegate_core::Activity },

    /// Control op, not durable state: the daemon's recovery loop must see
    /// it in the replayed tail and stop rather than treat it as more work.
    Shutdown,
}
