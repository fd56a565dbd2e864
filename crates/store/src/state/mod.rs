// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state built by replaying [`crate::ops::StoreOp`]s.

mod activity;
mod member;
mod message;
mod review;
mod task;
mod team;

use crate::ops::StoreOp;
use delegate_core::{
    Activity, Member, Message, MessageId, Review, ReviewHistory, Task, TaskId, Team, TeamId,
};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashMap;

/// Everything a team's store durably tracks, rebuilt from the WAL (or a
/// snapshot plus the WAL tail) on startup.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub teams: HashMap<TeamId, Team>,
    #[serde(default)]
    pub members: HashMap<TeamId, HashMap<SmolStr, Member>>,
    #[serde(default)]
    pub messages: HashMap<TeamId, Vec<Message>>,
    #[serde(default)]
    pub tasks: HashMap<TeamId, HashMap<TaskId, Task>>,
    #[serde(default)]
    pub reviews: HashMap<TeamId, HashMap<TaskId, ReviewHistory>>,
    #[serde(default)]
    pub activity: HashMap<TeamId, Vec<Activity>>,
    /// Next `TaskId`/`MessageId` to allocate, per team — durable so a
    /// restart never reuses an id a crashed write already handed out.
    #[serde(default)]
    pub next_task_id: HashMap<TeamId, TaskId>,
    #[serde(default)]
    pub next_message_id: HashMap<TeamId, MessageId>,
}

impl MaterializedState {
    pub fn get_task(&self, team_id: TeamId, id: TaskId) -> Option<&Task> {
        self.tasks.get(&team_id).and_then(|t| t.get(&id))
    }

    pub fn get_member(&self, team_id: TeamId, name: &str) -> Option<&Member> {
        self.members.get(&team_id).and_then(|m| m.get(name))
    }

    pub fn get_review_history(&self, team_id: TeamId, task_id: TaskId) -> Option<&ReviewHistory> {
        self.reviews.get(&team_id).and_then(|r| r.get(&task_id))
    }

    pub fn current_review(&self, team_id: TeamId, task_id: TaskId) -> Option<&Review> {
        self.get_review_history(team_id, task_id).and_then(ReviewHistory::current)
    }

    /// Allocate the next `TaskId` for `team_id`, advancing the counter.
    pub fn allocate_task_id(&mut self, team_id: TeamId) -> TaskId {
        let next = self.next_task_id.entry(team_id).or_insert_with(TaskId::first);
        let id = *next;
        *next = id.next();
        id
    }

    /// Allocate the next `MessageId` for `team_id`, advancing the counter.
    pub fn allocate_message_id(&mut self, team_id: TeamId) -> MessageId {
        let next = self.next_message_id.entry(team_id).or_insert_with(MessageId::first);
        let id = *next;
        *next = id.next();
        id
    }

    /// Bring the per-team id counters up to date with the highest id
    /// actually present after a WAL replay.
    ///
    /// Counters are advanced directly by the store's write path (outside
    /// `apply_op`) when an id is allocated, so a counter's value is only
    /// durable insofar as it was captured in the last snapshot. Replaying
    /// the WAL tail on top of that snapshot never touches the counters
    /// themselves, so this must run once after replay completes to avoid
    /// handing out an id a crashed write already assigned.
    pub fn reconcile_counters(&mut self) {
        for (team_id, tasks) in &self.tasks {
            let max = tasks.keys().max().copied();
            let next = max.map(TaskId::next).unwrap_or_else(TaskId::first);
            let slot = self.next_task_id.entry(*team_id).or_insert(next);
            if *slot < next {
                *slot = next;
            }
        }
        for (team_id, messages) in &self.messages {
            let max = messages.iter().map(|m| m.id).max();
            let next = max.map(MessageId::next).unwrap_or_else(MessageId::first);
            let slot = self.next_message_id.entry(*team_id).or_insert(next);
            if *slot < next {
                *slot = next;
            }
        }
    }

    /// Apply a logged operation to derive the next state.
    ///
    /// Every handler must be idempotent: replaying the same op twice (e.g.
    /// once for immediate visibility, once during WAL replay after a
    /// restart) must leave state unchanged the second time.
    pub fn apply_op(&mut self, op: &StoreOp) {
        match op {
            StoreOp::TeamCreated { .. } | StoreOp::TeamDeleted { .. } => team::apply(self, op),

            StoreOp::MemberAdded { .. }
            | StoreOp::MemberPidSet { .. }
            | StoreOp::MemberQuarantined { .. } => member::apply(self, op),

            StoreOp::MessageSent { .. } | StoreOp::MessageAdvanced { .. } => message::apply(self, op),

            StoreOp::TaskCreated { .. }
            | StoreOp::TaskTransitioned { .. }
            | StoreOp::TaskAssigned { .. }
            | StoreOp::TaskDriAssigned { .. }
            | StoreOp::TaskPriorityChanged { .. }
            | StoreOp::TaskAttachmentAdded { .. }
            | StoreOp::TaskRejected { .. }
            | StoreOp::TaskRetryCountSet { .. }
            | StoreOp::TaskBaseShaSet { .. }
            | StoreOp::TaskInCursorSet { .. } => task::apply(self, op),

            StoreOp::ReviewStarted { .. } | StoreOp::ReviewDecided { .. } | StoreOp::CommentAdded { .. } => {
                review::apply(self, op)
            }

            StoreOp::ActivityRecorded { .. } => activity::apply(self, op),

            // Control op: carries no state of its own.
            StoreOp::Shutdown => {}
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
