// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task lifecycle op handlers.

use super::MaterializedState;
use crate::ops::StoreOp;

pub(crate) fn apply(state: &mut MaterializedState, op: &StoreOp) {
    match op {
        StoreOp::TaskCreated { task } => {
            state.tasks.entry(task.team_id).or_default().entry(task.id).or_insert_with(|| task.clone());
        }

        StoreOp::TaskTransitioned { team_id, id, status, at_ms } => {
            if let Some(task) = state.tasks.get_mut(team_id).and_then(|t| t.get_mut(id)) {
                task.status = *status;
                task.updated_at_ms = *at_ms;
                if status.is_terminal() && task.completed_at_ms.is_none() {
                    task.completed_at_ms = Some(*at_ms);
                }
            }
        }

        StoreOp::TaskAssigned { team_id, id, assignee } => {
            if let Some(task) = state.tasks.get_mut(team_id).and_then(|t| t.get_mut(id)) {
                task.assignee = assignee.clone();
            }
        }

        StoreOp::TaskDriAssigned { team_id, id, dri } => {
            if let Some(task) = state.tasks.get_mut(team_id).and_then(|t| t.get_mut(id)) {
                task.assign_dri_if_unset(dri.clone());
            }
        }

        StoreOp::TaskPriorityChanged { team_id, id, priority } => {
            if let Some(task) = state.tasks.get_mut(team_id).and_then(|t| t.get_mut(id)) {
                task.priority = *priority;
            }
        }

        StoreOp::TaskAttachmentAdded { team_id, id, attachment } => {
            if let Some(task) = state.tasks.get_mut(team_id).and_then(|t| t.get_mut(id)) {
                if !task.attachments.iter().any(|a| a.name == attachment.name && a.uri == attachment.uri) {
                    task.attachments.push(attachment.clone());
                }
            }
        }

        StoreOp::TaskRejected { team_id, id, reason, at_ms } => {
            if let Some(task) = state.tasks.get_mut(team_id).and_then(|t| t.get_mut(id)) {
                task.rejection_reason = Some(reason.clone());
                task.updated_at_ms = *at_ms;
            }
        }

        StoreOp::TaskRetryCountSet { team_id, id, retry_count } => {
            if let Some(task) = state.tasks.get_mut(team_id).and_then(|t| t.get_mut(id)) {
                task.retry_count = *retry_count;
            }
        }

        StoreOp::TaskBaseShaSet { team_id, id, repo, sha } => {
            if let Some(task) = state.tasks.get_mut(team_id).and_then(|t| t.get_mut(id)) {
                task.base_sha.insert(repo.clone(), sha.clone());
            }
        }

        StoreOp::TaskInCursorSet { team_id, id, peer, message_id } => {
            if let Some(task) = state.tasks.get_mut(team_id).and_then(|t| t.get_mut(id)) {
                let slot = task.in_cursor.entry(peer.clone()).or_insert(*message_id);
                if *slot < *message_id {
                    *slot = *message_id;
                }
            }
        }

        _ => unreachable!("task::apply called with a non-task op"),
    }
}
