// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed set of typed events the bus carries (§4.6).

use delegate_core::{TaskId, TaskStatus, TurnId};
use smol_str::SmolStr;

/// One fan-out message on a team's topic.
///
/// Mirrors the five event kinds §4.6 names exactly: `turn_started`,
/// `turn_ended`, `activity`, `task_update`, `merge_progress`.
#[derive(Debug, Clone)]
pub enum DelegateEvent {
    TurnStarted { agent: SmolStr, turn_id: TurnId },
    TurnEnded { agent: SmolStr, turn_id: TurnId, ok: bool },
    Activity { agent: SmolStr, activity_type: SmolStr, task_id: Option<TaskId> },
    TaskUpdate { task_id: TaskId, status: TaskStatus },
    MergeProgress { task_id: TaskId, stage: SmolStr, detail: SmolStr },
}
