// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only activity log entries (§3) — the source of truth the
//! EventBus fans out from and cost/usage rollups are computed over.

use crate::ids::{TaskId, TeamId};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashMap;

/// The kind of activity recorded. Mirrors the event kinds the EventBus
/// publishes (§4.6) plus the failure/quarantine events §4.3/§4.5 require
/// to be durable, not just broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    TurnStarted,
    TurnEnded,
    TurnFailed,
    AgentQuarantined,
    TaskUpdate,
    MergeProgress,
    MessageSent,
}

crate::simple_display! {
    ActivityType {
        TurnStarted => "turn_started",
        TurnEnded => "turn_ended",
        TurnFailed => "turn_failed",
        AgentQuarantined => "agent_quarantined",
        TaskUpdate => "task_update",
        MergeProgress => "merge_progress",
        MessageSent => "message_sent",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub team_id: TeamId,
    pub agent: SmolStr,
    pub activity_type: ActivityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub payload: HashMap<String, String>,
    pub timestamp_ms: u64,
}

#[cfg(any(test, feature = "test-support"))]
crate::builder! {
    pub struct ActivityBuilder => Activity {
        into {
            agent: SmolStr = "alice",
        }
        set {
            team_id: TeamId = TeamId::new(),
            activity_type: ActivityType = ActivityType::TurnStarted,
            payload: HashMap<String, String> = HashMap::new(),
            timestamp_ms: u64 = 1_000_000,
        }
        option {
            task_id: TaskId = None,
        }
    }
}

#[cfg(test)]
#[path = "activity_tests.rs"]
mod tests;
