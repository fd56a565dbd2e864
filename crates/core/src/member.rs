// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Member entity: an agent, human, or the reserved `system` member of a team.

use crate::ids::TeamId;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// The reserved name no team member may register under.
pub const SYSTEM_MEMBER: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    Agent,
    Human,
    System,
}

crate::simple_display! {
    MemberKind {
        Agent => "agent",
        Human => "human",
        System => "system",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Manager,
    Worker,
    Reviewer,
    /// Dedicated QA variant of `Reviewer`, preferred by stage-assign rules
    /// that ask for a QA member instead of a generic peer reviewer (§9).
    Qa,
}

crate::simple_display! {
    MemberRole {
        Manager => "manager",
        Worker => "worker",
        Reviewer => "reviewer",
        Qa => "qa",
    }
}

/// Agent seniority, used by stage-assign rules to pick an escalation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seniority {
    Junior,
    Senior,
    Staff,
}

/// A team member: an agent, a human operator, or the reserved `system` actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub name: SmolStr,
    pub kind: MemberKind,
    pub role: MemberRole,
    pub seniority: Seniority,
    pub team_id: TeamId,
    /// OS process id of the turn currently executing for this agent, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Set once three consecutive turns have failed for this agent (§4.3).
    #[serde(default)]
    pub quarantined: bool,
}

impl Member {
    pub fn new(
        name: impl Into<SmolStr>,
        kind: MemberKind,
        role: MemberRole,
        seniority: Seniority,
        team_id: TeamId,
    ) -> Self {
        Self { name: name.into(), kind, role, seniority, team_id, pid: None, quarantined: false }
    }

    pub fn is_system(&self) -> bool {
        self.name.as_str() == SYSTEM_MEMBER
    }

    pub fn is_human(&self) -> bool {
        self.kind == MemberKind::Human
    }

    /// Whether this member is currently mid-turn.
    pub fn is_running(&self) -> bool {
        self.pid.is_some()
    }
}

#[cfg(any(test, feature = "test-support"))]
crate::builder! {
    pub struct MemberBuilder => Member {
        into {
            name: SmolStr = "alice",
        }
        set {
            kind: MemberKind = MemberKind::Agent,
            role: MemberRole = MemberRole::Worker,
            seniority: Seniority = Seniority::Senior,
            team_id: TeamId = TeamId::new(),
            quarantined: bool = false,
        }
        option {
            pid: u32 = None,
        }
    }
}

#[cfg(test)]
#[path = "member_tests.rs"]
mod tests;
