// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Team entity: the top-level container isolating members, tasks, and branches.

use crate::ids::TeamId;
use serde::{Deserialize, Serialize};

/// A named container that isolates members, tasks, and branch namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub team_id: TeamId,
    pub name: String,
    pub charter: String,
    pub created_at_ms: u64,
}

impl Team {
    pub fn new(name: impl Into<String>, charter: impl Into<String>, created_at_ms: u64) -> Self {
        Self { team_id: TeamId::new(), name: name.into(), charter: charter.into(), created_at_ms }
    }

    /// The branch prefix every task branch on this team is namespaced under.
    ///
    /// Embeds `team_id` so deleting and recreating a team with the same
    /// `name` can never collide with a previous generation's branches.
    pub fn branch_prefix(&self) -> String {
        format!("delegate/{}/{}", self.team_id, self.name)
    }
}

#[cfg(any(test, feature = "test-support"))]
crate::builder! {
    pub struct TeamBuilder => Team {
        into {
            name: String = "acme",
            charter: String = "ship the thing",
        }
        set {
            created_at_ms: u64 = 1_000_000,
        }
        computed {
            team_id: TeamId = TeamId::new(),
        }
    }
}

#[cfg(test)]
#[path = "team_tests.rs"]
mod tests;
