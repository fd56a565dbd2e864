// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Team lifecycle op handlers.

use super::MaterializedState;
use crate::ops::StoreOp;

pub(crate) fn apply(state: &mut MaterializedState, op: &StoreOp) {
    match op {
        StoreOp::TeamCreated { team } => {
            state.teams.entry(team.team_id).or_insert_with(|| team.clone());
        }

        StoreOp::TeamDeleted { team_id } => {
            state.teams.remove(team_id);
            state.members.remove(team_id);
            state.messages.remove(team_id);
            state.tasks.remove(team_id);
            state.reviews.remove(team_id);
            state.activity.remove(team_id);
            state.next_task_id.remove(team_id);
            state.next_message_id.remove(team_id);
        }

        _ => unreachable!("team::apply called with a non-team op"),
    }
}
