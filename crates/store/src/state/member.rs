// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Member lifecycle op handlers.

use super::MaterializedState;
use crate::ops::StoreOp;

pub(crate) fn apply(state: &mut MaterializedState, op: &StoreOp) {
    match op {
        StoreOp::MemberAdded { member } => {
            state
                .members
                .entry(member.team_id)
                .or_default()
                .entry(member.name.clone())
                .or_insert_with(|| member.clone());
        }

        StoreOp::MemberPidSet { team_id, name, pid } => {
            if let Some(member) = state.members.get_mut(team_id).and_then(|m| m.get_mut(name)) {
                member.pid = *pid;
            }
        }

        StoreOp::MemberQuarantined { team_id, name, quarantined } => {
            if let Some(member) = state.members.get_mut(team_id).and_then(|m| m.get_mut(name)) {
                member.quarantined = *quarantined;
            }
        }

        _ => unreachable!("member::apply called with a non-member op"),
    }
}
