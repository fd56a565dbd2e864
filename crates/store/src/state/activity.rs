// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only activity log op handler.

use super::MaterializedState;
use crate::ops::StoreOp;

pub(crate) fn apply(state: &mut MaterializedState, op: &StoreOp) {
    match op {
        StoreOp::ActivityRecorded { activity } => {
            state.activity.entry(activity.team_id).or_default().push(activity.clone());
        }

        _ => unreachable!("activity::apply called with a non-activity op"),
    }
}
