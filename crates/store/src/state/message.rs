// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message lifecycle op handlers.

use super::MaterializedState;
use crate::ops::StoreOp;

pub(crate) fn apply(state: &mut MaterializedState, op: &StoreOp) {
    match op {
        StoreOp::MessageSent { message } => {
            let log = state.messages.entry(message.team_id).or_default();
            if !log.iter().any(|m| m.id == message.id) {
                log.push(message.clone());
            }
        }

        StoreOp::MessageAdvanced { team_id, id, target, at_ms } => {
            if let Some(message) = state.messages.get_mut(team_id).and_then(|log| log.iter_mut().find(|m| m.id == *id))
            {
                // Idempotent: advance_to itself rejects stamping a stage
                // twice, so a replayed op that already landed is a no-op.
                let _ = message.advance_to(*target, *at_ms);
            }
        }

        _ => unreachable!("message::apply called with a non-message op"),
    }
}
