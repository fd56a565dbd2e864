// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent scheduling state (§4.3): the debounce flag, the cancellation
//! token for whichever turn is currently running, and the consecutive-
//! failure counter that trips quarantine.
//!
//! Grounded in the teacher's `HashMap<MemberName, bool>` pending-flag
//! sketch (SPEC_FULL §4.3 implementation note): one [`AgentState`] per
//! `(team, agent)` pair, created lazily and kept for the life of the
//! process. `active` plus `pending` together implement the single-slot
//! queue — `active` is set the instant a trigger decides to run a turn
//! and cleared only when no further trigger arrived while that turn (or
//! the one after it) ran.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Per-(team, agent) scheduling state.
#[derive(Default)]
pub(crate) struct AgentState {
    /// True from the moment a trigger decides to run a turn until the
    /// run loop finds no further pending trigger and exits.
    active: AtomicBool,
    /// Set by a trigger that arrives while `active` is already true;
    /// consulted by the run loop after each turn to decide whether to
    /// loop once more instead of going idle.
    pending: AtomicBool,
    /// The cancellation token for whichever turn is currently executing,
    /// if any. `None` while idle.
    cancel: Mutex<Option<CancellationToken>>,
    /// Consecutive turn failures, reset to zero on any successful turn
    /// (§4.3: "three consecutive failed turns ... puts the agent into a
    /// quarantined state").
    failures: AtomicU8,
}

impl AgentState {
    /// Try to claim this state for a new run loop. Returns `true` if the
    /// caller should spawn one (state was idle); `false` means a loop is
    /// already running and has been told to do another pass.
    pub(crate) fn try_activate(&self) -> bool {
        if self.active.swap(true, Ordering::AcqRel) {
            self.pending.store(true, Ordering::Release);
            false
        } else {
            true
        }
    }

    /// Called at the top of each pass through the run loop.
    pub(crate) fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Called after a pass completes with no further pending trigger;
    /// releases the claim so a later trigger starts a fresh run loop.
    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub(crate) fn set_cancel_token(&self, token: Option<CancellationToken>) {
        *self.cancel.lock() = token;
    }

    pub(crate) fn cancel(&self) -> bool {
        match self.cancel.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn record_success(&self) -> u8 {
        self.failures.store(0, Ordering::Release);
        0
    }

    /// Increment the failure streak and return the new count.
    pub(crate) fn record_failure(&self) -> u8 {
        self.failures.fetch_add(1, Ordering::AcqRel) + 1
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
