// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message entity and its delivery lifecycle (§3, §4.2).

use crate::ids::{MessageId, TaskId, TeamId};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A message's position in its delivery lifecycle.
///
/// The lifecycle is a total order: `Created -> Delivered -> Seen -> Processed`.
/// Transitions are monotonic; [`Message::advance_to`] refuses to regress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLifecycle {
    Created,
    Delivered,
    Seen,
    Processed,
}

crate::simple_display! {
    MessageLifecycle {
        Created => "created",
        Delivered => "delivered",
        Seen => "seen",
        Processed => "processed",
    }
}

/// An append-only inter-member message with durable delivery timestamps.
///
/// Messages are never edited after creation; each lifecycle timestamp is
/// written exactly once, in order, by [`crate::message::Message::advance_to`]
/// (or rather, by the Store operation that wraps it — this type only
/// encodes the invariant, persistence lives in `delegate-store`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub team_id: TeamId,
    pub sender: SmolStr,
    pub recipient: SmolStr,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub sent_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seen_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at_ms: Option<u64>,
}

/// Error returned when a lifecycle transition would regress or skip a stage.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("cannot move message from {from} back to {to}")]
    Regression { from: MessageLifecycle, to: MessageLifecycle },
    #[error("cannot advance message from {from} to {to}: skips a stage")]
    Skip { from: MessageLifecycle, to: MessageLifecycle },
}

impl Message {
    pub fn new(
        id: MessageId,
        team_id: TeamId,
        sender: impl Into<SmolStr>,
        recipient: impl Into<SmolStr>,
        content: impl Into<String>,
        task_id: Option<TaskId>,
        sent_at_ms: u64,
    ) -> Self {
        Self {
            id,
            team_id,
            sender: sender.into(),
            recipient: recipient.into(),
            content: content.into(),
            task_id,
            sent_at_ms,
            delivered_at_ms: None,
            seen_at_ms: None,
            processed_at_ms: None,
        }
    }

    /// Current lifecycle stage, derived from which timestamps are set.
    pub fn lifecycle(&self) -> MessageLifecycle {
        if self.processed_at_ms.is_some() {
            MessageLifecycle::Processed
        } else if self.seen_at_ms.is_some() {
            MessageLifecycle::Seen
        } else if self.delivered_at_ms.is_some() {
            MessageLifecycle::Delivered
        } else {
            MessageLifecycle::Created
        }
    }

    /// Record the next lifecycle timestamp, refusing regression.
    ///
    /// `target` must be exactly one stage ahead of the current stage;
    /// stamping the same stage twice or skipping a stage is rejected so
    /// that callers catch ordering bugs instead of silently clobbering an
    /// earlier timestamp.
    pub fn advance_to(&mut self, target: MessageLifecycle, at_ms: u64) -> Result<(), LifecycleError> {
        let current = self.lifecycle();
        if target <= current {
            return Err(LifecycleError::Regression { from: current, to: target });
        }
        if target as u8 != current as u8 + 1 {
            return Err(LifecycleError::Skip { from: current, to: target });
        }
        match target {
            MessageLifecycle::Created => unreachable!("Created is the minimum, never a target"),
            MessageLifecycle::Delivered => self.delivered_at_ms = Some(at_ms),
            MessageLifecycle::Seen => self.seen_at_ms = Some(at_ms),
            MessageLifecycle::Processed => self.processed_at_ms = Some(at_ms),
        }
        Ok(())
    }

    /// Whether this message requires `task_id` to be set (§4.2): every
    /// non-human, non-system message must carry task attribution.
    pub fn requires_task_attribution(&self, sender_is_human: bool, recipient_is_human: bool) -> bool {
        !sender_is_human && !recipient_is_human
    }

    /// Identity used for at-least-once duplicate detection at the receiver.
    pub fn dedup_identity(&self) -> (SmolStr, MessageId) {
        (self.sender.clone(), self.id)
    }
}

#[cfg(any(test, feature = "test-support"))]
crate::builder! {
    pub struct MessageBuilder => Message {
        into {
            sender: SmolStr = "alice",
            recipient: SmolStr = "bob",
            content: String = "hello",
        }
        set {
            id: MessageId = MessageId::first(),
            team_id: TeamId = TeamId::new(),
            sent_at_ms: u64 = 1_000_000,
        }
        option {
            task_id: TaskId = None,
        }
        computed {
            delivered_at_ms: Option<u64> = None,
            seen_at_ms: Option<u64> = None,
            processed_at_ms: Option<u64> = None,
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
