// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! delegate-events: the in-process, topic-per-team pub/sub bus (§4.6).
//!
//! Publishers (`delegate-scheduler`, `delegate-workflow`, `delegate-merge`)
//! emit typed [`DelegateEvent`]s; subscribers (the out-of-scope HTTP/SSE
//! adapter, or any `Observer`) receive them off a bounded per-subscriber
//! channel. A publish is always a non-blocking `try_send` — a subscriber
//! that can't keep up is dropped on the next publish rather than made to
//! block every publisher.

mod event;

pub use event::DelegateEvent;

use delegate_core::{SubscriberId, TeamId};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Per-subscriber inbox depth. Chosen generously for a local, in-process
/// bus — a subscriber that falls this far behind is almost certainly gone
/// (dead SSE connection) rather than merely slow.
const SUBSCRIBER_QUEUE_DEPTH: usize = 256;

struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<DelegateEvent>,
}

/// In-process pub/sub, one topic per team.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<TeamId, Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a team's topic. Returns the subscriber's id (for later
    /// unsubscribe) and the receiving half of its bounded channel.
    pub fn subscribe(&self, team_id: TeamId) -> (SubscriberId, mpsc::Receiver<DelegateEvent>) {
        let id = SubscriberId::new();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        self.subscribers.write().entry(team_id).or_default().push(Subscriber { id, tx });
        (id, rx)
    }

    pub fn unsubscribe(&self, team_id: TeamId, id: SubscriberId) {
        if let Some(subs) = self.subscribers.write().get_mut(&team_id) {
            subs.retain(|s| s.id != id);
        }
    }

    /// Fan `event` out to every subscriber of `team_id`. Never blocks: a
    /// full or closed channel drops that subscriber instead of stalling
    /// the publisher (§4.6 "publishers never block").
    pub fn publish(&self, team_id: TeamId, event: DelegateEvent) {
        let mut subs = self.subscribers.write();
        let Some(list) = subs.get_mut(&team_id) else { return };
        list.retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(%team_id, subscriber = %sub.id, "dropping slow EventBus subscriber");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Number of live subscribers on a team's topic, for tests and the
    /// ambient health metric (§4.2's pending-deliveries gauge has a
    /// sibling here: subscriber count is what a /healthz-equivalent reads).
    pub fn subscriber_count(&self, team_id: TeamId) -> usize {
        self.subscribers.read().get(&team_id).map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
