// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! delegate-bus: the MessageBus (§4.2) — routes messages from sender
//! outboxes to recipient inboxes and drives the `Created -> Delivered`
//! step of the delivery lifecycle. `Seen`/`Processed` are driven by
//! `delegate-scheduler`, since only a turn in progress knows when a
//! message entered and left its scope (§4.2 steps 3-4).
//!
//! Modeled as a single cooperative loop woken by a signal from the
//! sender, with a coarse interval as a safety net — the same shape as
//! the teacher's `event_tx`-driven runtime loop.

use delegate_core::{Clock, MessageLifecycle, SystemClock, TaskId, TeamId};
use delegate_store::{Store, StoreError};
use parking_lot::RwLock;
use smol_str::SmolStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Safety-net poll interval: the bus also wakes on this cadence even if a
/// `notify` signal was dropped, so a missed wakeup can never wedge
/// delivery (§4.2: "polls for new outbox entries (or is signaled)").
const SAFETY_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Depth of the notify channel. One slot per team in flight is enough —
/// `notify` coalesces bursts into a single wakeup per team.
const NOTIFY_QUEUE_DEPTH: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("message from {sender} to {recipient} carries no task_id and neither endpoint is human")]
    MissingTaskAttribution { sender: SmolStr, recipient: SmolStr },
}

/// Callback the TurnScheduler registers to learn when a message it should
/// react to has reached `delivered` (§4.3 dispatch trigger (a)).
pub trait DeliveryObserver: Send + Sync {
    fn on_delivered(&self, team_id: TeamId, recipient: &str, task_id: Option<TaskId>);
}

/// The at-least-once message router (§4.2).
pub struct MessageBus<C: Clock = SystemClock> {
    store: Arc<Store>,
    clock: C,
    observer: RwLock<Option<Arc<dyn DeliveryObserver>>>,
    notify_tx: mpsc::Sender<TeamId>,
    notify_rx: Mutex<Option<mpsc::Receiver<TeamId>>>,
    pending_deliveries: AtomicU64,
}

impl MessageBus<SystemClock> {
    pub fn new(store: Arc<Store>) -> Arc<Self> {
        Self::with_clock(store, SystemClock)
    }
}

impl<C: Clock + 'static> MessageBus<C> {
    pub fn with_clock(store: Arc<Store>, clock: C) -> Arc<Self> {
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFY_QUEUE_DEPTH);
        Arc::new(Self {
            store,
            clock,
            observer: RwLock::new(None),
            notify_tx,
            notify_rx: Mutex::new(Some(notify_rx)),
            pending_deliveries: AtomicU64::new(0),
        })
    }

    pub fn set_observer(&self, observer: Arc<dyn DeliveryObserver>) {
        *self.observer.write() = Some(observer);
    }

    /// Health metric: messages currently sitting in `Created`, i.e. not
    /// yet delivered. Alerts past a threshold per §4.2's "backpressure by
    /// design: none" clause — a growing gauge here means the loop is
    /// wedged, which is a bug, not a load condition to absorb.
    pub fn pending_deliveries(&self) -> u64 {
        self.pending_deliveries.load(Ordering::Relaxed)
    }

    /// Send a message and wake the delivery loop for its team. Rejects a
    /// send lacking `task_id` unless either endpoint is human (§4.2 task
    /// attribution rule) — the caller passes that determination in since
    /// only the Store's Member table can answer it, and the bus shouldn't
    /// take on a second dependency just to re-derive this.
    #[allow(clippy::too_many_arguments)]
    pub fn send(
        &self,
        team_id: TeamId,
        sender: impl Into<SmolStr>,
        recipient: impl Into<SmolStr>,
        content: impl Into<String>,
        task_id: Option<TaskId>,
        either_endpoint_human: bool,
    ) -> Result<delegate_core::Message, BusError> {
        let sender = sender.into();
        let recipient = recipient.into();
        if task_id.is_none() && !either_endpoint_human {
            return Err(BusError::MissingTaskAttribution { sender, recipient });
        }
        let message = self.store.send_message(team_id, sender, recipient, content, task_id, self.clock.epoch_ms())?;
        self.pending_deliveries.fetch_add(1, Ordering::Relaxed);
        let _ = self.notify_tx.try_send(team_id);
        Ok(message)
    }

    /// Deliver every `Created` message for `team_id`, advancing each to
    /// `Delivered` in `sent_at` order (§4.2 ordering rule).
    fn deliver_pending(&self, team_id: TeamId) -> Result<(), BusError> {
        let messages = self.store.list_messages(team_id)?;
        let mut delivered_in_order: Vec<_> =
            messages.into_iter().filter(|m| m.lifecycle() == MessageLifecycle::Created).collect();
        delivered_in_order.sort_by_key(|m| m.sent_at_ms);

        for message in delivered_in_order {
            self.store.advance_message(team_id, message.id, MessageLifecycle::Delivered, self.clock.epoch_ms())?;
            self.pending_deliveries.fetch_sub(1, Ordering::Relaxed);
            if let Some(observer) = self.observer.read().as_ref() {
                observer.on_delivered(team_id, message.recipient.as_str(), message.task_id);
            }
        }
        Ok(())
    }

    /// Run the delivery loop until `shutdown` fires. Intended to be
    /// `tokio::spawn`'d once at daemon boot.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut notify_rx = match self.notify_rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                tracing::error!("MessageBus::run called more than once");
                return;
            }
        };
        let mut ticker = tokio::time::interval(SAFETY_POLL_INTERVAL);
        loop {
            tokio::select! {
                team_id = notify_rx.recv() => {
                    let Some(team_id) = team_id else { break };
                    if let Err(e) = self.deliver_pending(team_id) {
                        tracing::error!(%team_id, error = %e, "message delivery failed");
                    }
                }
                _ = ticker.tick() => {
                    for team_id in self.store.list_teams() {
                        if let Err(e) = self.deliver_pending(team_id) {
                            tracing::error!(%team_id, error = %e, "message delivery failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
