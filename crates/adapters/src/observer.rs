// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Observer` external interface (§6): a consumer of the EventBus's
//! per-team topic, used by the (out of scope) HTTP/SSE front-end to
//! stream activity to the web UI.
//!
//! `delegate_events::EventBus::subscribe` already returns the bounded
//! `mpsc::Receiver<DelegateEvent>` an observer reads from; this trait
//! only names the drain loop shape so an adapter can be written against
//! a trait object instead of a concrete receiver type.

use async_trait::async_trait;
use delegate_events::DelegateEvent;

/// Implemented by anything that wants to receive events off a team's
/// EventBus topic (§4.6: "subscribers ... receive a bounded per-subscriber
/// queue"). `on_event` is called once per event in delivery order; the
/// bus itself drops this observer's queue if it falls behind, so
/// implementations should not block for long inside `on_event`.
#[async_trait]
pub trait Observer: Send + Sync + 'static {
    async fn on_event(&self, event: DelegateEvent);
}

/// Drains `rx` into `observer` until the EventBus drops the sending
/// half (team deleted, process shutting down). Intended to be
/// `tokio::spawn`'d once per `Observer::subscribe` call by the adapter
/// that owns it (e.g. an SSE connection handler).
pub async fn drive<O: Observer>(mut rx: tokio::sync::mpsc::Receiver<DelegateEvent>, observer: O) {
    while let Some(event) = rx.recv().await {
        observer.on_event(event).await;
    }
}

#[cfg(test)]
#[path = "observer_tests.rs"]
mod tests;
