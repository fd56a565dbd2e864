// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `AgentAdapter` external interface (§6): the boundary the
//! TurnScheduler calls through to actually run a turn. Prompt assembly
//! and LLM I/O live on the other side of this trait, in the (out of
//! scope) LLM-agent adapter the core exposes this boundary to.

use async_trait::async_trait;
use delegate_core::{Message, TaskId, TaskStatus};
use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("agent adapter failed: {0}")]
    Failed(String),
    #[error("turn cancelled before the adapter returned")]
    Cancelled,
}

/// A snapshot of one agent's inbox at the moment a turn is dispatched
/// (§4.3 step 2): every message addressed to `agent` that has not yet
/// reached `processed`, in `sent_at` order.
#[derive(Debug, Clone)]
pub struct InboxSnapshot {
    pub agent: SmolStr,
    pub messages: Vec<Message>,
}

/// Free-form context the scheduler hands the adapter alongside the inbox
/// — charter, recent activity summary, whatever prompt-assembly needs
/// that isn't itself part of the durable data model (§6: "the adapter is
/// responsible for prompt assembly").
#[derive(Debug, Clone, Default)]
pub struct ContextSummary {
    pub charter: String,
    pub notes: Vec<String>,
}

/// One action an agent's turn produced. A turn applies its whole action
/// list as one logical unit (§4.3 step 4); an individual action's
/// in-process representation carries just enough to drive the
/// corresponding Store/MessageBus call.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SendMessage { recipient: SmolStr, content: String, task_id: Option<TaskId> },
    CreateTask { title: String, description: String, repo: Vec<String> },
    UpdateTaskStatus { task_id: TaskId, status: TaskStatus },
    AppendComment { task_id: TaskId, body: String },
    SetContext { note: String },
    SpawnAgent { name: SmolStr, role: SmolStr },
    RunShell { command: String },
}

/// Invoked by the TurnScheduler once per dispatched turn (§6).
///
/// Implementations own process spawning and LLM I/O; the trait itself
/// only fixes the call shape the scheduler depends on, so scheduler
/// tests can run against [`FakeAgentAdapter`] without a real agent
/// process.
#[async_trait]
pub trait AgentAdapter: Send + Sync + 'static {
    async fn run_turn(
        &self,
        agent_identity: &str,
        inbox: InboxSnapshot,
        context: ContextSummary,
        cancel: CancellationToken,
    ) -> Result<Vec<Action>, AdapterError>;
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeAgentAdapter;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// A scripted `AgentAdapter` for scheduler tests: each call to
    /// `run_turn` pops the next queued response (a fixed action list, or
    /// a failure), returning an empty action list once the script runs
    /// dry, and records every inbox it was handed so tests can assert on
    /// dispatch behavior.
    #[derive(Clone, Default)]
    pub struct FakeAgentAdapter {
        script: Arc<Mutex<VecDeque<Result<Vec<Action>, AdapterError>>>>,
        calls: Arc<Mutex<Vec<InboxSnapshot>>>,
    }

    impl FakeAgentAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_actions(&self, actions: Vec<Action>) {
            self.script.lock().push_back(Ok(actions));
        }

        pub fn push_failure(&self, message: impl Into<String>) {
            self.script.lock().push_back(Err(AdapterError::Failed(message.into())));
        }

        pub fn calls(&self) -> Vec<InboxSnapshot> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl AgentAdapter for FakeAgentAdapter {
        async fn run_turn(
            &self,
            _agent_identity: &str,
            inbox: InboxSnapshot,
            _context: ContextSummary,
            _cancel: CancellationToken,
        ) -> Result<Vec<Action>, AdapterError> {
            self.calls.lock().push(inbox);
            self.script.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
