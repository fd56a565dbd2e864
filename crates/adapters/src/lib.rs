// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! delegate-adapters: the typed external-interface boundaries §6
//! defines — `AgentAdapter`, `GitHost`, and `Observer` — plus their test
//! doubles and, for `GitHost`, a real subprocess-backed implementation.
//!
//! The LLM-agent adapter's own process spawning and prompt assembly, and
//! the HTTP/SSE transport `Observer` implementations live behind, are
//! explicitly out of scope (§1) — this crate only fixes the boundary
//! shape the core's `delegate-scheduler`, `delegate-merge`, and
//! `delegate-resources` depend on.

pub mod agent;
pub mod git_host;
pub mod observer;

pub use agent::{Action, AdapterError, AgentAdapter, ContextSummary, InboxSnapshot};
pub use git_host::{GitHost, GitHostError, GitOutcome, ProcessGitHost};
pub use observer::Observer;

#[cfg(any(test, feature = "test-support"))]
pub use agent::FakeAgentAdapter;
#[cfg(any(test, feature = "test-support"))]
pub use git_host::FakeGitHost;
