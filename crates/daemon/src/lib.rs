// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `delegate-daemon`: the orchestration daemon's boot sequencing, static
//! config, and logging setup, factored out of the `delegated` binary so
//! integration tests can drive a whole `Daemon` the same way `main.rs`
//! does (mirrors the teacher's `oj-daemon` lib-plus-bin split).

pub mod config;
pub mod lifecycle;
pub mod logging;
