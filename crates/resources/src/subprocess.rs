// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timeout wrapper around `tokio::process::Command`, shared by every git
//! invocation in this crate and in `delegate-merge` (§5: "all blocking git
//! calls carry a configurable timeout").

use crate::ResourceError;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Budget for worktree add/remove — these are local filesystem + index
/// operations, not network fetches, so a short timeout is appropriate.
pub const GIT_WORKTREE_TIMEOUT: Duration = Duration::from_secs(30);
/// Budget for a rebase replay (§5 default).
pub const GIT_REBASE_TIMEOUT: Duration = Duration::from_secs(120);
/// Budget for a repo's configured test command (§5 default).
pub const GIT_TEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Run `cmd`, classifying a timeout as [`ResourceError::Timeout`] rather
/// than letting the subprocess hang the caller indefinitely.
pub async fn run_with_timeout(mut cmd: Command, timeout: Duration, label: &str) -> Result<Output, ResourceError> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(ResourceError::Io(e)),
        Err(_) => Err(ResourceError::Timeout { label: label.to_string(), timeout }),
    }
}
