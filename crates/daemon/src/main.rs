// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `delegated` — the orchestration daemon binary (§2 boot order). Resolves
//! the on-disk state home, installs logging and static config, boots every
//! component, then idles until asked to stop.
//!
//! The real `AgentAdapter` (LLM prompt assembly and process spawning) is an
//! external collaborator the core only defines an interface for (§6); this
//! binary ships [`delegate_adapters::FakeAgentAdapter`] as its runnable
//! out-of-the-box turn driver, matching `delegate-daemon`'s dependency note.

use std::process::ExitCode;

use delegate_daemon::config;
use delegate_daemon::lifecycle::{Daemon, Paths};
use delegate_daemon::logging;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let paths = match Paths::load() {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("delegated: failed to resolve state directory: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match logging::install(&paths.log_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("delegated: failed to install logging at {}: {e}", paths.log_dir.display());
            return ExitCode::FAILURE;
        }
    };

    let cfg = match config::Config::load(&paths.state_dir) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load delegate.toml");
            return ExitCode::FAILURE;
        }
    };

    let daemon = match Daemon::start_with_fake_adapter(&paths, cfg).await {
        Ok(daemon) => daemon,
        Err(e) => {
            error!(error = %e, "daemon failed to start");
            return ExitCode::FAILURE;
        }
    };

    info!(state_dir = %paths.state_dir.display(), "delegate daemon started");
    wait_for_shutdown_signal().await;

    daemon.shutdown();
    info!("delegate daemon stopped");
    ExitCode::SUCCESS
}

/// Wait for Ctrl-C, or on Unix, SIGTERM as well — whichever arrives first.
/// A daemon is ordinarily stopped by its supervisor sending SIGTERM, not by
/// an attached terminal.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler, waiting on Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
