// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Global tracing subscriber installation (§0.2), mirroring the teacher's
//! `log_dir`-rooted rolling file appender.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Install the process-wide tracing subscriber: a rolling daily file
/// appender under `log_dir`, plus stderr for interactive runs. The
/// returned [`WorkerGuard`] must be held for the process lifetime — the
/// non-blocking writer flushes on drop.
pub fn install(log_dir: &Path) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "delegate.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("delegate=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.and(std::io::stderr))
        .with_target(true)
        .init();

    Ok(guard)
}
