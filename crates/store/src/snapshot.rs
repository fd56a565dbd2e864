// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic full-state checkpoints.
//!
//! A snapshot lets the WAL be truncated: recovery replays only the
//! entries written since the last snapshot instead of the whole history.
//! Snapshots are zstd-compressed JSON, versioned so [`crate::migration`]
//! can upgrade one written by an older build.

use crate::migration::MigrationRegistry;
use crate::state::MaterializedState;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Current on-disk snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("snapshot compression error: {0}")]
    Compression(std::io::Error),
    #[error(transparent)]
    Migration(#[from] crate::migration::MigrationError),
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEnvelope {
    v: u32,
    seq: u64,
    state: MaterializedState,
}

/// A full materialized-state checkpoint taken at WAL sequence `seq`.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub seq: u64,
    pub state: MaterializedState,
}

impl Snapshot {
    pub fn new(seq: u64, state: MaterializedState) -> Self {
        Self { seq, state }
    }

    /// Write this snapshot to `path`, zstd-compressed, atomically (write to
    /// a temp file then rename, so a crash mid-write never corrupts the
    /// last good snapshot).
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        let envelope = SnapshotEnvelope { v: SNAPSHOT_VERSION, seq: self.seq, state: self.state.clone() };
        let json = serde_json::to_vec(&envelope)?;
        let compressed = zstd::encode_all(json.as_slice(), 3).map_err(SnapshotError::Compression)?;

        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, &compressed)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Read a snapshot from `path`, migrating it to [`SNAPSHOT_VERSION`] if
    /// it was written by an older build.
    pub fn read_from(path: impl AsRef<Path>, registry: &MigrationRegistry) -> Result<Option<Self>, SnapshotError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let compressed = std::fs::read(path)?;
        let mut json = Vec::new();
        zstd::Decoder::new(compressed.as_slice())
            .map_err(SnapshotError::Compression)?
            .read_to_end(&mut json)
            .map_err(SnapshotError::Compression)?;

        let raw: serde_json::Value = serde_json::from_slice(&json)?;
        let migrated = registry.migrate_to(raw, SNAPSHOT_VERSION)?;
        let envelope: SnapshotEnvelope = serde_json::from_value(migrated)?;
        Ok(Some(Snapshot { seq: envelope.seq, state: envelope.state }))
    }
}

/// Drives periodic snapshot-then-truncate for a single team's store.
///
/// Mirrors the retention discipline the WAL itself uses on corruption
/// recovery: keep a handful of prior generations instead of one.
pub struct Checkpointer {
    snapshot_path: PathBuf,
    interval_ops: u64,
    ops_since_snapshot: u64,
}

impl Checkpointer {
    pub fn new(snapshot_path: impl Into<PathBuf>, interval_ops: u64) -> Self {
        Self { snapshot_path: snapshot_path.into(), interval_ops, ops_since_snapshot: 0 }
    }

    pub fn record_op(&mut self) {
        self.ops_since_snapshot += 1;
    }

    pub fn due(&self) -> bool {
        self.ops_since_snapshot >= self.interval_ops
    }

    pub fn checkpoint(&mut self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        rotate_snapshot_generations(&self.snapshot_path)?;
        snapshot.write_to(&self.snapshot_path)?;
        self.ops_since_snapshot = 0;
        Ok(())
    }
}

/// Rotate `path.bak -> path.bak.2 -> path.bak.3 -> (evicted)` before a new
/// snapshot replaces `path`, the same 3-generation retention the WAL uses.
fn rotate_snapshot_generations(path: &Path) -> std::io::Result<()> {
    for gen in (2..=3).rev() {
        let from = if gen == 2 { path.with_extension("bak") } else { path.with_extension(format!("bak.{}", gen - 1)) };
        let to = path.with_extension(format!("bak.{gen}"));
        if from.exists() {
            std::fs::rename(&from, &to)?;
        }
    }
    if path.exists() {
        std::fs::rename(path, path.with_extension("bak"))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
