// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot schema migration.
//!
//! Snapshots are versioned JSON blobs (`{"v": N, "seq": M, "state": {...}}`).
//! A [`MigrationRegistry`] walks a chain of single-step [`Migration`]s to
//! bring an older snapshot up to the current schema version on load.

use serde_json::Value;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error("snapshot version {0} is newer than the highest supported version {1}")]
    TooNew(u32, u32),
    #[error("no migration path from version {0} to version {1}")]
    NoPath(u32, u32),
}

/// A single schema version step.
pub trait Migration {
    fn source_version(&self) -> u32;
    fn target_version(&self) -> u32;
    fn migrate(&self, snapshot: &mut Value) -> Result<(), MigrationError>;
}

/// Ordered collection of migrations, applied one hop at a time.
#[derive(Default)]
pub struct MigrationRegistry {
    pub(crate) migrations: Vec<Box<dyn Migration>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self { migrations: Vec::new() }
    }

    /// Migrate `snapshot` (read from its own embedded `"v"` field) to `target`.
    pub fn migrate_to(&self, mut snapshot: Value, target: u32) -> Result<Value, MigrationError> {
        let mut current = snapshot["v"].as_u64().unwrap_or(0) as u32;
        if current > target {
            return Err(MigrationError::TooNew(current, target));
        }
        while current < target {
            let step = self
                .migrations
                .iter()
                .find(|m| m.source_version() == current)
                .ok_or(MigrationError::NoPath(current, target))?;
            step.migrate(&mut snapshot)?;
            current = step.target_version();
            snapshot["v"] = current.into();
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
#[path = "migration_tests.rs"]
mod tests;
