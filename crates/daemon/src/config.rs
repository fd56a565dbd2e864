// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Static `delegate.toml` config loader (§0.3): a thin on/off ramp for the
//! handful of values the core components already expose as constructor
//! parameters, not a general settings system.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

/// Deserialized shape of `delegate.toml`. Every field has a default so an
/// absent file, or a file missing some keys, still boots the daemon.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Global cap on turns running concurrently (§4.3). `None` keeps
    /// [`delegate_scheduler::SchedulerConfig::default`]'s cores-based cap.
    pub parallelism_cap: Option<usize>,
    /// Consecutive turn failures before an agent is quarantined (§4.3).
    pub quarantine_threshold: u8,
    /// Seconds a cancelled turn's adapter call gets before hard-abort (§4.3).
    pub turn_cancel_grace_secs: u64,
    /// Cap on `in_review` rejections before human escalation (§4.4).
    pub review_attempt_cap: u32,
    /// Test command run per repo before a merge fast-forward (§4.5), keyed
    /// by repo name; `default_test_command` is used for repos with no entry.
    pub test_commands: HashMap<String, String>,
    pub default_test_command: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parallelism_cap: None,
            quarantine_threshold: 3,
            turn_cancel_grace_secs: 10,
            review_attempt_cap: delegate_workflow::DEFAULT_REVIEW_ATTEMPT_CAP,
            test_commands: HashMap::new(),
            default_test_command: "true".to_string(),
        }
    }
}

impl Config {
    /// Load `delegate.toml` from `state_dir`, falling back to defaults if
    /// the file doesn't exist (a fresh install has no config yet).
    pub fn load(state_dir: &Path) -> Result<Self, ConfigError> {
        let path = state_dir.join("delegate.toml");
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn scheduler_config(&self) -> delegate_scheduler::SchedulerConfig {
        let mut config = delegate_scheduler::SchedulerConfig::default();
        if let Some(cap) = self.parallelism_cap {
            config.parallelism_cap = cap;
        }
        config.turn_cancel_grace = std::time::Duration::from_secs(self.turn_cancel_grace_secs);
        config.quarantine_threshold = self.quarantine_threshold;
        config
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
