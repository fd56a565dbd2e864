// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier types for the data model.
//!
//! Most entities in this system are not identified by opaque random
//! strings: a team is a short hex token that must survive delete/recreate
//! without colliding with a prior team's branch namespace, and tasks and
//! messages are dense per-team integers allocated inside the Store's
//! write transaction (§4.1). Only identifiers with no durable meaning
//! (a turn, an event subscriber) use the generic nanoid scheme from
//! [`crate::id`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 6-character lowercase hex team identifier.
///
/// Generated at team creation; never reused. Branch names embed it
/// (`delegate/<team_id>/<team>/T<NNNN>`) so that deleting and recreating
/// a team with the same name cannot collide with old branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId([u8; 6]);

impl TeamId {
    /// Generate a new random team id from a UUIDv4's low 6 hex digits.
    pub fn new() -> Self {
        let raw = uuid::Uuid::new_v4().simple().to_string();
        Self::from_str(&raw[..6])
    }

    pub fn from_str(s: &str) -> Self {
        let mut buf = [b'0'; 6];
        for (slot, byte) in buf.iter_mut().zip(s.as_bytes().iter().take(6)) {
            *slot = byte.to_ascii_lowercase();
        }
        Self(buf)
    }

    pub fn as_str(&self) -> &str {
        // Invariant: only ever constructed from ASCII hex bytes.
        std::str::from_utf8(&self.0).unwrap_or("000000")
    }
}

impl Default for TeamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for TeamId {
    fn from(s: &str) -> Self {
        Self::from_str(s)
    }
}

/// A task identifier: a monotonic, per-team dense integer rendered `T<NNNN>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u32);

impl TaskId {
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Parse a rendered task id such as `T0001` (case-insensitive `T` prefix).
    pub fn parse(s: &str) -> Option<Self> {
        let digits = s.strip_prefix(['T', 't'])?;
        digits.parse::<u32>().ok().map(Self)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{:04}", self.0)
    }
}

/// A message identifier: a dense integer allocated inside the Store's
/// write transaction that appends it, unique within a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl MessageId {
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

crate::define_id! {
    /// Identifies a single turn execution for tracing/span correlation.
    ///
    /// Not part of the persisted data model (§3 has no "turn" entity) —
    /// purely an in-memory/log correlation id, so the generic nanoid
    /// scheme fits.
    pub struct TurnId("trn-");
}

crate::define_id! {
    /// Identifies an EventBus subscriber.
    pub struct SubscriberId("sub-");
}

#[cfg(test)]
#[path = "ids_tests.rs"]
mod tests;
