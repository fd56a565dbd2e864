// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Comments and reviews a task accumulates as it moves through `in_review` (§3).

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A free-form note attached to a task by a member or by the system
/// (e.g. a guard-rejection reason, §4.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: SmolStr,
    pub body: String,
    pub created_at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Pending,
    Pass,
    Fail,
}

/// One review cycle. `attempt` increments each time the task re-enters
/// `in_review` (§3); the task keeps the full history plus the current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub attempt: u32,
    pub reviewer: SmolStr,
    pub verdict: ReviewVerdict,
    pub summary: String,
    pub comments: Vec<Comment>,
}

impl Review {
    pub fn new(attempt: u32, reviewer: impl Into<SmolStr>) -> Self {
        Self {
            attempt,
            reviewer: reviewer.into(),
            verdict: ReviewVerdict::Pending,
            summary: String::new(),
            comments: Vec::new(),
        }
    }

    pub fn is_decided(&self) -> bool {
        !matches!(self.verdict, ReviewVerdict::Pending)
    }
}

/// A task's review history plus helpers for the cap/escalation rule (§4.4).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewHistory {
    pub reviews: Vec<Review>,
}

impl ReviewHistory {
    pub fn current(&self) -> Option<&Review> {
        self.reviews.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut Review> {
        self.reviews.last_mut()
    }

    /// Start a new review cycle, incrementing `attempt` from the last one.
    pub fn start_next(&mut self, reviewer: impl Into<SmolStr>) -> &Review {
        let attempt = self.reviews.last().map(|r| r.attempt).unwrap_or(0) + 1;
        let review = Review::new(attempt, reviewer);
        self.reviews.push(review);
        // Indexing is safe: we just pushed an element onto `self.reviews`.
        &self.reviews[self.reviews.len() - 1]
    }

    /// Count of `Fail` verdicts, i.e. how many times the task has bounced
    /// `in_review -> in_progress`.
    pub fn rejection_count(&self) -> u32 {
        self.reviews.iter().filter(|r| matches!(r.verdict, ReviewVerdict::Fail)).count() as u32
    }

    /// Whether the rejection count has reached the escalation cap (default 3, §4.4).
    pub fn should_escalate(&self, cap: u32) -> bool {
        self.rejection_count() >= cap
    }
}

#[cfg(test)]
#[path = "review_tests.rs"]
mod tests;
