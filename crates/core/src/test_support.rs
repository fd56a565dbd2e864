// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

/// Proptest strategies for the core state-machine types, so every crate's
/// property tests agree on what a "valid" task/message/review looks like.
pub mod strategies {
    use crate::message::MessageLifecycle;
    use crate::review::ReviewVerdict;
    use crate::task::TaskStatus;
    use proptest::prelude::*;

    pub fn arb_task_status() -> impl Strategy<Value = TaskStatus> {
        prop_oneof![
            Just(TaskStatus::Todo),
            Just(TaskStatus::InProgress),
            Just(TaskStatus::InReview),
            Just(TaskStatus::InApproval),
            Just(TaskStatus::Merging),
            Just(TaskStatus::Done),
            Just(TaskStatus::Rejected),
            Just(TaskStatus::MergeFailed),
            Just(TaskStatus::Cancelled),
            Just(TaskStatus::Error),
        ]
    }

    pub fn arb_message_lifecycle() -> impl Strategy<Value = MessageLifecycle> {
        prop_oneof![
            Just(MessageLifecycle::Created),
            Just(MessageLifecycle::Delivered),
            Just(MessageLifecycle::Seen),
            Just(MessageLifecycle::Processed),
        ]
    }

    pub fn arb_review_verdict() -> impl Strategy<Value = ReviewVerdict> {
        prop_oneof![
            Just(ReviewVerdict::Pending),
            Just(ReviewVerdict::Pass),
            Just(ReviewVerdict::Fail),
        ]
    }
}
