// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Review-cycle op handlers.

use super::MaterializedState;
use crate::ops::StoreOp;
use delegate_core::ReviewHistory;

pub(crate) fn apply(state: &mut MaterializedState, op: &StoreOp) {
    match op {
        StoreOp::ReviewStarted { team_id, task_id, reviewer } => {
            let history = state.reviews.entry(*team_id).or_default().entry(*task_id).or_insert_with(ReviewHistory::default);
            if history.reviews.last().map(|r| !r.is_decided()).unwrap_or(false) {
                // A pending review is already open; starting another is a no-op.
                return;
            }
            let started = history.start_next(reviewer.clone());
            let attempt = started.attempt;
            if let Some(task) = state.tasks.get_mut(team_id).and_then(|t| t.get_mut(task_id)) {
                task.review_attempt = attempt;
            }
        }

        StoreOp::ReviewDecided { team_id, task_id, verdict, summary } => {
            if let Some(review) = state
                .reviews
                .get_mut(team_id)
                .and_then(|t| t.get_mut(task_id))
                .and_then(ReviewHistory::current_mut)
            {
                review.verdict = *verdict;
                review.summary.clone_from(summary);
            }
        }

        StoreOp::CommentAdded { team_id, task_id, comment } => {
            if let Some(review) = state
                .reviews
                .get_mut(team_id)
                .and_then(|t| t.get_mut(task_id))
                .and_then(ReviewHistory::current_mut)
            {
                if !review.comments.iter().any(|c| c.author == comment.author && c.created_at_ms == comment.created_at_ms)
                {
                    review.comments.push(comment.clone());
                }
            }
        }

        _ => unreachable!("review::apply called with a non-review op"),
    }
}
