// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn start_next_increments_attempt() {
    let mut history = ReviewHistory::default();
    assert_eq!(history.start_next("bob").attempt, 1);
    history.current_mut().unwrap().verdict = ReviewVerdict::Fail;
    assert_eq!(history.start_next("bob").attempt, 2);
}

#[test]
fn rejection_count_only_counts_fail_verdicts() {
    let mut history = ReviewHistory::default();
    history.start_next("bob");
    history.current_mut().unwrap().verdict = ReviewVerdict::Fail;
    history.start_next("bob");
    history.current_mut().unwrap().verdict = ReviewVerdict::Pass;
    history.start_next("bob");
    history.current_mut().unwrap().verdict = ReviewVerdict::Fail;
    assert_eq!(history.rejection_count(), 2);
}

#[test]
fn escalates_once_cap_reached() {
    let mut history = ReviewHistory::default();
    for _ in 0..3 {
        history.start_next("bob");
        history.current_mut().unwrap().verdict = ReviewVerdict::Fail;
    }
    assert!(history.should_escalate(3));
    assert!(!history.should_escalate(4));
}

#[test]
fn pending_review_is_not_decided() {
    let review = Review::new(1, "bob");
    assert!(!review.is_decided());
}
