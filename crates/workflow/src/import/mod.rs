// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task descriptor YAML import (§6), grounded on the teacher's
//! `oj-runbook::import` module shape: a top-level `mod.rs` exposing the
//! entry point plus a sibling file per concern.

mod yaml;

pub use yaml::{from_yaml, AcceptanceCriterion, ImportError, TaskDescriptor};

#[cfg(test)]
#[path = "yaml_tests.rs"]
mod tests;
