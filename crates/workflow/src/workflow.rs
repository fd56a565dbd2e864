// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A `Workflow` is a named, versioned stage sequence (§4.4) plus the side
//! transitions that don't fit the main sequence (rejection bounce-back,
//! merge-failure retry, cancellation from anywhere).

use crate::stage::StageRef;
use delegate_core::TaskStatus;
use std::collections::HashMap;
use std::sync::Arc;

/// One named, versioned stage sequence. Stamped onto a task at creation;
/// later edits to the registered `Workflow` never retroactively affect an
/// already-stamped task (§4.4 invariant) because the engine always
/// resolves by the exact `(name, version)` pair recorded on the task.
pub struct Workflow {
    pub name: String,
    pub version: u32,
    stages: Vec<StageRef>,
    /// Transitions outside the main sequence: `(from, to)` pairs such as
    /// `rejected -> in_progress` or `merge_failed -> in_progress`.
    side_transitions: Vec<(TaskStatus, TaskStatus)>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, version: u32, stages: Vec<StageRef>, side_transitions: Vec<(TaskStatus, TaskStatus)>) -> Self {
        Self { name: name.into(), version, stages, side_transitions }
    }

    pub fn stage_for(&self, status: TaskStatus) -> Option<&StageRef> {
        self.stages.iter().find(|s| s.status() == status)
    }

    fn index_of(&self, status: TaskStatus) -> Option<usize> {
        self.stages.iter().position(|s| s.status() == status)
    }

    /// Whether `from -> to` is a transition this workflow permits: the
    /// next stage in the main sequence, a declared side transition, or
    /// (from any non-terminal status) cancellation.
    pub fn allows(&self, from: TaskStatus, to: TaskStatus) -> bool {
        if to == TaskStatus::Cancelled {
            return !from.is_terminal();
        }
        if let (Some(i), Some(j)) = (self.index_of(from), self.index_of(to)) {
            if j == i + 1 {
                return true;
            }
        }
        self.side_transitions.contains(&(from, to))
    }
}

/// `(workflow_name, workflow_version) -> Workflow` registry, resolved on
/// every transition so a task stamped at creation keeps using the
/// definition it was stamped with (§4.4).
#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<(String, u32), Arc<Workflow>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, workflow: Workflow) {
        self.workflows.insert((workflow.name.clone(), workflow.version), Arc::new(workflow));
    }

    pub fn get(&self, name: &str, version: u32) -> Option<Arc<Workflow>> {
        self.workflows.get(&(name.to_string(), version)).cloned()
    }
}
