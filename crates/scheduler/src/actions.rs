// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Applying a turn's action list through the Store and MessageBus (§4.3
//! step 4): "apply actions through the Store and MessageBus in a single
//! logical unit (individual action failures are surfaced as turn errors;
//! the turn is the unit of atomicity the user observes, not individual
//! actions)". Actions are applied one at a time, in order; a later
//! action's failure does not roll back an earlier action's effect — it
//! only fails the turn, which keeps `in_cursor` from advancing so the
//! same inbox is re-presented next trigger (§4.3 failure semantics).

use delegate_adapters::Action;
use delegate_core::{Clock, Priority};
use delegate_store::Store;
use delegate_workflow::{default, WorkflowEngine};
use smol_str::SmolStr;
use std::sync::Arc;

use crate::SchedulerError;

/// Collaborators one action application needs, bundled so
/// [`apply_action`]'s signature doesn't grow a parameter per action kind.
pub(crate) struct ActionCtx<'a, C: Clock> {
    pub store: &'a Arc<Store>,
    pub bus: &'a Arc<delegate_bus::MessageBus<C>>,
    pub workflow: &'a Arc<WorkflowEngine>,
    pub team_id: delegate_core::TeamId,
    pub team_name: &'a str,
    pub agent: &'a SmolStr,
    pub clock: &'a C,
}

/// Apply one [`Action`] a turn produced. `SetContext` and `RunShell`
/// don't map onto a Store op — `RunShell`'s actual command execution
/// already happened inside the (out of scope) agent adapter process
/// before it returned the action list (§6: "the adapter is responsible
/// for ... LLM I/O"); here they're only recorded as activity so
/// cost/usage rollups and the operator's activity feed see them.
pub(crate) async fn apply_action<C: Clock>(ctx: &ActionCtx<'_, C>, action: Action) -> Result<(), SchedulerError> {
    let now_ms = ctx.clock.epoch_ms();
    match action {
        Action::SendMessage { recipient, content, task_id } => {
            let either_human = {
                let sender_human = ctx.store.get_member(ctx.team_id, ctx.agent.as_str()).map(|m| m.is_human()).unwrap_or(false);
                let recipient_human = ctx.store.get_member(ctx.team_id, recipient.as_str()).map(|m| m.is_human()).unwrap_or(false);
                sender_human || recipient_human
            };
            ctx.bus.send(ctx.team_id, ctx.agent.clone(), recipient, content, task_id, either_human)?;
            Ok(())
        }
        Action::CreateTask { title, description, repo } => {
            ctx.store.create_task_deriving_branch(
                ctx.team_id,
                ctx.team_name,
                title,
                description,
                repo,
                default::DEFAULT_WORKFLOW_NAME,
                default::DEFAULT_WORKFLOW_VERSION,
                Priority::Normal,
                now_ms,
            )?;
            Ok(())
        }
        Action::UpdateTaskStatus { task_id, status } => {
            ctx.workflow.advance(ctx.team_id, task_id, status, now_ms).await?;
            Ok(())
        }
        Action::AppendComment { task_id, body } => {
            // A no-op if no review is currently open on the task (§3: only
            // `in_review` tasks own a current review to attach to).
            ctx.store.add_review_comment(ctx.team_id, task_id, ctx.agent.clone(), body, now_ms)?;
            Ok(())
        }
        Action::SetContext { note } => {
            ctx.store.record_activity(delegate_core::Activity {
                team_id: ctx.team_id,
                agent: ctx.agent.clone(),
                activity_type: delegate_core::ActivityType::TaskUpdate,
                task_id: None,
                payload: std::collections::HashMap::from([("context_note".to_string(), note)]),
                timestamp_ms: now_ms,
            })?;
            Ok(())
        }
        Action::SpawnAgent { name, role } => {
            let role = parse_role(&role);
            ctx.store.add_member(ctx.team_id, name, delegate_core::MemberKind::Agent, role, delegate_core::Seniority::Junior)?;
            Ok(())
        }
        Action::RunShell { command } => {
            ctx.store.record_activity(delegate_core::Activity {
                team_id: ctx.team_id,
                agent: ctx.agent.clone(),
                activity_type: delegate_core::ActivityType::TaskUpdate,
                task_id: None,
                payload: std::collections::HashMap::from([("ran_shell".to_string(), command)]),
                timestamp_ms: now_ms,
            })?;
            Ok(())
        }
    }
}

fn parse_role(role: &str) -> delegate_core::MemberRole {
    match role {
        "manager" => delegate_core::MemberRole::Manager,
        "reviewer" => delegate_core::MemberRole::Reviewer,
        "qa" => delegate_core::MemberRole::Qa,
        _ => delegate_core::MemberRole::Worker,
    }
}

#[cfg(test)]
#[path = "actions_tests.rs"]
mod tests;
