// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The turn execution contract (§4.3 steps 1-6) and the per-agent
//! dispatch loop that drives it.

use std::collections::HashMap;
use std::sync::Arc;

use delegate_adapters::{ContextSummary, InboxSnapshot};
use delegate_core::{Activity, ActivityType, Clock, Message, MessageLifecycle, TeamId};
use delegate_events::DelegateEvent;
use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::actions::{apply_action, ActionCtx};
use crate::state::AgentState;
use crate::{SchedulerError, TurnScheduler};

/// How a single dispatched turn ended, for logging and quarantine bookkeeping.
enum TurnResult {
    Completed,
    Failed(SchedulerError),
    Aborted,
}

impl<C: Clock + 'static> TurnScheduler<C> {
    /// Entry point for every dispatch trigger (§4.3: message delivered,
    /// task assignment, or an external request). Coalesces concurrent
    /// triggers for the same agent into the single-slot queue §4.3
    /// describes; only the first trigger for an idle agent actually
    /// spawns a run loop.
    pub(crate) fn trigger(self: &Arc<Self>, team_id: TeamId, agent: SmolStr) {
        let Ok(member) = self.store.get_member(team_id, agent.as_str()) else {
            return;
        };
        if member.kind != delegate_core::MemberKind::Agent {
            // Only agent members execute turns; humans and `system` never do.
            return;
        }
        if member.quarantined {
            return;
        }

        let state = self.agent_state(team_id, agent.clone());
        if !state.try_activate() {
            return;
        }

        let this = self.clone();
        tokio::spawn(async move { this.run_loop(team_id, agent, state).await });
    }

    fn agent_state(&self, team_id: TeamId, agent: SmolStr) -> Arc<AgentState> {
        self.agents.lock().entry((team_id, agent)).or_insert_with(|| Arc::new(AgentState::default())).clone()
    }

    /// The per-agent run loop: execute one turn, then check whether a
    /// trigger arrived during it; if so, run another immediately instead
    /// of going idle (§4.3 debounce/coalescing).
    async fn run_loop(self: Arc<Self>, team_id: TeamId, agent: SmolStr, state: Arc<AgentState>) {
        loop {
            state.take_pending();
            self.run_one_turn(team_id, &agent, &state).await;
            if !state.take_pending() {
                state.deactivate();
                break;
            }
        }
    }

    /// One full pass of the turn execution contract (§4.3 steps 1-6),
    /// bounded by the global parallelism semaphore and the agent's own
    /// mutex for the duration of the adapter call.
    #[instrument(skip(self, state), fields(%team_id, %agent))]
    async fn run_one_turn(self: &Arc<Self>, team_id: TeamId, agent: &SmolStr, state: &Arc<AgentState>) {
        let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
            warn!("scheduler semaphore closed, dropping turn");
            return;
        };

        let turn_id = delegate_core::TurnId::new();
        let now_ms = self.clock.epoch_ms();
        self.events.publish(team_id, DelegateEvent::TurnStarted { agent: agent.clone(), turn_id });
        let _ = self.store.record_activity(Activity {
            team_id,
            agent: agent.clone(),
            activity_type: ActivityType::TurnStarted,
            task_id: None,
            payload: HashMap::new(),
            timestamp_ms: now_ms,
        });

        let result = self.execute_turn(team_id, agent, state).await;

        let ok = matches!(result, TurnResult::Completed);
        let now_ms = self.clock.epoch_ms();
        self.events.publish(team_id, DelegateEvent::TurnEnded { agent: agent.clone(), turn_id, ok });

        match result {
            TurnResult::Completed => {
                state.record_success();
                let _ = self.store.record_activity(Activity {
                    team_id,
                    agent: agent.clone(),
                    activity_type: ActivityType::TurnEnded,
                    task_id: None,
                    payload: HashMap::new(),
                    timestamp_ms: now_ms,
                });
            }
            TurnResult::Failed(e) => {
                info!(error = %e, "turn failed, in_cursor not advanced");
                self.record_failure(team_id, agent, &e.to_string(), now_ms).await;
            }
            TurnResult::Aborted => {
                self.record_failure(team_id, agent, "turn aborted after cancellation grace period", now_ms).await;
            }
        }

        drop(permit);
    }

    async fn record_failure(self: &Arc<Self>, team_id: TeamId, agent: &SmolStr, reason: &str, now_ms: u64) {
        let _ = self.store.record_activity(Activity {
            team_id,
            agent: agent.clone(),
            activity_type: ActivityType::TurnFailed,
            task_id: None,
            payload: HashMap::from([("reason".to_string(), reason.to_string())]),
            timestamp_ms: now_ms,
        });

        let state = self.agent_state(team_id, agent.clone());
        let failures = state.record_failure();
        if failures >= self.config.quarantine_threshold {
            warn!(%failures, "agent quarantined after consecutive turn failures");
            let _ = self.store.quarantine_member(team_id, agent.clone(), true);
            let _ = self.store.record_activity(Activity {
                team_id,
                agent: agent.clone(),
                activity_type: ActivityType::AgentQuarantined,
                task_id: None,
                payload: HashMap::new(),
                timestamp_ms: now_ms,
            });
            if let Ok(members) = self.store.list_members(team_id) {
                if let Some(manager) = members.iter().find(|m| m.role == delegate_core::MemberRole::Manager) {
                    let _ = self.bus.send(
                        team_id,
                        delegate_core::SYSTEM_MEMBER,
                        manager.name.clone(),
                        format!("agent {agent} quarantined after {failures} consecutive turn failures"),
                        None,
                        true,
                    );
                }
            }
        }
    }

    /// Steps 2-5 of the contract: snapshot the inbox, invoke the adapter
    /// (honoring cancellation and the hard-kill grace period), apply the
    /// resulting actions, and advance the in-cursor on success.
    async fn execute_turn(self: &Arc<Self>, team_id: TeamId, agent: &SmolStr, state: &Arc<AgentState>) -> TurnResult {
        let inbox = match self.snapshot_and_mark_seen(team_id, agent) {
            Ok(inbox) => inbox,
            Err(e) => return TurnResult::Failed(SchedulerError::Store(e)),
        };
        let context = self.build_context(team_id, agent);

        let cancel = CancellationToken::new();
        state.set_cancel_token(Some(cancel.clone()));

        let adapter = self.adapter.clone();
        let agent_owned = agent.to_string();
        let inbox_for_call = inbox.clone();
        let cancel_for_call = cancel.clone();
        let mut handle = tokio::spawn(async move { adapter.run_turn(&agent_owned, inbox_for_call, context, cancel_for_call).await });

        let actions = tokio::select! {
            res = &mut handle => match res {
                Ok(Ok(actions)) => actions,
                Ok(Err(e)) => {
                    state.set_cancel_token(None);
                    return TurnResult::Failed(SchedulerError::AdapterFailed(e.to_string()));
                }
                Err(_join_err) => {
                    state.set_cancel_token(None);
                    return TurnResult::Aborted;
                }
            },
            _ = cancel.cancelled() => {
                // Cooperative cancellation was requested externally; give
                // the adapter its grace period to notice the token and
                // return before hard-aborting the task (§4.3 cancellation).
                match tokio::time::timeout(self.config.turn_cancel_grace, &mut handle).await {
                    Ok(Ok(Ok(actions))) => actions,
                    Ok(Ok(Err(e))) => {
                        state.set_cancel_token(None);
                        return TurnResult::Failed(SchedulerError::AdapterFailed(e.to_string()));
                    }
                    Ok(Err(_join_err)) => {
                        state.set_cancel_token(None);
                        return TurnResult::Aborted;
                    }
                    Err(_elapsed) => {
                        handle.abort();
                        state.set_cancel_token(None);
                        return TurnResult::Aborted;
                    }
                }
            }
        };
        state.set_cancel_token(None);

        match self.apply_actions(team_id, agent, actions).await {
            Ok(()) => {}
            Err(e) => return TurnResult::Failed(e),
        }

        if let Err(e) = self.mark_processed(team_id, agent, &inbox.messages) {
            return TurnResult::Failed(SchedulerError::Store(e));
        }

        TurnResult::Completed
    }

    /// §4.3 step 2: every message addressed to `agent` that hasn't yet
    /// reached `processed` (so a retried turn re-includes a message it
    /// saw but failed to finish processing), marked `seen_at` if it
    /// wasn't already.
    fn snapshot_and_mark_seen(&self, team_id: TeamId, agent: &SmolStr) -> Result<InboxSnapshot, delegate_store::StoreError> {
        let now_ms = self.clock.epoch_ms();
        let mut messages: Vec<Message> = self
            .store
            .list_messages(team_id)?
            .into_iter()
            .filter(|m| m.recipient == *agent && m.processed_at_ms.is_none())
            .collect();
        messages.sort_by_key(|m| m.sent_at_ms);

        for m in &messages {
            if m.lifecycle() < MessageLifecycle::Seen {
                self.store.advance_message(team_id, m.id, MessageLifecycle::Seen, now_ms)?;
            }
        }
        // Re-read so the snapshot handed to the adapter carries the
        // `seen_at` timestamp just recorded.
        let mut messages = self
            .store
            .list_messages(team_id)?
            .into_iter()
            .filter(|m| m.recipient == *agent && m.processed_at_ms.is_none())
            .collect::<Vec<_>>();
        messages.sort_by_key(|m| m.sent_at_ms);

        Ok(InboxSnapshot { agent: agent.clone(), messages: std::mem::take(&mut messages) })
    }

    /// §4.3 step 5: advance past the last processed message, both on the
    /// message itself and (when it carries `task_id`) on the task's
    /// per-peer in-cursor bookkeeping.
    fn mark_processed(&self, team_id: TeamId, agent: &SmolStr, messages: &[Message]) -> Result<(), delegate_store::StoreError> {
        let now_ms = self.clock.epoch_ms();
        for m in messages {
            self.store.advance_message(team_id, m.id, MessageLifecycle::Processed, now_ms)?;
            if let Some(task_id) = m.task_id {
                self.store.advance_task_in_cursor(team_id, task_id, agent.clone(), m.id)?;
            }
        }
        Ok(())
    }

    fn build_context(&self, team_id: TeamId, agent: &SmolStr) -> ContextSummary {
        let charter = self.store.get_team(team_id).map(|t| t.charter).unwrap_or_default();
        let mut notes: Vec<String> = self
            .store
            .list_activity(team_id)
            .unwrap_or_default()
            .into_iter()
            .filter(|a| a.agent == *agent && a.activity_type == ActivityType::TaskUpdate)
            .filter_map(|a| a.payload.get("context_note").cloned())
            .collect();
        // Keep only the most recent handful; the adapter owns prompt
        // assembly and doesn't need the full history (§6).
        if notes.len() > 5 {
            notes = notes.split_off(notes.len() - 5);
        }
        ContextSummary { charter, notes }
    }

    async fn apply_actions(self: &Arc<Self>, team_id: TeamId, agent: &SmolStr, actions: Vec<delegate_adapters::Action>) -> Result<(), SchedulerError> {
        let team_name = self.store.get_team(team_id).map(|t| t.name).unwrap_or_default();
        for action in actions {
            let ctx = ActionCtx {
                store: &self.store,
                bus: &self.bus,
                workflow: &self.workflow,
                team_id,
                team_name: &team_name,
                agent,
                clock: &self.clock,
            };
            apply_action(&ctx, action).await?;
        }
        Ok(())
    }

    /// Cooperative cancellation (§4.3): sets the flag the adapter should
    /// observe; the turn's own grace/hard-kill handling lives in
    /// [`execute_turn`]. Returns `true` if a turn for this agent was
    /// actually running.
    pub fn cancel_turn(&self, team_id: TeamId, agent: &str) -> bool {
        let Ok(members) = self.store.list_members(team_id) else { return false };
        if !members.iter().any(|m| m.name.as_str() == agent) {
            return false;
        }
        self.agent_state(team_id, SmolStr::new(agent)).cancel()
    }
}

#[cfg(test)]
#[path = "turn_tests.rs"]
mod tests;
