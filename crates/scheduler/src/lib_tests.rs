// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use delegate_adapters::{Action, FakeAgentAdapter};
use delegate_core::{FakeClock, MemberKind, MemberRole, Seniority};
use delegate_resources::ResourceManager;
use delegate_store::Store;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

struct Harness {
    _home: TempDir,
    _store_dir: TempDir,
    store: Arc<Store>,
    bus: Arc<MessageBus<FakeClock>>,
    events: Arc<EventBus>,
    adapter: FakeAgentAdapter,
    team_id: TeamId,
}

fn harness() -> (Harness, Arc<TurnScheduler<FakeClock>>) {
    let home = TempDir::new().expect("tempdir");
    let store_dir = TempDir::new().expect("tempdir");

    let resources = Arc::new(ResourceManager::open(home.path()).expect("open resources"));
    let store = Arc::new(Store::open(store_dir.path()).expect("open store"));
    let events = Arc::new(EventBus::new());
    let clock = FakeClock::new();
    let bus = MessageBus::with_clock(store.clone(), clock.clone());
    let workflow = Arc::new(WorkflowEngine::new(store.clone(), resources, events.clone()));
    let adapter = FakeAgentAdapter::new();

    let team = store.create_team("acme", "charter", 1_000_000).expect("create team");
    store.add_member(team.team_id, "alice", MemberKind::Agent, MemberRole::Worker, Seniority::Senior).expect("add agent");
    store.add_member(team.team_id, "carol", MemberKind::Human, MemberRole::Manager, Seniority::Staff).expect("add human");

    let config = SchedulerConfig { parallelism_cap: 4, turn_cancel_grace: Duration::from_millis(50), quarantine_threshold: 3 };
    let scheduler = TurnScheduler::with_clock(store.clone(), bus.clone(), events.clone(), workflow, Arc::new(adapter.clone()), clock, config);

    (Harness { _home: home, _store_dir: store_dir, store, bus, events, adapter, team_id: team.team_id }, scheduler)
}

#[tokio::test]
async fn request_turn_runs_the_adapter_once_for_an_idle_agent() {
    let (h, scheduler) = harness();
    h.adapter.push_actions(vec![Action::SetContext { note: "hi".into() }]);

    scheduler.request_turn(h.team_id, "alice");
    sleep(Duration::from_millis(50)).await;

    assert_eq!(h.adapter.calls().len(), 1);
}

#[tokio::test]
async fn a_quarantined_agent_never_gets_dispatched() {
    let (h, scheduler) = harness();
    h.store.quarantine_member(h.team_id, "alice", true).expect("quarantine");
    h.adapter.push_actions(vec![Action::SetContext { note: "hi".into() }]);

    scheduler.request_turn(h.team_id, "alice");
    sleep(Duration::from_millis(50)).await;

    assert!(h.adapter.calls().is_empty());
}

#[tokio::test]
async fn three_consecutive_failures_quarantine_the_agent() {
    let (h, scheduler) = harness();
    h.adapter.push_failure("boom 1");
    scheduler.request_turn(h.team_id, "alice");
    sleep(Duration::from_millis(30)).await;

    h.adapter.push_failure("boom 2");
    scheduler.request_turn(h.team_id, "alice");
    sleep(Duration::from_millis(30)).await;

    h.adapter.push_failure("boom 3");
    scheduler.request_turn(h.team_id, "alice");
    sleep(Duration::from_millis(30)).await;

    let member = h.store.get_member(h.team_id, "alice").expect("get member");
    assert!(member.quarantined);

    let activity = h.store.list_activity(h.team_id).expect("list");
    assert!(activity.iter().any(|a| a.activity_type == delegate_core::ActivityType::AgentQuarantined));
}

#[tokio::test]
async fn a_successful_turn_resets_the_failure_streak() {
    let (h, scheduler) = harness();
    h.adapter.push_failure("boom 1");
    scheduler.request_turn(h.team_id, "alice");
    sleep(Duration::from_millis(30)).await;

    h.adapter.push_actions(vec![]);
    scheduler.request_turn(h.team_id, "alice");
    sleep(Duration::from_millis(30)).await;

    h.adapter.push_failure("boom 2");
    scheduler.request_turn(h.team_id, "alice");
    sleep(Duration::from_millis(30)).await;

    let member = h.store.get_member(h.team_id, "alice").expect("get member");
    assert!(!member.quarantined);
}

#[tokio::test]
async fn bus_delivery_to_an_agent_triggers_a_turn_once_attached() {
    let (h, scheduler) = harness();
    scheduler.attach_to_bus();
    h.adapter.push_actions(vec![]);

    h.bus.send(h.team_id, "carol", "alice", "please start", None, true).expect("send");
    h.bus.deliver_pending(h.team_id).expect("deliver");
    sleep(Duration::from_millis(50)).await;

    assert_eq!(h.adapter.calls().len(), 1);
    assert_eq!(h.adapter.calls()[0].messages.len(), 1);
}

#[tokio::test]
async fn watch_team_dispatches_when_a_task_update_names_an_assignee() {
    let (h, scheduler) = harness();
    scheduler.watch_team(h.team_id);
    h.adapter.push_actions(vec![]);

    let task = h
        .store
        .create_task(h.team_id, "t", "d", vec!["svc".into()], "delegate/x/acme/T0001", "default", 1, delegate_core::Priority::Normal, 1_000_000)
        .expect("create task");
    h.store.assign_task(h.team_id, task.id, Some("alice".into())).expect("assign");
    h.events.publish(h.team_id, DelegateEvent::TaskUpdate { task_id: task.id, status: delegate_core::TaskStatus::InProgress });
    sleep(Duration::from_millis(50)).await;

    assert_eq!(h.adapter.calls().len(), 1);
}

#[tokio::test]
async fn request_cancel_fires_the_cancellation_token_for_a_running_turn() {
    let (h, scheduler) = harness();
    // The fake adapter returns instantly, so there's nothing to cancel
    // mid-flight, but `request_cancel` must still report `false` cleanly
    // for an agent with no turn in flight rather than panicking.
    assert!(!scheduler.request_cancel(h.team_id, "alice"));
}

#[tokio::test]
async fn available_permits_reflects_the_configured_parallelism_cap() {
    let (_h, scheduler) = harness();
    assert_eq!(scheduler.available_permits(), 4);
}
