// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable, per-team storage (§4.1).
//!
//! Every write to a team's state is logged to that team's write-ahead log
//! before it is applied in memory, and periodically checkpointed to a
//! snapshot so recovery only has to replay the tail. Teams are isolated
//! from each other: each gets its own directory, WAL, snapshot, and
//! single-writer lock, so a slow or corrupt team never blocks another.

pub mod migration;
pub mod ops;
pub mod snapshot;
pub mod state;
pub mod wal;

use delegate_core::{
    Activity, Attachment, Comment, Member, MemberKind, MemberRole, Message, MessageId,
    MessageLifecycle, Priority, Review, ReviewHistory, Seniority, Task, TaskId, TaskStatus, Team,
    TeamId,
};
use migration::MigrationRegistry;
use ops::StoreOp;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use smol_str::SmolStr;
use snapshot::{Checkpointer, Snapshot, SnapshotError};
use state::MaterializedState;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wal::{Wal, WalError};

/// How many ops accumulate between automatic snapshot checkpoints.
const CHECKPOINT_INTERVAL_OPS: u64 = 500;
/// Coarse window used by the message dedup key (§4.2): two sends from the
/// same sender with identical content land in the same bucket and are
/// treated as one.
const DEDUP_BUCKET_MS: u64 = 1_000;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("team {0} not found")]
    TeamNotFound(TeamId),
    #[error("member {0:?} not found on team {1}")]
    MemberNotFound(SmolStr, TeamId),
    #[error("task {0} not found on team {1}")]
    TaskNotFound(TaskId, TeamId),
    #[error("message {0} not found on team {1}")]
    MessageNotFound(MessageId, TeamId),
    #[error("message lifecycle error: {0}")]
    Lifecycle(#[from] delegate_core::LifecycleError),
    /// A write that would violate a durable invariant (§4.1's
    /// `INVARIANT_VIOLATION` contract) — e.g. mutating a terminal task's
    /// fields other than its attachments (§3). Callers treat this as a
    /// bug, not a recoverable condition.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// A send whose `(sender, content, sent_at bucket)` dedup key already
    /// exists; surfaced only where a caller explicitly asks to be told
    /// rather than handed the existing message back (§4.1 dedup key).
    #[error("duplicate message from the same sender within the same dedup bucket")]
    DuplicateMessage,
    /// Lost a race on a task transition: the task had already moved to
    /// `actual` by the time this write was attempted (§4.4).
    #[error("stale transition: task was already moved to {actual}")]
    StaleTransition { actual: TaskStatus },
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
}

fn content_hash(content: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.finalize().into()
}

struct TeamHandle {
    wal: Wal<StoreOp>,
    state: MaterializedState,
    checkpointer: Checkpointer,
}

/// The durable store for every team, rooted at a single directory on disk.
///
/// Each team gets `<root>/<team_id>/{wal.jsonl,snapshot.bin}`; the
/// top-level `teams` map is only a directory of which team's lock to take,
/// never held while a team's own lock is held.
pub struct Store {
    root_dir: PathBuf,
    registry: MigrationRegistry,
    teams: Mutex<HashMap<TeamId, Arc<Mutex<TeamHandle>>>>,
}

impl Store {
    /// Open (creating if absent) the store rooted at `root_dir`, loading
    /// every existing team's state by replaying its snapshot plus WAL tail.
    pub fn open(root_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root_dir = root_dir.into();
        std::fs::create_dir_all(&root_dir)?;
        let registry = MigrationRegistry::new();

        let mut teams = HashMap::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else { continue };
            if name.len() != 6 || !name.bytes().all(|b| b.is_ascii_hexdigit()) {
                continue;
            }
            let team_id = TeamId::from_str(&name);
            let handle = Self::load_team_handle(&entry.path(), &registry)?;
            teams.insert(team_id, Arc::new(Mutex::new(handle)));
        }

        Ok(Self { root_dir, registry, teams: Mutex::new(teams) })
    }

    fn team_dir(&self, team_id: TeamId) -> PathBuf {
        self.root_dir.join(team_id.to_string())
    }

    fn load_team_handle(dir: &Path, registry: &MigrationRegistry) -> Result<TeamHandle, StoreError> {
        let snapshot_path = dir.join("snapshot.bin");
        let wal_path = dir.join("wal.jsonl");

        let (processed_seq, mut state) = match Snapshot::read_from(&snapshot_path, registry)? {
            Some(snapshot) => (snapshot.seq, snapshot.state),
            None => (0, MaterializedState::default()),
        };

        let mut wal = Wal::open(&wal_path, processed_seq)?;
        while let Some(entry) = wal.next_unprocessed()? {
            state.apply_op(&entry.op);
            wal.mark_processed(entry.seq);
        }
        state.reconcile_counters();

        let checkpointer = Checkpointer::new(snapshot_path, CHECKPOINT_INTERVAL_OPS);
        Ok(TeamHandle { wal, state, checkpointer })
    }

    fn handle(&self, team_id: TeamId) -> Result<Arc<Mutex<TeamHandle>>, StoreError> {
        self.teams.lock().get(&team_id).cloned().ok_or(StoreError::TeamNotFound(team_id))
    }

    /// Look up `id` for a mutation, rejecting both a missing task and one
    /// already in a terminal state (§3: "A task in a terminal state is
    /// immutable except for the attachments list"). Every task-mutating
    /// method but [`Store::add_task_attachment`] goes through this.
    fn task_for_mutation(handle: &TeamHandle, team_id: TeamId, id: TaskId) -> Result<Task, StoreError> {
        let task = handle.state.get_task(team_id, id).cloned().ok_or(StoreError::TaskNotFound(id, team_id))?;
        if task.is_terminal() {
            return Err(StoreError::InvariantViolation(format!(
                "task {id} is terminal ({status}) and cannot be mutated except for attachments",
                status = task.status
            )));
        }
        Ok(task)
    }

    /// Append `op` to the WAL, apply it to in-memory state, and checkpoint
    /// if the interval has been reached. The only path through which any
    /// team state changes.
    fn commit(handle: &mut TeamHandle, op: StoreOp) -> Result<(), StoreError> {
        let seq = handle.wal.append(&op)?;
        handle.wal.mark_processed(seq);
        if handle.wal.needs_flush() {
            handle.wal.flush()?;
        }
        handle.state.apply_op(&op);
        handle.checkpointer.record_op();
        if handle.checkpointer.due() {
            handle.wal.flush()?;
            let snapshot = Snapshot::new(handle.wal.write_seq(), handle.state.clone());
            handle.checkpointer.checkpoint(&snapshot)?;
            handle.wal.truncate_before(snapshot.seq + 1)?;
        }
        Ok(())
    }

    // -- teams --------------------------------------------------------

    pub fn create_team(&self, name: impl Into<String>, charter: impl Into<String>, now_ms: u64) -> Result<Team, StoreError> {
        let team = Team::new(name, charter, now_ms);
        let dir = self.team_dir(team.team_id);
        std::fs::create_dir_all(&dir)?;

        let wal = Wal::open(dir.join("wal.jsonl"), 0)?;
        let checkpointer = Checkpointer::new(dir.join("snapshot.bin"), CHECKPOINT_INTERVAL_OPS);
        let mut handle = TeamHandle { wal, state: MaterializedState::default(), checkpointer };
        Self::commit(&mut handle, StoreOp::TeamCreated { team: team.clone() })?;

        self.teams.lock().insert(team.team_id, Arc::new(Mutex::new(handle)));
        Ok(team)
    }

    pub fn delete_team(&self, team_id: TeamId) -> Result<(), StoreError> {
        let handle = self.handle(team_id)?;
        Self::commit(&mut handle.lock(), StoreOp::TeamDeleted { team_id })?;
        self.teams.lock().remove(&team_id);
        Ok(())
    }

    pub fn get_team(&self, team_id: TeamId) -> Result<Team, StoreError> {
        let handle = self.handle(team_id)?;
        handle.lock().state.teams.get(&team_id).cloned().ok_or(StoreError::TeamNotFound(team_id))
    }

    pub fn list_teams(&self) -> Vec<TeamId> {
        self.teams.lock().keys().copied().collect()
    }

    // -- members --------------------------------------------------------

    /// Add a member, or return the existing one unchanged if already
    /// present under that name: retrying a crashed add must not error.
    pub fn add_member(
        &self,
        team_id: TeamId,
        name: impl Into<SmolStr>,
        kind: MemberKind,
        role: MemberRole,
        seniority: Seniority,
    ) -> Result<Member, StoreError> {
        let name = name.into();
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        if let Some(existing) = handle.state.get_member(team_id, &name) {
            return Ok(existing.clone());
        }
        let member = Member::new(name, kind, role, seniority, team_id);
        Self::commit(&mut handle, StoreOp::MemberAdded { member: member.clone() })?;
        Ok(member)
    }

    pub fn set_member_pid(&self, team_id: TeamId, name: impl Into<SmolStr>, pid: Option<u32>) -> Result<(), StoreError> {
        let name = name.into();
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        if handle.state.get_member(team_id, &name).is_none() {
            return Err(StoreError::MemberNotFound(name, team_id));
        }
        Self::commit(&mut handle, StoreOp::MemberPidSet { team_id, name, pid })
    }

    pub fn quarantine_member(&self, team_id: TeamId, name: impl Into<SmolStr>, quarantined: bool) -> Result<(), StoreError> {
        let name = name.into();
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        if handle.state.get_member(team_id, &name).is_none() {
            return Err(StoreError::MemberNotFound(name, team_id));
        }
        Self::commit(&mut handle, StoreOp::MemberQuarantined { team_id, name, quarantined })
    }

    pub fn get_member(&self, team_id: TeamId, name: &str) -> Result<Member, StoreError> {
        let handle = self.handle(team_id)?;
        handle.lock().state.get_member(team_id, name).cloned().ok_or_else(|| StoreError::MemberNotFound(name.into(), team_id))
    }

    pub fn list_members(&self, team_id: TeamId) -> Result<Vec<Member>, StoreError> {
        let handle = self.handle(team_id)?;
        Ok(handle.lock().state.members.get(&team_id).map(|m| m.values().cloned().collect()).unwrap_or_default())
    }

    // -- messages --------------------------------------------------------

    /// Send a message, deduplicating on `(sender, content, sent_at bucket)`
    /// (§4.2). A retried send that lands in the same coarse time bucket as
    /// an already-recorded one returns that message instead of creating a
    /// second one.
    pub fn send_message(
        &self,
        team_id: TeamId,
        sender: impl Into<SmolStr>,
        recipient: impl Into<SmolStr>,
        content: impl Into<String>,
        task_id: Option<TaskId>,
        now_ms: u64,
    ) -> Result<Message, StoreError> {
        let sender = sender.into();
        let content = content.into();
        let bucket = now_ms / DEDUP_BUCKET_MS;
        let hash = content_hash(&content);

        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        let duplicate = handle.state.messages.get(&team_id).and_then(|log| {
            log.iter().find(|m| m.sender == sender && m.sent_at_ms / DEDUP_BUCKET_MS == bucket && content_hash(&m.content) == hash)
        });
        if let Some(existing) = duplicate {
            return Ok(existing.clone());
        }

        let id = handle.state.allocate_message_id(team_id);
        let message = Message::new(id, team_id, sender, recipient, content, task_id, now_ms);
        Self::commit(&mut handle, StoreOp::MessageSent { message: message.clone() })?;
        Ok(message)
    }

    pub fn advance_message(&self, team_id: TeamId, id: MessageId, target: MessageLifecycle, at_ms: u64) -> Result<(), StoreError> {
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        let current = handle
            .state
            .messages
            .get(&team_id)
            .and_then(|log| log.iter().find(|m| m.id == id))
            .ok_or(StoreError::MessageNotFound(id, team_id))?
            .clone();
        let mut probe = current;
        probe.advance_to(target, at_ms)?;
        Self::commit(&mut handle, StoreOp::MessageAdvanced { team_id, id, target, at_ms })
    }

    pub fn list_messages(&self, team_id: TeamId) -> Result<Vec<Message>, StoreError> {
        let handle = self.handle(team_id)?;
        Ok(handle.lock().state.messages.get(&team_id).cloned().unwrap_or_default())
    }

    // -- tasks --------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn create_task(
        &self,
        team_id: TeamId,
        title: impl Into<String>,
        description: impl Into<String>,
        repo: Vec<String>,
        branch: impl Into<String>,
        workflow_name: impl Into<String>,
        workflow_version: u32,
        priority: Priority,
        now_ms: u64,
    ) -> Result<Task, StoreError> {
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        let id = handle.state.allocate_task_id(team_id);
        Self::insert_task(
            &mut handle,
            id,
            team_id,
            title.into(),
            description.into(),
            repo,
            branch.into(),
            workflow_name.into(),
            workflow_version,
            priority,
            now_ms,
        )
    }

    /// Create a task deriving `branch` from the newly allocated id rather
    /// than taking a literal string (§3: branch is derived
    /// deterministically, `delegate/<team_id>/<team>/T<NNNN>`). The id
    /// isn't known until allocation, so unlike [`Store::create_task`] this
    /// computes it inside the same critical section instead of asking the
    /// caller to guess it — the shape production callers (e.g.
    /// `delegate-scheduler` applying a `create_task` action) need.
    #[allow(clippy::too_many_arguments)]
    pub fn create_task_deriving_branch(
        &self,
        team_id: TeamId,
        team_name: &str,
        title: impl Into<String>,
        description: impl Into<String>,
        repo: Vec<String>,
        workflow_name: impl Into<String>,
        workflow_version: u32,
        priority: Priority,
        now_ms: u64,
    ) -> Result<Task, StoreError> {
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        let id = handle.state.allocate_task_id(team_id);
        let branch = Task::derive_branch(team_id, team_name, id);
        Self::insert_task(
            &mut handle,
            id,
            team_id,
            title.into(),
            description.into(),
            repo,
            branch,
            workflow_name.into(),
            workflow_version,
            priority,
            now_ms,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_task(
        handle: &mut TeamHandle,
        id: TaskId,
        team_id: TeamId,
        title: String,
        description: String,
        repo: Vec<String>,
        branch: String,
        workflow_name: String,
        workflow_version: u32,
        priority: Priority,
        now_ms: u64,
    ) -> Result<Task, StoreError> {
        let task = Task {
            id,
            team_id,
            title,
            description,
            dri: None,
            assignee: None,
            status: TaskStatus::Todo,
            priority,
            repo,
            base_sha: HashMap::new(),
            branch,
            workflow_name,
            workflow_version,
            depends_on: Vec::new(),
            attachments: Vec::new(),
            review_attempt: 0,
            retry_count: 0,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            completed_at_ms: None,
            rejection_reason: None,
            in_cursor: HashMap::new(),
        };
        Self::commit(handle, StoreOp::TaskCreated { task: task.clone() })?;
        Ok(task)
    }

    /// Transition a task's status, optionally asserting the status the
    /// caller last observed (`expected_status`). A mismatch means another
    /// writer already moved the task and this caller lost the race; it is
    /// rejected with [`StoreError::StaleTransition`] rather than silently
    /// transitioning from whatever the task now holds (§4.4: "the loser is
    /// rejected with STALE_TRANSITION"). Pass `None` when the caller has no
    /// expectation to assert (e.g. an unconditional recovery transition).
    pub fn transition_task(
        &self,
        team_id: TeamId,
        id: TaskId,
        status: TaskStatus,
        at_ms: u64,
        expected_status: Option<TaskStatus>,
    ) -> Result<(), StoreError> {
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        let task = Self::task_for_mutation(&handle, team_id, id)?;
        if let Some(expected) = expected_status {
            if task.status != expected {
                return Err(StoreError::StaleTransition { actual: task.status });
            }
        }
        Self::commit(&mut handle, StoreOp::TaskTransitioned { team_id, id, status, at_ms })
    }

    pub fn assign_task(&self, team_id: TeamId, id: TaskId, assignee: Option<SmolStr>) -> Result<(), StoreError> {
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        Self::task_for_mutation(&handle, team_id, id)?;
        Self::commit(&mut handle, StoreOp::TaskAssigned { team_id, id, assignee })
    }

    /// Set the task's DRI. A no-op if already set (§3 invariant: immutable
    /// once assigned).
    pub fn assign_dri(&self, team_id: TeamId, id: TaskId, dri: impl Into<SmolStr>) -> Result<(), StoreError> {
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        Self::task_for_mutation(&handle, team_id, id)?;
        Self::commit(&mut handle, StoreOp::TaskDriAssigned { team_id, id, dri: dri.into() })
    }

    pub fn set_task_priority(&self, team_id: TeamId, id: TaskId, priority: Priority) -> Result<(), StoreError> {
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        Self::task_for_mutation(&handle, team_id, id)?;
        Self::commit(&mut handle, StoreOp::TaskPriorityChanged { team_id, id, priority })
    }

    /// Add an attachment to a task. Exempt from the terminal-state guard
    /// other task mutations go through (§3: "immutable except for the
    /// attachments list"), so only existence is checked here.
    pub fn add_task_attachment(&self, team_id: TeamId, id: TaskId, name: impl Into<String>, uri: impl Into<String>, added_at_ms: u64) -> Result<(), StoreError> {
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        if handle.state.get_task(team_id, id).is_none() {
            return Err(StoreError::TaskNotFound(id, team_id));
        }
        let attachment = Attachment { name: name.into(), uri: uri.into(), added_at_ms };
        Self::commit(&mut handle, StoreOp::TaskAttachmentAdded { team_id, id, attachment })
    }

    pub fn reject_task(&self, team_id: TeamId, id: TaskId, reason: impl Into<String>, at_ms: u64) -> Result<(), StoreError> {
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        Self::task_for_mutation(&handle, team_id, id)?;
        Self::commit(&mut handle, StoreOp::TaskRejected { team_id, id, reason: reason.into(), at_ms })
    }

    pub fn set_task_retry_count(&self, team_id: TeamId, id: TaskId, retry_count: u32) -> Result<(), StoreError> {
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        Self::task_for_mutation(&handle, team_id, id)?;
        Self::commit(&mut handle, StoreOp::TaskRetryCountSet { team_id, id, retry_count })
    }

    /// Record `main`'s SHA for one repo of a task's worktree (§3 `base_sha`).
    pub fn set_task_base_sha(&self, team_id: TeamId, id: TaskId, repo: impl Into<String>, sha: impl Into<String>) -> Result<(), StoreError> {
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        Self::task_for_mutation(&handle, team_id, id)?;
        Self::commit(&mut handle, StoreOp::TaskBaseShaSet { team_id, id, repo: repo.into(), sha: sha.into() })
    }

    /// Advance the durable in-cursor for one peer past `message_id`
    /// (monotonic; a lower value is a no-op — see `state::task::apply`).
    pub fn advance_task_in_cursor(&self, team_id: TeamId, id: TaskId, peer: impl Into<SmolStr>, message_id: MessageId) -> Result<(), StoreError> {
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        Self::task_for_mutation(&handle, team_id, id)?;
        Self::commit(&mut handle, StoreOp::TaskInCursorSet { team_id, id, peer: peer.into(), message_id })
    }

    pub fn get_task(&self, team_id: TeamId, id: TaskId) -> Result<Task, StoreError> {
        let handle = self.handle(team_id)?;
        handle.lock().state.get_task(team_id, id).cloned().ok_or(StoreError::TaskNotFound(id, team_id))
    }

    pub fn list_tasks(&self, team_id: TeamId) -> Result<Vec<Task>, StoreError> {
        let handle = self.handle(team_id)?;
        Ok(handle.lock().state.tasks.get(&team_id).map(|t| t.values().cloned().collect()).unwrap_or_default())
    }

    // -- reviews --------------------------------------------------------

    pub fn start_review(&self, team_id: TeamId, task_id: TaskId, reviewer: impl Into<SmolStr>) -> Result<(), StoreError> {
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        if handle.state.get_task(team_id, task_id).is_none() {
            return Err(StoreError::TaskNotFound(task_id, team_id));
        }
        Self::commit(&mut handle, StoreOp::ReviewStarted { team_id, task_id, reviewer: reviewer.into() })
    }

    pub fn decide_review(
        &self,
        team_id: TeamId,
        task_id: TaskId,
        verdict: delegate_core::ReviewVerdict,
        summary: impl Into<String>,
    ) -> Result<(), StoreError> {
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        if handle.state.get_task(team_id, task_id).is_none() {
            return Err(StoreError::TaskNotFound(task_id, team_id));
        }
        Self::commit(&mut handle, StoreOp::ReviewDecided { team_id, task_id, verdict, summary: summary.into() })
    }

    pub fn add_review_comment(&self, team_id: TeamId, task_id: TaskId, author: impl Into<SmolStr>, body: impl Into<String>, created_at_ms: u64) -> Result<(), StoreError> {
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        if handle.state.get_task(team_id, task_id).is_none() {
            return Err(StoreError::TaskNotFound(task_id, team_id));
        }
        let comment = Comment { author: author.into(), body: body.into(), created_at_ms };
        Self::commit(&mut handle, StoreOp::CommentAdded { team_id, task_id, comment })
    }

    pub fn get_review_history(&self, team_id: TeamId, task_id: TaskId) -> Result<ReviewHistory, StoreError> {
        let handle = self.handle(team_id)?;
        Ok(handle.lock().state.get_review_history(team_id, task_id).cloned().unwrap_or_default())
    }

    pub fn current_review(&self, team_id: TeamId, task_id: TaskId) -> Result<Option<Review>, StoreError> {
        let handle = self.handle(team_id)?;
        Ok(handle.lock().state.current_review(team_id, task_id).cloned())
    }

    // -- activity --------------------------------------------------------

    pub fn record_activity(&self, activity: Activity) -> Result<(), StoreError> {
        let team_id = activity.team_id;
        let handle = self.handle(team_id)?;
        Self::commit(&mut handle.lock(), StoreOp::ActivityRecorded { activity })
    }

    pub fn list_activity(&self, team_id: TeamId) -> Result<Vec<Activity>, StoreError> {
        let handle = self.handle(team_id)?;
        Ok(handle.lock().state.activity.get(&team_id).cloned().unwrap_or_default())
    }

    /// Mark a clean shutdown in a team's WAL so a restart's recovery replay
    /// can tell a graceful stop from a crash mid-write.
    pub fn mark_shutdown(&self, team_id: TeamId) -> Result<(), StoreError> {
        let handle = self.handle(team_id)?;
        let mut handle = handle.lock();
        let seq = handle.wal.append(&StoreOp::Shutdown)?;
        handle.wal.mark_processed(seq);
        handle.wal.flush()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
