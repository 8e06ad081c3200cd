use std::collections::BTreeMap;

use tracker_logging::track_debug;

/// Opaque, server-issued task identifier.
pub type TaskId = String;

/// Job kinds the backend can run; carried for display, never branched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    FileProcessing,
    Scrape,
    PlaylistDownload,
    DocumentProcessing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Polling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    Completed,
    Failed,
    Cancelled,
}

/// Heartbeat-derived link quality, for display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionQuality {
    #[default]
    Unknown,
    Good,
    Degraded,
    Poor,
}

/// A parsed "batch k/total" hint from a progress message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchHint {
    pub current: u32,
    pub total: u32,
}

impl BatchHint {
    pub fn is_final(&self) -> bool {
        self.total > 0 && self.current >= self.total
    }
}

/// Active simulation sub-state: a synthetic slow climb from `base`,
/// entered on a sustained plateau and exited by a real sample or terminal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Simulation {
    /// The plateau value the climb starts from.
    pub base: f64,
    /// Epoch millis when simulation was entered.
    pub started_at: u64,
}

/// Authoritative per-task state. Mutated only by the reducer in `update`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSession {
    pub id: TaskId,
    pub kind: TaskKind,
    pub channel: ChannelState,
    pub started_at: u64,
    pub last_sample_at: Option<u64>,
    /// Displayed progress, 0-100. Non-decreasing for the life of the session.
    pub displayed: f64,
    pub terminal: Option<TerminalKind>,
    pub quality: ConnectionQuality,
    pub(crate) terminal_fired: bool,
    // Normalizer sub-state.
    pub(crate) saw_sample: bool,
    pub(crate) plateau_run: u32,
    pub(crate) last_progress_change_at: u64,
    pub(crate) simulation: Option<Simulation>,
    pub(crate) batch_hint: Option<BatchHint>,
    pub(crate) last_message: Option<String>,
    pub(crate) last_stats: Option<serde_json::Value>,
    // Scheduler sub-state.
    pub(crate) poll_failures: u32,
    pub(crate) polling_degraded_surfaced: bool,
    pub(crate) early_stall_surfaced: bool,
    pub(crate) connectivity_lost_surfaced: bool,
    pub(crate) cancel_pending: bool,
}

impl TaskSession {
    pub fn new(id: TaskId, kind: TaskKind, now: u64) -> Self {
        Self {
            id,
            kind,
            channel: ChannelState::Connecting,
            started_at: now,
            last_sample_at: None,
            displayed: 0.0,
            terminal: None,
            quality: ConnectionQuality::Unknown,
            terminal_fired: false,
            saw_sample: false,
            plateau_run: 0,
            last_progress_change_at: now,
            simulation: None,
            batch_hint: None,
            last_message: None,
            last_stats: None,
            poll_failures: 0,
            polling_degraded_surfaced: false,
            early_stall_surfaced: false,
            connectivity_lost_surfaced: false,
            cancel_pending: false,
        }
    }

    /// Epoch millis of the most recent channel activity.
    pub fn last_activity_at(&self) -> u64 {
        self.last_sample_at.unwrap_or(self.started_at)
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_fired
    }

    pub fn is_simulating(&self) -> bool {
        self.simulation.is_some()
    }
}

/// Sessions keyed by task id, replacing ambient "current task" globals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionRegistry {
    sessions: BTreeMap<TaskId, TaskSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, session: TaskSession) {
        self.sessions.insert(session.id.clone(), session);
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.sessions.contains_key(task_id)
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskSession> {
        self.sessions.get(task_id)
    }

    pub fn get_mut(&mut self, task_id: &str) -> Option<&mut TaskSession> {
        self.sessions.get_mut(task_id)
    }

    pub fn remove(&mut self, task_id: &str) -> Option<TaskSession> {
        self.sessions.remove(task_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Looks up the session for an incoming notification. Events keyed by an
    /// id we are not tracking are dropped here, whichever channel they came in
    /// on.
    pub(crate) fn admit(&mut self, task_id: &str) -> Option<&mut TaskSession> {
        if !self.sessions.contains_key(task_id) {
            track_debug!("dropping event for untracked task {}", task_id);
            return None;
        }
        self.sessions.get_mut(task_id)
    }
}
