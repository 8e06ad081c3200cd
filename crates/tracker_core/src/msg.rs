use crate::effect::TimerKind;
use crate::session::{TaskId, TaskKind, TerminalKind};

/// Which redundant channel a notification arrived on. Both are treated
/// identically past admission; the source only matters for channel-state
/// bookkeeping and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSource {
    Push,
    Poll,
}

/// A raw progress notification from either channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    pub task_id: TaskId,
    /// Server-reported progress, 0-100, when present.
    pub progress_raw: Option<f64>,
    /// Free text; may encode a "batch k/total" hint.
    pub message: Option<String>,
    /// Opaque domain payload, passed through untouched.
    pub stats: Option<serde_json::Value>,
    pub source: SampleSource,
    /// Epoch millis at receipt.
    pub received_at: u64,
}

/// Payload attached to a terminal transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerminalPayload {
    pub message: Option<String>,
    pub stats: Option<serde_json::Value>,
    pub output_ref: Option<String>,
    /// True when the tracker resolved the session locally (forced
    /// resolution or a cancel fallback) rather than from a server event.
    pub synthesized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the stream; retry immediately.
    ServerClose,
    /// The channel could not be established.
    ConnectFailed,
    /// The stream broke mid-flight.
    StreamError,
}

/// Everything that can happen to the tracker. Timestamps ride on messages;
/// the reducer itself never reads a clock.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Backend acknowledged task submission; start tracking.
    TrackRequested {
        task_id: TaskId,
        kind: TaskKind,
        at_ms: u64,
    },
    /// The push channel came up for this task.
    PushConnected { task_id: TaskId, at_ms: u64 },
    /// The push channel went down.
    PushDisconnected {
        task_id: TaskId,
        reason: DisconnectReason,
        at_ms: u64,
    },
    /// A progress notification from either channel.
    Sample(ProgressSample),
    /// A terminal notification from either channel.
    TerminalNotice {
        task_id: TaskId,
        kind: TerminalKind,
        payload: TerminalPayload,
        source: SampleSource,
        at_ms: u64,
    },
    /// A single poll attempt failed.
    PollFailed {
        task_id: TaskId,
        error: String,
        at_ms: u64,
    },
    /// Heartbeat round-trip completed; quality classification only.
    HeartbeatPong { task_id: TaskId, latency_ms: u64 },
    /// A timer owned by this session elapsed.
    TimerFired {
        task_id: TaskId,
        timer: TimerKind,
        at_ms: u64,
    },
    /// User asked to cancel the task.
    CancelRequested { task_id: TaskId, at_ms: u64 },
    /// User asked to retry after surfaced polling degradation.
    RetryRequested { task_id: TaskId, at_ms: u64 },
    /// The sink acknowledged the terminal transition; the session may go.
    TerminalAcked { task_id: TaskId },
}
