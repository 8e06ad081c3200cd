use std::time::Duration;

use crate::msg::TerminalPayload;
use crate::session::{TaskId, TerminalKind};

/// Timers a session can own. Each `(task_id, kind)` pair names at most one
/// live timer; re-arming replaces the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Heartbeat,
    Poll,
    StallCheck,
    Simulation,
    CancelFallback,
}

/// Recoverable conditions surfaced to the sink, distinct from terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    /// No progress at all since task start (T4). Not a completion claim.
    EarlyStall { silent_for_ms: u64 },
    /// Both channels silent past T3 with progress below the confidence
    /// threshold, so completion cannot be claimed.
    ConnectivityLost { silent_for_ms: u64 },
    /// Too many consecutive poll failures; a manual retry is available.
    PollingDegraded { consecutive_failures: u32 },
}

/// Instructions for the driver. The reducer never performs IO or owns
/// timers itself; it only requests them here.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Establish (or re-establish) the push channel for this task.
    ConnectPush { task_id: TaskId },
    /// Tear down the push channel for this task.
    ClosePush { task_id: TaskId },
    /// Issue one status poll for this task.
    RequestStatus { task_id: TaskId },
    /// Send a cancel instruction on the active channel.
    SendCancel { task_id: TaskId },
    /// Run one heartbeat round-trip probe.
    ProbeHeartbeat { task_id: TaskId },
    /// Arm (or replace) the named timer.
    ArmTimer {
        task_id: TaskId,
        timer: TimerKind,
        delay: Duration,
    },
    /// Cancel the named timer if armed.
    ClearTimer { task_id: TaskId, timer: TimerKind },
    /// Cancel every timer owned by this session.
    ClearTimers { task_id: TaskId },
    /// Normalized progress for the sink.
    Progress {
        task_id: TaskId,
        displayed: f64,
        message: Option<String>,
        stats: Option<serde_json::Value>,
    },
    /// The session's single terminal transition for the sink.
    Terminal {
        task_id: TaskId,
        kind: TerminalKind,
        payload: TerminalPayload,
    },
    /// A recoverable condition for the sink.
    Warn { task_id: TaskId, warning: Warning },
}
