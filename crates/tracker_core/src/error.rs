use thiserror::Error;

use crate::session::{TaskId, TerminalKind};

/// The failure taxonomy. Everything here is recoverable; an authoritative
/// backend-reported failure payload is not an error of ours, it is a
/// terminal event and passes through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// The push channel failed to establish or maintain itself. Triggers
    /// the polling fallback; not surfaced unless polling also degrades.
    #[error("push channel failure: {0}")]
    Connection(String),

    /// A single poll attempt failed.
    #[error("poll attempt failed: {0}")]
    Poll(String),

    /// No channel activity past a stall threshold.
    #[error("no channel activity for {silent_for_ms}ms")]
    Stall { silent_for_ms: u64 },

    /// A duplicate or late terminal notification. Logged, never surfaced,
    /// never double-applied.
    #[error("terminal {duplicate:?} for task {task_id} after {applied:?} already fired")]
    TerminalConflict {
        task_id: TaskId,
        applied: TerminalKind,
        duplicate: TerminalKind,
    },

    /// The server did not confirm a cancel in time; resolved locally.
    #[error("cancel not acknowledged in time for task {0}")]
    CancellationTimeout(TaskId),
}
