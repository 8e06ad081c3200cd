//! At-most-once terminal application.

use tracker_logging::{track_info, track_warn};

use crate::error::TrackerError;
use crate::msg::TerminalPayload;
use crate::session::{TaskSession, TerminalKind};

/// What the guard decided about a terminal report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// First report for the session; the only one the sink will see.
    Applied,
    /// A later report, from the other channel, a stale cached response, or
    /// a forced-resolution timer. Logged no-op.
    Duplicate,
}

/// Gate for terminal transitions. Every terminal notification, whatever its
/// origin, goes through [`CompletionGuard::report`]; the first call per
/// session wins.
pub struct CompletionGuard;

impl CompletionGuard {
    pub fn report(
        session: &mut TaskSession,
        kind: TerminalKind,
        payload: &TerminalPayload,
    ) -> GuardDecision {
        if session.terminal_fired {
            let conflict = TrackerError::TerminalConflict {
                task_id: session.id.clone(),
                applied: session.terminal.unwrap_or(kind),
                duplicate: kind,
            };
            track_warn!("{}", conflict);
            return GuardDecision::Duplicate;
        }

        session.terminal_fired = true;
        session.terminal = Some(kind);
        session.simulation = None;
        session.cancel_pending = false;
        if kind == TerminalKind::Completed {
            // The only path that may set 100.
            session.displayed = 100.0;
        }
        track_info!(
            "task {}: terminal {:?} applied (synthesized={})",
            session.id,
            kind,
            payload.synthesized
        );
        GuardDecision::Applied
    }
}
