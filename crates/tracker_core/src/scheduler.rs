//! Recovery policy: polling cadence, backoff, and stall assessment.
//!
//! Pure functions only. The reducer turns the returned actions into
//! effects; the driver owns the actual timers. The original system carried
//! several mutually inconsistent cadence/backoff implementations; this is
//! the single consolidated policy.

use std::time::Duration;

use crate::config::SchedulerConfig;
use crate::session::{ChannelState, TaskSession};

/// Cap on the backoff exponent so the multiplier cannot overflow.
const MAX_BACKOFF_EXP: u32 = 16;

/// Delay before the next poll: fast near completion, moderate mid-task,
/// exponentially backed off (capped) after consecutive failures. Jitter is
/// added by the driver when the timer is armed.
pub fn poll_interval(displayed: f64, consecutive_failures: u32, cfg: &SchedulerConfig) -> Duration {
    if consecutive_failures > 0 {
        let exp = (consecutive_failures - 1).min(MAX_BACKOFF_EXP);
        let backed = cfg.backoff_base.saturating_mul(1u32 << exp);
        return backed.min(cfg.poll_max_delay);
    }
    if displayed >= cfg.near_complete_threshold {
        cfg.poll_fast
    } else {
        cfg.poll_moderate
    }
}

/// Actions the stall sweep can demand, in escalation order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum StallAction {
    /// T1: channel gone quiet; activate (or continue) the poll fallback.
    ActivatePolling,
    /// T2: progress flat at a plateau; hand off to simulation.
    BeginSimulation,
    /// T3 with high confidence: resolve the session as completed.
    ForceCompletion { silent_for_ms: u64 },
    /// T3 without confidence: a connectivity problem, not a completion.
    ConnectivityLost { silent_for_ms: u64 },
    /// T4: nothing has happened since the task started.
    EarlyStall { silent_for_ms: u64 },
}

/// Evaluates every stall detector for one session at `now`.
pub(crate) fn assess_stalls(
    session: &TaskSession,
    now: u64,
    cfg: &SchedulerConfig,
) -> Vec<StallAction> {
    if session.is_terminal() {
        return Vec::new();
    }

    let mut actions = Vec::new();
    let silent_for_ms = now.saturating_sub(session.last_activity_at());

    if silent_for_ms >= cfg.stall_terminal.as_millis() as u64 {
        if session.displayed >= cfg.forced_resolution_confidence {
            actions.push(StallAction::ForceCompletion { silent_for_ms });
            return actions;
        }
        if !session.connectivity_lost_surfaced {
            actions.push(StallAction::ConnectivityLost { silent_for_ms });
        }
    } else if silent_for_ms >= cfg.stall_activity.as_millis() as u64
        && session.channel != ChannelState::Polling
        && !session.cancel_pending
    {
        actions.push(StallAction::ActivatePolling);
    }

    let flat_for_ms = now.saturating_sub(session.last_progress_change_at);
    if !session.is_simulating()
        && session.saw_sample
        && flat_for_ms >= cfg.stall_plateau.as_millis() as u64
    {
        actions.push(StallAction::BeginSimulation);
    }

    let since_start_ms = now.saturating_sub(session.started_at);
    if session.displayed <= 0.0
        && !session.early_stall_surfaced
        && since_start_ms >= cfg.stall_early.as_millis() as u64
    {
        actions.push(StallAction::EarlyStall {
            silent_for_ms: since_start_ms,
        });
    }

    actions
}
