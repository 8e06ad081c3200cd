//! Progress normalization: raw samples in, monotonic display values out.
//!
//! Raw progress is noisy: it can regress, repeat, or go silent while the
//! backend grinds through a long batch. Everything the sink sees is funneled
//! through here so the displayed value only ever moves forward, and known
//! plateaus are papered over with a bounded synthetic climb that can never
//! claim completion on its own.

use tracker_logging::track_debug;

use crate::config::NormalizerConfig;
use crate::session::{BatchHint, Simulation, TaskSession};

/// Comparison slop for "the server reported the same value again".
const SAMPLE_EPSILON: f64 = 1e-6;

/// What a raw sample did to the displayed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeOutcome {
    /// The displayed value moved (always upward).
    pub display_changed: bool,
    /// This sample pushed the session into the simulation sub-state.
    pub entered_simulation: bool,
}

/// Applies one raw sample to the session per the monotonicity rules:
/// adopt a higher value, hold on absence, count a plateau on equality,
/// and ignore regressions as noise.
pub(crate) fn apply_sample(
    session: &mut TaskSession,
    progress_raw: Option<f64>,
    received_at: u64,
    cfg: &NormalizerConfig,
) -> NormalizeOutcome {
    let mut outcome = NormalizeOutcome {
        display_changed: false,
        entered_simulation: false,
    };

    let raw = match progress_raw {
        // Only a terminal event may put 100 on screen, so even a raw 100
        // from a racing channel is held just below it.
        Some(raw) => raw.clamp(0.0, 100.0).min(cfg.pre_terminal_cap),
        // Absent progress holds the last value.
        None => return outcome,
    };

    if !session.saw_sample {
        // First sample for the session is adopted as-is, no simulation.
        session.saw_sample = true;
        if raw > session.displayed {
            session.displayed = raw;
            session.last_progress_change_at = received_at;
            outcome.display_changed = true;
        }
        return outcome;
    }

    if let Some(sim) = session.simulation {
        if raw > sim.base + SAMPLE_EPSILON {
            // A real sample above the plateau ends simulation immediately.
            session.simulation = None;
            session.plateau_run = 0;
            if raw > session.displayed {
                session.displayed = raw;
                session.last_progress_change_at = received_at;
                outcome.display_changed = true;
            }
        } else {
            // Still at (or below) the plateau; the synthetic climb goes on.
            track_debug!(
                "task {}: sample {:.1} at or below plateau {:.1} during simulation",
                session.id,
                raw,
                sim.base
            );
        }
        return outcome;
    }

    if raw > session.displayed + SAMPLE_EPSILON {
        session.displayed = raw;
        session.plateau_run = 0;
        session.last_progress_change_at = received_at;
        outcome.display_changed = true;
    } else if (raw - session.displayed).abs() <= SAMPLE_EPSILON {
        session.plateau_run += 1;
        if session.plateau_run >= cfg.plateau_trigger && begin_simulation(session, received_at, cfg)
        {
            outcome.entered_simulation = true;
        }
    } else {
        // Regression below the displayed value is noise.
        track_debug!(
            "task {}: ignoring regressed progress {:.1} < {:.1}",
            session.id,
            raw,
            session.displayed
        );
    }

    outcome
}

/// Enters the simulation sub-state if the session sits at an eligible
/// plateau. Also used by the scheduler's plateau stall detector (T2).
pub(crate) fn begin_simulation(
    session: &mut TaskSession,
    now: u64,
    cfg: &NormalizerConfig,
) -> bool {
    if session.simulation.is_some()
        || session.is_terminal()
        || !session.saw_sample
        || session.displayed <= 0.0
        || !plateau_eligible(session.displayed, cfg)
    {
        return false;
    }
    session.simulation = Some(Simulation {
        base: session.displayed,
        started_at: now,
    });
    track_debug!(
        "task {}: entering simulation from plateau {:.1}",
        session.id,
        session.displayed
    );
    true
}

/// Advances the synthetic climb. Returns the new displayed value when it
/// moved. The climb is capped by the hint-dependent ceiling and can never
/// reach 100; only an authoritative terminal event sets that.
pub(crate) fn simulation_tick(
    session: &mut TaskSession,
    now: u64,
    cfg: &NormalizerConfig,
) -> Option<f64> {
    let sim = session.simulation?;
    let ceiling = ceiling_for(session.batch_hint, cfg).min(cfg.pre_terminal_cap);
    let elapsed_s = now.saturating_sub(sim.started_at) as f64 / 1000.0;
    let target = (sim.base + elapsed_s * cfg.sim_rate).min(ceiling);
    if target > session.displayed {
        session.displayed = target;
        Some(target)
    } else {
        None
    }
}

/// Low ceiling without a hint; high ceiling only when the hint says we are
/// in the final batch.
fn ceiling_for(hint: Option<BatchHint>, cfg: &NormalizerConfig) -> f64 {
    match hint {
        Some(hint) if hint.is_final() => cfg.high_ceiling,
        _ => cfg.low_ceiling,
    }
}

fn plateau_eligible(value: f64, cfg: &NormalizerConfig) -> bool {
    if cfg.plateau_values.is_empty() {
        return true;
    }
    cfg.plateau_values
        .iter()
        .any(|v| (v - value).abs() <= cfg.plateau_tolerance)
}

/// Extracts a "batch k/total" hint from free message text. Accepts the
/// shapes the backends actually emit: "batch 3/5", "(3/5)", "3 of 5".
pub fn parse_batch_hint(message: &str) -> Option<BatchHint> {
    let lowered = message.to_ascii_lowercase();
    let tokens: Vec<&str> = lowered
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '/'))
        .collect();

    for (i, token) in tokens.iter().enumerate() {
        if let Some((current, total)) = parse_fraction(token) {
            return Some(BatchHint { current, total });
        }
        // "k of n" spread over three tokens.
        if *token == "of" && i > 0 {
            if let (Ok(current), Some(Ok(total))) = (
                tokens[i - 1].parse::<u32>(),
                tokens.get(i + 1).map(|t| t.parse::<u32>()),
            ) {
                return Some(BatchHint { current, total });
            }
        }
    }
    None
}

fn parse_fraction(token: &str) -> Option<(u32, u32)> {
    let (a, b) = token.split_once('/')?;
    let current = a.parse::<u32>().ok()?;
    let total = b.parse::<u32>().ok()?;
    Some((current, total))
}
