//! The reducer: one message in, zero or more effects out.
//!
//! All state mutation funnels through here, which is what makes the
//! unordered interleaving of push callbacks and poll responses safe: the
//! normalizer's monotonicity rule and the guard's at-most-once rule apply
//! no matter which channel spoke first or how late a response straggled in.

use tracker_logging::{track_debug, track_warn};

use crate::channel;
use crate::effect::{Effect, TimerKind, Warning};
use crate::error::TrackerError;
use crate::guard::{CompletionGuard, GuardDecision};
use crate::msg::{Msg, ProgressSample, SampleSource, TerminalPayload};
use crate::normalizer;
use crate::scheduler::{self, StallAction};
use crate::session::{ChannelState, TaskSession, TerminalKind};
use crate::state::TrackerState;

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: TrackerState, msg: Msg) -> (TrackerState, Vec<Effect>) {
    let effects = match msg {
        Msg::TrackRequested {
            task_id,
            kind,
            at_ms,
        } => {
            if state.sessions.contains(&task_id) {
                track_warn!("task {}: already tracked, ignoring", task_id);
                Vec::new()
            } else {
                state
                    .sessions
                    .insert(TaskSession::new(task_id.clone(), kind, at_ms));
                vec![
                    Effect::ConnectPush {
                        task_id: task_id.clone(),
                    },
                    Effect::ArmTimer {
                        task_id,
                        timer: TimerKind::StallCheck,
                        delay: state.config.scheduler.stall_check_interval,
                    },
                ]
            }
        }

        Msg::PushConnected { task_id, .. } => match state.sessions.admit(&task_id) {
            Some(session) if !session.is_terminal() => {
                channel::on_push_connected(session, &state.config)
            }
            _ => Vec::new(),
        },

        Msg::PushDisconnected {
            task_id, reason, ..
        } => match state.sessions.admit(&task_id) {
            Some(session) if !session.is_terminal() => {
                channel::on_push_disconnected(session, reason)
            }
            _ => Vec::new(),
        },

        Msg::Sample(sample) => apply_sample(&mut state, sample),

        Msg::TerminalNotice {
            task_id,
            kind,
            payload,
            source,
            ..
        } => match state.sessions.admit(&task_id) {
            Some(session) => {
                track_debug!("task {}: terminal {:?} via {:?}", task_id, kind, source);
                apply_terminal(session, kind, payload)
            }
            None => Vec::new(),
        },

        Msg::PollFailed { task_id, error, .. } => match state.sessions.admit(&task_id) {
            Some(session) if !session.is_terminal() => {
                apply_poll_failure(session, error, &state.config.scheduler)
            }
            _ => Vec::new(),
        },

        Msg::HeartbeatPong {
            task_id,
            latency_ms,
        } => {
            if let Some(session) = state.sessions.admit(&task_id) {
                session.quality = channel::classify_quality(latency_ms, &state.config);
            }
            Vec::new()
        }

        Msg::TimerFired {
            task_id,
            timer,
            at_ms,
        } => match state.sessions.admit(&task_id) {
            Some(session) if !session.is_terminal() => {
                apply_timer(session, timer, at_ms, &state.config)
            }
            _ => Vec::new(),
        },

        Msg::CancelRequested { task_id, .. } => match state.sessions.admit(&task_id) {
            Some(session) => apply_cancel(session, &state.config.scheduler),
            None => Vec::new(),
        },

        Msg::RetryRequested { task_id, .. } => match state.sessions.admit(&task_id) {
            Some(session) if !session.is_terminal() => apply_retry(session),
            _ => Vec::new(),
        },

        Msg::TerminalAcked { task_id } => {
            match state.sessions.get(&task_id).map(TaskSession::is_terminal) {
                Some(true) => {
                    state.sessions.remove(&task_id);
                }
                Some(false) => {
                    track_warn!("task {}: ack before terminal, session kept", task_id);
                }
                None => {}
            }
            Vec::new()
        }
    };

    (state, effects)
}

fn apply_sample(state: &mut TrackerState, sample: ProgressSample) -> Vec<Effect> {
    let config = state.config.clone();
    let session = match state.sessions.admit(&sample.task_id) {
        Some(session) => session,
        None => return Vec::new(),
    };
    if session.is_terminal() {
        // Late or duplicate sample after the terminal fired; not an error.
        track_debug!("task {}: sample after terminal ignored", session.id);
        return Vec::new();
    }

    session.last_sample_at = Some(sample.received_at);

    let mut effects = Vec::new();
    match sample.source {
        SampleSource::Push => {
            if session.channel == ChannelState::Polling {
                // Push activity resumed; the fallback stands down.
                session.channel = ChannelState::Connected;
                effects.push(Effect::ClearTimer {
                    task_id: session.id.clone(),
                    timer: TimerKind::Poll,
                });
            }
        }
        SampleSource::Poll => {
            session.poll_failures = 0;
            session.polling_degraded_surfaced = false;
        }
    }

    if let Some(message) = &sample.message {
        if let Some(hint) = normalizer::parse_batch_hint(message) {
            session.batch_hint = Some(hint);
        }
        session.last_message = Some(message.clone());
    }
    if let Some(stats) = &sample.stats {
        session.last_stats = Some(stats.clone());
    }

    let outcome = normalizer::apply_sample(
        session,
        sample.progress_raw,
        sample.received_at,
        &config.normalizer,
    );
    if outcome.entered_simulation {
        effects.push(Effect::ArmTimer {
            task_id: session.id.clone(),
            timer: TimerKind::Simulation,
            delay: config.normalizer.sim_tick,
        });
    }

    effects.push(Effect::Progress {
        task_id: session.id.clone(),
        displayed: session.displayed,
        message: sample.message,
        stats: sample.stats,
    });

    // Keep the fallback cadence going while it is the active channel.
    if sample.source == SampleSource::Poll
        && session.channel == ChannelState::Polling
        && !session.cancel_pending
    {
        effects.push(Effect::ArmTimer {
            task_id: session.id.clone(),
            timer: TimerKind::Poll,
            delay: scheduler::poll_interval(session.displayed, 0, &config.scheduler),
        });
    }

    effects
}

fn apply_terminal(
    session: &mut TaskSession,
    kind: TerminalKind,
    payload: TerminalPayload,
) -> Vec<Effect> {
    match CompletionGuard::report(session, kind, &payload) {
        GuardDecision::Applied => {
            let task_id = session.id.clone();
            let mut effects = vec![
                // No timer may outlive its session.
                Effect::ClearTimers {
                    task_id: task_id.clone(),
                },
                Effect::ClosePush {
                    task_id: task_id.clone(),
                },
            ];
            if kind == TerminalKind::Completed {
                effects.push(Effect::Progress {
                    task_id: task_id.clone(),
                    displayed: session.displayed,
                    message: payload.message.clone(),
                    stats: payload.stats.clone(),
                });
            }
            effects.push(Effect::Terminal {
                task_id,
                kind,
                payload,
            });
            effects
        }
        GuardDecision::Duplicate => Vec::new(),
    }
}

fn apply_poll_failure(
    session: &mut TaskSession,
    error: String,
    cfg: &crate::config::SchedulerConfig,
) -> Vec<Effect> {
    session.poll_failures += 1;
    track_warn!(
        "task {}: {} (consecutive {})",
        session.id,
        TrackerError::Poll(error),
        session.poll_failures
    );

    let mut effects = Vec::new();
    if session.poll_failures >= cfg.poll_failure_surface_threshold
        && !session.polling_degraded_surfaced
    {
        session.polling_degraded_surfaced = true;
        effects.push(Effect::Warn {
            task_id: session.id.clone(),
            warning: Warning::PollingDegraded {
                consecutive_failures: session.poll_failures,
            },
        });
    }
    if session.channel == ChannelState::Polling && !session.cancel_pending {
        effects.push(Effect::ArmTimer {
            task_id: session.id.clone(),
            timer: TimerKind::Poll,
            delay: scheduler::poll_interval(session.displayed, session.poll_failures, cfg),
        });
    }
    effects
}

fn apply_timer(
    session: &mut TaskSession,
    timer: TimerKind,
    at_ms: u64,
    config: &crate::config::TrackerConfig,
) -> Vec<Effect> {
    match timer {
        TimerKind::Poll => {
            if session.channel == ChannelState::Polling && !session.cancel_pending {
                vec![Effect::RequestStatus {
                    task_id: session.id.clone(),
                }]
            } else {
                Vec::new()
            }
        }

        TimerKind::Heartbeat => {
            if session.channel == ChannelState::Connected {
                vec![
                    Effect::ProbeHeartbeat {
                        task_id: session.id.clone(),
                    },
                    Effect::ArmTimer {
                        task_id: session.id.clone(),
                        timer: TimerKind::Heartbeat,
                        delay: config.heartbeat_interval,
                    },
                ]
            } else {
                Vec::new()
            }
        }

        TimerKind::Simulation => {
            let mut effects = Vec::new();
            if let Some(displayed) =
                normalizer::simulation_tick(session, at_ms, &config.normalizer)
            {
                effects.push(Effect::Progress {
                    task_id: session.id.clone(),
                    displayed,
                    message: session.last_message.clone(),
                    stats: None,
                });
            }
            if session.is_simulating() {
                effects.push(Effect::ArmTimer {
                    task_id: session.id.clone(),
                    timer: TimerKind::Simulation,
                    delay: config.normalizer.sim_tick,
                });
            }
            effects
        }

        TimerKind::StallCheck => apply_stall_sweep(session, at_ms, config),

        TimerKind::CancelFallback => {
            if !session.cancel_pending {
                return Vec::new();
            }
            track_warn!("{}", TrackerError::CancellationTimeout(session.id.clone()));
            apply_terminal(
                session,
                TerminalKind::Cancelled,
                TerminalPayload {
                    message: Some("cancelled locally: no server acknowledgment".to_string()),
                    stats: None,
                    output_ref: None,
                    synthesized: true,
                },
            )
        }
    }
}

fn apply_stall_sweep(
    session: &mut TaskSession,
    at_ms: u64,
    config: &crate::config::TrackerConfig,
) -> Vec<Effect> {
    let mut effects = Vec::new();
    for action in scheduler::assess_stalls(session, at_ms, &config.scheduler) {
        match action {
            StallAction::ActivatePolling => {
                session.channel = ChannelState::Polling;
                effects.push(Effect::RequestStatus {
                    task_id: session.id.clone(),
                });
            }
            StallAction::BeginSimulation => {
                if normalizer::begin_simulation(session, at_ms, &config.normalizer) {
                    effects.push(Effect::ArmTimer {
                        task_id: session.id.clone(),
                        timer: TimerKind::Simulation,
                        delay: config.normalizer.sim_tick,
                    });
                }
            }
            StallAction::ForceCompletion { silent_for_ms } => {
                track_warn!(
                    "task {}: {}, forcing resolution at {:.1}",
                    session.id,
                    TrackerError::Stall { silent_for_ms },
                    session.displayed
                );
                effects.extend(apply_terminal(
                    session,
                    TerminalKind::Completed,
                    TerminalPayload {
                        message: Some("resolved after prolonged silence at high progress".into()),
                        stats: session.last_stats.clone(),
                        output_ref: None,
                        synthesized: true,
                    },
                ));
            }
            StallAction::ConnectivityLost { silent_for_ms } => {
                session.connectivity_lost_surfaced = true;
                effects.push(Effect::Warn {
                    task_id: session.id.clone(),
                    warning: Warning::ConnectivityLost { silent_for_ms },
                });
            }
            StallAction::EarlyStall { silent_for_ms } => {
                session.early_stall_surfaced = true;
                effects.push(Effect::Warn {
                    task_id: session.id.clone(),
                    warning: Warning::EarlyStall { silent_for_ms },
                });
            }
        }
    }

    if !session.is_terminal() {
        effects.push(Effect::ArmTimer {
            task_id: session.id.clone(),
            timer: TimerKind::StallCheck,
            delay: config.scheduler.stall_check_interval,
        });
    }
    effects
}

fn apply_cancel(session: &mut TaskSession, cfg: &crate::config::SchedulerConfig) -> Vec<Effect> {
    if session.is_terminal() || session.cancel_pending {
        // Repeated cancels are harmless.
        track_debug!("task {}: cancel is a no-op", session.id);
        return Vec::new();
    }
    session.cancel_pending = true;
    vec![
        Effect::SendCancel {
            task_id: session.id.clone(),
        },
        Effect::ClearTimer {
            task_id: session.id.clone(),
            timer: TimerKind::Poll,
        },
        Effect::ArmTimer {
            task_id: session.id.clone(),
            timer: TimerKind::CancelFallback,
            delay: cfg.cancel_fallback,
        },
    ]
}

fn apply_retry(session: &mut TaskSession) -> Vec<Effect> {
    session.poll_failures = 0;
    session.polling_degraded_surfaced = false;
    let mut effects = vec![Effect::RequestStatus {
        task_id: session.id.clone(),
    }];
    if session.channel == ChannelState::Disconnected {
        session.channel = ChannelState::Connecting;
        effects.push(Effect::ConnectPush {
            task_id: session.id.clone(),
        });
    }
    effects
}
