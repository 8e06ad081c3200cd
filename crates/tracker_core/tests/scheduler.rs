use std::time::Duration;

use pretty_assertions::assert_eq;
use tracker_core::{
    poll_interval, update, ChannelState, ConnectionQuality, Effect, Msg, ProgressSample,
    SampleSource, SchedulerConfig, TaskKind, TerminalKind, TimerKind, TrackerConfig, TrackerState,
    Warning,
};

const TASK: &str = "task-3";

fn tracked() -> TrackerState {
    let state = TrackerState::new(TrackerConfig::default());
    let (state, _effects) = update(
        state,
        Msg::TrackRequested {
            task_id: TASK.into(),
            kind: TaskKind::Scrape,
            at_ms: 0,
        },
    );
    state
}

fn push_sample(raw: f64, at_ms: u64) -> Msg {
    Msg::Sample(ProgressSample {
        task_id: TASK.into(),
        progress_raw: Some(raw),
        message: None,
        stats: None,
        source: SampleSource::Push,
        received_at: at_ms,
    })
}

fn stall_check(at_ms: u64) -> Msg {
    Msg::TimerFired {
        task_id: TASK.into(),
        timer: TimerKind::StallCheck,
        at_ms,
    }
}

fn channel(state: &TrackerState) -> ChannelState {
    state.view(TASK).unwrap().channel
}

#[test]
fn poll_interval_adapts_to_progress_and_failures() {
    let cfg = SchedulerConfig::default();

    assert_eq!(poll_interval(90.0, 0, &cfg), cfg.poll_fast);
    assert_eq!(poll_interval(80.0, 0, &cfg), cfg.poll_fast);
    assert_eq!(poll_interval(40.0, 0, &cfg), cfg.poll_moderate);

    // Exponential backoff, doubling per failure, capped.
    assert_eq!(poll_interval(40.0, 1, &cfg), Duration::from_secs(2));
    assert_eq!(poll_interval(40.0, 2, &cfg), Duration::from_secs(4));
    assert_eq!(poll_interval(40.0, 3, &cfg), Duration::from_secs(8));
    assert_eq!(poll_interval(40.0, 10, &cfg), cfg.poll_max_delay);
    assert_eq!(poll_interval(95.0, 1, &cfg), Duration::from_secs(2));
}

#[test]
fn silence_past_t1_activates_polling() {
    let state = tracked();
    let (state, _effects) = update(
        state,
        Msg::PushConnected {
            task_id: TASK.into(),
            at_ms: 100,
        },
    );
    let (state, _effects) = update(state, push_sample(30.0, 1000));
    assert_eq!(channel(&state), ChannelState::Connected);

    // 9s of silence clears the default 8s activity threshold.
    let (state, effects) = update(state, stall_check(10_000));
    assert_eq!(channel(&state), ChannelState::Polling);
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::RequestStatus { .. })));
    // The sweep keeps itself armed.
    assert!(effects.iter().any(|e| matches!(
        e,
        Effect::ArmTimer {
            timer: TimerKind::StallCheck,
            ..
        }
    )));
}

#[test]
fn polling_stands_down_when_push_activity_resumes() {
    let state = tracked();
    let (state, _effects) = update(
        state,
        Msg::PushConnected {
            task_id: TASK.into(),
            at_ms: 100,
        },
    );
    let (state, _effects) = update(state, push_sample(30.0, 1000));
    let (state, _effects) = update(state, stall_check(10_000));
    assert_eq!(channel(&state), ChannelState::Polling);

    let (state, effects) = update(state, push_sample(35.0, 10_500));
    assert_eq!(channel(&state), ChannelState::Connected);
    assert!(effects.iter().any(|e| matches!(
        e,
        Effect::ClearTimer {
            timer: TimerKind::Poll,
            ..
        }
    )));
}

#[test]
fn poll_responses_keep_the_fallback_cadence() {
    let state = tracked();
    let (state, _effects) = update(state, push_sample(70.0, 1000));
    let (state, _effects) = update(state, stall_check(10_000));

    let (_state, effects) = update(
        state,
        Msg::Sample(ProgressSample {
            task_id: TASK.into(),
            progress_raw: Some(85.0),
            message: None,
            stats: None,
            source: SampleSource::Poll,
            received_at: 11_000,
        }),
    );
    // 85% is past the near-complete threshold, so the next poll is fast.
    assert!(effects.iter().any(|e| matches!(
        e,
        Effect::ArmTimer {
            timer: TimerKind::Poll,
            delay,
            ..
        } if *delay == Duration::from_secs(1)
    )));
}

#[test]
fn repeated_poll_failures_back_off_and_surface_once() {
    let mut state = tracked();
    let (next, _effects) = update(state, push_sample(30.0, 1000));
    state = next;
    let (next, _effects) = update(state, stall_check(10_000));
    state = next;

    let mut warnings = 0;
    for failure in 1..=6u32 {
        let (next, effects) = update(
            state,
            Msg::PollFailed {
                task_id: TASK.into(),
                error: "connection refused".into(),
                at_ms: 10_000 + u64::from(failure) * 1000,
            },
        );
        state = next;

        warnings += effects
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    Effect::Warn {
                        warning: Warning::PollingDegraded { .. },
                        ..
                    }
                )
            })
            .count();

        let expected = poll_interval(30.0, failure, &SchedulerConfig::default());
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::ArmTimer {
                timer: TimerKind::Poll,
                delay,
                ..
            } if *delay == expected
        )));
    }

    // Surfaced exactly once at the threshold, not on every failure after.
    assert_eq!(warnings, 1);
    assert_eq!(state.view(TASK).unwrap().poll_failures, 6);
}

#[test]
fn a_successful_poll_resets_the_failure_streak() {
    let mut state = tracked();
    let (next, _effects) = update(state, push_sample(30.0, 1000));
    state = next;
    let (next, _effects) = update(state, stall_check(10_000));
    state = next;
    for failure in 1..=3u32 {
        let (next, _effects) = update(
            state,
            Msg::PollFailed {
                task_id: TASK.into(),
                error: "timeout".into(),
                at_ms: 10_000 + u64::from(failure) * 1000,
            },
        );
        state = next;
    }
    assert_eq!(state.view(TASK).unwrap().poll_failures, 3);

    let (state, _effects) = update(
        state,
        Msg::Sample(ProgressSample {
            task_id: TASK.into(),
            progress_raw: Some(31.0),
            message: None,
            stats: None,
            source: SampleSource::Poll,
            received_at: 20_000,
        }),
    );
    assert_eq!(state.view(TASK).unwrap().poll_failures, 0);
}

#[test]
fn prolonged_flat_progress_at_a_plateau_hands_off_to_simulation() {
    // One sample, no repeats: only the time-based detector can see this
    // plateau.
    let state = tracked();
    let (state, _effects) = update(state, push_sample(50.0, 1000));
    assert!(!state.view(TASK).unwrap().simulating);

    // Flat past the 10s plateau threshold.
    let (state, effects) = update(state, stall_check(12_000));
    assert!(state.view(TASK).unwrap().simulating);
    assert!(effects.iter().any(|e| matches!(
        e,
        Effect::ArmTimer {
            timer: TimerKind::Simulation,
            ..
        }
    )));

    // The handed-off climb advances on its first tick.
    let (state, effects) = update(
        state,
        Msg::TimerFired {
            task_id: TASK.into(),
            timer: TimerKind::Simulation,
            at_ms: 14_000,
        },
    );
    let displayed = state.view(TASK).unwrap().displayed;
    assert!(displayed > 50.0 && displayed < 75.0);
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::Progress { .. })));

    // A later sweep does not restart an already-running simulation.
    let (state, effects) = update(state, stall_check(14_500));
    assert!(!effects.iter().any(|e| matches!(
        e,
        Effect::ArmTimer {
            timer: TimerKind::Simulation,
            ..
        }
    )));
    assert!(state.view(TASK).unwrap().simulating);
}

#[test]
fn flat_progress_off_the_eligible_plateau_stays_put() {
    let state = tracked();
    let (state, _effects) = update(state, push_sample(30.0, 1000));

    let (state, effects) = update(state, stall_check(12_000));
    assert!(!state.view(TASK).unwrap().simulating);
    assert!(!effects.iter().any(|e| matches!(
        e,
        Effect::ArmTimer {
            timer: TimerKind::Simulation,
            ..
        }
    )));
}

#[test]
fn forced_resolution_fires_only_above_the_confidence_threshold() {
    let state = tracked();
    let (state, _effects) = update(state, push_sample(92.0, 1000));

    // Silence past T3 at 92%: forced completion, synthesized payload.
    let (state, effects) = update(state, stall_check(1000 + 121_000));
    let terminal = effects
        .iter()
        .find_map(|e| match e {
            Effect::Terminal { kind, payload, .. } => Some((kind, payload)),
            _ => None,
        })
        .expect("forced terminal");
    assert_eq!(*terminal.0, TerminalKind::Completed);
    assert!(terminal.1.synthesized);
    assert_eq!(state.view(TASK).unwrap().displayed, 100.0);

    // The sweep does not re-arm once the session is terminal.
    assert!(!effects.iter().any(|e| matches!(
        e,
        Effect::ArmTimer {
            timer: TimerKind::StallCheck,
            ..
        }
    )));
}

#[test]
fn low_confidence_silence_surfaces_connectivity_loss_instead() {
    let state = tracked();
    let (state, _effects) = update(state, push_sample(40.0, 1000));

    let (state, effects) = update(state, stall_check(1000 + 121_000));
    assert!(effects.iter().any(|e| matches!(
        e,
        Effect::Warn {
            warning: Warning::ConnectivityLost { .. },
            ..
        }
    )));
    assert!(!effects
        .iter()
        .any(|e| matches!(e, Effect::Terminal { .. })));
    assert!(state.view(TASK).unwrap().terminal.is_none());

    // Only surfaced once.
    let (_state, effects) = update(state, stall_check(1000 + 123_000));
    assert!(!effects.iter().any(|e| matches!(e, Effect::Warn { .. })));
}

#[test]
fn no_progress_at_all_surfaces_an_early_stall_warning() {
    let state = tracked();

    let (state, effects) = update(state, stall_check(46_000));
    assert!(effects.iter().any(|e| matches!(
        e,
        Effect::Warn {
            warning: Warning::EarlyStall { .. },
            ..
        }
    )));
    assert!(!effects
        .iter()
        .any(|e| matches!(e, Effect::Terminal { .. })));

    // Warned once, not on every sweep.
    let (_state, effects) = update(state, stall_check(48_000));
    assert!(!effects.iter().any(|e| matches!(
        e,
        Effect::Warn {
            warning: Warning::EarlyStall { .. },
            ..
        }
    )));
}

#[test]
fn heartbeat_latency_classifies_quality_for_display_only() {
    let checks = [
        (100, ConnectionQuality::Good),
        (400, ConnectionQuality::Degraded),
        (1500, ConnectionQuality::Poor),
    ];
    let mut state = tracked();
    for (latency_ms, expected) in checks {
        let (next, effects) = update(
            state,
            Msg::HeartbeatPong {
                task_id: TASK.into(),
                latency_ms,
            },
        );
        state = next;
        assert_eq!(state.view(TASK).unwrap().quality, expected);
        assert_eq!(effects, Vec::new());
    }
}
