//! The driver: owns the runtime, the timers, and the push/poll tasks, and
//! pumps messages through the core reducer.
//!
//! Everything stateful happens on one task inside `run`; network calls and
//! timers are spawned helpers that only ever talk back through the message
//! channel, so ordering hazards between the two channels land in the
//! reducer where the monotonicity and idempotency rules absorb them.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::StreamExt;
use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracker_logging::{track_debug, track_info, track_warn};

use tracker_core::{
    update, DisconnectReason, Effect, Msg, SampleSource, TaskId, TaskKind, TimerKind,
    TrackerConfig, TrackerState,
};

use crate::sink::StatusSink;
use crate::transport::StatusTransport;

enum Command {
    Track { task_id: TaskId, kind: TaskKind },
    Cancel { task_id: TaskId },
    Retry { task_id: TaskId },
    Acknowledge { task_id: TaskId },
    Shutdown,
}

/// Handle to a running tracker. Cheap to clone; dropping every clone shuts
/// the driver down.
#[derive(Clone)]
pub struct TrackerHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl TrackerHandle {
    pub fn new(
        config: TrackerConfig,
        transport: Arc<dyn StatusTransport>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("tokio runtime");
            runtime.block_on(run(config, transport, sink, cmd_rx));
        });

        Self { cmd_tx }
    }

    /// Starts tracking a task the backend just acknowledged.
    pub fn track(&self, task_id: impl Into<TaskId>, kind: TaskKind) {
        let _ = self.cmd_tx.send(Command::Track {
            task_id: task_id.into(),
            kind,
        });
    }

    /// Requests cancellation. Safe to repeat.
    pub fn cancel(&self, task_id: impl Into<TaskId>) {
        let _ = self.cmd_tx.send(Command::Cancel {
            task_id: task_id.into(),
        });
    }

    /// Manual retry after surfaced polling degradation.
    pub fn retry(&self, task_id: impl Into<TaskId>) {
        let _ = self.cmd_tx.send(Command::Retry {
            task_id: task_id.into(),
        });
    }

    /// Acknowledges a delivered terminal; releases the session.
    pub fn acknowledge(&self, task_id: impl Into<TaskId>) {
        let _ = self.cmd_tx.send(Command::Acknowledge {
            task_id: task_id.into(),
        });
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
    }
}

/// Epoch milliseconds; the single wall-clock read feeding the core.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

struct Driver {
    state: TrackerState,
    transport: Arc<dyn StatusTransport>,
    sink: Arc<dyn StatusSink>,
    msg_tx: mpsc::UnboundedSender<Msg>,
    timers: HashMap<(TaskId, TimerKind), CancellationToken>,
    push_channels: HashMap<TaskId, CancellationToken>,
}

async fn run(
    config: TrackerConfig,
    transport: Arc<dyn StatusTransport>,
    sink: Arc<dyn StatusSink>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
) {
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
    let mut driver = Driver {
        state: TrackerState::new(config),
        transport,
        sink,
        msg_tx,
        timers: HashMap::new(),
        push_channels: HashMap::new(),
    };

    loop {
        tokio::select! {
            command = cmd_rx.recv() => match command {
                None | Some(Command::Shutdown) => break,
                Some(command) => driver.dispatch(command_to_msg(command)),
            },
            msg = msg_rx.recv() => match msg {
                // Driver holds a sender clone, so this stays open.
                None => break,
                Some(msg) => driver.dispatch(msg),
            },
        }
    }

    for token in driver.timers.values() {
        token.cancel();
    }
    for token in driver.push_channels.values() {
        token.cancel();
    }
    track_info!("tracker driver stopped");
}

fn command_to_msg(command: Command) -> Msg {
    match command {
        Command::Track { task_id, kind } => Msg::TrackRequested {
            task_id,
            kind,
            at_ms: now_ms(),
        },
        Command::Cancel { task_id } => Msg::CancelRequested {
            task_id,
            at_ms: now_ms(),
        },
        Command::Retry { task_id } => Msg::RetryRequested {
            task_id,
            at_ms: now_ms(),
        },
        Command::Acknowledge { task_id } => Msg::TerminalAcked { task_id },
        Command::Shutdown => unreachable!("handled by the select loop"),
    }
}

impl Driver {
    fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;
        for effect in effects {
            self.apply_effect(effect);
        }
    }

    fn apply_effect(&mut self, effect: Effect) {
        match effect {
            Effect::ConnectPush { task_id } => self.connect_push(task_id),

            Effect::ClosePush { task_id } => {
                if let Some(token) = self.push_channels.remove(&task_id) {
                    token.cancel();
                }
            }

            Effect::RequestStatus { task_id } => {
                let transport = self.transport.clone();
                let tx = self.msg_tx.clone();
                tokio::spawn(async move {
                    let msg = match transport.poll_status(&task_id).await {
                        Ok(event) => event.into_msg(SampleSource::Poll, now_ms()),
                        Err(err) => Msg::PollFailed {
                            task_id,
                            error: err.to_string(),
                            at_ms: now_ms(),
                        },
                    };
                    let _ = tx.send(msg);
                });
            }

            Effect::SendCancel { task_id } => {
                let transport = self.transport.clone();
                tokio::spawn(async move {
                    if let Err(err) = transport.send_cancel(&task_id).await {
                        // The fallback timer resolves the session locally.
                        track_warn!("task {}: cancel request failed: {}", task_id, err);
                    }
                });
            }

            Effect::ProbeHeartbeat { task_id } => {
                let transport = self.transport.clone();
                let tx = self.msg_tx.clone();
                tokio::spawn(async move {
                    match transport.heartbeat().await {
                        Ok(latency) => {
                            let _ = tx.send(Msg::HeartbeatPong {
                                task_id,
                                latency_ms: latency.as_millis() as u64,
                            });
                        }
                        Err(err) => track_debug!("task {}: heartbeat failed: {}", task_id, err),
                    }
                });
            }

            Effect::ArmTimer {
                task_id,
                timer,
                delay,
            } => self.arm_timer(task_id, timer, delay),

            Effect::ClearTimer { task_id, timer } => {
                if let Some(token) = self.timers.remove(&(task_id, timer)) {
                    token.cancel();
                }
            }

            Effect::ClearTimers { task_id } => {
                self.timers.retain(|(id, _), token| {
                    if *id == task_id {
                        token.cancel();
                        false
                    } else {
                        true
                    }
                });
            }

            Effect::Progress {
                task_id,
                displayed,
                message,
                stats,
            } => {
                self.sink
                    .on_progress(&task_id, displayed, message.as_deref(), stats.as_ref());
            }

            Effect::Terminal {
                task_id,
                kind,
                payload,
            } => self.sink.on_terminal(&task_id, kind, &payload),

            Effect::Warn { task_id, warning } => self.sink.on_warning(&task_id, warning),
        }
    }

    fn connect_push(&mut self, task_id: TaskId) {
        if let Some(previous) = self.push_channels.remove(&task_id) {
            previous.cancel();
        }
        let token = CancellationToken::new();
        self.push_channels.insert(task_id.clone(), token.clone());

        let transport = self.transport.clone();
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let mut stream = match transport.open_push_channel(&task_id).await {
                Ok(stream) => stream,
                Err(err) => {
                    track_warn!("task {}: push connect failed: {}", task_id, err);
                    let _ = tx.send(Msg::PushDisconnected {
                        task_id,
                        reason: DisconnectReason::ConnectFailed,
                        at_ms: now_ms(),
                    });
                    return;
                }
            };
            let _ = tx.send(Msg::PushConnected {
                task_id: task_id.clone(),
                at_ms: now_ms(),
            });

            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    item = stream.next() => {
                        let reason = match item {
                            Some(Ok(event)) => {
                                let _ = tx.send(event.into_msg(SampleSource::Push, now_ms()));
                                continue;
                            }
                            Some(Err(err)) => {
                                track_warn!("task {}: push stream error: {}", task_id, err);
                                DisconnectReason::StreamError
                            }
                            None => DisconnectReason::ServerClose,
                        };
                        let _ = tx.send(Msg::PushDisconnected {
                            task_id: task_id.clone(),
                            reason,
                            at_ms: now_ms(),
                        });
                        return;
                    }
                }
            }
        });
    }

    fn arm_timer(&mut self, task_id: TaskId, timer: TimerKind, delay: Duration) {
        if let Some(previous) = self.timers.remove(&(task_id.clone(), timer)) {
            previous.cancel();
        }

        // Jitter keeps poll fan-in from synchronizing across clients.
        let delay = if timer == TimerKind::Poll {
            let frac = self.state.config.scheduler.jitter_frac.max(0.0);
            delay.mul_f64(1.0 + frac * rand::thread_rng().gen::<f64>())
        } else {
            delay
        };

        let token = CancellationToken::new();
        self.timers.insert((task_id.clone(), timer), token.clone());

        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(Msg::TimerFired {
                        task_id,
                        timer,
                        at_ms: now_ms(),
                    });
                }
            }
        });
    }
}
