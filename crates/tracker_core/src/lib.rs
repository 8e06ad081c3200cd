//! Tracker core: pure state machine for task progress synchronization.
//!
//! Reconciles two unreliable notification channels into one monotonic
//! progress signal and an exactly-once terminal transition per task. No IO
//! and no clocks live here; the driver feeds messages in and executes the
//! returned effects.
mod channel;
mod config;
mod effect;
mod error;
mod guard;
mod msg;
mod normalizer;
mod scheduler;
mod session;
mod state;
mod update;
mod view;

pub use config::{NormalizerConfig, SchedulerConfig, TrackerConfig};
pub use effect::{Effect, TimerKind, Warning};
pub use error::TrackerError;
pub use guard::{CompletionGuard, GuardDecision};
pub use msg::{DisconnectReason, Msg, ProgressSample, SampleSource, TerminalPayload};
pub use normalizer::parse_batch_hint;
pub use scheduler::poll_interval;
pub use session::{
    BatchHint, ChannelState, ConnectionQuality, SessionRegistry, TaskId, TaskKind, TaskSession,
    TerminalKind,
};
pub use state::TrackerState;
pub use update::update;
pub use view::SessionView;
