//! Push-channel state bookkeeping.
//!
//! The driver owns the socket; this module owns the state transitions and
//! their contracts: at most one `Connected` transition without an
//! intervening disconnect, an automatic status re-sync on connect, and an
//! immediate retry only when the server itself closed the stream.

use tracker_logging::{track_debug, track_info, track_warn};

use crate::config::TrackerConfig;
use crate::effect::{Effect, TimerKind};
use crate::error::TrackerError;
use crate::msg::DisconnectReason;
use crate::session::{ChannelState, ConnectionQuality, TaskSession};

pub(crate) fn on_push_connected(session: &mut TaskSession, cfg: &TrackerConfig) -> Vec<Effect> {
    if session.channel == ChannelState::Connected {
        // Contract: a second `connected` without a disconnect is a wiring
        // bug upstream; ignore rather than double-subscribe.
        track_warn!("task {}: duplicate push connect ignored", session.id);
        return Vec::new();
    }

    let was_polling = session.channel == ChannelState::Polling;
    session.channel = ChannelState::Connected;
    session.poll_failures = 0;

    let mut effects = vec![
        // Re-sync: whatever we missed while disconnected comes back on the
        // poll path once, then push takes over.
        Effect::RequestStatus {
            task_id: session.id.clone(),
        },
        Effect::ArmTimer {
            task_id: session.id.clone(),
            timer: TimerKind::Heartbeat,
            delay: cfg.heartbeat_interval,
        },
    ];
    if was_polling {
        effects.push(Effect::ClearTimer {
            task_id: session.id.clone(),
            timer: TimerKind::Poll,
        });
    }
    track_info!("task {}: push channel connected", session.id);
    effects
}

pub(crate) fn on_push_disconnected(
    session: &mut TaskSession,
    reason: DisconnectReason,
) -> Vec<Effect> {
    if session.channel == ChannelState::Polling {
        // Already on the fallback path; nothing changes.
        track_debug!("task {}: push disconnect while polling", session.id);
        return Vec::new();
    }

    session.channel = ChannelState::Disconnected;
    session.quality = ConnectionQuality::Unknown;
    track_warn!(
        "{}",
        TrackerError::Connection(format!("task {}: disconnected ({reason:?})", session.id))
    );

    let mut effects = vec![Effect::ClearTimer {
        task_id: session.id.clone(),
        timer: TimerKind::Heartbeat,
    }];
    if reason == DisconnectReason::ServerClose && !session.cancel_pending {
        // Server-initiated close: retry immediately. Everything else waits
        // for the activity stall detector to activate polling.
        session.channel = ChannelState::Connecting;
        effects.push(Effect::ConnectPush {
            task_id: session.id.clone(),
        });
    }
    effects
}

/// Classifies heartbeat latency for display. Never used for correctness.
pub(crate) fn classify_quality(latency_ms: u64, cfg: &TrackerConfig) -> ConnectionQuality {
    if latency_ms >= cfg.quality_poor.as_millis() as u64 {
        ConnectionQuality::Poor
    } else if latency_ms >= cfg.quality_degraded.as_millis() as u64 {
        ConnectionQuality::Degraded
    } else {
        ConnectionQuality::Good
    }
}
