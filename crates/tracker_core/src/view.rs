use crate::session::{
    ChannelState, ConnectionQuality, TaskId, TaskKind, TaskSession, TerminalKind,
};

/// Cheap display snapshot of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub channel: ChannelState,
    pub displayed: f64,
    pub quality: ConnectionQuality,
    pub terminal: Option<TerminalKind>,
    pub simulating: bool,
    pub poll_failures: u32,
    pub cancel_pending: bool,
}

impl SessionView {
    pub(crate) fn of(session: &TaskSession) -> Self {
        Self {
            task_id: session.id.clone(),
            kind: session.kind,
            channel: session.channel,
            displayed: session.displayed,
            quality: session.quality,
            terminal: session.terminal,
            simulating: session.is_simulating(),
            poll_failures: session.poll_failures,
            cancel_pending: session.cancel_pending,
        }
    }
}
