use crate::config::TrackerConfig;
use crate::session::SessionRegistry;
use crate::view::SessionView;

/// Root state for the reducer: configuration plus the session registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerState {
    pub config: TrackerConfig,
    pub(crate) sessions: SessionRegistry,
}

impl TrackerState {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            sessions: SessionRegistry::new(),
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Display snapshot for one tracked task.
    pub fn view(&self, task_id: &str) -> Option<SessionView> {
        self.sessions.get(task_id).map(SessionView::of)
    }
}
