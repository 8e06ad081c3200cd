use tracker_core::{TerminalKind, TerminalPayload, Warning};

/// Consumer seam for the UI layer. Implementations receive normalized,
/// monotonic progress and exactly one terminal call per tracked task.
pub trait StatusSink: Send + Sync {
    fn on_progress(
        &self,
        task_id: &str,
        displayed: f64,
        message: Option<&str>,
        stats: Option<&serde_json::Value>,
    );

    fn on_terminal(&self, task_id: &str, kind: TerminalKind, payload: &TerminalPayload);

    /// Recoverable conditions: early stalls, connectivity loss below the
    /// completion-confidence threshold, degraded polling.
    fn on_warning(&self, task_id: &str, warning: Warning);
}
