//! Wire contract shared by both channels.
//!
//! The push channel delivers these as SSE `data:` payloads; the poll
//! endpoint returns one as a JSON body. Past this point the two sources are
//! indistinguishable except for the `SampleSource` tag.

use serde::{Deserialize, Serialize};
use tracker_core::{Msg, ProgressSample, SampleSource, TerminalKind, TerminalPayload};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    Started {
        task_id: String,
    },
    Progress {
        task_id: String,
        #[serde(default)]
        progress: Option<f64>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        stats: Option<serde_json::Value>,
    },
    Completed {
        task_id: String,
        #[serde(default)]
        stats: Option<serde_json::Value>,
        #[serde(default)]
        output_ref: Option<String>,
    },
    Error {
        task_id: String,
        message: String,
    },
    Cancelled {
        task_id: String,
    },
}

impl StatusEvent {
    pub fn task_id(&self) -> &str {
        match self {
            StatusEvent::Started { task_id }
            | StatusEvent::Progress { task_id, .. }
            | StatusEvent::Completed { task_id, .. }
            | StatusEvent::Error { task_id, .. }
            | StatusEvent::Cancelled { task_id } => task_id,
        }
    }

    /// Lowers a wire event into a core message. `started` becomes a raw
    /// sample of 0 so a stale one from the poll path dies against the
    /// monotonicity rule instead of needing a special case.
    pub fn into_msg(self, source: SampleSource, at_ms: u64) -> Msg {
        match self {
            StatusEvent::Started { task_id } => Msg::Sample(ProgressSample {
                task_id,
                progress_raw: Some(0.0),
                message: None,
                stats: None,
                source,
                received_at: at_ms,
            }),
            StatusEvent::Progress {
                task_id,
                progress,
                message,
                stats,
            } => Msg::Sample(ProgressSample {
                task_id,
                progress_raw: progress,
                message,
                stats,
                source,
                received_at: at_ms,
            }),
            StatusEvent::Completed {
                task_id,
                stats,
                output_ref,
            } => Msg::TerminalNotice {
                task_id,
                kind: TerminalKind::Completed,
                payload: TerminalPayload {
                    message: None,
                    stats,
                    output_ref,
                    synthesized: false,
                },
                source,
                at_ms,
            },
            // A backend-reported failure is authoritative and terminal; the
            // message passes through verbatim.
            StatusEvent::Error { task_id, message } => Msg::TerminalNotice {
                task_id,
                kind: TerminalKind::Failed,
                payload: TerminalPayload {
                    message: Some(message),
                    stats: None,
                    output_ref: None,
                    synthesized: false,
                },
                source,
                at_ms,
            },
            StatusEvent::Cancelled { task_id } => Msg::TerminalNotice {
                task_id,
                kind: TerminalKind::Cancelled,
                payload: TerminalPayload::default(),
                source,
                at_ms,
            },
        }
    }
}
