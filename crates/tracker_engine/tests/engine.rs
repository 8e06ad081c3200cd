use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream;
use futures_util::StreamExt;
use pretty_assertions::assert_eq;

use tracker_core::{TaskKind, TerminalKind, TerminalPayload, TrackerConfig, Warning};
use tracker_engine::{
    PushStream, StatusEvent, StatusSink, StatusTransport, TrackerHandle, TransportError,
};

/// Plays back a fixed list of push events; optionally keeps the channel
/// open afterwards instead of letting the server-close path kick in.
struct ScriptedTransport {
    events: Mutex<Vec<StatusEvent>>,
    hold_open: bool,
    cancels: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn new(events: Vec<StatusEvent>, hold_open: bool) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(events),
            hold_open,
            cancels: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait::async_trait]
impl StatusTransport for ScriptedTransport {
    async fn open_push_channel(&self, _task_id: &str) -> Result<PushStream, TransportError> {
        let events = std::mem::take(&mut *self.events.lock().unwrap());
        let played = stream::iter(events.into_iter().map(Ok));
        if self.hold_open {
            Ok(Box::pin(played.chain(stream::pending())))
        } else {
            Ok(Box::pin(played))
        }
    }

    async fn poll_status(&self, _task_id: &str) -> Result<StatusEvent, TransportError> {
        Err(TransportError::HttpStatus(404))
    }

    async fn send_cancel(&self, task_id: &str) -> Result<(), TransportError> {
        self.cancels.lock().unwrap().push(task_id.to_string());
        Ok(())
    }

    async fn heartbeat(&self) -> Result<Duration, TransportError> {
        Ok(Duration::from_millis(10))
    }
}

#[derive(Default)]
struct Recorded {
    progress: Vec<f64>,
    terminals: Vec<(String, TerminalKind, TerminalPayload)>,
    warnings: Vec<Warning>,
}

struct RecordingSink {
    recorded: Mutex<Recorded>,
    terminal_tx: Mutex<mpsc::Sender<()>>,
}

impl RecordingSink {
    fn new() -> (Arc<Self>, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel();
        let sink = Arc::new(Self {
            recorded: Mutex::new(Recorded::default()),
            terminal_tx: Mutex::new(tx),
        });
        (sink, rx)
    }
}

impl StatusSink for RecordingSink {
    fn on_progress(
        &self,
        _task_id: &str,
        displayed: f64,
        _message: Option<&str>,
        _stats: Option<&serde_json::Value>,
    ) {
        self.recorded.lock().unwrap().progress.push(displayed);
    }

    fn on_terminal(&self, task_id: &str, kind: TerminalKind, payload: &TerminalPayload) {
        self.recorded
            .lock()
            .unwrap()
            .terminals
            .push((task_id.to_string(), kind, payload.clone()));
        let _ = self.terminal_tx.lock().unwrap().send(());
    }

    fn on_warning(&self, _task_id: &str, warning: Warning) {
        self.recorded.lock().unwrap().warnings.push(warning);
    }
}

#[test]
fn a_full_push_lifecycle_reaches_the_sink_exactly_once() {
    let transport = ScriptedTransport::new(
        vec![
            StatusEvent::Started {
                task_id: "t1".into(),
            },
            StatusEvent::Progress {
                task_id: "t1".into(),
                progress: Some(30.0),
                message: None,
                stats: None,
            },
            StatusEvent::Progress {
                task_id: "t1".into(),
                progress: Some(60.0),
                message: None,
                stats: None,
            },
            StatusEvent::Completed {
                task_id: "t1".into(),
                stats: None,
                output_ref: Some("results/t1".into()),
            },
            // A duplicate straggler the guard must absorb.
            StatusEvent::Completed {
                task_id: "t1".into(),
                stats: None,
                output_ref: None,
            },
        ],
        false,
    );
    let (sink, terminal_rx) = RecordingSink::new();

    let handle = TrackerHandle::new(TrackerConfig::default(), transport, sink.clone());
    handle.track("t1", TaskKind::FileProcessing);

    terminal_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("terminal within the deadline");
    // Give any straggling duplicate a moment to surface, then assert it did not.
    std::thread::sleep(Duration::from_millis(200));
    handle.acknowledge("t1");
    handle.shutdown();

    let recorded = sink.recorded.lock().unwrap();
    assert_eq!(recorded.progress, vec![0.0, 30.0, 60.0, 100.0]);
    assert!(recorded.progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(recorded.terminals.len(), 1);
    let (task_id, kind, payload) = &recorded.terminals[0];
    assert_eq!(task_id, "t1");
    assert_eq!(*kind, TerminalKind::Completed);
    assert_eq!(payload.output_ref.as_deref(), Some("results/t1"));
    assert!(!payload.synthesized);
}

#[test]
fn an_unacknowledged_cancel_resolves_locally() {
    let transport = ScriptedTransport::new(Vec::new(), true);
    let (sink, terminal_rx) = RecordingSink::new();

    let mut config = TrackerConfig::default();
    config.scheduler.cancel_fallback = Duration::from_millis(200);

    let handle = TrackerHandle::new(config, transport.clone(), sink.clone());
    handle.track("t9", TaskKind::Scrape);
    // Let the push channel come up before cancelling.
    std::thread::sleep(Duration::from_millis(100));
    handle.cancel("t9");

    terminal_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("local cancel terminal within the deadline");
    handle.shutdown();

    assert_eq!(transport.cancels.lock().unwrap().as_slice(), ["t9"]);
    let recorded = sink.recorded.lock().unwrap();
    assert_eq!(recorded.terminals.len(), 1);
    let (task_id, kind, payload) = &recorded.terminals[0];
    assert_eq!(task_id, "t9");
    assert_eq!(*kind, TerminalKind::Cancelled);
    assert!(payload.synthesized);
}
