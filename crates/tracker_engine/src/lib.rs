//! Tracker engine: IO, timers, and the driver loop around the core reducer.
mod engine;
mod sink;
mod sse;
mod transport;
mod wire;

pub use engine::TrackerHandle;
pub use sink::StatusSink;
pub use sse::{SseDecoder, SseFrame};
pub use transport::{
    PushStream, ReqwestTransport, StatusTransport, TransportError, TransportSettings,
};
pub use wire::StatusEvent;
