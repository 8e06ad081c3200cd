//! HTTP transport for both channels: the SSE push stream, the poll
//! endpoint, cancel instructions, and the heartbeat probe.

use std::pin::Pin;
use std::time::{Duration, Instant};

use futures_util::stream::{self, Stream, StreamExt};
use thiserror::Error;
use tracker_logging::track_warn;

use crate::sse::SseDecoder;
use crate::wire::StatusEvent;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}")]
    Decode(String),
}

pub type PushStream = Pin<Box<dyn Stream<Item = Result<StatusEvent, TransportError>> + Send>>;

/// Seam between the driver and the network. Production uses
/// [`ReqwestTransport`]; tests swap in fakes here.
#[async_trait::async_trait]
pub trait StatusTransport: Send + Sync {
    /// Opens the push channel for one task. The stream ends when the server
    /// closes it.
    async fn open_push_channel(&self, task_id: &str) -> Result<PushStream, TransportError>;
    /// One status query; returns the same logical shape as a push event.
    async fn poll_status(&self, task_id: &str) -> Result<StatusEvent, TransportError>;
    /// Sends a cancel instruction. Idempotent server-side.
    async fn send_cancel(&self, task_id: &str) -> Result<(), TransportError>;
    /// Round-trip probe; the measured latency classifies link quality.
    async fn heartbeat(&self) -> Result<Duration, TransportError>;
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Per-request timeout for poll/cancel/heartbeat. The push stream is
    /// long-lived and only bounded by its connect timeout.
    pub request_timeout: Duration,
}

impl TransportSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
        }
    }
}

pub struct ReqwestTransport {
    settings: TransportSettings,
    client: reqwest::Client,
    stream_client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(settings: TransportSettings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let stream_client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(Self {
            settings,
            client,
            stream_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait::async_trait]
impl StatusTransport for ReqwestTransport {
    async fn open_push_channel(&self, task_id: &str) -> Result<PushStream, TransportError> {
        let response = self
            .stream_client
            .get(self.url(&format!("/tasks/{task_id}/events")))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus(status.as_u16()));
        }

        let mut decoder = SseDecoder::new();
        let events = response.bytes_stream().flat_map(move |chunk| match chunk {
            Ok(bytes) => {
                let parsed: Vec<Result<StatusEvent, TransportError>> = decoder
                    .feed(&bytes)
                    .into_iter()
                    .filter_map(|frame| match serde_json::from_str(&frame.data) {
                        Ok(event) => Some(Ok(event)),
                        Err(err) => {
                            // A malformed frame is dropped, not fatal; the
                            // poll path covers whatever it carried.
                            track_warn!("skipping malformed push frame: {}", err);
                            None
                        }
                    })
                    .collect();
                stream::iter(parsed)
            }
            Err(err) => stream::iter(vec![Err(map_reqwest_error(err))]),
        });
        Ok(Box::pin(events))
    }

    async fn poll_status(&self, task_id: &str) -> Result<StatusEvent, TransportError> {
        let response = self
            .client
            .get(self.url(&format!("/tasks/{task_id}/status")))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus(status.as_u16()));
        }
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        serde_json::from_slice(&body).map_err(|err| TransportError::Decode(err.to_string()))
    }

    async fn send_cancel(&self, task_id: &str) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.url(&format!("/tasks/{task_id}/cancel")))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus(status.as_u16()));
        }
        Ok(())
    }

    async fn heartbeat(&self) -> Result<Duration, TransportError> {
        let started = Instant::now();
        let response = self
            .client
            .get(self.url("/ping"))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus(status.as_u16()));
        }
        Ok(started.elapsed())
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout;
    }
    TransportError::Network(err.to_string())
}
