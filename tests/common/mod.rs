//! Shared helpers for transport-driven integration tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use futures_util::{stream, StreamExt as _};
use prima_live::backoff::ReconnectPolicy;
use prima_live::sse::SseFrame;
use prima_live::transport::{FrameStream, StreamConnector};
use prima_live::{PushTransport, StaticToken};
use tokio::time::Instant;

pub const STREAM_URL: &str = "http://localhost:8080/api/sse/delivery-status";

/// What one `open()` call does.
#[derive(Debug, Clone)]
pub enum Script {
    /// The connection attempt itself fails.
    Fail,
    /// Yield the frames, then the server closes the stream.
    Close(Vec<SseFrame>),
    /// Yield the frames, then stay open forever.
    Hold(Vec<SseFrame>),
}

/// Connector that replays scripts in order and records when it was called.
///
/// Once the scripts run out every attempt fails.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    scripts: Mutex<VecDeque<Script>>,
    opens: Mutex<Vec<(Instant, String)>>,
}

impl ScriptedConnector {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            opens: Mutex::new(Vec::new()),
        })
    }

    pub fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.opens.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.opens.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait::async_trait]
impl StreamConnector for ScriptedConnector {
    async fn open(&self, _url: &str, token: &str) -> Result<FrameStream> {
        self.opens
            .lock()
            .unwrap()
            .push((Instant::now(), token.to_string()));
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or(Script::Fail);
        match script {
            Script::Fail => anyhow::bail!("connection refused"),
            Script::Close(frames) => Ok(Box::pin(stream::iter(frames.into_iter().map(Ok::<_, anyhow::Error>)))),
            Script::Hold(frames) => Ok(Box::pin(
                stream::iter(frames.into_iter().map(Ok::<_, anyhow::Error>)).chain(stream::pending()),
            )),
        }
    }
}

pub fn established() -> SseFrame {
    SseFrame::new("connection.established", r#"{"client_id":"c1"}"#)
}

pub fn status_updated(reminder_id: &str, status: &str, timestamp: &str) -> SseFrame {
    SseFrame::new(
        "delivery.status.updated",
        serde_json::json!({
            "reminder_id": reminder_id,
            "status": status,
            "timestamp": timestamp,
        })
        .to_string(),
    )
}

pub fn delivery_failed(reminder_id: &str, patient_id: &str, patient_name: &str) -> SseFrame {
    SseFrame::new(
        "delivery.failed",
        serde_json::json!({
            "reminder_id": reminder_id,
            "patient_id": patient_id,
            "patient_name": patient_name,
            "error": "bad number",
        })
        .to_string(),
    )
}

pub fn transport_with(connector: &Arc<ScriptedConnector>, token: Option<&str>) -> PushTransport {
    transport_with_policy(connector, token, ReconnectPolicy::default())
}

pub fn transport_with_policy(
    connector: &Arc<ScriptedConnector>,
    token: Option<&str>,
    policy: ReconnectPolicy,
) -> PushTransport {
    let credentials = token.map_or_else(StaticToken::none, StaticToken::new);
    PushTransport::new(
        STREAM_URL,
        Arc::clone(connector) as Arc<dyn StreamConnector>,
        Arc::new(credentials),
        policy,
    )
}

/// Let spawned tasks run without advancing past any backoff deadline.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
}
