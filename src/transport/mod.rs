//! Reconnecting push transport for delivery-status events.
//!
//! Owns at most one live event stream to the server, decodes its named
//! events and fans them out to subscribers registered per [`EventKind`].
//!
//! # State machine
//!
//! ```text
//!   Disconnected ──connect()──► Connecting ──connection.established──► Connected
//!        ▲                          │                                     │
//!        │                          └────────── stream error ─────────────┤
//!        │                                                                ▼
//!        └──── backoff timer ◄──── Disconnected (attempt k of max) ◄──────┘
//! ```
//!
//! After `max_attempts` failed retries the transport stays `Disconnected`
//! until [`PushTransport::connect`] is called again. [`PushTransport::disconnect`]
//! cancels both the live stream and any pending retry timer.
//!
//! # Dispatch
//!
//! Handlers run synchronously on the stream task, in registration order,
//! outside any transport lock. A panicking handler is logged and skipped;
//! the remaining handlers still receive the event.

// Rust guideline compliant 2026-02

pub mod connector;
pub mod events;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use futures_util::StreamExt;
use tokio::task::JoinHandle;

use crate::backoff::{Backoff, ReconnectPolicy};
use crate::config::Config;
use crate::credentials::CredentialSource;
use crate::sse::SseFrame;

pub use connector::{FrameStream, HttpConnector, StreamConnector};
pub use events::{ConnectionStatus, DeliveryFailure, EventKind, PushEvent, StatusUpdate};

/// Subscriber callback. Identity (for [`PushTransport::off`]) is the `Arc`
/// allocation, so keep the `Arc` you registered if you want to remove it.
pub type Handler = Arc<dyn Fn(&PushEvent) + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&PushEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Handle to the push transport. Clones share the same connection.
#[derive(Clone)]
pub struct PushTransport {
    shared: Arc<Shared>,
}

struct Shared {
    stream_url: String,
    connector: Arc<dyn StreamConnector>,
    credentials: Arc<dyn CredentialSource>,
    state: Mutex<TransportState>,
    listeners: Mutex<HashMap<EventKind, Vec<Handler>>>,
}

struct TransportState {
    status: ConnectionStatus,
    /// Stream task for the current (pending or open) connection.
    connection: Option<ActiveConnection>,
    /// Scheduled retry, cancelled by `disconnect()` and `connect()`.
    reconnect_timer: Option<JoinHandle<()>>,
    /// Bumped whenever a scheduled retry is superseded. A timer that already
    /// woke up cannot be aborted, so it checks this before reopening.
    timer_ticket: u64,
    backoff: Backoff,
    /// Bumped per opened stream so a superseded task cannot touch state.
    generation: u64,
}

struct ActiveConnection {
    generation: u64,
    task: JoinHandle<()>,
}

impl TransportState {
    /// Abort the pending retry and invalidate any timer already running.
    ///
    /// Returns `true` if a retry was pending.
    fn cancel_reconnect(&mut self) -> bool {
        self.timer_ticket += 1;
        match self.reconnect_timer.take() {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for PushTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("PushTransport")
            .field("stream_url", &self.shared.stream_url)
            .field("status", &state.status)
            .field("attempts", &state.backoff.attempts())
            .field("connected", &state.connection.is_some())
            .finish_non_exhaustive()
    }
}

impl PushTransport {
    /// Create a transport for `stream_url`. Nothing is opened until
    /// [`Self::connect`].
    pub fn new(
        stream_url: impl Into<String>,
        connector: Arc<dyn StreamConnector>,
        credentials: Arc<dyn CredentialSource>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                stream_url: stream_url.into(),
                connector,
                credentials,
                state: Mutex::new(TransportState {
                    status: ConnectionStatus::Disconnected,
                    connection: None,
                    reconnect_timer: None,
                    timer_ticket: 0,
                    backoff: Backoff::new(policy),
                    generation: 0,
                }),
                listeners: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Create an HTTP transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config, credentials: Arc<dyn CredentialSource>) -> Result<Self> {
        Ok(Self::new(
            config.stream_url(),
            Arc::new(HttpConnector::new()?),
            credentials,
            config.reconnect_policy(),
        ))
    }

    /// Open the stream if it is not already open or opening.
    ///
    /// Must be called from within a Tokio runtime. Without a session token
    /// this logs an error and returns, leaving the status `Disconnected` and
    /// scheduling no retry. A manual call cancels any pending retry timer and
    /// restores the full retry budget.
    pub fn connect(&self) {
        let started = {
            let mut state = self.lock_state();
            if state.connection.is_some() {
                log::debug!("[Sse] connect() ignored, stream already {}", state.status);
                return;
            }
            state.cancel_reconnect();
            state.backoff.reset();
            self.start_connection(&mut state)
        };

        if started {
            self.notify_status();
        }
    }

    /// Close the stream and cancel any pending retry.
    ///
    /// Idempotent; always notifies status subscribers.
    pub fn disconnect(&self) {
        {
            let mut state = self.lock_state();
            if let Some(connection) = state.connection.take() {
                connection.task.abort();
                log::info!("[Sse] Disconnected from delivery-status stream");
            }
            if state.cancel_reconnect() {
                log::debug!("[Sse] Cancelled pending reconnect");
            }
            state.status = ConnectionStatus::Disconnected;
        }
        self.notify_status();
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.lock_state().status
    }

    /// Retry attempts claimed since the last successful handshake.
    pub fn reconnect_attempts(&self) -> u32 {
        self.lock_state().backoff.attempts()
    }

    /// Whether a retry timer is currently scheduled.
    pub fn has_pending_reconnect(&self) -> bool {
        self.lock_state().reconnect_timer.is_some()
    }

    /// Register `handler` for events of `kind`.
    ///
    /// Handlers run in registration order; registering the same handler
    /// twice makes it run twice.
    pub fn on(&self, kind: EventKind, handler: Handler) {
        self.lock_listeners().entry(kind).or_default().push(handler);
    }

    /// Remove one registration of `handler` for `kind`.
    ///
    /// Returns `false` if it was not registered.
    pub fn off(&self, kind: EventKind, handler: &Handler) -> bool {
        let mut listeners = self.lock_listeners();
        let Some(handlers) = listeners.get_mut(&kind) else {
            return false;
        };
        match handlers.iter().position(|h| Arc::ptr_eq(h, handler)) {
            Some(index) => {
                handlers.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of handlers registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock_listeners().get(&kind).map_or(0, Vec::len)
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Spawn the stream task. Returns `false` if no token is available.
    fn start_connection(&self, state: &mut TransportState) -> bool {
        let Some(token) = self.shared.credentials.bearer_token() else {
            log::error!("[Sse] No session token available for delivery-status stream");
            return false;
        };

        state.generation += 1;
        let generation = state.generation;
        state.status = ConnectionStatus::Connecting;

        let transport = self.clone();
        let task = tokio::spawn(async move {
            transport.run_stream(generation, token).await;
        });
        state.connection = Some(ActiveConnection { generation, task });
        true
    }

    async fn run_stream(self, generation: u64, token: String) {
        let url = self.shared.stream_url.clone();
        log::info!("[Sse] Connecting to {}", url);

        let mut frames = match self.shared.connector.open(&url, &token).await {
            Ok(frames) => frames,
            Err(e) => {
                log::error!("[Sse] Connection error: {:#}", e);
                self.handle_failure(generation);
                return;
            }
        };

        while let Some(item) = frames.next().await {
            match item {
                Ok(frame) => self.handle_frame(generation, frame),
                Err(e) => {
                    log::error!("[Sse] Stream error: {:#}", e);
                    self.handle_failure(generation);
                    return;
                }
            }
        }

        log::warn!("[Sse] Stream closed by server");
        self.handle_failure(generation);
    }

    fn handle_frame(&self, generation: u64, frame: SseFrame) {
        if !self.is_current(generation) {
            return;
        }

        let Some(kind) = EventKind::from_wire(&frame.event) else {
            log::trace!("[Sse] Ignoring unhandled event {:?}", frame.event);
            return;
        };

        let event = match PushEvent::decode(kind, &frame.data) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("[Sse] Dropping malformed {} event: {:#}", kind, e);
                return;
            }
        };

        if kind == EventKind::ConnectionEstablished {
            log::info!("[Sse] Connection established: {}", frame.data);
            {
                let mut state = self.lock_state();
                if !matches!(&state.connection, Some(c) if c.generation == generation) {
                    return;
                }
                state.status = ConnectionStatus::Connected;
                state.backoff.reset();
            }
            self.notify_status();
        }

        self.emit(&event);
    }

    /// Tear down after a transport-level failure and schedule a retry.
    fn handle_failure(&self, generation: u64) {
        {
            let mut state = self.lock_state();
            if !matches!(&state.connection, Some(c) if c.generation == generation) {
                return;
            }
            // Dropping our own JoinHandle detaches; the task is about to end.
            state.connection = None;
            state.status = ConnectionStatus::Disconnected;
            self.schedule_reconnect(&mut state);
        }
        self.notify_status();
    }

    fn schedule_reconnect(&self, state: &mut TransportState) {
        let Some((attempt, delay)) = state.backoff.next_attempt() else {
            log::error!(
                "[Sse] Max reconnection attempts ({}) reached",
                state.backoff.policy().max_attempts
            );
            return;
        };

        log::info!(
            "[Sse] Attempting reconnection in {}ms (attempt {})",
            delay.as_millis(),
            attempt
        );

        state.timer_ticket += 1;
        let ticket = state.timer_ticket;
        let transport = self.clone();
        state.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            transport.fire_reconnect(ticket);
        }));
    }

    /// Timer callback: reopen without resetting the attempt counter.
    ///
    /// Does nothing if the retry was cancelled after the timer woke up.
    fn fire_reconnect(&self, ticket: u64) {
        let started = {
            let mut state = self.lock_state();
            if state.timer_ticket != ticket {
                log::debug!("[Sse] Ignoring cancelled reconnect");
                return;
            }
            state.reconnect_timer = None;
            if state.connection.is_some() {
                return;
            }
            self.start_connection(&mut state)
        };

        if started {
            self.notify_status();
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        matches!(&self.lock_state().connection, Some(c) if c.generation == generation)
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Publish the current status under `connection.status`.
    ///
    /// Reads the status at notification time, so interleaved transitions
    /// never leave subscribers with a stale value.
    fn notify_status(&self) {
        let status = self.status();
        self.emit(&PushEvent::ConnectionStatus(status));
    }

    fn emit(&self, event: &PushEvent) {
        let kind = event.kind();
        let handlers: Vec<Handler> = self
            .lock_listeners()
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        for handler in handlers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                log::error!(
                    "[Sse] Error in {} listener: {}",
                    kind,
                    panic_message(panic.as_ref())
                );
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, TransportState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, HashMap<EventKind, Vec<Handler>>> {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Best-effort text of a caught panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
