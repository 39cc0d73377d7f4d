//! Application-wide constants for prima-live.
//!
//! Centralizes wire names and tuning defaults so the transport, store and
//! configuration agree on them.

use std::time::Duration;

// ============================================================================
// Streaming endpoint
// ============================================================================

/// Path of the delivery-status event stream, relative to the server URL.
pub const STREAM_PATH: &str = "/api/sse/delivery-status";

/// Query parameter carrying the bearer token.
///
/// The event-stream protocol cannot attach custom headers from the browser,
/// so the server accepts the session token in the URL instead.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Connect timeout for opening the event stream.
///
/// Only the handshake is bounded; the stream itself is long-lived.
pub const STREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed from sending the request to receiving response headers.
///
/// The body is never time-bounded: the server sends no heartbeat, so an
/// idle stream is indistinguishable from a quiet one.
pub const STREAM_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Reconnection
// ============================================================================

/// Floor of the reconnection backoff.
pub const RECONNECT_INITIAL_DELAY: Duration = Duration::from_millis(1000);

/// Ceiling of the reconnection backoff.
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Reconnection attempts before giving up until the next manual connect.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

// ============================================================================
// Notifications
// ============================================================================

/// Default auto-dismiss time for toasts.
pub const TOAST_DURATION: Duration = Duration::from_millis(5000);

/// Maximum number of toasts shown at once.
pub const MAX_TOASTS: usize = 5;

/// Capacity of the navigation broadcast channel.
pub const NAVIGATION_CHANNEL_CAPACITY: usize = 32;
