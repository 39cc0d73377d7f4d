//! Typed events surfaced by the push transport.
//!
//! Wire payloads are JSON bodies of named server-sent events. The transport
//! decodes them into [`PushEvent`] before handing them to subscribers, so
//! subscribers never see raw strings.

use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Connection health as observed by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No stream is open and none is being opened.
    #[default]
    Disconnected,
    /// A stream is being opened; the server has not confirmed it yet.
    Connecting,
    /// The server confirmed the stream with `connection.established`.
    Connected,
}

impl ConnectionStatus {
    /// Lowercase name used in logs and UI bindings.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }

    /// Catalog key of the live-update indicator label.
    pub fn label_key(self) -> &'static str {
        match self {
            Self::Disconnected => "delivery.connection.disconnected",
            Self::Connecting => "delivery.connection.connecting",
            Self::Connected => "delivery.connection.connected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription key for [`super::PushTransport::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Server confirmed the stream.
    ConnectionEstablished,
    /// A reminder's delivery status changed.
    StatusUpdated,
    /// A reminder could not be delivered.
    DeliveryFailed,
    /// Local connection status change (never sent by the server).
    ConnectionStatus,
}

impl EventKind {
    /// Event name, as used on the wire for server events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionEstablished => "connection.established",
            Self::StatusUpdated => "delivery.status.updated",
            Self::DeliveryFailed => "delivery.failed",
            Self::ConnectionStatus => "connection.status",
        }
    }

    /// Map a server-sent event name to its kind.
    ///
    /// `connection.status` is local-only and is not accepted from the wire.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "connection.established" => Some(Self::ConnectionEstablished),
            "delivery.status.updated" => Some(Self::StatusUpdated),
            "delivery.failed" => Some(Self::DeliveryFailed),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `delivery.status.updated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Reminder whose status changed.
    pub reminder_id: String,
    /// Domain status string (`pending`, `sent`, `delivered`, ...).
    pub status: String,
    /// Server-side time of the change, passed through verbatim.
    pub timestamp: String,
}

/// Body of `delivery.failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    /// Reminder that failed.
    pub reminder_id: String,
    /// Patient the reminder was addressed to.
    pub patient_id: String,
    /// Patient display name, used in the notification text.
    pub patient_name: String,
    /// Human-readable failure reason from the messaging gateway.
    pub error: String,
    /// Server-side failure time, when provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// An event delivered to transport subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// Server confirmed the stream. The payload is informational only.
    ConnectionEstablished {
        /// Raw payload as sent by the server.
        payload: String,
    },
    /// A reminder's delivery status changed.
    StatusUpdated(StatusUpdate),
    /// A reminder could not be delivered.
    DeliveryFailed(DeliveryFailure),
    /// The transport's connection status changed.
    ConnectionStatus(ConnectionStatus),
}

impl PushEvent {
    /// Subscription key this event is dispatched under.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ConnectionEstablished { .. } => EventKind::ConnectionEstablished,
            Self::StatusUpdated(_) => EventKind::StatusUpdated,
            Self::DeliveryFailed(_) => EventKind::DeliveryFailed,
            Self::ConnectionStatus(_) => EventKind::ConnectionStatus,
        }
    }

    /// Decode the payload of a server event of the given kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid JSON for the kind, or if
    /// the kind is local-only.
    pub fn decode(kind: EventKind, data: &str) -> Result<Self> {
        match kind {
            EventKind::ConnectionEstablished => Ok(Self::ConnectionEstablished {
                payload: data.to_string(),
            }),
            EventKind::StatusUpdated => serde_json::from_str(data)
                .map(Self::StatusUpdated)
                .context("invalid delivery.status.updated payload"),
            EventKind::DeliveryFailed => serde_json::from_str(data)
                .map(Self::DeliveryFailed)
                .context("invalid delivery.failed payload"),
            EventKind::ConnectionStatus => {
                anyhow::bail!("connection.status is not a server event")
            }
        }
    }
}
