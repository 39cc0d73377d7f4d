//! PRIMA Live - real-time delivery status for the volunteer dashboard.
//!
//! This crate keeps a dashboard's view of reminder deliveries current by
//! listening to the server's delivery-status event stream.
//!
//! # Architecture
//!
//! - **Transport** - one reconnecting event-stream connection, fan-out to
//!   typed subscribers, capped exponential backoff
//! - **Store** - reactive projection of transport events: statuses per
//!   reminder, connection health, failure list
//! - **Toasts / Navigation** - side channels the store drives when a
//!   delivery fails
//!
//! Instances are constructed explicitly and shared by handle; there is no
//! global state.
//!
//! # Modules
//!
//! - [`transport`] - Push transport and event types
//! - [`store`] - Delivery state aggregator
//! - [`sse`] - `text/event-stream` codec
//! - [`config`] - Configuration loading/saving
//! - [`credentials`] - Session token storage

// Library modules
pub mod backoff;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod env;
pub mod i18n;
pub mod navigation;
pub mod observable;
pub mod sse;
pub mod store;
pub mod toast;
pub mod transport;

// Re-export commonly used types
pub use backoff::ReconnectPolicy;
pub use config::Config;
pub use credentials::{CredentialSource, StaticToken, TokenStore};
pub use i18n::{Locale, Translator};
pub use navigation::{NavigationBus, NavigationRequest};
pub use store::{DeliveryStore, FailureRecord, StatusRecord};
pub use toast::{Toast, ToastStore};
pub use transport::{ConnectionStatus, EventKind, PushEvent, PushTransport};
