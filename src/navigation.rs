//! In-process navigation requests.
//!
//! The delivery store cannot reach the UI's router, so it publishes typed
//! requests here and whatever owns navigation subscribes.

use tokio::sync::broadcast;

use crate::constants;

/// A request to show some part of the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationRequest {
    /// Open the patient's detail view.
    Patient {
        /// Patient to show.
        patient_id: String,
    },
}

/// Broadcast channel for [`NavigationRequest`]s. Clones share the channel.
#[derive(Debug, Clone)]
pub struct NavigationBus {
    tx: broadcast::Sender<NavigationRequest>,
}

impl Default for NavigationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationBus {
    /// Create a bus with the default buffer size.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(constants::NAVIGATION_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish `request` to every current subscriber.
    ///
    /// Returns the number of subscribers reached; zero is not an error.
    pub fn request(&self, request: NavigationRequest) -> usize {
        match self.tx.send(request) {
            Ok(n) => n,
            Err(broadcast::error::SendError(request)) => {
                log::debug!("[Navigation] No listeners for {:?}", request);
                0
            }
        }
    }

    /// Receive requests published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<NavigationRequest> {
        self.tx.subscribe()
    }
}
