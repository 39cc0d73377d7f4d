//! Delivery state aggregator.
//!
//! Projects transport events into reactive state the dashboard reads:
//!
//! - `delivery_statuses`: latest observed status per reminder
//! - `connection_status`: mirror of the transport's status
//! - `failed_reminders`: delivery failures in arrival order
//! - `failed_count`: derived from `failed_reminders`
//!
//! Every mutation publishes a new container (see [`Observable`]). A delivery
//! failure also raises an error toast whose action asks the application to
//! open the patient.

// Rust guideline compliant 2026-02

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::constants;
use crate::i18n::Translator;
use crate::navigation::{NavigationBus, NavigationRequest};
use crate::observable::Observable;
use crate::toast::{ToastAction, ToastKind, ToastOptions, ToastStore};
use crate::transport::{
    handler, ConnectionStatus, DeliveryFailure, EventKind, Handler, PushEvent, PushTransport,
};

/// Known reminder delivery states.
///
/// The transport passes status strings through untouched; this is only for
/// rendering and filtering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    /// Created, not yet scheduled.
    Pending,
    /// Waiting for its send time.
    Scheduled,
    /// Handed to the send queue.
    Queued,
    /// Being sent to the messaging gateway.
    Sending,
    /// Accepted by the gateway.
    Sent,
    /// Delivered to the patient's device.
    Delivered,
    /// Read by the patient.
    Read,
    /// Delivery failed.
    Failed,
    /// Send window passed.
    Expired,
    /// Cancelled by a volunteer.
    Cancelled,
    /// Waiting for another send attempt.
    Retry,
    /// Anything the server added later.
    Other(String),
}

/// Dashboard filter bucket a status belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterGroup {
    /// Not sent yet.
    Pending,
    /// Reached the gateway or beyond.
    Sent,
    /// Did not reach the patient.
    Failed,
}

impl DeliveryStatus {
    /// Classify a status string.
    pub fn parse(status: &str) -> Self {
        match status {
            "pending" => Self::Pending,
            "scheduled" => Self::Scheduled,
            "queued" => Self::Queued,
            "sending" => Self::Sending,
            "sent" => Self::Sent,
            "delivered" => Self::Delivered,
            "read" => Self::Read,
            "failed" => Self::Failed,
            "expired" => Self::Expired,
            "cancelled" => Self::Cancelled,
            "retry" => Self::Retry,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Queued => "queued",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
            Self::Retry => "retry",
            Self::Other(s) => s,
        }
    }

    /// Catalog key of the badge label.
    pub fn label_key(&self) -> String {
        format!("reminder.status.{}", self.as_str())
    }

    /// Badge label in the translator's locale.
    ///
    /// Statuses without a catalog entry render as their wire name.
    pub fn label(&self, translator: &Translator) -> String {
        match self {
            Self::Other(status) => status.clone(),
            known => translator.translate(&known.label_key(), &[]),
        }
    }

    /// Filter bucket, if the status is counted by any filter.
    pub fn filter_group(&self) -> Option<FilterGroup> {
        match self {
            Self::Pending | Self::Scheduled | Self::Queued | Self::Sending | Self::Retry => {
                Some(FilterGroup::Pending)
            }
            Self::Sent | Self::Delivered | Self::Read => Some(FilterGroup::Sent),
            Self::Failed | Self::Expired => Some(FilterGroup::Failed),
            Self::Cancelled | Self::Other(_) => None,
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest observed status of one reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRecord {
    /// Status string as sent by the server.
    pub status: String,
    /// Server timestamp, passed through verbatim.
    pub source_timestamp: String,
    /// Local time the update was applied.
    pub observed_at: DateTime<Utc>,
}

/// A delivery failure awaiting volunteer attention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    /// Reminder that failed.
    pub reminder_id: String,
    /// Patient the reminder was for.
    pub patient_id: String,
    /// Patient display name.
    pub patient_name: String,
    /// Failure reason.
    pub error: String,
    /// Server timestamp, or the local time the failure was recorded.
    pub timestamp: String,
}

/// Status counts for the dashboard's delivery filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterCounts {
    /// Reminders with any known status.
    pub all: usize,
    /// Not sent yet.
    pub pending: usize,
    /// Sent, delivered or read.
    pub sent: usize,
    /// Failed or expired.
    pub failed: usize,
}

/// Type alias for the status map.
pub type StatusMap = HashMap<String, StatusRecord>;

struct StoreState {
    statuses: Observable<StatusMap>,
    connection: Observable<ConnectionStatus>,
    failed: Observable<Vec<FailureRecord>>,
    toasts: ToastStore,
    translator: Translator,
    navigation: NavigationBus,
    toast_duration: Duration,
}

impl StoreState {
    fn update_status(&self, reminder_id: &str, status: &str, timestamp: &str) {
        let record = StatusRecord {
            status: status.to_string(),
            source_timestamp: timestamp.to_string(),
            observed_at: Utc::now(),
        };
        self.statuses.update(|current| {
            let mut next = current.clone();
            next.insert(reminder_id.to_string(), record);
            next
        });
    }

    fn add_failed_reminder(&self, failure: &DeliveryFailure) {
        let record = FailureRecord {
            reminder_id: failure.reminder_id.clone(),
            patient_id: failure.patient_id.clone(),
            patient_name: failure.patient_name.clone(),
            error: failure.error.clone(),
            timestamp: failure
                .timestamp
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        };
        log::warn!(
            "[Delivery] Reminder {} failed for patient {}: {}",
            record.reminder_id,
            record.patient_id,
            record.error
        );
        self.failed.update(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend_from_slice(current);
            next.push(record);
            next
        });

        self.raise_failure_toast(failure);
    }

    fn raise_failure_toast(&self, failure: &DeliveryFailure) {
        let message = self.translator.translate(
            "reminder.failedNotification",
            &[("patientName", failure.patient_name.as_str())],
        );
        let navigation = self.navigation.clone();
        let patient_id = failure.patient_id.clone();
        let action = ToastAction::new(
            self.translator.translate("reminder.viewDetails", &[]),
            move || {
                navigation.request(NavigationRequest::Patient {
                    patient_id: patient_id.clone(),
                });
            },
        );

        self.toasts.add(
            message,
            ToastOptions {
                kind: ToastKind::Error,
                duration: self.toast_duration,
                action: Some(action),
            },
        );
    }
}

/// Reactive delivery state fed by a [`PushTransport`].
///
/// Construct once per session. Dropping the store unregisters its
/// transport handlers.
pub struct DeliveryStore {
    state: Arc<StoreState>,
    transport: PushTransport,
    handlers: Vec<(EventKind, Handler)>,
}

impl fmt::Debug for DeliveryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryStore")
            .field("statuses", &self.state.statuses.get().len())
            .field("connection", &*self.state.connection.get())
            .field("failed", &self.state.failed.get().len())
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl DeliveryStore {
    /// Create the store and subscribe it to `transport`.
    pub fn new(
        transport: PushTransport,
        toasts: ToastStore,
        translator: Translator,
        navigation: NavigationBus,
        toast_duration: Duration,
    ) -> Self {
        let state = Arc::new(StoreState {
            statuses: Observable::default(),
            connection: Observable::new(transport.status()),
            failed: Observable::default(),
            toasts,
            translator,
            navigation,
            toast_duration,
        });

        let on_status = {
            let state = Arc::clone(&state);
            handler(move |event| {
                if let PushEvent::StatusUpdated(update) = event {
                    state.update_status(&update.reminder_id, &update.status, &update.timestamp);
                }
            })
        };
        let on_connection = {
            let state = Arc::clone(&state);
            handler(move |event| {
                if let PushEvent::ConnectionStatus(status) = event {
                    state.connection.replace(*status);
                }
            })
        };
        let on_failure = {
            let state = Arc::clone(&state);
            handler(move |event| {
                if let PushEvent::DeliveryFailed(failure) = event {
                    state.add_failed_reminder(failure);
                }
            })
        };

        let handlers = vec![
            (EventKind::StatusUpdated, on_status),
            (EventKind::ConnectionStatus, on_connection),
            (EventKind::DeliveryFailed, on_failure),
        ];
        for (kind, h) in &handlers {
            transport.on(*kind, Arc::clone(h));
        }

        Self {
            state,
            transport,
            handlers,
        }
    }

    /// Store with default toasts, English text and a private navigation bus.
    pub fn with_defaults(transport: PushTransport) -> Self {
        Self::new(
            transport,
            ToastStore::default(),
            Translator::default(),
            NavigationBus::new(),
            constants::TOAST_DURATION,
        )
    }

    // === Delivery statuses ===

    /// Record `status` for `reminder_id`, replacing any previous record.
    pub fn update_status(&self, reminder_id: &str, status: &str, timestamp: &str) {
        self.state.update_status(reminder_id, status, timestamp);
    }

    /// Latest status of `reminder_id`, if any was observed.
    pub fn status(&self, reminder_id: &str) -> Option<String> {
        self.state
            .statuses
            .get()
            .get(reminder_id)
            .map(|r| r.status.clone())
    }

    /// Drop the record for a reminder that no longer exists.
    ///
    /// Returns `false` if nothing was recorded for it.
    pub fn forget_status(&self, reminder_id: &str) -> bool {
        if !self.state.statuses.get().contains_key(reminder_id) {
            return false;
        }
        self.state.statuses.update(|current| {
            let mut next = current.clone();
            next.remove(reminder_id);
            next
        });
        true
    }

    /// Snapshot of every observed status.
    pub fn delivery_statuses(&self) -> Arc<StatusMap> {
        self.state.statuses.get()
    }

    /// Change notifications for [`Self::delivery_statuses`].
    pub fn subscribe_statuses(&self) -> watch::Receiver<Arc<StatusMap>> {
        self.state.statuses.subscribe()
    }

    /// Counts per filter bucket over observed statuses.
    pub fn filter_counts(&self) -> FilterCounts {
        let statuses = self.state.statuses.get();
        statuses.values().fold(
            FilterCounts {
                all: statuses.len(),
                ..FilterCounts::default()
            },
            |mut counts, record| {
                match DeliveryStatus::parse(&record.status).filter_group() {
                    Some(FilterGroup::Pending) => counts.pending += 1,
                    Some(FilterGroup::Sent) => counts.sent += 1,
                    Some(FilterGroup::Failed) => counts.failed += 1,
                    None => {}
                }
                counts
            },
        )
    }

    // === Failures ===

    /// Record a failure and raise its toast.
    pub fn add_failed_reminder(&self, failure: &DeliveryFailure) {
        self.state.add_failed_reminder(failure);
    }

    /// Remove every failure recorded for `reminder_id`.
    pub fn remove_failed_reminder(&self, reminder_id: &str) {
        if !self
            .state
            .failed
            .get()
            .iter()
            .any(|r| r.reminder_id == reminder_id)
        {
            return;
        }
        self.state.failed.update(|current| {
            current
                .iter()
                .filter(|r| r.reminder_id != reminder_id)
                .cloned()
                .collect()
        });
    }

    /// Remove all failures.
    pub fn clear_failed_reminders(&self) {
        self.state.failed.replace(Vec::new());
    }

    /// Failures in arrival order.
    pub fn failed_reminders(&self) -> Arc<Vec<FailureRecord>> {
        self.state.failed.get()
    }

    /// Number of recorded failures.
    pub fn failed_count(&self) -> usize {
        self.state.failed.get().len()
    }

    /// Change notifications for [`Self::failed_reminders`].
    pub fn subscribe_failed_reminders(&self) -> watch::Receiver<Arc<Vec<FailureRecord>>> {
        self.state.failed.subscribe()
    }

    // === Connection ===

    /// Last status published by the transport.
    pub fn connection_status(&self) -> ConnectionStatus {
        *self.state.connection.get()
    }

    /// Change notifications for [`Self::connection_status`].
    pub fn subscribe_connection_status(&self) -> watch::Receiver<Arc<ConnectionStatus>> {
        self.state.connection.subscribe()
    }

    /// Open the transport's stream.
    pub fn connect(&self) {
        self.transport.connect();
    }

    /// Close the transport's stream.
    pub fn disconnect(&self) {
        self.transport.disconnect();
    }

    /// Forget all statuses and failures (logout).
    pub fn reset(&self) {
        self.state.statuses.replace(StatusMap::new());
        self.state.failed.replace(Vec::new());
        log::debug!("[Delivery] State reset");
    }

    /// Toasts raised by this store.
    pub fn toasts(&self) -> &ToastStore {
        &self.state.toasts
    }

    /// Transport this store listens to.
    pub fn transport(&self) -> &PushTransport {
        &self.transport
    }
}

impl Drop for DeliveryStore {
    fn drop(&mut self) {
        for (kind, h) in &self.handlers {
            self.transport.off(*kind, h);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::ReconnectPolicy;
    use crate::credentials::StaticToken;
    use crate::i18n::Locale;
    use crate::transport::{FrameStream, StreamConnector};

    #[derive(Debug)]
    struct Unused;

    #[async_trait::async_trait]
    impl StreamConnector for Unused {
        async fn open(&self, _url: &str, _token: &str) -> anyhow::Result<FrameStream> {
            anyhow::bail!("not used")
        }
    }

    fn store() -> DeliveryStore {
        let transport = PushTransport::new(
            "http://localhost:8080/api/sse/delivery-status",
            Arc::new(Unused),
            Arc::new(StaticToken::none()),
            ReconnectPolicy::default(),
        );
        DeliveryStore::with_defaults(transport)
    }

    fn failure(reminder_id: &str, patient_name: &str) -> DeliveryFailure {
        DeliveryFailure {
            reminder_id: reminder_id.to_string(),
            patient_id: format!("p-{reminder_id}"),
            patient_name: patient_name.to_string(),
            error: "bad number".to_string(),
            timestamp: None,
        }
    }

    #[test]
    fn test_update_status_latest_wins_and_changes_identity() {
        let store = store();
        let empty = store.delivery_statuses();

        store.update_status("r1", "queued", "T0");
        let first = store.delivery_statuses();
        store.update_status("r1", "sent", "T1");
        store.update_status("r2", "pending", "T1");
        let last = store.delivery_statuses();

        assert!(!Arc::ptr_eq(&empty, &first));
        assert!(!Arc::ptr_eq(&first, &last));
        assert_eq!(store.status("r1").as_deref(), Some("sent"));
        assert_eq!(store.status("r2").as_deref(), Some("pending"));
        assert_eq!(store.status("missing"), None);
        assert_eq!(last["r1"].source_timestamp, "T1");
        // Earlier snapshots are untouched.
        assert_eq!(first["r1"].status, "queued");
    }

    #[test]
    fn test_failed_count_follows_sequence() {
        let store = store();
        for i in 0..4 {
            store.add_failed_reminder(&failure(&format!("r{i}"), "Jane"));
        }
        assert_eq!(store.failed_count(), 4);
        let ids: Vec<_> = store
            .failed_reminders()
            .iter()
            .map(|r| r.reminder_id.clone())
            .collect();
        assert_eq!(ids, vec!["r0", "r1", "r2", "r3"]);

        store.clear_failed_reminders();
        assert_eq!(store.failed_count(), 0);
    }

    #[test]
    fn test_remove_failed_reminder_removes_all_matches() {
        let store = store();
        store.add_failed_reminder(&failure("r1", "A"));
        store.add_failed_reminder(&failure("r2", "B"));
        store.add_failed_reminder(&failure("r1", "A"));
        store.add_failed_reminder(&failure("r3", "C"));

        let before = store.failed_reminders();
        store.remove_failed_reminder("missing");
        assert!(Arc::ptr_eq(&before, &store.failed_reminders()));

        store.remove_failed_reminder("r1");
        let ids: Vec<_> = store
            .failed_reminders()
            .iter()
            .map(|r| r.reminder_id.clone())
            .collect();
        assert_eq!(ids, vec!["r2", "r3"]);
    }

    #[test]
    fn test_missing_timestamp_defaults_to_now() {
        let store = store();
        store.add_failed_reminder(&failure("r1", "Jane"));
        let timestamp = store.failed_reminders()[0].timestamp.clone();
        assert!(timestamp.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&timestamp).is_ok());

        let mut with_ts = failure("r2", "Jane");
        with_ts.timestamp = Some("2025-12-30T10:00:00Z".to_string());
        store.add_failed_reminder(&with_ts);
        assert_eq!(store.failed_reminders()[1].timestamp, "2025-12-30T10:00:00Z");
    }

    #[test]
    fn test_failure_raises_error_toast() {
        let store = store();
        store.add_failed_reminder(&failure("r1", "Jane"));
        let toasts = store.toasts().toasts();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].kind, ToastKind::Error);
        assert!(toasts[0].message.contains("Jane"));
        assert_eq!(
            toasts[0].action.as_ref().map(|a| a.label.as_str()),
            Some("View details")
        );
    }

    #[test]
    fn test_forget_status_and_reset() {
        let store = store();
        store.update_status("r1", "sent", "T1");
        store.update_status("r2", "failed", "T1");
        assert!(store.forget_status("r1"));
        assert!(!store.forget_status("r1"));
        assert_eq!(store.status("r1"), None);

        store.add_failed_reminder(&failure("r2", "Jane"));
        store.reset();
        assert!(store.delivery_statuses().is_empty());
        assert_eq!(store.failed_count(), 0);
    }

    #[test]
    fn test_filter_counts() {
        let store = store();
        store.update_status("a", "pending", "T");
        store.update_status("b", "queued", "T");
        store.update_status("c", "delivered", "T");
        store.update_status("d", "failed", "T");
        store.update_status("e", "cancelled", "T");

        assert_eq!(
            store.filter_counts(),
            FilterCounts {
                all: 5,
                pending: 2,
                sent: 1,
                failed: 1,
            }
        );
    }

    #[test]
    fn test_delivery_status_parse() {
        assert_eq!(DeliveryStatus::parse("read"), DeliveryStatus::Read);
        assert_eq!(
            DeliveryStatus::parse("bounced"),
            DeliveryStatus::Other("bounced".to_string())
        );
        assert_eq!(DeliveryStatus::Sent.label_key(), "reminder.status.sent");
        assert_eq!(DeliveryStatus::parse("bounced").filter_group(), None);
    }

    #[test]
    fn test_delivery_status_label() {
        let id = Translator::new(Locale::Id);
        assert_eq!(DeliveryStatus::Delivered.label(&id), "Diterima");
        assert_eq!(DeliveryStatus::parse("cancelled").label(&id), "Dibatalkan");
        assert_eq!(DeliveryStatus::parse("bounced").label(&id), "bounced");
        assert_eq!(
            DeliveryStatus::Sending.label(&Translator::default()),
            "Sending..."
        );
    }

    #[test]
    fn test_store_registers_three_handlers_and_drop_removes_them() {
        let store = store();
        let transport = store.transport().clone();
        assert_eq!(transport.listener_count(EventKind::StatusUpdated), 1);
        assert_eq!(transport.listener_count(EventKind::ConnectionStatus), 1);
        assert_eq!(transport.listener_count(EventKind::DeliveryFailed), 1);

        drop(store);
        assert_eq!(transport.listener_count(EventKind::StatusUpdated), 0);
        assert_eq!(transport.listener_count(EventKind::DeliveryFailed), 0);
    }
}
