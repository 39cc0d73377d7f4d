//! Integration tests for the delivery store fed by a live transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{delivery_failed, established, settle, status_updated, transport_with, Script, ScriptedConnector};
use prima_live::toast::ToastKind;
use prima_live::{
    ConnectionStatus, DeliveryStore, Locale, NavigationBus, NavigationRequest, ToastStore,
    Translator,
};

fn store_for(connector: &Arc<ScriptedConnector>, locale: Locale) -> (DeliveryStore, NavigationBus) {
    let navigation = NavigationBus::new();
    let store = DeliveryStore::new(
        transport_with(connector, Some("jwt")),
        ToastStore::default(),
        Translator::new(locale),
        navigation.clone(),
        Duration::from_millis(5000),
    );
    (store, navigation)
}

#[tokio::test(start_paused = true)]
async fn test_status_update_event_updates_store() {
    let connector = ScriptedConnector::new([Script::Hold(vec![
        established(),
        status_updated("r1", "sent", "T1"),
    ])]);
    let (store, _nav) = store_for(&connector, Locale::En);

    store.connect();
    settle().await;

    assert_eq!(store.status("r1").as_deref(), Some("sent"));
    assert_eq!(store.delivery_statuses()["r1"].source_timestamp, "T1");
    assert_eq!(store.connection_status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_delivery_failed_event_records_and_notifies() {
    let connector = ScriptedConnector::new([Script::Hold(vec![
        established(),
        delivery_failed("r1", "p1", "Jane"),
    ])]);
    let (store, navigation) = store_for(&connector, Locale::En);
    let mut requests = navigation.subscribe();

    store.connect();
    settle().await;

    assert_eq!(store.failed_count(), 1);
    let failure = &store.failed_reminders()[0];
    assert_eq!(failure.reminder_id, "r1");
    assert_eq!(failure.patient_id, "p1");
    assert_eq!(failure.error, "bad number");

    let toasts = store.toasts().toasts();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].kind, ToastKind::Error);
    assert!(toasts[0].message.contains("Jane"));

    // "View details" asks the application to open the patient.
    assert!(store.toasts().activate(toasts[0].id));
    assert_eq!(
        requests.try_recv().unwrap(),
        NavigationRequest::Patient {
            patient_id: "p1".to_string()
        }
    );
    assert!(store.toasts().toasts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failure_toast_is_localized_and_auto_dismissed() {
    let connector = ScriptedConnector::new([Script::Hold(vec![
        established(),
        delivery_failed("r1", "p1", "Siti"),
    ])]);
    let (store, _nav) = store_for(&connector, Locale::Id);

    store.connect();
    settle().await;

    let toasts = store.toasts().toasts();
    assert_eq!(toasts[0].message, "Pengiriman pengingat gagal untuk Siti");
    assert_eq!(
        toasts[0].action.as_ref().map(|a| a.label.as_str()),
        Some("Lihat detail")
    );

    tokio::time::sleep(Duration::from_millis(5000)).await;
    assert!(store.toasts().toasts().is_empty());
    // The failure list outlives the toast.
    assert_eq!(store.failed_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connection_status_mirrors_transport() {
    let connector = ScriptedConnector::new([Script::Hold(vec![established()])]);
    let (store, _nav) = store_for(&connector, Locale::En);
    let mut changes = store.subscribe_connection_status();

    assert_eq!(store.connection_status(), ConnectionStatus::Disconnected);
    store.connect();
    assert_eq!(store.connection_status(), ConnectionStatus::Connecting);
    assert!(changes.has_changed().unwrap());

    settle().await;
    assert_eq!(store.connection_status(), ConnectionStatus::Connected);

    store.disconnect();
    assert_eq!(store.connection_status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_status_subscribers_see_each_update() {
    let connector = ScriptedConnector::new([Script::Hold(vec![
        established(),
        status_updated("r1", "queued", "T1"),
    ])]);
    let (store, _nav) = store_for(&connector, Locale::En);
    let mut statuses = store.subscribe_statuses();
    let before = store.delivery_statuses();

    store.connect();
    settle().await;

    assert!(statuses.has_changed().unwrap());
    let after = Arc::clone(&*statuses.borrow_and_update());
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after["r1"].status, "queued");
}

#[tokio::test(start_paused = true)]
async fn test_reset_after_logout() {
    let connector = ScriptedConnector::new([Script::Hold(vec![
        established(),
        status_updated("r1", "sent", "T1"),
        delivery_failed("r2", "p2", "Jane"),
    ])]);
    let (store, _nav) = store_for(&connector, Locale::En);

    store.connect();
    settle().await;
    store.disconnect();
    store.reset();

    assert_eq!(store.status("r1"), None);
    assert_eq!(store.failed_count(), 0);
    assert_eq!(store.connection_status(), ConnectionStatus::Disconnected);
}
