use crate::signal::ChangeSignal;

#[tokio::test]
async fn first_notification_always_fires() {
    let signal = ChangeSignal::new();
    let mut rx = signal.subscribe();
    assert!(signal.notify_children_changed("dev-1", 1, None, 1));
    let n = rx.recv().await.unwrap();
    assert_eq!(n.device_id, "dev-1");
    assert_eq!(n.storage_id, Some(1));
}

#[tokio::test]
async fn repeat_notification_within_window_is_debounced_unless_counter_advanced() {
    let signal = ChangeSignal::new();
    let mut rx = signal.subscribe();
    assert!(signal.notify_children_changed("dev-1", 1, Some(5), 1));
    rx.recv().await.unwrap();

    assert!(!signal.notify_children_changed("dev-1", 1, Some(5), 1));
    assert!(rx.try_recv().is_err());

    assert!(signal.notify_children_changed("dev-1", 1, Some(5), 2));
    rx.recv().await.unwrap();
}

#[tokio::test]
async fn distinct_keys_are_independent() {
    let signal = ChangeSignal::new();
    let mut rx = signal.subscribe();
    assert!(signal.notify_children_changed("dev-1", 1, Some(5), 1));
    rx.recv().await.unwrap();
    assert!(signal.notify_children_changed("dev-1", 1, Some(6), 1));
    rx.recv().await.unwrap();
}

#[tokio::test]
async fn working_set_notification_bypasses_debounce() {
    let signal = ChangeSignal::new();
    let mut rx = signal.subscribe();
    signal.notify_working_set("dev-1");
    signal.notify_working_set("dev-1");
    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.storage_id, None);
    assert_eq!(second.storage_id, None);
}

