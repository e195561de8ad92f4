use std::time::Duration;

use blueclick_types::{AppEvent, PassSummary, ScanMode};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::controller::ChannelSet;
use crate::status::{AppStatus, status_loop};

#[tokio::test]
async fn test_blocking_thread_sends_to_async_receiver() {
    let channels = ChannelSet::new();
    let tx = channels.control.0.clone().to_sync();

    tokio::task::spawn_blocking(move || {
        tx.send(AppEvent::HotkeyTriggered).unwrap();
        tx.send(AppEvent::StopRequested).unwrap();
    });

    let rx = &channels.control.1;
    let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    let second = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert!(matches!(first, AppEvent::HotkeyTriggered));
    assert!(matches!(second, AppEvent::StopRequested));
}

#[tokio::test]
async fn test_full_status_channel_drops_instead_of_blocking() {
    let (tx, _rx) = kanal::bounded_async::<AppEvent>(1);
    assert!(tx.try_send(AppEvent::Shutdown).unwrap());
    assert!(!tx.try_send(AppEvent::Shutdown).unwrap());
}

#[tokio::test]
async fn test_status_loop_counts_outgoing_events() {
    let status = AppStatus::new();
    let (tx, rx) = kanal::bounded_async(16);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(status_loop(status.scan.clone(), rx, cancel.clone()));

    tx.send(AppEvent::PassCompleted(PassSummary {
        found: 2,
        acted: 1,
        ..Default::default()
    }))
    .await
    .unwrap();
    tx.send(AppEvent::PassFailed("capture failed".into()))
        .await
        .unwrap();
    tx.send(AppEvent::StatusUpdate {
        status: "scanning".into(),
        mode: ScanMode::Auto,
    })
    .await
    .unwrap();
    tx.send(AppEvent::ScriptLoaded {
        name: "daily".into(),
        templates: 3,
    })
    .await
    .unwrap();

    timeout(Duration::from_secs(2), async {
        while status.scan.read().await.script.is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    cancel.cancel();
    handle.await.unwrap().unwrap();

    let scan = status.scan.read().await;
    assert_eq!(scan.pass_count, 2);
    assert_eq!(scan.match_count, 2);
    assert_eq!(scan.action_count, 1);
    assert_eq!(scan.error_count, 1);
    assert_eq!(scan.mode, ScanMode::Auto);
    assert_eq!(scan.script.as_deref(), Some("daily"));
    assert!(scan.last_pass_time.is_some());
}
