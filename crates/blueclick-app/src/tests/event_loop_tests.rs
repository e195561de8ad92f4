use std::time::Duration;

use blueclick_config::ScriptRecord;
use blueclick_config::blob::encode;
use blueclick_config::EmbeddedScript;
use blueclick_types::{AppEvent, Point, ScanMode};
use image::{ImageFormat, Rgba, RgbaImage};

use super::{Harness, pattern, screen_with_target};
use crate::embedded::load_blob;

fn is_status(mode: ScanMode) -> impl Fn(&AppEvent) -> bool {
    move |e| matches!(e, AppEvent::StatusUpdate { mode: m, .. } if *m == mode)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_hotkey_pass_clicks_target() {
    let h = Harness::new(screen_with_target(), true);
    h.send(AppEvent::SetMode(ScanMode::Hotkey)).await;
    h.expect(is_status(ScanMode::Hotkey)).await;

    h.send(AppEvent::HotkeyTriggered).await;
    let event = h
        .expect(|e| matches!(e, AppEvent::PassCompleted(_)))
        .await;

    let AppEvent::PassCompleted(summary) = event else {
        unreachable!()
    };
    assert_eq!(summary.found, 1);
    assert_eq!(summary.acted, 1);
    assert!(!summary.roi);
    assert_eq!(h.driver.clicks(), vec![Point::new(68, 56)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_trigger_ignored_outside_hotkey_mode() {
    let h = Harness::new(screen_with_target(), true);
    h.send(AppEvent::SetMode(ScanMode::Off)).await;
    h.expect(is_status(ScanMode::Off)).await;

    h.send(AppEvent::HotkeyTriggered).await;
    // Round trip through the loop so the trigger has been handled
    h.send(AppEvent::SetMode(ScanMode::Off)).await;
    h.expect(is_status(ScanMode::Off)).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.driver.clicks().is_empty());
    assert_eq!(h.state.engine.session().lock().await.stats.passes, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_auto_mode_reports_passes_and_stops() {
    let h = Harness::new(screen_with_target(), true);
    h.send(AppEvent::SetMode(ScanMode::Auto)).await;

    h.expect(|e| matches!(e, AppEvent::PassCompleted(s) if s.acted == 1))
        .await;
    assert_eq!(h.driver.clicks(), vec![Point::new(68, 56)]);

    h.send(AppEvent::StopRequested).await;
    h.expect(is_status(ScanMode::Off)).await;
    assert_eq!(h.state.engine.session().lock().await.mode(), ScanMode::Off);

    let token = h.state.auto_cancel.lock().unwrap().clone().unwrap();
    assert!(token.is_cancelled());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_auto_restarts_after_quick_toggle() {
    let h = Harness::new(RgbaImage::from_pixel(200, 150, Rgba([30, 30, 30, 255])), true);
    h.send(AppEvent::SetMode(ScanMode::Auto)).await;
    h.send(AppEvent::SetMode(ScanMode::Off)).await;
    h.send(AppEvent::SetMode(ScanMode::Auto)).await;
    h.expect(is_status(ScanMode::Auto)).await;
    h.expect(is_status(ScanMode::Off)).await;
    h.expect(is_status(ScanMode::Auto)).await;

    let before = h.state.engine.session().lock().await.stats.passes;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let after = h.state.engine.session().lock().await.stats.passes;
    assert!(after > before, "auto loop did not resume");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_threshold_update_reaches_session_and_config() {
    let h = Harness::new(screen_with_target(), true);
    h.send(AppEvent::UpdateThreshold(1.7)).await;
    h.send(AppEvent::SetMode(ScanMode::Off)).await;
    h.expect(is_status(ScanMode::Off)).await;

    assert_eq!(h.state.engine.session().lock().await.settings.threshold, 1.0);
    assert_eq!(h.state.config.read().await.similarity_threshold, 1.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_command_line_threshold_overrides_loaded_script() {
    let h = Harness::new(screen_with_target(), false);
    let dir = tempfile::tempdir().unwrap();
    pattern().save(dir.path().join("target.png")).unwrap();
    let record = ScriptRecord {
        name: "strict".into(),
        templates: vec!["target.png".into()],
        threshold: Some(0.95),
        ..Default::default()
    };
    let script_path = dir.path().join("strict.json");
    record.save(&script_path).unwrap();

    // Startup order: script first, then the --threshold value
    h.send(AppEvent::LoadScript(script_path)).await;
    h.expect(|e| matches!(e, AppEvent::ScriptLoaded { .. }))
        .await;
    assert_eq!(h.state.engine.session().lock().await.settings.threshold, 0.95);

    h.send(AppEvent::UpdateThreshold(0.6)).await;
    h.send(AppEvent::SetMode(ScanMode::Off)).await;
    h.expect(is_status(ScanMode::Off)).await;
    assert_eq!(h.state.engine.session().lock().await.settings.threshold, 0.6);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_load_script_replaces_templates() {
    let h = Harness::new(screen_with_target(), false);
    let dir = tempfile::tempdir().unwrap();
    pattern().save(dir.path().join("target.png")).unwrap();

    let record = ScriptRecord {
        name: "daily".into(),
        templates: vec!["target.png".into(), "missing.png".into()],
        ..Default::default()
    };
    let script_path = dir.path().join("daily.json");
    record.save(&script_path).unwrap();

    h.send(AppEvent::LoadScript(script_path.clone())).await;
    let event = h
        .expect(|e| matches!(e, AppEvent::ScriptLoaded { .. }))
        .await;
    let AppEvent::ScriptLoaded { name, templates } = event else {
        unreachable!()
    };
    assert_eq!(name, "daily");
    assert_eq!(templates, 1);

    assert_eq!(h.state.engine.session().lock().await.templates.len(), 1);
    assert_eq!(
        h.state.config.read().await.last_script.as_deref(),
        Some(script_path.as_path())
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bad_script_keeps_loop_alive() {
    let h = Harness::new(screen_with_target(), true);
    h.send(AppEvent::LoadScript("/no/such/script.json".into()))
        .await;
    let event = h
        .expect(|e| matches!(e, AppEvent::StatusUpdate { .. }))
        .await;
    let AppEvent::StatusUpdate { status, .. } = event else {
        unreachable!()
    };
    assert!(status.contains("script.json"));

    h.send(AppEvent::SetMode(ScanMode::Hotkey)).await;
    h.expect(is_status(ScanMode::Hotkey)).await;
    assert_eq!(h.state.engine.session().lock().await.templates.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_blob_carries_script_and_template() {
    let dir = tempfile::tempdir().unwrap();
    let mut png = Vec::new();
    pattern()
        .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();

    let record = ScriptRecord {
        name: "runner".into(),
        click_count: 3,
        ..Default::default()
    };
    let blob = encode(&EmbeddedScript::new(record, Some(&png))).unwrap();
    let path = dir.path().join("runner.dat");
    std::fs::write(&path, blob).unwrap();

    let (record, templates) = load_blob(&path).unwrap();
    assert_eq!(record.name, "runner");
    assert_eq!(record.click_count, 3);
    assert_eq!(templates.len(), 1);
    assert_eq!((templates[0].width(), templates[0].height()), (16, 12));

    std::fs::write(&path, "not a blob").unwrap();
    assert!(load_blob(&path).is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_event_ends_loop() {
    let h = Harness::new(screen_with_target(), true);
    h.send(AppEvent::SetMode(ScanMode::Auto)).await;
    h.expect(is_status(ScanMode::Auto)).await;
    h.send(AppEvent::Shutdown).await;

    tokio::time::timeout(Duration::from_secs(2), async {
        // Sends fail once the loop has dropped its receiver
        while h.control.send(AppEvent::SetMode(ScanMode::Auto)).await.is_ok() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let token = h.state.auto_cancel.lock().unwrap().clone().unwrap();
    assert!(token.is_cancelled());
}
