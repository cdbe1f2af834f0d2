//! Contract Test: Region Removal and Expiry
//!
//! This test verifies that regions can leave a live session.
//!
//! Constraints verified:
//! - Removed regions are unregistered with the platform and forgotten
//! - The rest of the session keeps delivering
//! - A failed removal leaves the session unchanged
//! - Removal outside an active session is a no-op
//! - Transitions observed after a region's expiry are discarded

mod common;

use common::*;
use geofence_core::traits::{GeofenceManagement, RawTransition};
use geofence_core::{ErrorKind, MonitoringState, PlatformError, TransitionKind};
use std::time::{Duration, Instant};

#[tokio::test]
async fn removed_region_stops_reporting() {
    let harness = Harness::start(LONG_DWELL);
    let delegate = RecordingDelegate::new();
    harness.register(delegate.clone()).await;
    harness
        .handle
        .start_monitoring(vec![region("home"), region("work")])
        .await
        .unwrap();

    harness
        .handle
        .remove_regions(&["work", "atlantis", "work"])
        .await
        .expect("removal succeeds");

    assert_eq!(harness.control.removed(), vec!["work"]);
    assert_eq!(harness.control.end_calls(), 0);
    assert!(harness.handle.is_monitoring());
    assert!(!harness.handle.contains_region("work").await.unwrap());
    assert!(harness.handle.contains_region("home").await.unwrap());

    harness.control.emit("work", TransitionKind::Enter);
    harness.control.emit("home", TransitionKind::Enter);

    assert!(wait_until(|| delegate.events().len() == 1).await);
    assert!(wait_until(|| harness.handle.diagnostics().discarded_unknown_region == 1).await);
    assert_eq!(delegate.kinds_for("home"), vec![TransitionKind::Enter]);
}

#[tokio::test]
async fn removing_every_region_keeps_session_open() {
    let harness = Harness::start(LONG_DWELL);
    harness.handle.start_monitoring(vec![region("home")]).await.unwrap();

    harness.handle.remove_regions(&["home"]).await.unwrap();

    assert!(harness.handle.is_monitoring());
    assert!(harness.handle.regions().await.unwrap().is_empty());

    harness.handle.stop_monitoring().await.unwrap();
    assert_eq!(harness.control.end_calls(), 1);
}

#[tokio::test]
async fn unknown_ids_skip_the_platform() {
    let harness = Harness::start(LONG_DWELL);
    harness.handle.start_monitoring(vec![region("home")]).await.unwrap();

    harness.handle.remove_regions(&["atlantis"]).await.unwrap();
    harness.handle.remove_regions::<&str>(&[]).await.unwrap();

    assert!(harness.control.removed().is_empty());
    assert!(harness.handle.contains_region("home").await.unwrap());
}

#[tokio::test]
async fn removal_while_idle_is_noop() {
    let harness = Harness::start(LONG_DWELL);

    harness
        .handle
        .remove_regions(&["home"])
        .await
        .expect("removal while idle resolves");

    assert_eq!(harness.handle.state(), MonitoringState::Idle);
    assert!(harness.control.removed().is_empty());
}

#[tokio::test]
async fn failed_removal_keeps_regions() {
    let harness = Harness::start(LONG_DWELL);
    let delegate = RecordingDelegate::new();
    harness.register(delegate.clone()).await;
    harness.handle.start_monitoring(vec![region("home")]).await.unwrap();
    harness
        .control
        .fail_removal_with(PlatformError::hardware_unavailable("radio off"));

    let err = harness
        .handle
        .remove_regions(&["home"])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::HardwareUnavailable);
    assert!(harness.handle.is_monitoring());
    assert!(harness.handle.contains_region("home").await.unwrap());

    harness.control.emit("home", TransitionKind::Enter);
    assert!(wait_until(|| delegate.events().len() == 1).await);
}

#[tokio::test]
async fn expired_region_transitions_are_discarded() {
    let harness = Harness::start(LONG_DWELL);
    let delegate = RecordingDelegate::new();
    harness.register(delegate.clone()).await;

    let pop_up = region("pop-up").with_expiry(Duration::from_secs(60));
    harness
        .handle
        .start_monitoring(vec![pop_up, region("home")])
        .await
        .unwrap();

    let now = Instant::now();
    let later = now + Duration::from_secs(3600);
    harness
        .control
        .emit_raw(RawTransition::at("pop-up", TransitionKind::Enter, now));
    harness
        .control
        .emit_raw(RawTransition::at("pop-up", TransitionKind::Exit, later));
    harness
        .control
        .emit_raw(RawTransition::at("home", TransitionKind::Enter, later));

    assert!(wait_until(|| delegate.events().len() == 2).await);
    assert!(wait_until(|| harness.handle.diagnostics().discarded_expired == 1).await);
    assert_eq!(delegate.kinds_for("pop-up"), vec![TransitionKind::Enter]);
    assert_eq!(delegate.kinds_for("home"), vec![TransitionKind::Enter]);

    // Expired regions stay registered until removed
    assert!(harness.handle.contains_region("pop-up").await.unwrap());
}

#[tokio::test]
async fn zero_expiry_is_rejected_at_start() {
    let harness = Harness::start(LONG_DWELL);
    let mut broken = region("pop-up");
    broken.expires_after_ms = Some(0);

    let err = harness
        .handle
        .start_monitoring(vec![broken])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidRegion);
    assert_eq!(harness.control.begin_calls(), 0);
}
