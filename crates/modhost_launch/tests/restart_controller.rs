//! Restart directive decisions and refresh handling against a scripted host

mod common;

use common::{Call, ScriptedHost};
use modhost_launch::host::{HostHandle, LifecycleState, StopEvent, ROOT_ARTIFACT_ID};
use modhost_launch::runtime::{RestartController, RestartDirective, RestartTimings};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn timings() -> RestartTimings {
    RestartTimings {
        update_grace: Duration::from_millis(50),
        update_poll: Duration::from_millis(10),
        stopping_wait: Duration::from_millis(80),
        root_refresh_wait: Duration::from_millis(100),
        refresh_ack_wait: Duration::from_millis(100),
        state_poll: Duration::from_millis(5),
        refresh_timeout: Duration::from_millis(20),
    }
}

fn controller(host: ScriptedHost) -> (Arc<ScriptedHost>, RestartController) {
    let host = Arc::new(host);
    let controller = RestartController::new(HostHandle::new(host.clone()), timings());
    (host, controller)
}

async fn directive_for(events: &[StopEvent], after: LifecycleState) -> RestartDirective {
    let tmp = tempfile::tempdir().unwrap();
    let (_, controller) = controller(
        ScriptedHost::new(tmp.path())
            .with_stop_events(events)
            .with_state_after_stop(after),
    );
    controller.wait_for_directive().await
}

#[tokio::test]
async fn test_stop_events_map_to_directives() {
    assert_eq!(
        directive_for(&[StopEvent::Stopped], LifecycleState::Resolved).await,
        RestartDirective::Exit
    );
    assert_eq!(
        directive_for(&[StopEvent::SystemRefreshed], LifecycleState::Resolved).await,
        RestartDirective::RestartNewProcess
    );
    assert_eq!(
        directive_for(&[StopEvent::BootclasspathModified], LifecycleState::Resolved).await,
        RestartDirective::RestartNewLoader
    );
    assert_eq!(
        directive_for(&[StopEvent::StoppedUpdate], LifecycleState::Resolved).await,
        RestartDirective::RestartSameLoader
    );
}

#[tokio::test]
async fn test_host_that_restarts_itself_is_watched_again() {
    let directive = directive_for(
        &[StopEvent::StoppedUpdate, StopEvent::Stopped],
        LifecycleState::Active,
    )
    .await;
    assert_eq!(directive, RestartDirective::Exit);
}

#[tokio::test]
async fn test_unknown_stop_codes_are_ignored() {
    let directive = directive_for(
        &[StopEvent::Other(7), StopEvent::WaitTimedOut, StopEvent::SystemRefreshed],
        LifecycleState::Resolved,
    )
    .await;
    assert_eq!(directive, RestartDirective::RestartNewProcess);
}

#[tokio::test]
async fn test_host_stuck_stopping_forces_exit() {
    let started = Instant::now();
    let directive = directive_for(&[StopEvent::StoppedUpdate], LifecycleState::Stopping).await;
    assert_eq!(directive, RestartDirective::Exit);
    assert!(started.elapsed() >= timings().update_grace + timings().stopping_wait);
}

#[tokio::test]
async fn test_empty_closure_skips_refresh() {
    let tmp = tempfile::tempdir().unwrap();
    let (host, controller) = controller(ScriptedHost::new(tmp.path()));
    assert_eq!(controller.refresh(&[]).await, None);
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_root_refresh_without_stop_forces_exit() {
    let tmp = tempfile::tempdir().unwrap();
    let (host, controller) = controller(ScriptedHost::new(tmp.path()));

    let started = Instant::now();
    let directive = controller.refresh(&[ROOT_ARTIFACT_ID]).await;
    assert_eq!(directive, Some(RestartDirective::Exit));
    assert!(started.elapsed() >= timings().root_refresh_wait);
    assert_eq!(host.calls(), vec![Call::Refresh(vec![ROOT_ARTIFACT_ID])]);
}

#[tokio::test]
async fn test_root_refresh_stop_becomes_directive() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, controller) = controller(
        ScriptedHost::new(tmp.path()).with_stop_events(&[StopEvent::SystemRefreshed]),
    );
    assert_eq!(
        controller.refresh(&[ROOT_ARTIFACT_ID]).await,
        Some(RestartDirective::RestartNewProcess)
    );
}

#[tokio::test]
async fn test_artifact_refresh_waits_for_ack() {
    let tmp = tempfile::tempdir().unwrap();
    let (host, controller) = controller(
        ScriptedHost::new(tmp.path()).with_installed("ui", "3.0.0", "bin/ui-3.0.0"),
    );

    let started = Instant::now();
    assert_eq!(controller.refresh(&[1]).await, None);
    assert!(started.elapsed() < timings().refresh_ack_wait);
    assert_eq!(host.calls(), vec![Call::Refresh(vec![1])]);
}

#[tokio::test]
async fn test_missing_ack_falls_back_to_state_watch() {
    let tmp = tempfile::tempdir().unwrap();
    let (host, controller) = controller(
        ScriptedHost::new(tmp.path())
            .with_installed("ui", "3.0.0", "bin/ui-3.0.0")
            .without_refresh_ack(),
    );
    host.set_state(LifecycleState::Active);

    let started = Instant::now();
    assert_eq!(controller.refresh(&[1]).await, None);
    assert!(started.elapsed() >= timings().refresh_ack_wait);
}
