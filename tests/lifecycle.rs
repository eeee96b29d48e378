//! Serve/signal race and the shutdown sequence.

use std::sync::Arc;
use std::time::Duration;

use proxyd::lifecycle::{ExitReason, LifecycleController};
use proxyd::store::Store;

mod common;

use common::{MockService, RecordingEngine};

#[tokio::test]
async fn test_signal_stops_a_healthy_service() {
    let store = Store::temporary().unwrap();
    let engine = Arc::new(RecordingEngine::default());
    let controller = LifecycleController::new(store.clone(), engine.clone());
    let sequence = controller.sequence();

    let termination = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        "SIGTERM"
    };
    let reason = controller
        .run(Box::new(MockService { fail_with: None }), termination)
        .await;

    assert!(matches!(reason, ExitReason::Signal("SIGTERM")));
    assert!(!reason.is_failure());
    assert!(sequence.has_run());
    assert!(store.is_closed());
    assert_eq!(engine.calls(), vec!["stop_transparent_proxy", "stop_process_manager"]);

    // a second request does nothing
    assert!(sequence.run().await.is_none());
    assert_eq!(engine.calls().len(), 2);
}

#[tokio::test]
async fn test_service_failure_is_reported() {
    let store = Store::temporary().unwrap();
    let engine = Arc::new(RecordingEngine::default());
    let controller = LifecycleController::new(store.clone(), engine.clone());
    let sequence = controller.sequence();

    let reason = controller
        .run(
            Box::new(MockService { fail_with: Some("address in use") }),
            std::future::pending(),
        )
        .await;

    assert!(matches!(reason, ExitReason::ServiceFailed(_)));
    assert!(reason.is_failure());
    assert!(sequence.has_run());
    assert!(store.is_closed());
    assert_eq!(engine.calls(), vec!["stop_transparent_proxy", "stop_process_manager"]);
}

#[tokio::test]
async fn test_running_engine_is_started_first() {
    let store = Store::temporary().unwrap();
    store.set_running(true).unwrap();
    let engine = Arc::new(RecordingEngine {
        fail_apply: true,
        ..Default::default()
    });
    let controller = LifecycleController::new(store.clone(), engine.clone());

    let termination = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        "SIGINT"
    };
    let reason = controller
        .run(Box::new(MockService { fail_with: None }), termination)
        .await;

    // a failed start is logged, serving still happens
    assert!(matches!(reason, ExitReason::Signal("SIGINT")));
    assert_eq!(
        engine.calls(),
        vec!["apply_config", "stop_transparent_proxy", "stop_process_manager"]
    );
}

#[tokio::test]
async fn test_stopped_engine_is_not_started() {
    let store = Store::temporary().unwrap();
    let engine = Arc::new(RecordingEngine::default());
    let controller = LifecycleController::new(store, engine.clone());

    controller
        .run(Box::new(MockService { fail_with: None }), async { "SIGHUP" })
        .await;

    assert!(!engine.calls().contains(&"apply_config"));
}
