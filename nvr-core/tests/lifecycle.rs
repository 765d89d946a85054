//! Lifecycle tests for PluginManager
//!
//! Dependency ordering, cycle handling, idempotent start, teardown order,
//! failure containment and cancellation of in-flight starts.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{Journal, StopHook, eventually, manager, mock, test_config};
use nvr_core::events::EventPattern;
use nvr_core::{LifecycleState, ManagerConfig, ManagerError, MemoryStore, PluginManager, Store};
use nvr_plugin_api::{Event, HealthState};

#[tokio::test]
async fn start_all_follows_dependency_order() {
    let journal = Journal::new();
    let manager = manager();
    // installed in reverse order on purpose
    mock("recorder", &journal)
        .depends_on("detector")
        .install(&manager)
        .await;
    mock("detector", &journal)
        .depends_on("camera-hub")
        .install(&manager)
        .await;
    mock("camera-hub", &journal).install(&manager).await;

    let report = manager.start_all().await;
    assert_eq!(report.started.len(), 3);
    assert!(report.failed.is_empty());

    let hub = journal.position("camera-hub:start").unwrap();
    let detector_init = journal.position("detector:initialize").unwrap();
    let detector = journal.position("detector:start").unwrap();
    let recorder_init = journal.position("recorder:initialize").unwrap();
    assert!(hub < detector_init);
    assert!(detector < recorder_init);

    for id in ["camera-hub", "detector", "recorder"] {
        assert_eq!(manager.state(id).unwrap(), LifecycleState::Running);
    }
}

#[tokio::test]
async fn start_brings_up_dependencies_first() {
    let journal = Journal::new();
    let manager = manager();
    mock("a", &journal).critical().install(&manager).await;
    mock("b", &journal).depends_on("a").install(&manager).await;

    manager.start("b").await.unwrap();

    assert!(journal.position("a:start").unwrap() < journal.position("b:initialize").unwrap());
    assert_eq!(manager.state("a").unwrap(), LifecycleState::Running);
    assert_eq!(manager.state("b").unwrap(), LifecycleState::Running);
}

#[tokio::test]
async fn cycle_is_reported_at_install_and_never_started() {
    let journal = Journal::new();
    let manager = manager();

    let first = mock("a", &journal).depends_on("b").install(&manager).await;
    assert!(matches!(
        first.issues.as_slice(),
        [ManagerError::DependencyMissing { missing, .. }] if missing == &["b".to_string()]
    ));

    let second = mock("b", &journal).depends_on("a").install(&manager).await;
    assert!(
        second
            .issues
            .iter()
            .any(|e| matches!(e, ManagerError::DependencyCycle { members, .. } if members.len() == 2))
    );

    let report = manager.start_all().await;
    assert!(report.started.is_empty());
    assert!(report.skipped.contains(&"a".to_string()));
    assert!(report.skipped.contains(&"b".to_string()));

    let err = manager.start("a").await.unwrap_err();
    assert!(matches!(err, ManagerError::DependencyCycle { .. }));
    assert_eq!(manager.state("a").unwrap(), LifecycleState::Installed);
    assert_eq!(manager.state("b").unwrap(), LifecycleState::Installed);
    assert!(journal.entries().is_empty());
    assert!(manager.status("a").unwrap().error_message.is_some());
}

#[tokio::test]
async fn missing_dependency_blocks_start() {
    let journal = Journal::new();
    let manager = manager();
    mock("alerts", &journal)
        .depends_on("smtp")
        .install(&manager)
        .await;

    let err = manager.start("alerts").await.unwrap_err();
    assert!(matches!(err, ManagerError::DependencyMissing { .. }));
    assert!(err.to_string().contains("smtp"));
    assert_eq!(manager.state("alerts").unwrap(), LifecycleState::Installed);
}

#[tokio::test]
async fn installing_the_missing_dependency_clears_the_error() {
    let journal = Journal::new();
    let manager = manager();
    mock("alerts", &journal)
        .depends_on("smtp")
        .install(&manager)
        .await;
    assert!(manager.status("alerts").unwrap().error_message.is_some());

    let outcome = mock("smtp", &journal).install(&manager).await;
    assert!(outcome.issues.is_empty());
    assert_eq!(manager.status("alerts").unwrap().error_message, None);

    manager.start("alerts").await.unwrap();
    assert_eq!(manager.state("alerts").unwrap(), LifecycleState::Running);
}

#[tokio::test]
async fn duplicate_install_is_rejected() {
    let journal = Journal::new();
    let manager = manager();
    mock("archive", &journal).install(&manager).await;

    let err = manager
        .register_builtin(mock("archive", &journal).factory())
        .await
        .unwrap_err();
    assert!(matches!(err, ManagerError::DuplicateId { .. }));
}

#[tokio::test]
async fn starting_twice_does_not_duplicate_subscriptions() {
    let journal = Journal::new();
    let manager = manager();
    mock("motion-log", &journal)
        .subscribe(&["motion"])
        .install(&manager)
        .await;

    manager.start("motion-log").await.unwrap();
    manager.start("motion-log").await.unwrap();

    assert_eq!(manager.bus().subscription_count("motion-log"), 1);
    assert_eq!(journal.count("motion-log:start"), 1);
    assert_eq!(manager.status("motion-log").unwrap().methods.len(), 4);
}

#[tokio::test]
async fn stop_unregisters_everything_before_the_stop_hook() {
    let journal = Journal::new();
    let manager = manager();

    let seen_at_stop: Arc<Mutex<Option<(usize, usize)>>> = Arc::default();
    let hook: StopHook = {
        let seen = seen_at_stop.clone();
        let manager = manager.clone();
        Arc::new(move |id: &str| {
            let subs = manager.bus().subscription_count(id);
            let methods = manager.methods(id).len();
            *seen.lock().unwrap() = Some((subs, methods));
        })
    };
    mock("motion-log", &journal)
        .subscribe(&["motion"])
        .with(|b| b.on_stop = Some(hook))
        .install(&manager)
        .await;

    manager.start("motion-log").await.unwrap();
    manager.publish(Event::new("motion"));
    assert!(eventually(|| journal.handled() == 1).await);

    manager.stop("motion-log").await.unwrap();
    assert_eq!(*seen_at_stop.lock().unwrap(), Some((0, 0)));

    let report = manager.publish(Event::new("motion"));
    assert_eq!(manager.bus().subscription_count("motion-log"), 0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(journal.handled(), 1);
    // only the stream fanout pump still listens
    assert!(report.delivered <= 1);
    assert_eq!(manager.state("motion-log").unwrap(), LifecycleState::Stopped);
}

#[tokio::test]
async fn disable_stops_dependents_first() {
    let journal = Journal::new();
    let manager = manager();
    mock("a", &journal).critical().install(&manager).await;
    mock("b", &journal).depends_on("a").install(&manager).await;
    manager.start("b").await.unwrap();

    manager.disable("a").await.unwrap();

    assert!(journal.position("b:stop").unwrap() < journal.position("a:stop").unwrap());
    let a = manager.status("a").unwrap();
    let b = manager.status("b").unwrap();
    assert_eq!(a.state, LifecycleState::Stopped);
    assert_eq!(b.state, LifecycleState::Stopped);
    assert!(!a.enabled);
    assert!(b.enabled);

    let err = manager.start("a").await.unwrap_err();
    assert!(matches!(err, ManagerError::PluginDisabled { .. }));

    manager.enable("a").await.unwrap();
    assert_eq!(manager.state("a").unwrap(), LifecycleState::Running);
}

#[tokio::test]
async fn failing_start_leaves_plugin_in_error() {
    let journal = Journal::new();
    let manager = manager();
    mock("onvif", &journal)
        .subscribe(&["camera.*"])
        .with(|b| b.fail_start = true)
        .install(&manager)
        .await;

    let err = manager.start("onvif").await.unwrap_err();
    assert!(matches!(err, ManagerError::PluginFailed { phase: "start", .. }));
    assert!(err.to_string().contains("camera unreachable"));

    let status = manager.status("onvif").unwrap();
    assert_eq!(status.state, LifecycleState::Error);
    assert_eq!(status.health.state, HealthState::Unhealthy);
    assert!(status.error_message.unwrap().contains("camera unreachable"));
    assert_eq!(manager.bus().subscription_count("onvif"), 0);
    assert!(manager.methods("onvif").is_empty());

    // Error -> Stopped through an explicit stop
    manager.stop("onvif").await.unwrap();
    assert_eq!(manager.state("onvif").unwrap(), LifecycleState::Stopped);
}

#[tokio::test]
async fn failing_initialize_is_reported_with_its_phase() {
    let journal = Journal::new();
    let manager = manager();
    mock("webhook", &journal)
        .with(|b| b.fail_initialize = true)
        .install(&manager)
        .await;

    let err = manager.start("webhook").await.unwrap_err();
    assert!(matches!(
        err,
        ManagerError::PluginFailed {
            phase: "initialize",
            ..
        }
    ));
    assert_eq!(journal.count("webhook:start"), 0);
}

#[tokio::test]
async fn slow_start_times_out() {
    let journal = Journal::new();
    let manager = manager();
    mock("rtsp", &journal)
        .with(|b| b.start_delay = Some(Duration::from_secs(5)))
        .install(&manager)
        .await;

    let err = manager.start("rtsp").await.unwrap_err();
    assert!(matches!(err, ManagerError::StartTimeout { .. }));
    assert_eq!(manager.state("rtsp").unwrap(), LifecycleState::Error);
}

#[tokio::test]
async fn panicking_start_is_contained() {
    let journal = Journal::new();
    let manager = manager();
    mock("fragile", &journal)
        .with(|b| b.panic_in_start = true)
        .install(&manager)
        .await;
    mock("steady", &journal).install(&manager).await;

    let err = manager.start("fragile").await.unwrap_err();
    assert!(matches!(err, ManagerError::PluginFault { .. }));
    assert!(err.to_string().contains("start exploded"));
    assert_eq!(manager.state("fragile").unwrap(), LifecycleState::Error);

    manager.start("steady").await.unwrap();
    assert_eq!(manager.state("steady").unwrap(), LifecycleState::Running);
}

#[tokio::test]
async fn failed_dependency_keeps_dependent_installed() {
    let journal = Journal::new();
    let manager = manager();
    mock("db", &journal)
        .with(|b| b.fail_start = true)
        .install(&manager)
        .await;
    mock("api", &journal).depends_on("db").install(&manager).await;

    let err = manager.start("api").await.unwrap_err();
    assert!(matches!(err, ManagerError::DependencyUnavailable { ref dependency, .. } if dependency == "db"));
    assert_eq!(manager.state("db").unwrap(), LifecycleState::Error);
    assert_eq!(manager.state("api").unwrap(), LifecycleState::Installed);

    let report = manager.start_all().await;
    assert_eq!(report.failed.len(), 2);
}

#[tokio::test]
async fn stalled_stop_still_ends_stopped() {
    let journal = Journal::new();
    let manager = manager();
    mock("uploader", &journal)
        .with(|b| b.stop_delay = Some(Duration::from_secs(5)))
        .install(&manager)
        .await;
    manager.start("uploader").await.unwrap();

    let err = manager.stop("uploader").await.unwrap_err();
    assert!(matches!(err, ManagerError::StopTimeout { .. }));
    assert_eq!(manager.state("uploader").unwrap(), LifecycleState::Stopped);

    // a fresh instance comes up on the next start
    manager.start("uploader").await.unwrap();
    assert_eq!(manager.state("uploader").unwrap(), LifecycleState::Running);
}

#[tokio::test]
async fn panicking_stop_still_ends_stopped() {
    let journal = Journal::new();
    let manager = manager();
    mock("fragile", &journal)
        .with(|b| b.panic_in_stop = true)
        .install(&manager)
        .await;
    manager.start("fragile").await.unwrap();

    let err = manager.stop("fragile").await.unwrap_err();
    assert!(matches!(err, ManagerError::PluginFault { phase: "stop", .. }));
    assert_eq!(manager.state("fragile").unwrap(), LifecycleState::Stopped);
}

#[tokio::test]
async fn stop_cancels_an_in_flight_start() {
    let journal = Journal::new();
    let config = ManagerConfig {
        start_timeout: Duration::from_secs(10),
        ..test_config()
    };
    let manager = PluginManager::new(config, Arc::new(MemoryStore::new()));
    mock("slowpoke", &journal)
        .with(|b| b.start_delay = Some(Duration::from_secs(5)))
        .install(&manager)
        .await;

    let starting = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.start("slowpoke").await })
    };
    assert!(
        eventually(|| manager.state("slowpoke").unwrap() == LifecycleState::Starting).await
    );

    tokio::time::timeout(Duration::from_secs(2), manager.stop("slowpoke"))
        .await
        .expect("stop should not wait for the start deadline")
        .unwrap();

    let result = starting.await.unwrap();
    assert!(matches!(result, Err(ManagerError::Cancelled { .. })));
    assert_eq!(manager.state("slowpoke").unwrap(), LifecycleState::Stopped);
}

#[tokio::test]
async fn stop_during_dependency_startup_abandons_the_start() {
    let journal = Journal::new();
    let config = ManagerConfig {
        start_timeout: Duration::from_secs(10),
        ..test_config()
    };
    let manager = PluginManager::new(config, Arc::new(MemoryStore::new()));
    mock("camera-hub", &journal)
        .with(|b| b.start_delay = Some(Duration::from_millis(500)))
        .install(&manager)
        .await;
    mock("recorder", &journal)
        .depends_on("camera-hub")
        .install(&manager)
        .await;

    let starting = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.start("recorder").await })
    };
    assert!(
        eventually(|| manager.state("camera-hub").unwrap() == LifecycleState::Starting).await
    );

    manager.stop("recorder").await.unwrap();

    let result = starting.await.unwrap();
    assert!(matches!(result, Err(ManagerError::Cancelled { .. })));
    assert_eq!(manager.state("recorder").unwrap(), LifecycleState::Installed);
    assert_eq!(journal.count("recorder:start"), 0);
    // the dependency finishes its own start
    assert_eq!(manager.state("camera-hub").unwrap(), LifecycleState::Running);
}

#[tokio::test]
async fn start_after_a_stop_is_not_cancelled() {
    let journal = Journal::new();
    let manager = manager();
    mock("archive", &journal).install(&manager).await;

    manager.stop("archive").await.unwrap();
    manager.start("archive").await.unwrap();

    assert_eq!(manager.state("archive").unwrap(), LifecycleState::Running);
}

#[tokio::test]
async fn restart_runs_stop_then_start() {
    let journal = Journal::new();
    let manager = manager();
    mock("archive", &journal).install(&manager).await;
    manager.start("archive").await.unwrap();

    manager.restart("archive").await.unwrap();

    assert_eq!(
        journal.entries(),
        vec![
            "archive:initialize",
            "archive:start",
            "archive:stop",
            "archive:initialize",
            "archive:start",
        ]
    );
    assert_eq!(manager.bus().subscription_count("archive"), 0);
    assert_eq!(manager.methods("archive").len(), 4);
}

#[tokio::test]
async fn uninstall_requires_an_inactive_plugin() {
    let journal = Journal::new();
    let store = Arc::new(MemoryStore::new());
    let manager = PluginManager::new(test_config(), store.clone());
    mock("archive", &journal).install(&manager).await;
    manager.start("archive").await.unwrap();
    manager.disable("archive").await.unwrap();
    assert!(store.get("plugin-state/archive").await.unwrap().is_some());

    manager.enable("archive").await.unwrap();
    let err = manager.uninstall("archive").await.unwrap_err();
    assert!(matches!(
        err,
        ManagerError::InvalidState {
            state: LifecycleState::Running,
            ..
        }
    ));

    manager.stop("archive").await.unwrap();
    manager.uninstall("archive").await.unwrap();

    assert!(matches!(
        manager.status("archive"),
        Err(ManagerError::NotFound { .. })
    ));
    assert!(store.get("plugin-state/archive").await.unwrap().is_none());
}

#[tokio::test]
async fn lifecycle_events_are_published() {
    let journal = Journal::new();
    let manager = manager();
    let (_, mut rx) = manager.bus().subscribe_system(
        "test",
        vec![EventPattern::Namespace("plugin".into())],
        32,
    );
    mock("archive", &journal).install(&manager).await;
    mock("broken", &journal)
        .with(|b| b.fail_start = true)
        .install(&manager)
        .await;

    manager.start("archive").await.unwrap();
    manager.stop("archive").await.unwrap();
    let _ = manager.start("broken").await;

    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        let plugin = event.payload["plugin"].as_str().unwrap_or_default().to_string();
        seen.push(format!("{}:{plugin}", event.event_type));
    }
    assert_eq!(
        seen,
        vec![
            "plugin.started:archive",
            "plugin.stopped:archive",
            "plugin.error:broken",
        ]
    );
}

#[tokio::test]
async fn shutdown_stops_in_reverse_order() {
    let journal = Journal::new();
    let manager = manager();
    mock("a", &journal).install(&manager).await;
    mock("b", &journal).depends_on("a").install(&manager).await;
    manager.start_all().await;

    let failures = manager.shutdown().await;
    assert!(failures.is_empty());
    assert!(journal.position("b:stop").unwrap() < journal.position("a:stop").unwrap());
    assert!(
        manager
            .list()
            .iter()
            .all(|p| p.state == LifecycleState::Stopped)
    );
}
