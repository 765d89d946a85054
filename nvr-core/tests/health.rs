//! Health polling and aggregation through PluginManager

mod common;

use std::time::Duration;

use common::{Journal, eventually, manager, mock};
use nvr_core::events::EventPattern;
use nvr_core::{ErrorKind, LifecycleState};
use nvr_plugin_api::{HealthState, HealthStatus};

#[tokio::test]
async fn critical_degraded_and_unhealthy_analytics_aggregate_to_degraded() {
    let journal = Journal::new();
    let manager = manager();
    mock("streaming", &journal)
        .critical()
        .with(|b| b.health = Some(HealthStatus::degraded("high latency")))
        .install(&manager)
        .await;
    mock("analytics", &journal)
        .with(|b| b.health = Some(HealthStatus::unhealthy("model missing")))
        .install(&manager)
        .await;
    manager.start_all().await;

    manager.check_health("streaming").await.unwrap();
    manager.check_health("analytics").await.unwrap();

    let health = manager.system_health();
    assert_eq!(health.state, HealthState::Degraded);
    assert_eq!(health.plugins.len(), 2);
}

#[tokio::test]
async fn unhealthy_critical_plugin_makes_the_system_unhealthy() {
    let journal = Journal::new();
    let manager = manager();
    mock("streaming", &journal)
        .critical()
        .with(|b| b.health = Some(HealthStatus::unhealthy("encoder lost")))
        .install(&manager)
        .await;
    mock("analytics", &journal)
        .with(|b| b.health = Some(HealthStatus::unhealthy("model missing")))
        .install(&manager)
        .await;
    manager.start_all().await;

    let status = manager.check_health("streaming").await.unwrap();
    assert_eq!(status.state, HealthState::Unhealthy);

    let health = manager.system_health();
    assert_eq!(health.state, HealthState::Unhealthy);
    assert!(health.message.contains("streaming"));
}

#[tokio::test]
async fn poller_picks_up_reported_health() {
    let journal = Journal::new();
    let manager = manager();
    let (_, mut rx) = manager.bus().subscribe_system(
        "test",
        vec![EventPattern::Exact("plugin.health".into())],
        8,
    );
    mock("archive", &journal)
        .with(|b| b.health = Some(HealthStatus::degraded("disk 95% full")))
        .install(&manager)
        .await;
    manager.start("archive").await.unwrap();
    assert_eq!(
        manager.status("archive").unwrap().health.state,
        HealthState::Unknown
    );

    assert!(
        eventually(|| manager.status("archive").unwrap().health.state == HealthState::Degraded)
            .await
    );
    let event = rx.recv().await.unwrap();
    assert_eq!(event.payload["plugin"], "archive");
    assert_eq!(event.payload["message"], "disk 95% full");
}

#[tokio::test]
async fn panicking_health_check_faults_the_plugin() {
    let journal = Journal::new();
    let manager = manager();
    let (_, mut rx) = manager.bus().subscribe_system(
        "test",
        vec![EventPattern::Exact("plugin.error".into())],
        8,
    );
    mock("fragile", &journal)
        .subscribe(&["motion"])
        .with(|b| b.panic_in_health = true)
        .install(&manager)
        .await;
    manager.start("fragile").await.unwrap();

    assert!(eventually(|| manager.state("fragile").unwrap() == LifecycleState::Error).await);
    assert_eq!(manager.bus().subscription_count("fragile"), 0);
    assert!(manager.methods("fragile").is_empty());

    let event = rx.recv().await.unwrap();
    assert_eq!(event.payload["plugin"], "fragile");
    assert_eq!(event.payload["kind"], ErrorKind::PluginFault.as_str());

    let status = manager.status("fragile").unwrap();
    assert_eq!(status.health.state, HealthState::Unhealthy);
    assert!(status.error_message.unwrap().contains("health check exploded"));
}

#[tokio::test]
async fn stopped_plugin_reports_unknown() {
    let journal = Journal::new();
    let manager = manager();
    mock("archive", &journal)
        .with(|b| b.health = Some(HealthStatus::healthy("ok")))
        .install(&manager)
        .await;
    manager.start("archive").await.unwrap();
    assert_eq!(
        manager.check_health("archive").await.unwrap().state,
        HealthState::Healthy
    );

    manager.stop("archive").await.unwrap();
    let status = manager.check_health("archive").await.unwrap();
    assert_eq!(status.state, HealthState::Unknown);
}

#[tokio::test]
async fn slow_health_check_overwrites_a_healthy_report() {
    let journal = Journal::new();
    let manager = manager();
    mock("encoder", &journal)
        .with(|b| {
            b.healthy_on_start = true;
            b.health_delay = Some(Duration::from_secs(5));
        })
        .install(&manager)
        .await;
    manager.start("encoder").await.unwrap();
    let before = manager.status("encoder").unwrap().health;
    assert_eq!(before.state, HealthState::Healthy);
    assert_eq!(before.message, "warmed up");

    let status = manager.check_health("encoder").await.unwrap();
    assert_eq!(status.state, HealthState::Unhealthy);
    assert_eq!(status.message, "health check timed out");
    assert_eq!(manager.state("encoder").unwrap(), LifecycleState::Running);
}
