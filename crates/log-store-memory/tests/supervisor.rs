use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use proven_log_store::{ConnectionSupervisor, Error, LogConnection, SupervisorOptions};
use proven_log_store_memory::MemoryLogStore;
use tracing_test::traced_test;

#[tokio::test(start_paused = true)]
async fn test_healthy_connection_is_reused() {
    let store = MemoryLogStore::new();
    let connector = store.connector();
    let supervisor = ConnectionSupervisor::new(connector.clone(), SupervisorOptions::default());

    supervisor.acquire().await.unwrap();
    supervisor.acquire().await.unwrap();

    assert_eq!(connector.connect_count(), 1);
    assert_eq!(supervisor.attempts(), 1);
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn test_unhealthy_within_cooldown_reconnects_at_most_once() {
    let store = MemoryLogStore::new();
    let connector = store.connector();
    let supervisor = ConnectionSupervisor::new(connector.clone(), SupervisorOptions::default());

    supervisor.acquire().await.unwrap();
    tokio::time::advance(Duration::from_secs(6)).await;

    // First observation after the cooldown: reconnect.
    connector.last_connection().unwrap().mark_unhealthy();
    let replacement = supervisor.acquire().await.unwrap();
    assert!(replacement.is_healthy());
    assert_eq!(connector.connect_count(), 2);

    // Second observation inside the cooldown: hand back the stale one.
    replacement.mark_unhealthy();
    let stale = supervisor.acquire().await.unwrap();
    assert!(!stale.is_healthy());
    assert_eq!(connector.connect_count(), 2);

    assert!(logs_contain("connecting to log store"));
    assert!(logs_contain("attempt=2"));
    assert!(logs_contain("reconnect cooldown active"));
    assert!(!logs_contain("attempt=3"));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_reconnect() {
    let store = MemoryLogStore::new();
    let connector = store.connector();
    let supervisor = Arc::new(ConnectionSupervisor::new(
        connector.clone(),
        SupervisorOptions::default(),
    ));

    supervisor.acquire().await.unwrap();
    tokio::time::advance(Duration::from_secs(6)).await;
    connector.last_connection().unwrap().mark_unhealthy();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.acquire().await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_healthy());
    }

    assert_eq!(connector.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_replaced_connection_closes_after_grace() {
    let store = MemoryLogStore::new();
    let connector = store.connector();
    let supervisor = ConnectionSupervisor::new(connector.clone(), SupervisorOptions::default());

    let original = supervisor.acquire().await.unwrap();
    tokio::time::advance(Duration::from_secs(6)).await;
    original.mark_unhealthy();
    supervisor.acquire().await.unwrap();

    assert!(!original.is_closed());

    tokio::time::sleep(Duration::from_secs(6)).await;

    assert!(original.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_failed_connect_surfaces_error() {
    let store = MemoryLogStore::new();
    let connector = store.connector();
    let supervisor = ConnectionSupervisor::new(connector.clone(), SupervisorOptions::default());

    connector.fail_next_connects(1);

    assert_matches!(supervisor.acquire().await, Err(Error::Connection(_)));
    assert!(supervisor.acquire().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_dispose_is_idempotent() {
    let store = MemoryLogStore::new();
    let connector = store.connector();
    let supervisor = ConnectionSupervisor::new(connector.clone(), SupervisorOptions::default());

    let connection = supervisor.acquire().await.unwrap();

    supervisor.dispose().await;
    supervisor.dispose().await;

    assert!(connection.is_closed());
    assert_matches!(supervisor.acquire().await, Err(Error::Disposed));
}
