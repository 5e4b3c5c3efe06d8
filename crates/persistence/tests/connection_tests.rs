//! Connection manager tests.

mod common;

use std::sync::Arc;

use parkline_persistence::backends::memory::{MemoryConnector, MemoryStore, StoreOpKind};
use parkline_persistence::config::ConnectOptions;
use parkline_persistence::error::{ConnectionError, StorageError};
use parkline_persistence::ConnectionManager;

use common::*;

#[tokio::test]
async fn test_connect_sets_state_and_pings() {
    let store = MemoryStore::new();
    let manager = ConnectionManager::new(MemoryConnector::new(store.clone()));
    let state = manager.state();

    assert!(!state.is_connected());
    assert!(manager.connect(&ConnectOptions::default()).await);
    assert!(state.is_connected());
    assert_eq!(store.count_ops(StoreOpKind::Ping), 1);
}

#[tokio::test]
async fn test_connect_twice_does_not_redial() {
    let connector = Arc::new(MemoryConnector::new(MemoryStore::new()));
    let manager = ConnectionManager::with_connector(connector.clone());

    assert!(manager.connect(&ConnectOptions::default()).await);
    assert!(manager.connect(&ConnectOptions::default()).await);
    assert_eq!(connector.dial_count(), 1);
}

#[tokio::test]
async fn test_concurrent_connects_dial_once() {
    let connector = Arc::new(MemoryConnector::new(MemoryStore::new()));
    let manager = Arc::new(ConnectionManager::with_connector(connector.clone()));
    let options = ConnectOptions::default();

    let (a, b, c) = tokio::join!(
        manager.connect(&options),
        manager.connect(&options),
        manager.connect(&options)
    );
    assert!(a && b && c);
    assert_eq!(connector.dial_count(), 1);
}

#[tokio::test]
async fn test_failed_dial_returns_false() {
    let manager = ConnectionManager::new(MemoryConnector::refusing(MemoryStore::new()));

    assert!(!manager.connect(&ConnectOptions::default()).await);
    assert!(!manager.is_connected());
    assert!(matches!(
        manager.store(),
        Err(StorageError::Connection(ConnectionError::NotConnected))
    ));
}

#[tokio::test]
async fn test_failed_ping_returns_false() {
    let store = MemoryStore::new();
    store.fail_always(StoreOpKind::Ping, None);
    let manager = ConnectionManager::new(MemoryConnector::new(store));

    assert!(!manager.connect(&ConnectOptions::default()).await);
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let env = TestEnv::connected(test_config(&["en"])).await;

    assert!(env.manager.close(false).await);
    assert!(!env.manager.is_connected());
    assert!(env.manager.close(true).await);
    assert_eq!(env.store.count_ops(StoreOpKind::Shutdown), 1);
}

#[tokio::test]
async fn test_close_without_connect() {
    let manager = ConnectionManager::new(UnreachableConnector);
    assert!(manager.close(false).await);
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_close_clears_flag_even_if_shutdown_fails() {
    let env = TestEnv::connected(test_config(&["en"])).await;
    env.store.fail_always(StoreOpKind::Shutdown, None);

    assert!(env.manager.close(false).await);
    assert!(!env.manager.is_connected());
    assert!(env.manager.store().is_err());
}

#[tokio::test]
async fn test_reconnect_after_close() {
    let connector = Arc::new(MemoryConnector::new(MemoryStore::new()));
    let manager = ConnectionManager::with_connector(connector.clone());
    let options = ConnectOptions::default();

    assert!(manager.connect(&options).await);
    manager.close(false).await;
    assert!(manager.connect(&options).await);
    assert_eq!(connector.dial_count(), 2);
}
