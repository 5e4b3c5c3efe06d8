//! Collection provisioner tests.

mod common;

use std::time::Duration;

use parkline_persistence::backends::memory::StoreOpKind;
use parkline_persistence::error::{ConnectionError, ProvisioningError, StorageError};
use parkline_persistence::reconcile::ProvisionOutcome;
use parkline_persistence::schema::{COUNTRIES, SESSIONS};
use tokio::time::Instant;

use common::*;

#[tokio::test]
async fn test_creates_missing_collection_with_declared_indexes() {
    let env = TestEnv::connected(test_config(&["en"])).await;
    let schema = env.schema();
    let model = schema.model(COUNTRIES).unwrap();

    let outcome = env.provisioner().ensure(model, true).await.unwrap();

    assert_eq!(
        outcome,
        ProvisionOutcome::Created {
            indexes: model.indexes.len()
        }
    );
    assert!(env.store.collections().contains(&COUNTRIES.to_string()));
    assert_eq!(env.store.indexes(COUNTRIES), model.indexes);
}

#[tokio::test]
async fn test_existing_collection_is_left_alone() {
    let env = TestEnv::connected(test_config(&["en"])).await;
    env.store.seed_collection(COUNTRIES);
    let schema = env.schema();

    let outcome = env
        .provisioner()
        .ensure(schema.model(COUNTRIES).unwrap(), true)
        .await
        .unwrap();

    assert_eq!(outcome, ProvisionOutcome::AlreadyExists);
    assert_eq!(env.store.count_ops(StoreOpKind::CreateCollection), 0);
    assert_eq!(env.store.count_ops(StoreOpKind::CreateIndex), 0);
}

#[tokio::test]
async fn test_index_build_can_be_skipped() {
    let env = TestEnv::connected(test_config(&["en"])).await;
    let schema = env.schema();

    let outcome = env
        .provisioner()
        .ensure(schema.model(SESSIONS).unwrap(), false)
        .await
        .unwrap();

    assert_eq!(outcome, ProvisionOutcome::Created { indexes: 0 });
    assert!(env.store.indexes(SESSIONS).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_with_backoff() {
    let env = TestEnv::connected(test_config(&["en"])).await;
    env.store.fail_times(StoreOpKind::CreateCollection, Some(COUNTRIES), 2);
    let schema = env.schema();
    let start = Instant::now();

    let outcome = env
        .provisioner()
        .ensure(schema.model(COUNTRIES).unwrap(), true)
        .await
        .unwrap();

    assert!(matches!(outcome, ProvisionOutcome::Created { .. }));
    assert_eq!(env.store.count_ops(StoreOpKind::CreateCollection), 3);
    // 500ms after the first failure, 1000ms after the second
    assert!(start.elapsed() >= Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_propagate_last_error() {
    let env = TestEnv::connected(test_config(&["en"])).await;
    env.store.fail_always(StoreOpKind::ListCollections, None);
    let schema = env.schema();

    let err = env
        .provisioner()
        .ensure(schema.model(COUNTRIES).unwrap(), true)
        .await
        .unwrap_err();

    match err {
        StorageError::Provisioning(ProvisioningError::RetriesExhausted {
            collection,
            attempts,
            message,
        }) => {
            assert_eq!(collection, COUNTRIES);
            assert_eq!(attempts, 3);
            assert!(message.contains("ListCollections"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(env.store.count_ops(StoreOpKind::ListCollections), 3);
    assert_eq!(env.store.count_ops(StoreOpKind::CreateCollection), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_store_is_not_retried() {
    let env = TestEnv::connected(test_config(&["en"])).await;
    env.store.fail_unreachable(StoreOpKind::ListCollections, None);
    let schema = env.schema();
    let start = Instant::now();

    let err = env
        .provisioner()
        .ensure(schema.model(COUNTRIES).unwrap(), true)
        .await
        .unwrap_err();

    assert!(err.is_connection_unavailable(), "unexpected error: {err}");
    assert_eq!(env.store.count_ops(StoreOpKind::ListCollections), 1);
    assert_eq!(env.store.count_ops(StoreOpKind::CreateCollection), 0);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_index_build_failure_after_creation_is_retried() {
    let env = TestEnv::connected(test_config(&["en"])).await;
    env.store.fail_times(StoreOpKind::CreateIndex, Some(COUNTRIES), 1);
    let schema = env.schema();
    let model = schema.model(COUNTRIES).unwrap();

    env.provisioner().ensure(model, true).await.unwrap();

    assert_eq!(env.store.count_ops(StoreOpKind::CreateCollection), 1);
    assert_eq!(env.store.indexes(COUNTRIES), model.indexes);
}

#[tokio::test]
async fn test_not_connected_fails_without_io() {
    let env = TestEnv::new(test_config(&["en"]));
    let schema = env.schema();

    let err = env
        .provisioner()
        .ensure(schema.model(COUNTRIES).unwrap(), true)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StorageError::Connection(ConnectionError::NotConnected)
    ));
    assert!(env.store.ops().is_empty());
}
