//! Multilingual synchronization tests.

mod common;

use std::sync::Arc;

use parkline_persistence::backends::memory::StoreOpKind;
use parkline_persistence::error::{ConfigError, StorageError};
use parkline_persistence::reconcile::MultilingualSynchronizer;
use parkline_persistence::schema::{
    COUNTRIES, EntityFamily, EntityFamilyKind, LOCALIZED_VALUES, LOCATIONS, PARKING_SPOTS,
};

use common::*;

const LANGUAGES: &[&str] = &["en", "de", "fr"];

#[tokio::test]
async fn test_backfill_copies_english_text_into_every_missing_language() {
    let env = TestEnv::connected(test_config(LANGUAGES)).await;
    let ids: Vec<_> = ["Airport", "Harbour", "Old Town"]
        .iter()
        .map(|text| env.seed_english(LOCATIONS, text))
        .collect();

    let stats = env
        .synchronizer()
        .run(&EntityFamily::declared(EntityFamilyKind::Location))
        .await
        .unwrap();

    assert_eq!(stats.entities, 3);
    assert_eq!(stats.values_created, 6);
    assert_eq!(stats.entities_updated, 3);
    env.assert_synchronized(LOCATIONS, LANGUAGES);

    for id in &ids {
        let entity = env.store.entity(LOCATIONS, LOCALIZED_VALUES, id).unwrap();
        let english = entity.value_for("en").unwrap().text.clone();
        for value in &entity.values {
            assert_eq!(value.text, english);
        }
    }
}

#[tokio::test]
async fn test_backfill_is_one_bulk_insert_and_one_bulk_update() {
    let env = TestEnv::connected(test_config(LANGUAGES)).await;
    for i in 0..25 {
        env.seed_english(LOCATIONS, &format!("Location {}", i));
    }

    assert!(env.synchronizer().synchronize_locations().await);

    let inserts = env.store.ops_of(StoreOpKind::InsertValues);
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0].items, 50);
    let pushes = env.store.ops_of(StoreOpKind::PushValueRefs);
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].items, 25);
}

#[tokio::test]
async fn test_only_missing_languages_are_added() {
    let env = TestEnv::connected(test_config(LANGUAGES)).await;
    let id = env.seed(LOCATIONS, &[("en", "Station"), ("de", "Bahnhof")]);

    assert!(env.synchronizer().synchronize_locations().await);

    let entity = env.store.entity(LOCATIONS, LOCALIZED_VALUES, &id).unwrap();
    assert_eq!(entity.values.len(), 3);
    assert_eq!(entity.value_for("de").unwrap().text, "Bahnhof");
    assert_eq!(entity.value_for("fr").unwrap().text, "Station");
}

#[tokio::test]
async fn test_entities_without_english_are_skipped() {
    let env = TestEnv::connected(test_config(LANGUAGES)).await;
    let orphan = env.seed(COUNTRIES, &[("de", "Deutschland")]);
    env.seed_english(COUNTRIES, "France");

    let stats = env
        .synchronizer()
        .run(&EntityFamily::declared(EntityFamilyKind::Country))
        .await
        .unwrap();

    assert_eq!(stats.skipped_without_baseline, 1);
    assert_eq!(stats.values_created, 2);
    let entity = env.store.entity(COUNTRIES, LOCALIZED_VALUES, &orphan).unwrap();
    assert_eq!(entity.values.len(), 1);
    env.assert_synchronized(COUNTRIES, LANGUAGES);
}

#[tokio::test]
async fn test_second_pass_changes_nothing() {
    let env = TestEnv::connected(test_config(LANGUAGES)).await;
    env.seed_english(LOCATIONS, "Pier");
    let synchronizer = env.synchronizer();

    assert!(synchronizer.synchronize_locations().await);
    env.store.clear_ops();
    assert!(synchronizer.synchronize_locations().await);

    assert_eq!(env.store.count_ops(StoreOpKind::InsertValues), 0);
    assert_eq!(env.store.count_ops(StoreOpKind::PushValueRefs), 0);
    assert_eq!(env.store.count_ops(StoreOpKind::DeleteValues), 0);
}

#[tokio::test]
async fn test_purge_runs_in_batches_and_leaves_no_dangling_refs() {
    let batch_size = 20;
    let config = test_config(&["en", "de"]).with_purge_batch_size(batch_size);
    let env = TestEnv::connected(config).await;

    // 30 stale values spread over 10 entities: 1.5 batches
    for _ in 0..10 {
        env.seed(
            LOCATIONS,
            &[
                ("en", "Gate"),
                ("de", "Tor"),
                ("it", "Cancello"),
                ("es", "Puerta"),
                ("pt", "Portão"),
            ],
        );
    }
    assert_eq!(env.stale_value_count(&["en", "de"]), 30);

    let stats = env
        .synchronizer()
        .run(&EntityFamily::declared(EntityFamilyKind::Location))
        .await
        .unwrap();

    assert_eq!(stats.purge_batches, 2);
    assert_eq!(stats.stale_values_removed, 30);
    assert_eq!(env.store.count_ops(StoreOpKind::DeleteValues), 2);
    assert_eq!(env.stale_value_count(&["en", "de"]), 0);
    env.assert_no_dangling_refs(LOCATIONS);
    env.assert_synchronized(LOCATIONS, &["en", "de"]);
}

#[tokio::test]
async fn test_purge_pulls_refs_from_every_family_sharing_the_values() {
    let config = test_config(&["en"]).with_purge_batch_size(5);
    let env = TestEnv::connected(config).await;
    let country = env.seed(COUNTRIES, &[("en", "Italy"), ("it", "Italia")]);
    env.seed(LOCATIONS, &[("en", "Rome"), ("it", "Roma")]);

    // Purging the location family removes every stale value in the shared
    // collection, including the one a country points to.
    assert!(env.synchronizer().synchronize_locations().await);

    assert_eq!(env.stale_value_count(&["en"]), 0);
    env.assert_no_dangling_refs(LOCATIONS);
    env.assert_no_dangling_refs(COUNTRIES);
    assert_eq!(env.store.entity_refs(COUNTRIES, &country).len(), 1);
}

#[tokio::test]
async fn test_backfill_completes_before_purge() {
    let env = TestEnv::connected(test_config(&["en", "de"])).await;
    env.seed(LOCATIONS, &[("en", "Quay"), ("nl", "Kade")]);

    assert!(env.synchronizer().synchronize_locations().await);

    let kinds: Vec<StoreOpKind> = env.store.ops().iter().map(|op| op.kind).collect();
    let push = kinds.iter().position(|k| *k == StoreOpKind::PushValueRefs).unwrap();
    let stale = kinds.iter().position(|k| *k == StoreOpKind::StaleValueIds).unwrap();
    assert!(push < stale);
}

#[tokio::test]
async fn test_store_failure_returns_false() {
    let env = TestEnv::connected(test_config(LANGUAGES)).await;
    env.seed_english(LOCATIONS, "Depot");
    env.store
        .fail_always(StoreOpKind::InsertValues, Some(LOCALIZED_VALUES));

    assert!(!env.synchronizer().synchronize_locations().await);
    assert_eq!(env.store.count_ops(StoreOpKind::PushValueRefs), 0);
}

#[tokio::test]
async fn test_failure_between_insert_and_update_heals_on_next_pass() {
    let env = TestEnv::connected(test_config(&["en", "de"])).await;
    let id = env.seed_english(LOCATIONS, "Lighthouse");
    env.store
        .fail_times(StoreOpKind::PushValueRefs, Some(LOCATIONS), 1);
    let synchronizer = env.synchronizer();

    assert!(!synchronizer.synchronize_locations().await);
    assert_eq!(env.store.entity_refs(LOCATIONS, &id).len(), 1);

    assert!(synchronizer.synchronize_locations().await);
    env.assert_synchronized(LOCATIONS, &["en", "de"]);
    // The value inserted by the failed pass stays behind unreferenced.
    assert_eq!(env.store.values(LOCALIZED_VALUES).len(), 3);
}

#[tokio::test]
async fn test_family_entry_points() {
    let env = TestEnv::connected(test_config(&["en", "de"])).await;
    env.seed_english(LOCATIONS, "A");
    env.seed_english(COUNTRIES, "B");
    env.seed_english(PARKING_SPOTS, "C");
    let synchronizer = env.synchronizer();

    assert!(synchronizer.synchronize_locations().await);
    assert!(synchronizer.synchronize_countries().await);
    assert!(synchronizer.synchronize_parking_spots().await);

    env.assert_synchronized(LOCATIONS, &["en", "de"]);
    env.assert_synchronized(COUNTRIES, &["en", "de"]);
    env.assert_synchronized(PARKING_SPOTS, &["en", "de"]);
}

#[tokio::test]
async fn test_not_connected_returns_false_without_io() {
    let env = TestEnv::new(test_config(LANGUAGES));
    env.seed_english(LOCATIONS, "Nowhere");

    assert!(!env.synchronizer().synchronize_locations().await);
    assert!(!env.synchronizer().synchronize_countries().await);
    assert!(!env.synchronizer().synchronize_parking_spots().await);
    assert!(env.store.ops().is_empty());
}

#[tokio::test]
async fn test_languages_without_english_are_refused_before_any_io() {
    let env = TestEnv::connected(test_config(&["de", "fr"])).await;
    let id = env.seed(LOCATIONS, &[("en", "Station"), ("de", "Bahnhof")]);

    let err = env
        .synchronizer()
        .run(&EntityFamily::declared(EntityFamilyKind::Location))
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Config(ConfigError::Invalid { .. })));
    assert!(!env.synchronizer().synchronize_locations().await);
    assert!(env.store.ops().is_empty());
    let entity = env.store.entity(LOCATIONS, LOCALIZED_VALUES, &id).unwrap();
    assert_eq!(entity.baseline().unwrap().text, "Station");
    assert_eq!(entity.values.len(), 2);
}

#[tokio::test]
async fn test_constructor_normalizes_languages_and_batch_size() {
    let env = TestEnv::new(test_config(LANGUAGES));
    let synchronizer = MultilingualSynchronizer::new(
        env.manager.clone(),
        Arc::new(env.schema()),
        vec![" EN ".to_string(), "de".to_string(), "De".to_string()],
        0,
    );

    assert_eq!(synchronizer.languages(), ["en", "de"]);
    assert_eq!(synchronizer.batch_size(), 1);
}

#[tokio::test]
async fn test_stored_language_case_is_ignored() {
    let env = TestEnv::connected(test_config(&["en", "de"])).await;
    let id = env.seed(LOCATIONS, &[("EN", "Ferry Terminal")]);

    let stats = env
        .synchronizer()
        .run(&EntityFamily::declared(EntityFamilyKind::Location))
        .await
        .unwrap();

    assert_eq!(stats.skipped_without_baseline, 0);
    assert_eq!(stats.values_created, 1);
    assert_eq!(stats.stale_values_removed, 0);
    let entity = env.store.entity(LOCATIONS, LOCALIZED_VALUES, &id).unwrap();
    let languages: Vec<&str> = entity.values.iter().map(|v| v.language.as_str()).collect();
    assert_eq!(languages, vec!["EN", "de"]);
    assert_eq!(entity.value_for("de").unwrap().text, "Ferry Terminal");
}
