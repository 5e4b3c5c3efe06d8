//! Fixtures: configurations, connected managers and seeded stores.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parkline_persistence::backends::memory::{MemoryConnector, MemoryStore};
use parkline_persistence::config::{ConnectOptions, ReconcileConfig, RetryConfig};
use parkline_persistence::core::{Connector, DocumentStore};
use parkline_persistence::reconcile::{
    CollectionProvisioner, Initializer, MultilingualSynchronizer, RetryPolicy,
    TextIndexNegotiator, TtlReconciler,
};
use parkline_persistence::schema::{LOCALIZED_VALUES, Schema};
use parkline_persistence::{ConnectionManager, DocumentId, StorageResult};

/// A configuration with fast retries.
pub fn test_config(languages: &[&str]) -> ReconcileConfig {
    let mut config = ReconcileConfig::default().with_languages(languages.iter().copied());
    config.connection = ConnectOptions::new("memory://test");
    config.provisioning = RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(5),
        backoff_multiplier: 2.0,
    };
    config
}

/// A memory store behind a connection manager.
pub struct TestEnv {
    pub store: MemoryStore,
    pub manager: Arc<ConnectionManager>,
    pub config: ReconcileConfig,
}

impl TestEnv {
    /// Creates an environment whose manager is not connected yet.
    pub fn new(config: ReconcileConfig) -> Self {
        let store = MemoryStore::new();
        let manager = Arc::new(ConnectionManager::new(MemoryConnector::new(store.clone())));
        Self {
            store,
            manager,
            config,
        }
    }

    /// Creates a connected environment with an empty operation log.
    pub async fn connected(config: ReconcileConfig) -> Self {
        let env = Self::new(config);
        assert!(env.manager.connect(&env.config.connection).await);
        env.store.clear_ops();
        env
    }

    pub fn schema(&self) -> Schema {
        Schema::declared(&self.config)
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.provisioning.clone())
    }

    pub fn provisioner(&self) -> CollectionProvisioner {
        CollectionProvisioner::new(self.manager.clone(), self.retry())
    }

    pub fn negotiator(&self) -> TextIndexNegotiator {
        TextIndexNegotiator::new(self.manager.clone())
    }

    pub fn ttl(&self) -> TtlReconciler {
        TtlReconciler::new(self.manager.clone(), self.provisioner(), self.retry())
    }

    pub fn synchronizer(&self) -> MultilingualSynchronizer {
        MultilingualSynchronizer::from_config(self.manager.clone(), &self.config)
    }

    pub fn initializer(&self) -> Initializer {
        Initializer::new(self.manager.clone(), &self.config)
    }

    /// Seeds an entity holding only an English value.
    pub fn seed_english(&self, collection: &str, text: &str) -> DocumentId {
        self.store
            .seed_entity(collection, LOCALIZED_VALUES, &[("en", text)])
    }

    /// Seeds an entity with the given values.
    pub fn seed(&self, collection: &str, values: &[(&str, &str)]) -> DocumentId {
        self.store.seed_entity(collection, LOCALIZED_VALUES, values)
    }

    /// Asserts that every entity in `collection` that has an English value
    /// carries exactly one value per supported language and nothing else.
    pub fn assert_synchronized(&self, collection: &str, languages: &[&str]) {
        for id in self.store.entity_ids(collection) {
            let entity = self
                .store
                .entity(collection, LOCALIZED_VALUES, &id)
                .expect("entity exists");
            if entity.baseline().is_none() {
                continue;
            }
            let mut seen: Vec<&str> = entity.values.iter().map(|v| v.language.as_str()).collect();
            seen.sort_unstable();
            let mut expected = languages.to_vec();
            expected.sort_unstable();
            assert_eq!(seen, expected, "entity {} in {}", id, collection);
        }
    }

    /// Asserts that no entity in `collection` references a missing value.
    pub fn assert_no_dangling_refs(&self, collection: &str) {
        let existing: HashSet<DocumentId> = self
            .store
            .values(LOCALIZED_VALUES)
            .into_iter()
            .map(|v| v.id)
            .collect();
        for id in self.store.entity_ids(collection) {
            for value_id in self.store.entity_refs(collection, &id) {
                assert!(
                    existing.contains(&value_id),
                    "entity {} in {} references deleted value {}",
                    id,
                    collection,
                    value_id
                );
            }
        }
    }

    /// Number of stored values whose language is not in `languages`.
    pub fn stale_value_count(&self, languages: &[&str]) -> usize {
        self.store
            .values(LOCALIZED_VALUES)
            .iter()
            .filter(|v| !languages.contains(&v.language.as_str()))
            .count()
    }
}

/// A connector that fails the test if it is ever asked to dial.
#[derive(Debug)]
pub struct UnreachableConnector;

#[async_trait]
impl Connector for UnreachableConnector {
    async fn connect(&self, _options: &ConnectOptions) -> StorageResult<Arc<dyn DocumentStore>> {
        panic!("the store must not be dialed");
    }
}
