//! Multilingual value synchronization.
//!
//! Every entity family stores its display text as one [`LocalizedValue`]
//! document per language, referenced from the entity's `values` list. A pass
//! over one family:
//!
//! 1. loads every entity with its values populated,
//! 2. copies the English text into a new value for each supported language
//!    the entity lacks,
//! 3. inserts all new values in one bulk insert,
//! 4. appends their IDs to the owning entities in one bulk update,
//! 5. streams the IDs of values in unsupported languages and, one batch at a
//!    time, pulls them from every referencing entity while deleting them.
//!
//! Steps 3 and 4 are not atomic. A failure between them leaves unreferenced
//! values behind; they are harmless and the next pass creates fresh ones.
//!
//! [`LocalizedValue`]: crate::types::LocalizedValue

use std::sync::Arc;

use futures::TryStreamExt;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::ReconcileConfig;
use crate::core::{ConnectionManager, DocumentStore};
use crate::error::{BackendError, ConfigError, StorageResult};
use crate::schema::{EntityFamily, EntityFamilyKind, Schema};
use crate::types::{BASELINE_LANGUAGE, DocumentId, NewLocalizedValue, ValueRefUpdate};

/// Counters from one synchronization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Entities loaded.
    pub entities: usize,
    /// Entities skipped because they have no English value.
    pub skipped_without_baseline: usize,
    /// Values created by backfill.
    pub values_created: usize,
    /// Entities that received new value references.
    pub entities_updated: u64,
    /// Values deleted because their language is no longer supported.
    pub stale_values_removed: u64,
    /// Purge batches flushed.
    pub purge_batches: usize,
}

/// Result of synchronizing one family, as reported by the initializer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FamilySyncReport {
    /// Which family.
    pub family: EntityFamilyKind,
    /// Counters, when the pass completed.
    pub stats: Option<SyncStats>,
    /// Error message, when it did not.
    pub error: Option<String>,
}

impl FamilySyncReport {
    /// Returns `true` if the pass completed.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Keeps multilingual entity families in line with the supported languages.
#[derive(Debug, Clone)]
pub struct MultilingualSynchronizer {
    connection: Arc<ConnectionManager>,
    schema: Arc<Schema>,
    languages: Arc<[String]>,
    batch_size: usize,
}

impl MultilingualSynchronizer {
    /// Creates a synchronizer for the given languages.
    ///
    /// Language codes are trimmed, lowercased and deduplicated. A
    /// `batch_size` of zero is treated as one.
    pub fn new(
        connection: Arc<ConnectionManager>,
        schema: Arc<Schema>,
        languages: Vec<String>,
        batch_size: usize,
    ) -> Self {
        let mut normalized: Vec<String> = Vec::with_capacity(languages.len());
        for lang in languages {
            let lang = lang.trim().to_ascii_lowercase();
            if !normalized.contains(&lang) {
                normalized.push(lang);
            }
        }
        Self {
            connection,
            schema,
            languages: normalized.into(),
            batch_size: batch_size.max(1),
        }
    }

    /// Creates a synchronizer from configuration and the declared schema.
    pub fn from_config(connection: Arc<ConnectionManager>, config: &ReconcileConfig) -> Self {
        Self::new(
            connection,
            Arc::new(Schema::declared(config)),
            config.normalized_languages(),
            config.purge_batch_size,
        )
    }

    /// Supported languages.
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Purge batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Synchronizes the location family.
    pub async fn synchronize_locations(&self) -> bool {
        self.synchronize_kind(EntityFamilyKind::Location).await
    }

    /// Synchronizes the country family.
    pub async fn synchronize_countries(&self) -> bool {
        self.synchronize_kind(EntityFamilyKind::Country).await
    }

    /// Synchronizes the parking spot family.
    pub async fn synchronize_parking_spots(&self) -> bool {
        self.synchronize_kind(EntityFamilyKind::ParkingSpot).await
    }

    /// Synchronizes the family of the given kind.
    pub async fn synchronize_kind(&self, kind: EntityFamilyKind) -> bool {
        let family = self.family(kind);
        self.synchronize(&family).await
    }

    /// Synchronizes one family. Returns `false` on any error, after logging it.
    pub async fn synchronize(&self, family: &EntityFamily) -> bool {
        self.synchronize_report(family).await.succeeded()
    }

    /// Synchronizes one family and reports the outcome instead of failing.
    pub async fn synchronize_report(&self, family: &EntityFamily) -> FamilySyncReport {
        match self.run(family).await {
            Ok(stats) => {
                info!(
                    family = family.label(),
                    entities = stats.entities,
                    skipped = stats.skipped_without_baseline,
                    created = stats.values_created,
                    purged = stats.stale_values_removed,
                    "Synchronized {} values",
                    family.label()
                );
                FamilySyncReport {
                    family: family.kind,
                    stats: Some(stats),
                    error: None,
                }
            }
            Err(e) => {
                error!(
                    family = family.label(),
                    error = %e,
                    "Failed to synchronize {} values",
                    family.label()
                );
                FamilySyncReport {
                    family: family.kind,
                    stats: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Runs one pass over `family`: backfill, then purge.
    ///
    /// Refuses to run, before touching the store, when the supported
    /// languages do not include English: the purge would delete every
    /// baseline value.
    pub async fn run(&self, family: &EntityFamily) -> StorageResult<SyncStats> {
        self.check_languages()?;
        let store = self.connection.store()?;
        let mut stats = SyncStats::default();
        self.backfill(store.as_ref(), family, &mut stats).await?;
        self.purge(store.as_ref(), family, &mut stats).await?;
        Ok(stats)
    }

    fn check_languages(&self) -> Result<(), ConfigError> {
        if self.languages.iter().any(|l| l == BASELINE_LANGUAGE) {
            return Ok(());
        }
        Err(ConfigError::Invalid {
            errors: vec![format!(
                "Supported languages must include the baseline '{}', got [{}]",
                BASELINE_LANGUAGE,
                self.languages.join(", ")
            )],
        })
    }

    fn family(&self, kind: EntityFamilyKind) -> EntityFamily {
        self.schema
            .family(kind)
            .cloned()
            .unwrap_or_else(|| EntityFamily::declared(kind))
    }

    async fn backfill(
        &self,
        store: &dyn DocumentStore,
        family: &EntityFamily,
        stats: &mut SyncStats,
    ) -> StorageResult<()> {
        let entities = store
            .load_entities(&family.collection, &family.values_collection)
            .await?;
        stats.entities = entities.len();

        let mut new_values = Vec::new();
        let mut owners: Vec<(DocumentId, usize)> = Vec::new();

        for entity in &entities {
            let Some(baseline) = entity.baseline() else {
                warn!(
                    family = family.label(),
                    entity = %entity.id,
                    "Skipping {} without an English value",
                    family.label()
                );
                stats.skipped_without_baseline += 1;
                continue;
            };

            let missing = entity.missing_languages(&self.languages);
            if missing.is_empty() {
                continue;
            }
            for language in &missing {
                new_values.push(NewLocalizedValue::new(*language, baseline.text.clone()));
            }
            owners.push((entity.id.clone(), missing.len()));
        }

        if new_values.is_empty() {
            debug!(family = family.label(), "No values to backfill");
            return Ok(());
        }

        let ids = store
            .insert_values(&family.values_collection, &new_values)
            .await?;
        if ids.len() != new_values.len() {
            return Err(BackendError::Internal {
                backend_name: store.kind().to_string(),
                message: format!(
                    "inserted {} values but received {} ids",
                    new_values.len(),
                    ids.len()
                ),
                source: None,
            }
            .into());
        }
        stats.values_created = ids.len();

        let mut ids = ids.into_iter();
        let updates: Vec<ValueRefUpdate> = owners
            .into_iter()
            .map(|(entity_id, count)| ValueRefUpdate {
                entity_id,
                value_ids: ids.by_ref().take(count).collect(),
            })
            .collect();

        stats.entities_updated = store.push_value_refs(&family.collection, &updates).await?;
        debug!(
            family = family.label(),
            values = stats.values_created,
            entities = stats.entities_updated,
            "Backfilled missing languages"
        );
        Ok(())
    }

    async fn purge(
        &self,
        store: &dyn DocumentStore,
        family: &EntityFamily,
        stats: &mut SyncStats,
    ) -> StorageResult<()> {
        // Every family pointing into the same values collection must drop the
        // reference before the value goes away.
        let mut referencing = self.schema.referencing_collections(&family.values_collection);
        if !referencing.contains(&family.collection) {
            referencing.push(family.collection.clone());
        }

        let mut stale = store
            .stale_value_ids(&family.values_collection, &self.languages)
            .await?;
        let mut batch = Vec::with_capacity(self.batch_size);

        while let Some(id) = stale.try_next().await? {
            batch.push(id);
            if batch.len() >= self.batch_size {
                self.flush(store, family, &referencing, &batch, stats).await?;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            self.flush(store, family, &referencing, &batch, stats).await?;
        }
        Ok(())
    }

    async fn flush(
        &self,
        store: &dyn DocumentStore,
        family: &EntityFamily,
        referencing: &[String],
        batch: &[DocumentId],
        stats: &mut SyncStats,
    ) -> StorageResult<()> {
        let pulls = futures::future::try_join_all(
            referencing
                .iter()
                .map(|collection| store.pull_value_refs(collection, batch)),
        );
        let deletion = store.delete_values(&family.values_collection, batch);
        let (_, deleted) = tokio::try_join!(pulls, deletion)?;

        stats.purge_batches += 1;
        stats.stale_values_removed += deleted;
        debug!(
            family = family.label(),
            batch = stats.purge_batches,
            size = batch.len(),
            deleted = deleted,
            "Purged unsupported-language values"
        );
        Ok(())
    }
}
