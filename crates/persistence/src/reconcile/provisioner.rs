//! Collection provisioning.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use super::retry::RetryPolicy;
use crate::core::{ConnectionManager, DocumentStore};
use crate::error::{ProvisioningError, StorageError, StorageResult};
use crate::schema::CollectionModel;

/// What [`CollectionProvisioner::ensure`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// The collection was already there; nothing was touched.
    AlreadyExists,
    /// The collection was created and `indexes` declared indexes were built.
    Created {
        /// Number of indexes built.
        indexes: usize,
    },
}

impl fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionOutcome::AlreadyExists => write!(f, "already exists"),
            ProvisionOutcome::Created { indexes } => write!(f, "created with {} indexes", indexes),
        }
    }
}

/// Makes sure declared collections exist.
#[derive(Debug, Clone)]
pub struct CollectionProvisioner {
    connection: Arc<ConnectionManager>,
    retry: RetryPolicy,
}

impl CollectionProvisioner {
    /// Creates a provisioner.
    pub fn new(connection: Arc<ConnectionManager>, retry: RetryPolicy) -> Self {
        Self { connection, retry }
    }

    /// Ensures `model`'s collection exists. When it has to be created and
    /// `create_indexes` is set, its declared indexes are built as well.
    ///
    /// Both steps are retried with backoff. When the retries run out the last
    /// error is returned as [`ProvisioningError::RetriesExhausted`]. Fails
    /// immediately, without retrying, when not connected or when the store
    /// cannot be reached.
    pub async fn ensure(
        &self,
        model: &CollectionModel,
        create_indexes: bool,
    ) -> StorageResult<ProvisionOutcome> {
        let store = self.connection.store()?;
        let label = format!("provision {}", model.name);

        let created = self
            .retry
            .run_while(&label, StorageError::is_retryable, || {
                ensure_collection(store.as_ref(), &model.name)
            })
            .await
            .map_err(|e| self.exhausted(model, e))?;

        if !created {
            debug!(collection = %model.name, "Collection already exists");
            return Ok(ProvisionOutcome::AlreadyExists);
        }

        let indexes = if create_indexes {
            self.retry
                .run_while(&label, StorageError::is_retryable, || {
                    build_indexes(store.as_ref(), model)
                })
                .await
                .map_err(|e| self.exhausted(model, e))?
        } else {
            0
        };

        info!(
            collection = %model.name,
            indexes = indexes,
            "Created collection"
        );
        Ok(ProvisionOutcome::Created { indexes })
    }

    /// Builds every index declared on `model`, once, and returns how many
    /// were built. Indexes that already exist with the same definition are
    /// left alone by the store.
    pub async fn build_declared_indexes(&self, model: &CollectionModel) -> StorageResult<usize> {
        let store = self.connection.store()?;
        build_indexes(store.as_ref(), model).await
    }

    fn exhausted(&self, model: &CollectionModel, err: StorageError) -> StorageError {
        if err.is_connection_unavailable() {
            return err;
        }
        ProvisioningError::RetriesExhausted {
            collection: model.name.clone(),
            attempts: self.retry.max_attempts(),
            message: err.to_string(),
        }
        .into()
    }
}

/// Returns `true` if the collection had to be created.
async fn ensure_collection(store: &dyn DocumentStore, name: &str) -> StorageResult<bool> {
    let existing = store.list_collections().await?;
    if existing.iter().any(|c| c == name) {
        return Ok(false);
    }
    store.create_collection(name).await?;
    Ok(true)
}

async fn build_indexes(store: &dyn DocumentStore, model: &CollectionModel) -> StorageResult<usize> {
    for index in &model.indexes {
        store.create_index(&model.name, index).await?;
        debug!(
            collection = %model.name,
            index = %index.name,
            kind = %index.kind,
            "Built index"
        );
    }
    Ok(model.indexes.len())
}
