//! TTL index drift repair.
//!
//! Compares the deployed expiry of a named TTL index with the configured one
//! and rebuilds the index when they differ. Failures are logged and reported
//! in the outcome, never returned.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use super::provisioner::CollectionProvisioner;
use super::retry::RetryPolicy;
use crate::core::{ConnectionManager, DocumentStore};
use crate::error::{StorageError, StorageResult};
use crate::schema::{CollectionModel, TtlIndexSpec};
use crate::types::IndexDescriptor;

/// What [`TtlReconciler::reconcile`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlOutcome {
    /// The deployed lifetime already matches.
    UpToDate,
    /// The index did not exist and was created.
    Created,
    /// The index had drifted and was rebuilt.
    Recreated {
        /// Deployed lifetime in seconds, if the index had one.
        from: Option<u64>,
        /// New lifetime in seconds.
        to: u64,
    },
    /// The index could not be brought up to date.
    Failed(String),
}

impl fmt::Display for TtlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TtlOutcome::UpToDate => write!(f, "up to date"),
            TtlOutcome::Created => write!(f, "created"),
            TtlOutcome::Recreated { from: Some(from), to } => {
                write!(f, "recreated ({}s -> {}s)", from, to)
            }
            TtlOutcome::Recreated { from: None, to } => write!(f, "recreated (-> {}s)", to),
            TtlOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Repairs TTL index drift.
#[derive(Debug, Clone)]
pub struct TtlReconciler {
    connection: Arc<ConnectionManager>,
    provisioner: CollectionProvisioner,
    retry: RetryPolicy,
}

impl TtlReconciler {
    /// Creates a reconciler. `provisioner` rebuilds the model's declared
    /// indexes when creating the TTL index directly keeps failing.
    pub fn new(
        connection: Arc<ConnectionManager>,
        provisioner: CollectionProvisioner,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            connection,
            provisioner,
            retry,
        }
    }

    /// Converges the TTL index described by `spec` on `model`'s collection.
    pub async fn reconcile(&self, model: &CollectionModel, spec: &TtlIndexSpec) -> TtlOutcome {
        let store = match self.connection.store() {
            Ok(store) => store,
            Err(e) => {
                error!(collection = %spec.collection, error = %e, "Cannot reconcile TTL index");
                return TtlOutcome::Failed(e.to_string());
            }
        };

        let deployed = match store.list_indexes(&spec.collection).await {
            Ok(indexes) => indexes.into_iter().find(|i| i.name == spec.index_name),
            Err(e) => {
                error!(
                    collection = %spec.collection,
                    index = %spec.index_name,
                    error = %e,
                    "Failed to list indexes for TTL reconciliation"
                );
                return TtlOutcome::Failed(e.to_string());
            }
        };

        let desired = spec.desired();
        let previous = match deployed {
            Some(index) if index.expire_after_seconds() == Some(spec.expire_after_seconds) => {
                info!(
                    collection = %spec.collection,
                    index = %spec.index_name,
                    expire_after_seconds = spec.expire_after_seconds,
                    "TTL index already up to date"
                );
                return TtlOutcome::UpToDate;
            }
            Some(index) => {
                let from = index.expire_after_seconds();
                info!(
                    collection = %spec.collection,
                    index = %spec.index_name,
                    from = ?from,
                    to = spec.expire_after_seconds,
                    "TTL index drifted, rebuilding"
                );
                if let Err(e) = store.drop_index(&spec.collection, &spec.index_name).await {
                    warn!(
                        collection = %spec.collection,
                        index = %spec.index_name,
                        error = %e,
                        "Failed to drop TTL index; attempting to create it anyway"
                    );
                }
                Some(from)
            }
            None => None,
        };

        match self.create(store.as_ref(), model, &desired).await {
            Ok(()) => match previous {
                Some(from) => {
                    info!(
                        collection = %spec.collection,
                        index = %spec.index_name,
                        expire_after_seconds = spec.expire_after_seconds,
                        "TTL index rebuilt"
                    );
                    TtlOutcome::Recreated {
                        from,
                        to: spec.expire_after_seconds,
                    }
                }
                None => {
                    info!(
                        collection = %spec.collection,
                        index = %spec.index_name,
                        expire_after_seconds = spec.expire_after_seconds,
                        "TTL index created"
                    );
                    TtlOutcome::Created
                }
            },
            Err(e) => {
                error!(
                    collection = %spec.collection,
                    index = %spec.index_name,
                    error = %e,
                    "Failed to repair TTL index"
                );
                TtlOutcome::Failed(e.to_string())
            }
        }
    }

    /// Creates the index with retries, then falls back to rebuilding every
    /// index declared on the model.
    async fn create(
        &self,
        store: &dyn DocumentStore,
        model: &CollectionModel,
        desired: &IndexDescriptor,
    ) -> StorageResult<()> {
        let label = format!("create {} on {}", desired.name, model.name);
        match self
            .retry
            .run_while(&label, StorageError::is_retryable, || {
                store.create_index(&model.name, desired)
            })
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_connection_unavailable() => Err(e),
            Err(e) => {
                warn!(
                    collection = %model.name,
                    index = %desired.name,
                    error = %e,
                    "Direct TTL index creation failed, rebuilding declared indexes"
                );
                self.provisioner.build_declared_indexes(model).await.map(|_| ())
            }
        }
    }
}
