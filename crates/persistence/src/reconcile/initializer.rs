//! Startup initialization.
//!
//! Runs four sequential phases, each fanning out over independent
//! collections or families on a [`JoinSet`]:
//!
//! | Phase | Work | On failure |
//! |-------|------|------------|
//! | A | provision every declared collection | close the connection, abort |
//! | B | negotiate every declared text index | logged |
//! | C | reconcile every declared TTL index | logged |
//! | D | synchronize every multilingual family | overall result is `false` |

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::multilingual::{FamilySyncReport, MultilingualSynchronizer};
use super::provisioner::{CollectionProvisioner, ProvisionOutcome};
use super::retry::RetryPolicy;
use super::text_index::{TextIndexNegotiator, TextIndexOutcome};
use super::ttl::{TtlOutcome, TtlReconciler};
use crate::config::ReconcileConfig;
use crate::core::ConnectionManager;
use crate::schema::Schema;

/// Phase A result for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    /// Collection name.
    pub collection: String,
    /// What happened, when provisioning succeeded.
    pub outcome: Option<ProvisionOutcome>,
    /// Error message, when it did not.
    pub error: Option<String>,
}

/// Phase B result for one text index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextIndexReport {
    /// Collection name.
    pub collection: String,
    /// Index name.
    pub index: String,
    /// What happened.
    pub outcome: TextIndexOutcome,
}

/// Phase C result for one TTL index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TtlReport {
    /// Collection name.
    pub collection: String,
    /// Index name.
    pub index: String,
    /// What happened.
    pub outcome: TtlOutcome,
}

/// Everything one [`Initializer::initialize_with_report`] call did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InitReport {
    /// Phase A.
    pub collections: Vec<CollectionReport>,
    /// Phase B.
    pub text_indexes: Vec<TextIndexReport>,
    /// Phase C.
    pub ttl_indexes: Vec<TtlReport>,
    /// Phase D.
    pub families: Vec<FamilySyncReport>,
    /// Why the run stopped early, if it did.
    pub aborted: Option<String>,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl InitReport {
    /// Returns `true` if the run completed and every family synchronized.
    pub fn succeeded(&self) -> bool {
        self.aborted.is_none() && self.families.iter().all(FamilySyncReport::succeeded)
    }

    fn abort(&mut self, reason: impl Into<String>, started: Instant) {
        self.aborted = Some(reason.into());
        self.elapsed = started.elapsed();
    }
}

/// Sequences provisioning, index reconciliation and synchronization.
#[derive(Debug, Clone)]
pub struct Initializer {
    connection: Arc<ConnectionManager>,
    schema: Arc<Schema>,
    provisioner: CollectionProvisioner,
    negotiator: TextIndexNegotiator,
    ttl: TtlReconciler,
    synchronizer: MultilingualSynchronizer,
    /// Set when the configuration failed validation; every run aborts.
    config_error: Option<String>,
}

impl Initializer {
    /// Creates an initializer for the declared schema.
    pub fn new(connection: Arc<ConnectionManager>, config: &ReconcileConfig) -> Self {
        Self::with_schema(connection, config, Schema::declared(config))
    }

    /// Creates an initializer for a custom schema.
    pub fn with_schema(
        connection: Arc<ConnectionManager>,
        config: &ReconcileConfig,
        schema: Schema,
    ) -> Self {
        let schema = Arc::new(schema);
        let retry = RetryPolicy::new(config.provisioning.clone());
        let provisioner = CollectionProvisioner::new(connection.clone(), retry.clone());
        Self {
            negotiator: TextIndexNegotiator::new(connection.clone()),
            ttl: TtlReconciler::new(connection.clone(), provisioner.clone(), retry),
            synchronizer: MultilingualSynchronizer::new(
                connection.clone(),
                schema.clone(),
                config.normalized_languages(),
                config.purge_batch_size,
            ),
            provisioner,
            schema,
            connection,
            config_error: config.check().err().map(|e| e.to_string()),
        }
    }

    /// The schema being initialized.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The synchronizer, for repairing a single family.
    pub fn synchronizer(&self) -> &MultilingualSynchronizer {
        &self.synchronizer
    }

    /// Runs every phase and returns `true` if all of them succeeded.
    pub async fn initialize(&self) -> bool {
        self.initialize_with_report().await.succeeded()
    }

    /// Runs every phase and returns what happened.
    pub async fn initialize_with_report(&self) -> InitReport {
        let started = Instant::now();
        let mut report = InitReport::default();

        if let Some(reason) = &self.config_error {
            error!(error = %reason, "Cannot initialize database: configuration is invalid");
            report.abort(reason.clone(), started);
            return report;
        }

        if !self.connection.is_connected() {
            error!("Cannot initialize database: not connected");
            report.abort("not connected", started);
            return report;
        }

        info!(
            collections = self.schema.collections.len(),
            families = self.schema.families.len(),
            "Initializing database"
        );

        // Phase A
        let provisioned = self.provision_collections().await;
        let failed: Vec<&str> = provisioned
            .iter()
            .filter(|r| r.error.is_some())
            .map(|r| r.collection.as_str())
            .collect();
        if !failed.is_empty() {
            let reason = format!("failed to provision collections: {}", failed.join(", "));
            error!("Database initialization aborted: {}", reason);
            report.collections = provisioned;
            report.abort(reason, started);
            self.connection.close(false).await;
            return report;
        }
        report.collections = provisioned;

        // Phase B
        report.text_indexes = self.ensure_text_indexes().await;

        // Phase C
        report.ttl_indexes = self.reconcile_ttl_indexes().await;

        // Phase D
        match self.synchronize_families().await {
            Ok(families) => report.families = families,
            Err(reason) => {
                error!("Database initialization aborted: {}", reason);
                report.abort(reason, started);
                self.connection.close(false).await;
                return report;
            }
        }

        report.elapsed = started.elapsed();
        if report.succeeded() {
            info!(
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Database initialized"
            );
        } else {
            let failed: Vec<&str> = report
                .families
                .iter()
                .filter(|f| !f.succeeded())
                .map(|f| f.family.label())
                .collect();
            error!(
                failed = %failed.join(", "),
                "Database initialization finished but some parts failed"
            );
        }
        report
    }

    async fn provision_collections(&self) -> Vec<CollectionReport> {
        let mut tasks: JoinSet<CollectionReport> = JoinSet::new();

        for model in &self.schema.collections {
            let provisioner = self.provisioner.clone();
            let model = model.clone();
            tasks.spawn(async move {
                let result = AssertUnwindSafe(provisioner.ensure(&model, true))
                    .catch_unwind()
                    .await;
                match result {
                    Ok(Ok(outcome)) => CollectionReport {
                        collection: model.name,
                        outcome: Some(outcome),
                        error: None,
                    },
                    Ok(Err(e)) => {
                        error!(collection = %model.name, error = %e, "Failed to provision collection");
                        CollectionReport {
                            collection: model.name,
                            outcome: None,
                            error: Some(e.to_string()),
                        }
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!(collection = %model.name, panic = %message, "Provisioning task panicked");
                        CollectionReport {
                            collection: model.name,
                            outcome: None,
                            error: Some(format!("provisioning task panicked: {}", message)),
                        }
                    }
                }
            });
        }

        let mut reports = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(report) => reports.push(report),
                // Tasks catch their own panics, so this is cancellation.
                Err(e) => {
                    error!(error = %e, "Provisioning task was cancelled");
                    reports.push(CollectionReport {
                        collection: "<cancelled>".to_string(),
                        outcome: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        reports.sort_by(|a, b| a.collection.cmp(&b.collection));
        reports
    }

    async fn ensure_text_indexes(&self) -> Vec<TextIndexReport> {
        let mut tasks: JoinSet<TextIndexReport> = JoinSet::new();

        for spec in &self.schema.text_indexes {
            let negotiator = self.negotiator.clone();
            let spec = spec.clone();
            tasks.spawn(async move {
                let outcome = negotiator.ensure_text_index(&spec).await;
                TextIndexReport {
                    collection: spec.collection,
                    index: spec.index_name,
                    outcome,
                }
            });
        }

        let mut reports = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => warn!(error = %e, "Text index task failed"),
            }
        }
        reports.sort_by(|a, b| a.index.cmp(&b.index));
        reports
    }

    async fn reconcile_ttl_indexes(&self) -> Vec<TtlReport> {
        let mut tasks: JoinSet<TtlReport> = JoinSet::new();

        for spec in &self.schema.ttl_indexes {
            let Some(model) = self.schema.model(&spec.collection).cloned() else {
                warn!(
                    collection = %spec.collection,
                    "TTL index declared on an undeclared collection, skipping"
                );
                continue;
            };
            let ttl = self.ttl.clone();
            let spec = spec.clone();
            tasks.spawn(async move {
                let outcome = ttl.reconcile(&model, &spec).await;
                TtlReport {
                    collection: spec.collection,
                    index: spec.index_name,
                    outcome,
                }
            });
        }

        let mut reports = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => warn!(error = %e, "TTL reconciliation task failed"),
            }
        }
        reports.sort_by(|a, b| a.index.cmp(&b.index));
        reports
    }

    /// Returns an error only when a task panicked or was cancelled.
    async fn synchronize_families(&self) -> Result<Vec<FamilySyncReport>, String> {
        let mut tasks: JoinSet<Result<FamilySyncReport, String>> = JoinSet::new();

        for family in &self.schema.families {
            let synchronizer = self.synchronizer.clone();
            let family = family.clone();
            tasks.spawn(async move {
                AssertUnwindSafe(synchronizer.synchronize_report(&family))
                    .catch_unwind()
                    .await
                    .map_err(|panic| {
                        format!(
                            "synchronization task for {} panicked: {}",
                            family.label(),
                            panic_message(panic.as_ref())
                        )
                    })
            });
        }

        let mut reports = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(reason)) => return Err(reason),
                Err(e) => return Err(format!("synchronization task was cancelled: {}", e)),
            }
        }
        reports.sort_by_key(|r| r.family as u8);
        Ok(reports)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
