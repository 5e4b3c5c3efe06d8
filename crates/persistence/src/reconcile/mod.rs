//! Schema reconciliation and multilingual synchronization.
//!
//! Each component takes an `Arc<ConnectionManager>` and fails fast when it
//! is not connected. [`Initializer`] runs them all in order.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use parkline_persistence::backends::memory::{MemoryConnector, MemoryStore};
//! use parkline_persistence::config::ReconcileConfig;
//! use parkline_persistence::core::ConnectionManager;
//! use parkline_persistence::reconcile::Initializer;
//!
//! # tokio_test::block_on(async {
//! let config = ReconcileConfig::default().with_languages(["en", "de"]);
//! let manager = Arc::new(ConnectionManager::new(MemoryConnector::new(MemoryStore::new())));
//! assert!(manager.connect(&config.connection).await);
//!
//! let initializer = Initializer::new(manager.clone(), &config);
//! assert!(initializer.initialize().await);
//! # });
//! ```

pub mod initializer;
pub mod multilingual;
pub mod provisioner;
pub mod retry;
pub mod text_index;
pub mod ttl;

pub use initializer::{CollectionReport, InitReport, Initializer, TextIndexReport, TtlReport};
pub use multilingual::{FamilySyncReport, MultilingualSynchronizer, SyncStats};
pub use provisioner::{CollectionProvisioner, ProvisionOutcome};
pub use retry::RetryPolicy;
pub use text_index::{TextIndexNegotiator, TextIndexOutcome};
pub use ttl::{TtlOutcome, TtlReconciler};
