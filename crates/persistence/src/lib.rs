//! Parkline Persistence Layer
//!
//! This crate brings the Parkline document store into its declared state on
//! startup and keeps multilingual content consistent across entity families.
//!
//! # Features
//!
//! - **Collection provisioning**: creates missing collections and their
//!   declared indexes, with bounded retries and exponential backoff
//! - **Text index negotiation**: language-neutral full-text indexes, with a
//!   fallback for engines that reject the language options
//! - **TTL drift repair**: rebuilds expiry indexes whose lifetime no longer
//!   matches configuration
//! - **Multilingual synchronization**: backfills missing languages from the
//!   English baseline and purges unsupported ones in bounded batches
//!
//! # Backend Features
//!
//! Enable the MongoDB backend with a feature flag in `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! parkline-persistence = { version = "0.3", features = ["mongodb"] }
//! ```
//!
//! The in-memory backend is always available.
//!
//! # Architecture
//!
//! - [`types`] - Localized values, multilingual entities and index descriptors
//! - [`schema`] - Declared collections, text fields, TTL indexes and families
//! - [`config`] - Connection and reconciliation configuration
//! - [`error`] - Error types for all operations
//! - [`core`] - The document store trait and the connection manager
//! - [`backends`] - Store implementations (MongoDB, memory)
//! - [`reconcile`] - Provisioner, negotiator, TTL reconciler, synchronizer
//!   and the initializer that sequences them
//!
//! # Quick Start
//!
//! ```no_run
//! # #[cfg(feature = "mongodb")]
//! # async fn example() {
//! use std::sync::Arc;
//!
//! use parkline_persistence::backends::mongodb::MongoConnector;
//! use parkline_persistence::config::ReconcileConfig;
//! use parkline_persistence::core::ConnectionManager;
//! use parkline_persistence::reconcile::Initializer;
//!
//! let config = ReconcileConfig::default().with_languages(["en", "de", "fr"]);
//! let manager = Arc::new(ConnectionManager::new(MongoConnector::new()));
//!
//! if manager.connect(&config.connection).await {
//!     let ok = Initializer::new(manager.clone(), &config).initialize().await;
//!     if !ok {
//!         eprintln!("database initialization finished with failures");
//!     }
//! }
//! manager.close(false).await;
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod config;
pub mod core;
pub mod error;
pub mod reconcile;
pub mod schema;
pub mod types;

// Re-export commonly used types at crate root
pub use config::{ConnectOptions, ReconcileConfig};
pub use error::{StorageError, StorageResult};
pub use schema::{EntityFamily, EntityFamilyKind, Schema};
pub use types::{DocumentId, IndexDescriptor, LocalizedValue, MultilingualEntity};

// Re-export core traits
pub use core::{BackendKind, ConnectionManager, ConnectionState, Connector, DocumentStore};

// Re-export reconciliation components
pub use reconcile::{
    CollectionProvisioner, InitReport, Initializer, MultilingualSynchronizer, RetryPolicy,
    TextIndexNegotiator, TtlReconciler,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
