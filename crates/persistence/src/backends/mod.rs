//! Document store backends.
//!
//! This module contains implementations of [`DocumentStore`](crate::core::DocumentStore)
//! and [`Connector`](crate::core::Connector). Network backends are gated
//! behind a feature flag.
//!
//! # Available Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | Memory | (always) | In-process store with an operation log, used for tests and dry runs |
//! | MongoDB | `mongodb` | MongoDB 4.x and later through the official driver |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "mongodb")]
//! use parkline_persistence::backends::mongodb::MongoConnector;
//! use parkline_persistence::config::ConnectOptions;
//! use parkline_persistence::core::ConnectionManager;
//!
//! # #[cfg(feature = "mongodb")]
//! # async fn example() {
//! let manager = ConnectionManager::new(MongoConnector::new());
//! let connected = manager
//!     .connect(&ConnectOptions::new("mongodb://localhost:27017/parkline"))
//!     .await;
//! # }
//! ```

pub mod memory;

#[cfg(feature = "mongodb")]
pub mod mongodb;
