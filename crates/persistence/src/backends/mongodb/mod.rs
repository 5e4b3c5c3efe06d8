//! MongoDB backend implementation.
//!
//! Talks to MongoDB 4.x and later through the official async driver. Index
//! management goes through raw `listIndexes`, `createIndexes` and
//! `dropIndexes` commands so the reconcilers see exactly what the server
//! stores, including numeric types and text index language options.
//!
//! # Document layout
//!
//! ```text
//! locations         { _id, values: [ObjectId, ...], ... }
//! localized_values  { _id, language: "en", text: "Central Station" }
//! ```
//!
//! # Example
//!
//! ```no_run
//! use parkline_persistence::backends::mongodb::MongoStore;
//! use parkline_persistence::config::ConnectOptions;
//! use parkline_persistence::core::DocumentStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MongoStore::connect(&ConnectOptions::new("mongodb://localhost:27017/parkline")).await?;
//! let collections = store.list_collections().await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod convert;

pub use backend::{MongoConnector, MongoStore};
