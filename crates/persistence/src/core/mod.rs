//! Core store traits and abstractions.
//!
//! - [`DocumentStore`] - the operations reconciliation needs from a database
//! - [`Connector`] - dials a store
//! - [`ConnectionManager`] - owns the single live connection
//! - [`ConnectionState`] - the shared connected flag
//!
//! Components receive an `Arc<ConnectionManager>` and fetch the store per
//! operation with [`ConnectionManager::store`]. That call is the fail-fast
//! gate: when the state is disconnected it errors before any I/O.

pub mod backend;
pub mod connection;

pub use backend::{BackendKind, DocumentStore, IdStream};
pub use connection::{ConnectionManager, ConnectionState, Connector};
