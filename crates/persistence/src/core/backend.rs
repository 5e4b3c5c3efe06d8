//! Store abstraction for document database drivers.
//!
//! This module defines the [`DocumentStore`] trait, the only surface the
//! reconciliation components use to talk to the database. Each backend
//! implements it on top of its own driver.

use std::fmt::Debug;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::StorageResult;
use crate::types::{DocumentId, IndexDescriptor, MultilingualEntity, NewLocalizedValue, ValueRefUpdate};

/// Identifies the type of document store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// MongoDB.
    MongoDB,
    /// In-process store.
    Memory,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::MongoDB => write!(f, "mongodb"),
            BackendKind::Memory => write!(f, "memory"),
        }
    }
}

/// A lazy, non-restartable sequence of document IDs.
///
/// Backed by a server-side cursor where the store has one. If iteration is
/// interrupted the remaining IDs are simply found again on the next run.
pub type IdStream = BoxStream<'static, StorageResult<DocumentId>>;

/// A document store that can be reconciled.
///
/// Every method is a network round trip on a real backend. None of them
/// retry; retry policy belongs to the callers.
#[async_trait]
pub trait DocumentStore: Send + Sync + Debug {
    /// Returns the kind of backend.
    fn kind(&self) -> BackendKind;

    /// Round-trips a no-op command to confirm the connection is open.
    async fn ping(&self) -> StorageResult<()>;

    /// Lists the names of existing collections.
    async fn list_collections(&self) -> StorageResult<Vec<String>>;

    /// Creates an empty collection.
    async fn create_collection(&self, name: &str) -> StorageResult<()>;

    /// Lists the indexes on a collection. A collection that does not exist
    /// has no indexes.
    async fn list_indexes(&self, collection: &str) -> StorageResult<Vec<IndexDescriptor>>;

    /// Builds one index.
    async fn create_index(&self, collection: &str, index: &IndexDescriptor) -> StorageResult<()>;

    /// Drops an index by name.
    async fn drop_index(&self, collection: &str, name: &str) -> StorageResult<()>;

    /// Loads every entity in `collection` with its `values` resolved against
    /// `values_collection`.
    async fn load_entities(
        &self,
        collection: &str,
        values_collection: &str,
    ) -> StorageResult<Vec<MultilingualEntity>>;

    /// Inserts values in one bulk operation and returns their IDs in input
    /// order.
    async fn insert_values(
        &self,
        values_collection: &str,
        values: &[NewLocalizedValue],
    ) -> StorageResult<Vec<DocumentId>>;

    /// Appends value references to entities in one bulk operation keyed by
    /// entity ID. Returns the number of entities modified.
    async fn push_value_refs(
        &self,
        collection: &str,
        updates: &[ValueRefUpdate],
    ) -> StorageResult<u64>;

    /// Streams the IDs of values whose language is not in `supported`.
    ///
    /// `supported` holds lowercase codes; stored languages are compared
    /// without regard to ASCII case.
    async fn stale_value_ids(
        &self,
        values_collection: &str,
        supported: &[String],
    ) -> StorageResult<IdStream>;

    /// Removes the given IDs from the `values` list of every entity in
    /// `collection`. Returns the number of entities modified.
    async fn pull_value_refs(&self, collection: &str, ids: &[DocumentId]) -> StorageResult<u64>;

    /// Deletes values by ID. Returns the number deleted.
    async fn delete_values(&self, values_collection: &str, ids: &[DocumentId])
    -> StorageResult<u64>;

    /// Releases driver resources.
    async fn shutdown(&self, force: bool) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::MongoDB.to_string(), "mongodb");
        assert_eq!(BackendKind::Memory.to_string(), "memory");
    }
}
