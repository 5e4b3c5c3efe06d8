//! In-process document store.
//!
//! [`MemoryStore`] follows the same semantics as the MongoDB backend for every
//! operation the reconcilers use: index names are unique per collection,
//! creating an index that already exists with the same definition is a no-op,
//! and creating one under an existing name with different options fails.
//!
//! It also records every operation it receives and can be told to fail
//! specific operations, which is what the integration tests use to observe
//! and disturb the reconcilers.
//!
//! # Example
//!
//! ```
//! use parkline_persistence::backends::memory::{MemoryStore, StoreOpKind};
//! use parkline_persistence::core::DocumentStore;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! store.create_collection("locations").await.unwrap();
//!
//! assert_eq!(store.collections(), vec!["locations"]);
//! assert_eq!(store.count_ops(StoreOpKind::CreateCollection), 1);
//! # });
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;

use crate::config::ConnectOptions;
use crate::core::{BackendKind, Connector, DocumentStore, IdStream};
use crate::error::{BackendError, ConnectionError, IndexError, StorageError, StorageResult};
use crate::types::{
    DocumentId, IndexDescriptor, LocalizedValue, MultilingualEntity, NewLocalizedValue,
    ValueRefUpdate,
};

/// The kind of a recorded store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOpKind {
    /// `ping`
    Ping,
    /// `list_collections`
    ListCollections,
    /// `create_collection`
    CreateCollection,
    /// `list_indexes`
    ListIndexes,
    /// `create_index`
    CreateIndex,
    /// `drop_index`
    DropIndex,
    /// `load_entities`
    LoadEntities,
    /// `insert_values`
    InsertValues,
    /// `push_value_refs`
    PushValueRefs,
    /// `stale_value_ids`
    StaleValueIds,
    /// `pull_value_refs`
    PullValueRefs,
    /// `delete_values`
    DeleteValues,
    /// `shutdown`
    Shutdown,
}

/// A recorded store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOp {
    /// What was called.
    pub kind: StoreOpKind,
    /// The collection it targeted, if any.
    pub collection: Option<String>,
    /// The index involved, for index operations.
    pub index: Option<IndexDescriptor>,
    /// Number of items in a bulk operation.
    pub items: usize,
}

impl StoreOp {
    fn new(kind: StoreOpKind, collection: Option<&str>) -> Self {
        Self {
            kind,
            collection: collection.map(str::to_string),
            index: None,
            items: 0,
        }
    }

    fn with_items(mut self, items: usize) -> Self {
        self.items = items;
        self
    }

    fn with_index(mut self, index: IndexDescriptor) -> Self {
        self.index = Some(index);
        self
    }

    /// Returns `true` if this operation targeted `collection`.
    pub fn targets(&self, collection: &str) -> bool {
        self.collection.as_deref() == Some(collection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultAction {
    Fail,
    Unreachable,
    Panic,
}

#[derive(Debug)]
struct Fault {
    kind: StoreOpKind,
    collection: Option<String>,
    remaining: Option<usize>,
    action: FaultAction,
}

#[derive(Debug, Default)]
struct Inner {
    collections: BTreeSet<String>,
    indexes: HashMap<String, Vec<IndexDescriptor>>,
    entities: HashMap<String, BTreeMap<DocumentId, Vec<DocumentId>>>,
    values: HashMap<String, BTreeMap<DocumentId, LocalizedValue>>,
    ops: Vec<StoreOp>,
    faults: Vec<Fault>,
    reject_language_options: bool,
}

impl Inner {
    /// Records `op` and applies any matching injected fault.
    fn begin(&mut self, op: StoreOp) -> StorageResult<()> {
        let kind = op.kind;
        let collection = op.collection.clone();
        self.ops.push(op);

        let position = self.faults.iter().position(|f| {
            f.kind == kind
                && f.collection
                    .as_deref()
                    .is_none_or(|c| collection.as_deref() == Some(c))
        });
        let Some(position) = position else {
            return Ok(());
        };
        let fault = &mut self.faults[position];
        let action = fault.action;
        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                self.faults.remove(position);
            }
        }

        let target = collection.as_deref().unwrap_or("<none>");
        match action {
            FaultAction::Fail => Err(StorageError::Backend(BackendError::QueryError {
                message: format!("injected {:?} failure on {}", kind, target),
            })),
            FaultAction::Unreachable => Err(StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: BackendKind::Memory.to_string(),
                message: format!("store unreachable during {:?} on {}", kind, target),
            })),
            FaultAction::Panic => panic!("injected {:?} panic on {}", kind, target),
        }
    }

    fn populate(&self, refs: &[DocumentId], values_collection: &str) -> Vec<LocalizedValue> {
        let Some(values) = self.values.get(values_collection) else {
            return Vec::new();
        };
        refs.iter().filter_map(|id| values.get(id).cloned()).collect()
    }
}

/// An in-process [`DocumentStore`].
///
/// Clones share state, so a test can keep one handle for inspection while
/// the connection manager owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seeding ──────────────────────────────────────────────────

    /// Creates a collection without recording an operation.
    pub fn seed_collection(&self, name: &str) {
        self.inner.lock().collections.insert(name.to_string());
    }

    /// Installs an index without recording an operation.
    pub fn seed_index(&self, collection: &str, index: IndexDescriptor) {
        let mut inner = self.inner.lock();
        inner.collections.insert(collection.to_string());
        let indexes = inner.indexes.entry(collection.to_string()).or_default();
        indexes.retain(|i| i.name != index.name);
        indexes.push(index);
    }

    /// Inserts an unreferenced value and returns its ID.
    pub fn seed_value(&self, values_collection: &str, language: &str, text: &str) -> DocumentId {
        let mut inner = self.inner.lock();
        inner.collections.insert(values_collection.to_string());
        let id = new_id();
        inner
            .values
            .entry(values_collection.to_string())
            .or_default()
            .insert(id.clone(), LocalizedValue::new(id.clone(), language, text));
        id
    }

    /// Inserts an entity with one value per `(language, text)` pair and
    /// returns the entity ID.
    pub fn seed_entity(
        &self,
        collection: &str,
        values_collection: &str,
        values: &[(&str, &str)],
    ) -> DocumentId {
        let refs: Vec<DocumentId> = values
            .iter()
            .map(|(language, text)| self.seed_value(values_collection, language, text))
            .collect();
        self.seed_entity_refs(collection, refs)
    }

    /// Inserts an entity referencing the given value IDs as-is.
    pub fn seed_entity_refs(&self, collection: &str, refs: Vec<DocumentId>) -> DocumentId {
        let mut inner = self.inner.lock();
        inner.collections.insert(collection.to_string());
        let id = new_id();
        inner
            .entities
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), refs);
        id
    }

    // ── Fault injection ──────────────────────────────────────────

    /// Makes every `kind` operation fail, optionally only on `collection`.
    pub fn fail_always(&self, kind: StoreOpKind, collection: Option<&str>) {
        self.push_fault(kind, collection, None, FaultAction::Fail);
    }

    /// Makes the next `times` matching operations fail.
    pub fn fail_times(&self, kind: StoreOpKind, collection: Option<&str>, times: usize) {
        if times > 0 {
            self.push_fault(kind, collection, Some(times), FaultAction::Fail);
        }
    }

    /// Makes every matching operation fail as if the server could not be
    /// reached.
    pub fn fail_unreachable(&self, kind: StoreOpKind, collection: Option<&str>) {
        self.push_fault(kind, collection, None, FaultAction::Unreachable);
    }

    /// Makes the next matching operation panic.
    pub fn panic_once(&self, kind: StoreOpKind, collection: Option<&str>) {
        self.push_fault(kind, collection, Some(1), FaultAction::Panic);
    }

    /// Removes all injected faults.
    pub fn clear_faults(&self) {
        self.inner.lock().faults.clear();
    }

    /// Rejects text indexes that set `default_language` or
    /// `language_override`, as older engines do.
    pub fn reject_text_language_options(&self, reject: bool) {
        self.inner.lock().reject_language_options = reject;
    }

    fn push_fault(
        &self,
        kind: StoreOpKind,
        collection: Option<&str>,
        remaining: Option<usize>,
        action: FaultAction,
    ) {
        self.inner.lock().faults.push(Fault {
            kind,
            collection: collection.map(str::to_string),
            remaining,
            action,
        });
    }

    // ── Inspection ───────────────────────────────────────────────

    /// Returns all recorded operations.
    pub fn ops(&self) -> Vec<StoreOp> {
        self.inner.lock().ops.clone()
    }

    /// Returns recorded operations of the given kind.
    pub fn ops_of(&self, kind: StoreOpKind) -> Vec<StoreOp> {
        self.inner
            .lock()
            .ops
            .iter()
            .filter(|op| op.kind == kind)
            .cloned()
            .collect()
    }

    /// Counts recorded operations of the given kind.
    pub fn count_ops(&self, kind: StoreOpKind) -> usize {
        self.inner.lock().ops.iter().filter(|op| op.kind == kind).count()
    }

    /// Forgets recorded operations.
    pub fn clear_ops(&self) {
        self.inner.lock().ops.clear();
    }

    /// Returns collection names in sorted order.
    pub fn collections(&self) -> Vec<String> {
        self.inner.lock().collections.iter().cloned().collect()
    }

    /// Returns the indexes on a collection.
    pub fn indexes(&self, collection: &str) -> Vec<IndexDescriptor> {
        self.inner
            .lock()
            .indexes
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the named index on a collection.
    pub fn index(&self, collection: &str, name: &str) -> Option<IndexDescriptor> {
        self.indexes(collection).into_iter().find(|i| i.name == name)
    }

    /// Returns an entity with its values populated.
    pub fn entity(
        &self,
        collection: &str,
        values_collection: &str,
        id: &DocumentId,
    ) -> Option<MultilingualEntity> {
        let inner = self.inner.lock();
        let refs = inner.entities.get(collection)?.get(id)?;
        Some(MultilingualEntity::new(
            id.clone(),
            inner.populate(refs, values_collection),
        ))
    }

    /// Returns an entity's raw value references.
    pub fn entity_refs(&self, collection: &str, id: &DocumentId) -> Vec<DocumentId> {
        self.inner
            .lock()
            .entities
            .get(collection)
            .and_then(|e| e.get(id).cloned())
            .unwrap_or_default()
    }

    /// Returns every entity ID in a collection.
    pub fn entity_ids(&self, collection: &str) -> Vec<DocumentId> {
        self.inner
            .lock()
            .entities
            .get(collection)
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns every value in a values collection.
    pub fn values(&self, values_collection: &str) -> Vec<LocalizedValue> {
        self.inner
            .lock()
            .values
            .get(values_collection)
            .map(|v| v.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns `true` if a value with this ID exists.
    pub fn value_exists(&self, values_collection: &str, id: &DocumentId) -> bool {
        self.inner
            .lock()
            .values
            .get(values_collection)
            .is_some_and(|v| v.contains_key(id))
    }
}

fn new_id() -> DocumentId {
    DocumentId::new(uuid::Uuid::new_v4().to_string())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn ping(&self) -> StorageResult<()> {
        self.inner.lock().begin(StoreOp::new(StoreOpKind::Ping, None))
    }

    async fn list_collections(&self) -> StorageResult<Vec<String>> {
        let mut inner = self.inner.lock();
        inner.begin(StoreOp::new(StoreOpKind::ListCollections, None))?;
        Ok(inner.collections.iter().cloned().collect())
    }

    async fn create_collection(&self, name: &str) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.begin(StoreOp::new(StoreOpKind::CreateCollection, Some(name)))?;
        if !inner.collections.insert(name.to_string()) {
            return Err(StorageError::Backend(BackendError::QueryError {
                message: format!("collection {} already exists", name),
            }));
        }
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> StorageResult<Vec<IndexDescriptor>> {
        let mut inner = self.inner.lock();
        inner.begin(StoreOp::new(StoreOpKind::ListIndexes, Some(collection)))?;
        Ok(inner.indexes.get(collection).cloned().unwrap_or_default())
    }

    async fn create_index(&self, collection: &str, index: &IndexDescriptor) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.begin(
            StoreOp::new(StoreOpKind::CreateIndex, Some(collection)).with_index(index.clone()),
        )?;

        if inner.reject_language_options && index.has_language_options() {
            return Err(IndexError::Rejected {
                collection: collection.to_string(),
                index: index.name.clone(),
                message: "unsupported text index option".to_string(),
            }
            .into());
        }

        inner.collections.insert(collection.to_string());
        let indexes = inner.indexes.entry(collection.to_string()).or_default();
        match indexes.iter().find(|i| i.name == index.name) {
            Some(existing) if existing == index => Ok(()),
            Some(_) => Err(IndexError::Conflict {
                collection: collection.to_string(),
                index: index.name.clone(),
            }
            .into()),
            None => {
                indexes.push(index.clone());
                Ok(())
            }
        }
    }

    async fn drop_index(&self, collection: &str, name: &str) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        let mut op = StoreOp::new(StoreOpKind::DropIndex, Some(collection));
        op.index = inner
            .indexes
            .get(collection)
            .and_then(|i| i.iter().find(|i| i.name == name).cloned());
        inner.begin(op)?;

        let indexes = inner.indexes.entry(collection.to_string()).or_default();
        let before = indexes.len();
        indexes.retain(|i| i.name != name);
        if indexes.len() == before {
            return Err(IndexError::NotFound {
                collection: collection.to_string(),
                index: name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn load_entities(
        &self,
        collection: &str,
        values_collection: &str,
    ) -> StorageResult<Vec<MultilingualEntity>> {
        let mut inner = self.inner.lock();
        inner.begin(StoreOp::new(StoreOpKind::LoadEntities, Some(collection)))?;
        let Some(entities) = inner.entities.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(entities
            .iter()
            .map(|(id, refs)| {
                MultilingualEntity::new(id.clone(), inner.populate(refs, values_collection))
            })
            .collect())
    }

    async fn insert_values(
        &self,
        values_collection: &str,
        values: &[NewLocalizedValue],
    ) -> StorageResult<Vec<DocumentId>> {
        let mut inner = self.inner.lock();
        inner.begin(
            StoreOp::new(StoreOpKind::InsertValues, Some(values_collection))
                .with_items(values.len()),
        )?;
        inner.collections.insert(values_collection.to_string());
        let stored = inner.values.entry(values_collection.to_string()).or_default();
        let mut ids = Vec::with_capacity(values.len());
        for value in values {
            let id = new_id();
            stored.insert(
                id.clone(),
                LocalizedValue::new(id.clone(), value.language.clone(), value.text.clone()),
            );
            ids.push(id);
        }
        Ok(ids)
    }

    async fn push_value_refs(
        &self,
        collection: &str,
        updates: &[ValueRefUpdate],
    ) -> StorageResult<u64> {
        let mut inner = self.inner.lock();
        inner.begin(
            StoreOp::new(StoreOpKind::PushValueRefs, Some(collection)).with_items(updates.len()),
        )?;
        let Some(entities) = inner.entities.get_mut(collection) else {
            return Ok(0);
        };
        let mut modified = 0;
        for update in updates {
            if let Some(refs) = entities.get_mut(&update.entity_id) {
                refs.extend(update.value_ids.iter().cloned());
                modified += 1;
            }
        }
        Ok(modified)
    }

    async fn stale_value_ids(
        &self,
        values_collection: &str,
        supported: &[String],
    ) -> StorageResult<IdStream> {
        let mut inner = self.inner.lock();
        inner.begin(StoreOp::new(StoreOpKind::StaleValueIds, Some(values_collection)))?;
        let ids: Vec<DocumentId> = inner
            .values
            .get(values_collection)
            .map(|values| {
                values
                    .values()
                    .filter(|v| !supported.iter().any(|l| l.eq_ignore_ascii_case(&v.language)))
                    .map(|v| v.id.clone())
                    .collect()
            })
            .unwrap_or_default();
        Ok(futures::stream::iter(ids.into_iter().map(Ok)).boxed())
    }

    async fn pull_value_refs(&self, collection: &str, ids: &[DocumentId]) -> StorageResult<u64> {
        let mut inner = self.inner.lock();
        inner.begin(StoreOp::new(StoreOpKind::PullValueRefs, Some(collection)).with_items(ids.len()))?;
        let Some(entities) = inner.entities.get_mut(collection) else {
            return Ok(0);
        };
        let pulled: HashSet<&DocumentId> = ids.iter().collect();
        let mut modified = 0;
        for refs in entities.values_mut() {
            let before = refs.len();
            refs.retain(|id| !pulled.contains(id));
            if refs.len() != before {
                modified += 1;
            }
        }
        Ok(modified)
    }

    async fn delete_values(
        &self,
        values_collection: &str,
        ids: &[DocumentId],
    ) -> StorageResult<u64> {
        let mut inner = self.inner.lock();
        inner.begin(
            StoreOp::new(StoreOpKind::DeleteValues, Some(values_collection)).with_items(ids.len()),
        )?;
        let Some(values) = inner.values.get_mut(values_collection) else {
            return Ok(0);
        };
        let mut deleted = 0;
        for id in ids {
            if values.remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn shutdown(&self, _force: bool) -> StorageResult<()> {
        self.inner.lock().begin(StoreOp::new(StoreOpKind::Shutdown, None))
    }
}

/// A [`Connector`] that hands out a shared [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryConnector {
    store: MemoryStore,
    refuse: bool,
    dials: AtomicUsize,
}

impl MemoryConnector {
    /// Creates a connector for `store`.
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            refuse: false,
            dials: AtomicUsize::new(0),
        }
    }

    /// Creates a connector whose every dial fails.
    pub fn refusing(store: MemoryStore) -> Self {
        Self {
            refuse: true,
            ..Self::new(store)
        }
    }

    /// Number of times `connect` has been called.
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, options: &ConnectOptions) -> StorageResult<Arc<dyn DocumentStore>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(ConnectionError::DialFailed {
                uri: options.uri.clone(),
                message: "connection refused".to_string(),
            }
            .into());
        }
        self.store.ping().await?;
        Ok(Arc::new(self.store.clone()))
    }
}
