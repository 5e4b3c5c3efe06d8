//! MongoDB store and connector.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use mongodb::bson::{Bson, Document, doc};
use mongodb::error::ErrorKind;
use mongodb::event::EventHandler;
use mongodb::event::command::CommandEvent;
use mongodb::options::{ClientOptions, Tls, TlsOptions};
use mongodb::{Client, Collection, Database};

use super::convert;
use crate::config::ConnectOptions;
use crate::core::{BackendKind, Connector, DocumentStore, IdStream};
use crate::error::{BackendError, ConnectionError, IndexError, StorageError, StorageResult};
use crate::types::{
    DocumentId, IndexDescriptor, LocalizedValue, MultilingualEntity, NewLocalizedValue,
    ValueRefUpdate,
};

const BACKEND_NAME: &str = "mongodb";

/// Field on entity documents that holds value references.
const VALUES_FIELD: &str = "values";
/// Temporary field the `$lookup` stage writes resolved values into.
const POPULATED_FIELD: &str = "populated";
/// Update statements sent per `update` command.
const MAX_UPDATES_PER_COMMAND: usize = 1000;

// Server error codes the store maps to typed errors.
const NAMESPACE_NOT_FOUND: i32 = 26;
const INDEX_NOT_FOUND: i32 = 27;
const CANNOT_CREATE_INDEX: i32 = 67;
const INDEX_OPTIONS_CONFLICT: i32 = 85;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
const BAD_VALUE: i32 = 2;
const INVALID_OPTIONS: i32 = 72;

fn command_error_code(err: &mongodb::error::Error) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        _ => None,
    }
}

/// MongoDB document store.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl Debug for MongoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoStore")
            .field("database", &self.database.name())
            .finish_non_exhaustive()
    }
}

impl MongoStore {
    /// Dials the server and confirms the connection with a `ping`.
    ///
    /// The database named in the URI wins over
    /// [`ConnectOptions::database`].
    pub async fn connect(options: &ConnectOptions) -> StorageResult<Self> {
        let dial_failed = |err: mongodb::error::Error| ConnectionError::DialFailed {
            uri: options.uri.clone(),
            message: err.to_string(),
        };

        let mut client_options = ClientOptions::parse(&options.uri)
            .await
            .map_err(dial_failed)?;

        if options.tls.enabled {
            for path in [&options.tls.ca_file, &options.tls.cert_key_file]
                .into_iter()
                .flatten()
            {
                if !path.is_file() {
                    return Err(ConnectionError::InvalidTls {
                        message: format!("{} is not a readable file", path.display()),
                    }
                    .into());
                }
            }
            let mut tls = TlsOptions::default();
            tls.ca_file_path = options.tls.ca_file.clone();
            tls.cert_key_file_path = options.tls.cert_key_file.clone();
            client_options.tls = Some(Tls::Enabled(tls));
        }

        if options.debug {
            client_options.command_event_handler =
                Some(EventHandler::callback(|event: CommandEvent| {
                    if let CommandEvent::Started(started) = event {
                        tracing::debug!(
                            command = %started.command_name,
                            db = %started.db,
                            "mongodb command"
                        );
                    }
                }));
        }

        let client = Client::with_options(client_options).map_err(dial_failed)?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(&options.database));

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(dial_failed)?;

        tracing::info!(
            "Connected to MongoDB database '{}' (tls: {})",
            database.name(),
            options.tls.enabled
        );

        Ok(Self { client, database })
    }

    /// Returns the database handle.
    pub fn database(&self) -> &Database {
        &self.database
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection::<Document>(name)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn kind(&self) -> BackendKind {
        BackendKind::MongoDB
    }

    async fn ping(&self) -> StorageResult<()> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn list_collections(&self) -> StorageResult<Vec<String>> {
        Ok(self.database.list_collection_names().await?)
    }

    async fn create_collection(&self, name: &str) -> StorageResult<()> {
        self.database.create_collection(name).await?;
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> StorageResult<Vec<IndexDescriptor>> {
        let response = match self
            .database
            .run_command(doc! { "listIndexes": collection })
            .await
        {
            Ok(response) => response,
            Err(err) if command_error_code(&err) == Some(NAMESPACE_NOT_FOUND) => {
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        let batch = response.get_document("cursor")?.get_array("firstBatch")?;
        Ok(batch
            .iter()
            .filter_map(|entry| match entry {
                Bson::Document(document) => convert::index_from_document(document),
                _ => None,
            })
            .collect())
    }

    async fn create_index(&self, collection: &str, index: &IndexDescriptor) -> StorageResult<()> {
        let command = doc! {
            "createIndexes": collection,
            "indexes": [convert::index_to_document(index)],
        };
        match self.database.run_command(command).await {
            Ok(_) => Ok(()),
            Err(err) => Err(match command_error_code(&err) {
                Some(INDEX_OPTIONS_CONFLICT | INDEX_KEY_SPECS_CONFLICT) => IndexError::Conflict {
                    collection: collection.to_string(),
                    index: index.name.clone(),
                }
                .into(),
                Some(CANNOT_CREATE_INDEX | BAD_VALUE | INVALID_OPTIONS) => IndexError::Rejected {
                    collection: collection.to_string(),
                    index: index.name.clone(),
                    message: err.to_string(),
                }
                .into(),
                _ => err.into(),
            }),
        }
    }

    async fn drop_index(&self, collection: &str, name: &str) -> StorageResult<()> {
        let command = doc! { "dropIndexes": collection, "index": name };
        match self.database.run_command(command).await {
            Ok(_) => Ok(()),
            Err(err) if command_error_code(&err) == Some(INDEX_NOT_FOUND) => {
                Err(IndexError::NotFound {
                    collection: collection.to_string(),
                    index: name.to_string(),
                }
                .into())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn load_entities(
        &self,
        collection: &str,
        values_collection: &str,
    ) -> StorageResult<Vec<MultilingualEntity>> {
        let pipeline = vec![
            doc! {
                "$lookup": {
                    "from": values_collection,
                    "localField": VALUES_FIELD,
                    "foreignField": "_id",
                    "as": POPULATED_FIELD,
                }
            },
            doc! { "$project": { VALUES_FIELD: 1, POPULATED_FIELD: 1 } },
        ];

        let documents: Vec<Document> = self
            .collection(collection)
            .aggregate(pipeline)
            .await?
            .try_collect()
            .await?;

        Ok(documents.iter().filter_map(entity_from_document).collect())
    }

    async fn insert_values(
        &self,
        values_collection: &str,
        values: &[NewLocalizedValue],
    ) -> StorageResult<Vec<DocumentId>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let documents: Vec<Document> = values
            .iter()
            .map(|v| doc! { "language": v.language.clone(), "text": v.text.clone() })
            .collect();
        let result = self
            .collection(values_collection)
            .insert_many(documents)
            .await?;

        (0..values.len())
            .map(|i| {
                result
                    .inserted_ids
                    .get(&i)
                    .map(convert::id_from_bson)
                    .ok_or_else(|| {
                        StorageError::Backend(BackendError::Internal {
                            backend_name: BACKEND_NAME.to_string(),
                            message: format!("insert_many returned no id for value {}", i),
                            source: None,
                        })
                    })
            })
            .collect()
    }

    async fn push_value_refs(
        &self,
        collection: &str,
        updates: &[ValueRefUpdate],
    ) -> StorageResult<u64> {
        if updates.is_empty() {
            return Ok(0);
        }

        let mut modified = 0u64;
        for command in push_commands(collection, updates) {
            let statements = command.get_array("updates").map_or(0, Vec::len);
            let response = self.database.run_command(command).await?;

            if let Ok(errors) = response.get_array("writeErrors")
                && !errors.is_empty()
            {
                return Err(BackendError::QueryError {
                    message: format!(
                        "{} of {} reference updates on {} failed: {}",
                        errors.len(),
                        statements,
                        collection,
                        errors[0]
                    ),
                }
                .into());
            }

            modified += response
                .get("nModified")
                .and_then(convert::as_i64)
                .unwrap_or(0)
                .max(0) as u64;
        }
        Ok(modified)
    }

    async fn stale_value_ids(
        &self,
        values_collection: &str,
        supported: &[String],
    ) -> StorageResult<IdStream> {
        let cursor = self
            .collection(values_collection)
            .find(stale_language_filter(supported))
            .projection(doc! { "_id": 1 })
            .await?;

        Ok(cursor
            .map(|result| -> StorageResult<DocumentId> {
                let document = result?;
                let id = document.get("_id").ok_or_else(|| BackendError::SerializationError {
                    message: "value document without _id".to_string(),
                })?;
                Ok(convert::id_from_bson(id))
            })
            .boxed())
    }

    async fn pull_value_refs(&self, collection: &str, ids: &[DocumentId]) -> StorageResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = convert::ids_to_bson(ids);
        let result = self
            .collection(collection)
            .update_many(
                doc! { VALUES_FIELD: { "$in": ids.clone() } },
                doc! { "$pull": { VALUES_FIELD: { "$in": ids } } },
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn delete_values(
        &self,
        values_collection: &str,
        ids: &[DocumentId],
    ) -> StorageResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = self
            .collection(values_collection)
            .delete_many(doc! { "_id": { "$in": convert::ids_to_bson(ids) } })
            .await?;
        Ok(result.deleted_count)
    }

    async fn shutdown(&self, force: bool) -> StorageResult<()> {
        self.client.clone().shutdown().immediate(force).await;
        Ok(())
    }
}

/// Builds the unordered `update` commands that append value references,
/// at most [`MAX_UPDATES_PER_COMMAND`] statements each.
fn push_commands(collection: &str, updates: &[ValueRefUpdate]) -> Vec<Document> {
    updates
        .chunks(MAX_UPDATES_PER_COMMAND)
        .map(|chunk| {
            let statements: Vec<Document> = chunk
                .iter()
                .map(|update| {
                    doc! {
                        "q": { "_id": convert::id_to_bson(&update.entity_id) },
                        "u": {
                            "$push": {
                                VALUES_FIELD: { "$each": convert::ids_to_bson(&update.value_ids) }
                            }
                        },
                    }
                })
                .collect();
            doc! {
                "update": collection,
                "updates": statements,
                "ordered": false,
            }
        })
        .collect()
}

/// Matches values whose language, lowercased, is not in `supported`.
fn stale_language_filter(supported: &[String]) -> Document {
    doc! {
        "$expr": {
            "$not": [{ "$in": [{ "$toLower": "$language" }, supported.to_vec()] }]
        }
    }
}

/// Builds an entity from an aggregation result, keeping values in the order
/// the entity references them.
fn entity_from_document(document: &Document) -> Option<MultilingualEntity> {
    let id = convert::id_from_bson(document.get("_id")?);

    let mut populated: HashMap<DocumentId, LocalizedValue> = document
        .get_array(POPULATED_FIELD)
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_document())
                .filter_map(convert::value_from_document)
                .map(|v| (v.id.clone(), v))
                .collect()
        })
        .unwrap_or_default();

    let values = document
        .get_array(VALUES_FIELD)
        .map(|refs| {
            refs.iter()
                .filter_map(|r| populated.remove(&convert::id_from_bson(r)))
                .collect()
        })
        .unwrap_or_default();

    Some(MultilingualEntity::new(id, values))
}

/// A [`Connector`] that dials MongoDB.
#[derive(Debug, Default, Clone, Copy)]
pub struct MongoConnector;

impl MongoConnector {
    /// Creates a connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self, options: &ConnectOptions) -> StorageResult<Arc<dyn DocumentStore>> {
        Ok(Arc::new(MongoStore::connect(options).await?))
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::oid::ObjectId;

    use super::*;

    #[test]
    fn test_entity_values_follow_reference_order() {
        let (a, b) = (ObjectId::new(), ObjectId::new());
        let document = doc! {
            "_id": ObjectId::new(),
            "values": [b, a],
            "populated": [
                { "_id": a, "language": "en", "text": "Harbour" },
                { "_id": b, "language": "de", "text": "Hafen" },
            ],
        };
        let entity = entity_from_document(&document).unwrap();
        let languages: Vec<_> = entity.values.iter().map(|v| v.language.as_str()).collect();
        assert_eq!(languages, vec!["de", "en"]);
    }

    #[test]
    fn test_reference_updates_are_split_into_commands() {
        let updates: Vec<ValueRefUpdate> = (0..2500)
            .map(|i| ValueRefUpdate {
                entity_id: DocumentId::new(format!("spot-{}", i)),
                value_ids: vec![DocumentId::new(format!("value-{}", i))],
            })
            .collect();

        let commands = push_commands("parking_spots", &updates);

        let sizes: Vec<usize> = commands
            .iter()
            .map(|c| c.get_array("updates").unwrap().len())
            .collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);
        assert!(commands.iter().all(|c| c.get_str("update").unwrap() == "parking_spots"));
        assert!(commands.iter().all(|c| !c.get_bool("ordered").unwrap()));
        let last = commands[2].get_array("updates").unwrap()[499].as_document().unwrap();
        assert_eq!(
            last.get_document("q").unwrap().get_str("_id").unwrap(),
            "spot-2499"
        );
    }

    #[test]
    fn test_stale_filter_lowercases_stored_language() {
        let filter = stale_language_filter(&["en".to_string(), "de".to_string()]);
        assert_eq!(
            filter,
            doc! {
                "$expr": {
                    "$not": [{ "$in": [{ "$toLower": "$language" }, ["en", "de"]] }]
                }
            }
        );
    }

    #[test]
    fn test_dangling_references_are_skipped() {
        let document = doc! {
            "_id": ObjectId::new(),
            "values": [ObjectId::new()],
            "populated": [],
        };
        assert!(entity_from_document(&document).unwrap().values.is_empty());
    }
}
