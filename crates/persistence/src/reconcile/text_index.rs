//! Full-text index negotiation.
//!
//! The desired text index switches off language heuristics
//! (`default_language: "none"`, `language_override: "_none"`) so searches
//! behave the same in every configured language. Older engines reject those
//! options; the negotiator then settles for a basic text index. Text search
//! is a soft dependency, so nothing here returns an error.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::core::{ConnectionManager, DocumentStore};
use crate::error::StorageResult;
use crate::schema::TextIndexSpec;

/// What [`TextIndexNegotiator::ensure_text_index`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextIndexOutcome {
    /// An index with the desired options already existed.
    AlreadyConverged,
    /// The desired index was created.
    Created,
    /// The store rejected the language options and a basic index was created.
    CreatedBasic,
    /// No text index could be created.
    Failed(String),
}

impl TextIndexOutcome {
    /// Returns `true` if a text index is in place.
    pub fn has_index(&self) -> bool {
        !matches!(self, TextIndexOutcome::Failed(_))
    }
}

impl fmt::Display for TextIndexOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextIndexOutcome::AlreadyConverged => write!(f, "already converged"),
            TextIndexOutcome::Created => write!(f, "created"),
            TextIndexOutcome::CreatedBasic => write!(f, "created (basic)"),
            TextIndexOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Creates full-text indexes, degrading to a basic index when needed.
#[derive(Debug, Clone)]
pub struct TextIndexNegotiator {
    connection: Arc<ConnectionManager>,
}

impl TextIndexNegotiator {
    /// Creates a negotiator.
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        Self { connection }
    }

    /// Brings the text index described by `spec` to the desired state.
    pub async fn ensure_text_index(&self, spec: &TextIndexSpec) -> TextIndexOutcome {
        let result = match self.connection.store() {
            Ok(store) => negotiate(store.as_ref(), spec).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    collection = %spec.collection,
                    index = %spec.index_name,
                    error = %e,
                    "Failed to create text index; full-text search on {}.{} is unavailable",
                    spec.collection,
                    spec.field
                );
                TextIndexOutcome::Failed(e.to_string())
            }
        }
    }
}

async fn negotiate(store: &dyn DocumentStore, spec: &TextIndexSpec) -> StorageResult<TextIndexOutcome> {
    let existing = store
        .list_indexes(&spec.collection)
        .await?
        .into_iter()
        .find(|i| i.name == spec.index_name);

    if let Some(existing) = existing {
        if existing.matches_text_options() {
            debug!(
                collection = %spec.collection,
                index = %spec.index_name,
                "Text index already up to date"
            );
            return Ok(TextIndexOutcome::AlreadyConverged);
        }
        info!(
            collection = %spec.collection,
            index = %spec.index_name,
            default_language = existing.options.default_language.as_deref().unwrap_or("<unset>"),
            language_override = existing.options.language_override.as_deref().unwrap_or("<unset>"),
            "Dropping text index with outdated language options"
        );
        store.drop_index(&spec.collection, &spec.index_name).await?;
    }

    match store.create_index(&spec.collection, &spec.desired()).await {
        Ok(()) => {
            info!(
                collection = %spec.collection,
                index = %spec.index_name,
                "Created text index"
            );
            Ok(TextIndexOutcome::Created)
        }
        Err(e) => {
            warn!(
                collection = %spec.collection,
                index = %spec.index_name,
                error = %e,
                "Store rejected language-neutral text index options; falling back to a basic \
                 text index, search will use the store's default language heuristics"
            );
            store.create_index(&spec.collection, &spec.basic()).await?;
            Ok(TextIndexOutcome::CreatedBasic)
        }
    }
}
