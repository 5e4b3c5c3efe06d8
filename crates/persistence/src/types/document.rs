//! Multilingual entity and localized value documents.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The language code every multilingual entity is expected to carry.
///
/// Missing languages are backfilled by copying the text of this value.
pub const BASELINE_LANGUAGE: &str = "en";

/// An opaque document identifier.
///
/// MongoDB hands out ObjectId hex strings; the in-memory backend uses UUIDs.
/// Components never interpret the contents.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates a document ID from the given string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single piece of text in one language.
///
/// Owned by exactly one entity's `values` list once the reference has been
/// pushed. Between insert and reference update it may briefly exist unowned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedValue {
    /// Document ID.
    pub id: DocumentId,
    /// Two-letter language code.
    pub language: String,
    /// The text itself.
    pub text: String,
}

impl LocalizedValue {
    /// Creates a localized value.
    pub fn new(id: impl Into<DocumentId>, language: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            language: language.into(),
            text: text.into(),
        }
    }
}

/// A localized value that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLocalizedValue {
    /// Two-letter language code.
    pub language: String,
    /// The text.
    pub text: String,
}

impl NewLocalizedValue {
    /// Creates a new, unsaved localized value.
    pub fn new(language: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            text: text.into(),
        }
    }
}

/// An entity whose display text is kept in one value per language.
///
/// `values` is populated: each reference has been resolved to the concrete
/// [`LocalizedValue`], in the order the entity references them. References
/// to values that no longer exist are dropped during population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultilingualEntity {
    /// Entity document ID.
    pub id: DocumentId,
    /// Populated localized values.
    pub values: Vec<LocalizedValue>,
}

impl MultilingualEntity {
    /// Creates an entity with the given populated values.
    pub fn new(id: impl Into<DocumentId>, values: Vec<LocalizedValue>) -> Self {
        Self {
            id: id.into(),
            values,
        }
    }

    /// Returns the first value in the given language, ignoring ASCII case.
    pub fn value_for(&self, language: &str) -> Option<&LocalizedValue> {
        self.values
            .iter()
            .find(|v| v.language.eq_ignore_ascii_case(language))
    }

    /// Returns `true` if the entity carries a value in the given language.
    pub fn has_language(&self, language: &str) -> bool {
        self.value_for(language).is_some()
    }

    /// Returns the English baseline value, if present.
    pub fn baseline(&self) -> Option<&LocalizedValue> {
        self.value_for(BASELINE_LANGUAGE)
    }

    /// Returns the supported languages this entity has no value for, in the
    /// order given.
    pub fn missing_languages<'a>(&self, supported: &'a [String]) -> Vec<&'a str> {
        supported
            .iter()
            .map(String::as_str)
            .filter(|lang| !self.has_language(lang))
            .collect()
    }
}

/// New value references to append to one entity's `values` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRefUpdate {
    /// The entity to update.
    pub entity_id: DocumentId,
    /// Value IDs to push, in order.
    pub value_ids: Vec<DocumentId>,
}
