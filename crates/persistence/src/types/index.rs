//! Index descriptors.
//!
//! An [`IndexDescriptor`] describes one named index, either as it is
//! declared (desired state) or as the store reports it (observed state).
//! The reconcilers compare the two by name.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// `default_language` value that switches off stemming and stop words.
pub const NEUTRAL_LANGUAGE: &str = "none";

/// `language_override` field name that no document carries, so per-document
/// language detection never kicks in.
pub const NEUTRAL_LANGUAGE_OVERRIDE: &str = "_none";

/// The kind of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexKind {
    /// A regular field index.
    Collection,
    /// A full-text index.
    Text,
    /// An expiry index that removes documents after a fixed age.
    Ttl,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Collection => write!(f, "collection-index"),
            IndexKind::Text => write!(f, "text-index"),
            IndexKind::Ttl => write!(f, "ttl-index"),
        }
    }
}

/// Per-field ordering of an index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKeyOrder {
    /// Ascending (`1`).
    Ascending,
    /// Descending (`-1`).
    Descending,
    /// Full-text (`"text"`).
    Text,
}

/// Options that vary by index kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Reject duplicate keys.
    #[serde(default)]
    pub unique: bool,

    /// Text index field weights.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub weights: BTreeMap<String, i32>,

    /// Text index default language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_language: Option<String>,

    /// Text index per-document language field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_override: Option<String>,

    /// Lifetime of documents covered by a TTL index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_after_seconds: Option<u64>,
}

/// A named index on one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Index name, unique within its collection.
    pub name: String,
    /// Indexed fields in key order.
    pub keys: Vec<(String, IndexKeyOrder)>,
    /// Index kind.
    pub kind: IndexKind,
    /// Kind-specific options.
    #[serde(default)]
    pub options: IndexSettings,
}

impl IndexDescriptor {
    /// Creates an ascending single-field index.
    pub fn ascending(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: vec![(field.into(), IndexKeyOrder::Ascending)],
            kind: IndexKind::Collection,
            options: IndexSettings::default(),
        }
    }

    /// Marks the index as unique.
    pub fn unique(mut self) -> Self {
        self.options.unique = true;
        self
    }

    /// Creates the desired full-text index: weight 1 on `field`, with
    /// language heuristics disabled.
    pub fn text(name: impl Into<String>, field: impl Into<String>) -> Self {
        let mut index = Self::text_basic(name, field);
        index.options.default_language = Some(NEUTRAL_LANGUAGE.to_string());
        index.options.language_override = Some(NEUTRAL_LANGUAGE_OVERRIDE.to_string());
        index
    }

    /// Creates a minimal full-text index that leaves language handling to
    /// the store defaults.
    pub fn text_basic(name: impl Into<String>, field: impl Into<String>) -> Self {
        let field = field.into();
        let mut weights = BTreeMap::new();
        weights.insert(field.clone(), 1);
        Self {
            name: name.into(),
            keys: vec![(field, IndexKeyOrder::Text)],
            kind: IndexKind::Text,
            options: IndexSettings {
                weights,
                ..Default::default()
            },
        }
    }

    /// Creates a TTL index on a timestamp field.
    pub fn ttl(name: impl Into<String>, field: impl Into<String>, expire_after_seconds: u64) -> Self {
        Self {
            name: name.into(),
            keys: vec![(field.into(), IndexKeyOrder::Ascending)],
            kind: IndexKind::Ttl,
            options: IndexSettings {
                expire_after_seconds: Some(expire_after_seconds),
                ..Default::default()
            },
        }
    }

    /// Returns the configured TTL, if any.
    pub fn expire_after_seconds(&self) -> Option<u64> {
        self.options.expire_after_seconds
    }

    /// Returns `true` if this index has language heuristics disabled the
    /// same way [`IndexDescriptor::text`] does.
    pub fn matches_text_options(&self) -> bool {
        self.options.default_language.as_deref() == Some(NEUTRAL_LANGUAGE)
            && self.options.language_override.as_deref() == Some(NEUTRAL_LANGUAGE_OVERRIDE)
    }

    /// Returns `true` if the index sets any language option.
    pub fn has_language_options(&self) -> bool {
        self.options.default_language.is_some() || self.options.language_override.is_some()
    }
}
