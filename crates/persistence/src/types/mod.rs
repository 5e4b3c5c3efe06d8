//! Core types for the persistence layer.
//!
//! - [`MultilingualEntity`], [`LocalizedValue`] - multilingual documents
//! - [`IndexDescriptor`] - desired or observed index state
//!
//! # Example
//!
//! ```
//! use parkline_persistence::types::{LocalizedValue, MultilingualEntity};
//!
//! let entity = MultilingualEntity::new(
//!     "loc-1",
//!     vec![LocalizedValue::new("v-1", "en", "Central Station")],
//! );
//!
//! let supported = vec!["en".to_string(), "de".to_string()];
//! assert_eq!(entity.missing_languages(&supported), vec!["de"]);
//! ```

mod document;
mod index;

pub use document::{
    BASELINE_LANGUAGE, DocumentId, LocalizedValue, MultilingualEntity, NewLocalizedValue,
    ValueRefUpdate,
};
pub use index::{
    IndexDescriptor, IndexKeyOrder, IndexKind, IndexSettings, NEUTRAL_LANGUAGE,
    NEUTRAL_LANGUAGE_OVERRIDE,
};
