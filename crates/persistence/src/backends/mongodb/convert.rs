//! Conversions between BSON documents and persistence types.

use std::collections::BTreeMap;

use mongodb::bson::{Bson, Document, doc, oid::ObjectId};

use crate::types::{DocumentId, IndexDescriptor, IndexKeyOrder, IndexKind, IndexSettings, LocalizedValue};

/// Key the server reports for the token field of a text index.
const TEXT_KEY: &str = "_fts";
/// Key the server reports for the term frequency field of a text index.
const TEXT_FREQUENCY_KEY: &str = "_ftsx";

/// Reads any BSON number as an integer.
pub(super) fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) => Some(*v as i64),
        _ => None,
    }
}

/// Stored IDs are ObjectIds unless the ID string is not one.
pub(super) fn id_to_bson(id: &DocumentId) -> Bson {
    match ObjectId::parse_str(id.as_str()) {
        Ok(oid) => Bson::ObjectId(oid),
        Err(_) => Bson::String(id.as_str().to_string()),
    }
}

pub(super) fn ids_to_bson(ids: &[DocumentId]) -> Vec<Bson> {
    ids.iter().map(id_to_bson).collect()
}

pub(super) fn id_from_bson(value: &Bson) -> DocumentId {
    match value {
        Bson::ObjectId(oid) => DocumentId::new(oid.to_hex()),
        Bson::String(s) => DocumentId::new(s.clone()),
        other => DocumentId::new(other.to_string()),
    }
}

/// Reads a `localized_values` document. Documents without a language or
/// text are skipped.
pub(super) fn value_from_document(document: &Document) -> Option<LocalizedValue> {
    let id = id_from_bson(document.get("_id")?);
    let language = document.get_str("language").ok()?;
    let text = document.get_str("text").ok()?;
    Some(LocalizedValue::new(id, language, text))
}

/// Builds the `createIndexes` entry for an index.
pub(super) fn index_to_document(index: &IndexDescriptor) -> Document {
    let mut key = Document::new();
    for (field, order) in &index.keys {
        let value = match order {
            IndexKeyOrder::Ascending => Bson::Int32(1),
            IndexKeyOrder::Descending => Bson::Int32(-1),
            IndexKeyOrder::Text => Bson::String("text".to_string()),
        };
        key.insert(field.clone(), value);
    }

    let mut document = doc! { "key": key, "name": index.name.clone() };
    let options = &index.options;
    if options.unique {
        document.insert("unique", true);
    }
    if !options.weights.is_empty() {
        let weights: Document = options
            .weights
            .iter()
            .map(|(field, weight)| (field.clone(), Bson::Int32(*weight)))
            .collect();
        document.insert("weights", weights);
    }
    if let Some(language) = &options.default_language {
        document.insert("default_language", language.clone());
    }
    if let Some(field) = &options.language_override {
        document.insert("language_override", field.clone());
    }
    if let Some(seconds) = options.expire_after_seconds {
        document.insert("expireAfterSeconds", seconds as i64);
    }
    document
}

/// Reads one `listIndexes` entry.
///
/// Text indexes come back keyed on `_fts`/`_ftsx`; the indexed fields are
/// recovered from `weights`. `expireAfterSeconds` may be stored as any
/// numeric type depending on the client that created the index.
pub(super) fn index_from_document(document: &Document) -> Option<IndexDescriptor> {
    let name = document.get_str("name").ok()?.to_string();
    let key = document.get_document("key").ok()?;

    let mut weights = BTreeMap::new();
    if let Ok(stored) = document.get_document("weights") {
        for (field, weight) in stored {
            if let Some(weight) = as_i64(weight) {
                weights.insert(field.clone(), weight as i32);
            }
        }
    }

    let is_text = key.contains_key(TEXT_KEY)
        || key.values().any(|v| matches!(v, Bson::String(s) if s == "text"));
    let keys = if is_text {
        weights
            .keys()
            .map(|field| (field.clone(), IndexKeyOrder::Text))
            .collect()
    } else {
        key.iter()
            .filter(|(field, _)| field.as_str() != TEXT_FREQUENCY_KEY)
            .map(|(field, value)| {
                let order = match as_i64(value) {
                    Some(v) if v < 0 => IndexKeyOrder::Descending,
                    _ => IndexKeyOrder::Ascending,
                };
                (field.clone(), order)
            })
            .collect()
    };

    let expire_after_seconds = document
        .get("expireAfterSeconds")
        .and_then(as_i64)
        .map(|v| v.max(0) as u64);

    let kind = if is_text {
        IndexKind::Text
    } else if expire_after_seconds.is_some() {
        IndexKind::Ttl
    } else {
        IndexKind::Collection
    };

    Some(IndexDescriptor {
        name,
        keys,
        kind,
        options: IndexSettings {
            unique: document.get_bool("unique").unwrap_or(false),
            weights,
            default_language: document.get_str("default_language").ok().map(str::to_string),
            language_override: document.get_str("language_override").ok().map(str::to_string),
            expire_after_seconds,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_strings_round_trip_as_object_ids() {
        let oid = ObjectId::new();
        let id = DocumentId::new(oid.to_hex());
        assert_eq!(id_to_bson(&id), Bson::ObjectId(oid));
        assert_eq!(id_from_bson(&Bson::ObjectId(oid)), id);
    }

    #[test]
    fn test_non_object_id_strings_stay_strings() {
        let id = DocumentId::new("spot-17");
        assert_eq!(id_to_bson(&id), Bson::String("spot-17".into()));
    }

    #[test]
    fn test_text_index_as_reported_by_server() {
        let reported = doc! {
            "v": 2,
            "key": { "_fts": "text", "_ftsx": 1 },
            "name": "localized_values_text",
            "weights": { "text": 1 },
            "default_language": "none",
            "language_override": "_none",
            "textIndexVersion": 3,
        };
        let index = index_from_document(&reported).unwrap();
        assert_eq!(index, IndexDescriptor::text("localized_values_text", "text"));
        assert!(index.matches_text_options());
    }

    #[test]
    fn test_text_index_without_language_options_reads_server_default() {
        let reported = doc! {
            "key": { "_fts": "text", "_ftsx": 1 },
            "name": "t",
            "weights": { "text": 1 },
            "default_language": "english",
            "language_override": "language",
        };
        let index = index_from_document(&reported).unwrap();
        assert!(!index.matches_text_options());
    }

    #[test]
    fn test_ttl_seconds_accept_any_numeric_type() {
        for seconds in [Bson::Int32(60), Bson::Int64(60), Bson::Double(60.0)] {
            let reported = doc! {
                "key": { "created_at": 1 },
                "name": "sessions_created_at_ttl",
                "expireAfterSeconds": seconds,
            };
            let index = index_from_document(&reported).unwrap();
            assert_eq!(index.kind, IndexKind::Ttl);
            assert_eq!(index.expire_after_seconds(), Some(60));
        }
    }

    #[test]
    fn test_index_document_for_ttl() {
        let document = index_to_document(&IndexDescriptor::ttl("x_ttl", "created_at", 90));
        assert_eq!(document.get_document("key").unwrap(), &doc! { "created_at": 1 });
        assert_eq!(document.get_i64("expireAfterSeconds").unwrap(), 90);
    }

    #[test]
    fn test_value_document() {
        let oid = ObjectId::new();
        let value = value_from_document(&doc! { "_id": oid, "language": "fr", "text": "Gare" }).unwrap();
        assert_eq!(value.language, "fr");
        assert!(value_from_document(&doc! { "_id": oid }).is_none());
    }
}
