//! The declared schema: collections, full-text fields, expiring collections
//! and multilingual entity families.
//!
//! Index names declared here are part of the persisted contract. The
//! reconcilers find and compare indexes by name across restarts, so renaming
//! one causes a drop and rebuild on the next run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ReconcileConfig;
use crate::types::IndexDescriptor;

/// Collection holding every [`LocalizedValue`](crate::types::LocalizedValue).
pub const LOCALIZED_VALUES: &str = "localized_values";
/// Collection of locations.
pub const LOCATIONS: &str = "locations";
/// Collection of countries.
pub const COUNTRIES: &str = "countries";
/// Collection of parking spots.
pub const PARKING_SPOTS: &str = "parking_spots";
/// Collection of login sessions.
pub const SESSIONS: &str = "sessions";
/// Collection of pending email verifications.
pub const EMAIL_VERIFICATIONS: &str = "email_verifications";
/// Collection of temporary reservation holds.
pub const RESERVATION_HOLDS: &str = "reservation_holds";

/// Timestamp field the TTL indexes expire on.
pub const CREATED_AT: &str = "created_at";

/// A declared collection and the indexes built when it is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionModel {
    /// Collection name.
    pub name: String,
    /// Declared collection and TTL indexes.
    pub indexes: Vec<IndexDescriptor>,
}

impl CollectionModel {
    /// Creates a model with no indexes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexes: Vec::new(),
        }
    }

    /// Adds a declared index.
    pub fn with_index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    /// Returns the declared index with the given name.
    pub fn index(&self, name: &str) -> Option<&IndexDescriptor> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

/// A full-text field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextIndexSpec {
    /// Collection name.
    pub collection: String,
    /// Indexed field.
    pub field: String,
    /// Index name.
    pub index_name: String,
}

impl TextIndexSpec {
    /// Creates a text index spec.
    pub fn new(
        collection: impl Into<String>,
        field: impl Into<String>,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            field: field.into(),
            index_name: index_name.into(),
        }
    }

    /// The desired index, with language heuristics disabled.
    pub fn desired(&self) -> IndexDescriptor {
        IndexDescriptor::text(&self.index_name, &self.field)
    }

    /// The fallback index for stores that reject language options.
    pub fn basic(&self) -> IndexDescriptor {
        IndexDescriptor::text_basic(&self.index_name, &self.field)
    }
}

/// An expiring collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlIndexSpec {
    /// Collection name.
    pub collection: String,
    /// Timestamp field.
    pub field: String,
    /// Index name.
    pub index_name: String,
    /// Desired document lifetime.
    pub expire_after_seconds: u64,
}

impl TtlIndexSpec {
    /// Creates a TTL index spec.
    pub fn new(
        collection: impl Into<String>,
        field: impl Into<String>,
        index_name: impl Into<String>,
        expire_after_seconds: u64,
    ) -> Self {
        Self {
            collection: collection.into(),
            field: field.into(),
            index_name: index_name.into(),
            expire_after_seconds,
        }
    }

    /// The desired index.
    pub fn desired(&self) -> IndexDescriptor {
        IndexDescriptor::ttl(&self.index_name, &self.field, self.expire_after_seconds)
    }
}

/// Identifies one of the multilingual entity families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityFamilyKind {
    /// Locations.
    Location,
    /// Countries.
    Country,
    /// Parking spots.
    ParkingSpot,
}

impl EntityFamilyKind {
    /// All families, in synchronization order.
    pub const ALL: [EntityFamilyKind; 3] = [
        EntityFamilyKind::Location,
        EntityFamilyKind::Country,
        EntityFamilyKind::ParkingSpot,
    ];

    /// Label used in logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            EntityFamilyKind::Location => "location",
            EntityFamilyKind::Country => "country",
            EntityFamilyKind::ParkingSpot => "parking spot",
        }
    }

    /// Collection holding the family's entities.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityFamilyKind::Location => LOCATIONS,
            EntityFamilyKind::Country => COUNTRIES,
            EntityFamilyKind::ParkingSpot => PARKING_SPOTS,
        }
    }
}

impl fmt::Display for EntityFamilyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A multilingual entity family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFamily {
    /// Which family.
    pub kind: EntityFamilyKind,
    /// Collection holding the entities.
    pub collection: String,
    /// Collection holding their localized values.
    pub values_collection: String,
}

impl EntityFamily {
    /// Creates the declared family for `kind`.
    pub fn declared(kind: EntityFamilyKind) -> Self {
        Self {
            kind,
            collection: kind.collection().to_string(),
            values_collection: LOCALIZED_VALUES.to_string(),
        }
    }

    /// Label used in logs and reports.
    pub fn label(&self) -> &'static str {
        self.kind.label()
    }
}

/// The full declared schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Every declared collection.
    pub collections: Vec<CollectionModel>,
    /// Full-text fields.
    pub text_indexes: Vec<TextIndexSpec>,
    /// Expiring collections.
    pub ttl_indexes: Vec<TtlIndexSpec>,
    /// Multilingual entity families.
    pub families: Vec<EntityFamily>,
}

impl Schema {
    /// Builds the declared schema, taking TTL lifetimes from `config`.
    pub fn declared(config: &ReconcileConfig) -> Self {
        let ttl_indexes = vec![
            TtlIndexSpec::new(
                SESSIONS,
                CREATED_AT,
                "sessions_created_at_ttl",
                config.expiry.session.as_secs(),
            ),
            TtlIndexSpec::new(
                EMAIL_VERIFICATIONS,
                CREATED_AT,
                "email_verifications_created_at_ttl",
                config.expiry.email_verification.as_secs(),
            ),
            TtlIndexSpec::new(
                RESERVATION_HOLDS,
                CREATED_AT,
                "reservation_holds_created_at_ttl",
                config.expiry.reservation_hold.as_secs(),
            ),
        ];

        let mut collections = vec![
            CollectionModel::new(LOCALIZED_VALUES).with_index(IndexDescriptor::ascending(
                "localized_values_language",
                "language",
            )),
            CollectionModel::new(LOCATIONS).with_index(IndexDescriptor::ascending(
                "locations_values",
                "values",
            )),
            CollectionModel::new(COUNTRIES)
                .with_index(IndexDescriptor::ascending("countries_values", "values"))
                .with_index(IndexDescriptor::ascending("countries_code", "code").unique()),
            CollectionModel::new(PARKING_SPOTS)
                .with_index(IndexDescriptor::ascending("parking_spots_values", "values"))
                .with_index(IndexDescriptor::ascending(
                    "parking_spots_location",
                    "location",
                )),
            CollectionModel::new(SESSIONS)
                .with_index(IndexDescriptor::ascending("sessions_user", "user")),
            CollectionModel::new(EMAIL_VERIFICATIONS).with_index(
                IndexDescriptor::ascending("email_verifications_token", "token").unique(),
            ),
            CollectionModel::new(RESERVATION_HOLDS).with_index(IndexDescriptor::ascending(
                "reservation_holds_spot",
                "parking_spot",
            )),
        ];
        for ttl in &ttl_indexes {
            if let Some(model) = collections.iter_mut().find(|m| m.name == ttl.collection) {
                model.indexes.push(ttl.desired());
            }
        }

        Self {
            collections,
            text_indexes: vec![
                TextIndexSpec::new(LOCALIZED_VALUES, "text", "localized_values_text"),
                TextIndexSpec::new(PARKING_SPOTS, "address", "parking_spots_address_text"),
            ],
            ttl_indexes,
            families: EntityFamilyKind::ALL
                .into_iter()
                .map(EntityFamily::declared)
                .collect(),
        }
    }

    /// Returns the declared collection with the given name.
    pub fn model(&self, name: &str) -> Option<&CollectionModel> {
        self.collections.iter().find(|m| m.name == name)
    }

    /// Returns the declared family of the given kind.
    pub fn family(&self, kind: EntityFamilyKind) -> Option<&EntityFamily> {
        self.families.iter().find(|f| f.kind == kind)
    }

    /// Entity collections whose `values` point into `values_collection`.
    pub fn referencing_collections(&self, values_collection: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for family in &self.families {
            if family.values_collection == values_collection && !out.contains(&family.collection) {
                out.push(family.collection.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::types::IndexKind;

    #[test]
    fn test_declared_schema_shape() {
        let schema = Schema::declared(&ReconcileConfig::default());
        assert_eq!(schema.collections.len(), 7);
        assert_eq!(schema.text_indexes.len(), 2);
        assert_eq!(schema.ttl_indexes.len(), 3);
        assert_eq!(schema.families.len(), 3);
    }

    #[test]
    fn test_ttl_indexes_follow_config() {
        let mut config = ReconcileConfig::default();
        config.expiry.session = Duration::from_secs(3600);
        let schema = Schema::declared(&config);

        let sessions = schema.model(SESSIONS).unwrap();
        let ttl = sessions.index("sessions_created_at_ttl").unwrap();
        assert_eq!(ttl.kind, IndexKind::Ttl);
        assert_eq!(ttl.expire_after_seconds(), Some(3600));
    }

    #[test]
    fn test_declared_models_have_no_text_indexes() {
        let schema = Schema::declared(&ReconcileConfig::default());
        for model in &schema.collections {
            assert!(model.indexes.iter().all(|i| i.kind != IndexKind::Text));
        }
    }

    #[test]
    fn test_referencing_collections() {
        let schema = Schema::declared(&ReconcileConfig::default());
        assert_eq!(
            schema.referencing_collections(LOCALIZED_VALUES),
            vec![LOCATIONS, COUNTRIES, PARKING_SPOTS]
        );
        assert!(schema.referencing_collections("other").is_empty());
    }

    #[test]
    fn test_family_labels() {
        assert_eq!(EntityFamilyKind::ParkingSpot.to_string(), "parking spot");
        assert_eq!(EntityFamilyKind::Country.collection(), COUNTRIES);
    }
}
