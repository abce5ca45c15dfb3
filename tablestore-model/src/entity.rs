use crate::property::EntityProperty;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Property name carrying the partition key.
pub const PARTITION_KEY: &str = "PartitionKey";
/// Property name carrying the row key.
pub const ROW_KEY: &str = "RowKey";
/// Property name carrying the server-assigned timestamp.
pub const TIMESTAMP: &str = "Timestamp";
/// Name reserved for the concurrency token, which travels only as a header.
pub const ETAG: &str = "Etag";

/// Names that can never be written through the generic property map.
pub const RESERVED_NAMES: [&str; 4] = [PARTITION_KEY, ROW_KEY, TIMESTAMP, ETAG];

/// Property name to value. Ordering carries no meaning; a sorted map keeps
/// serialized output stable.
pub type PropertyMap = BTreeMap<String, EntityProperty>;

/// Returns true for PartitionKey, RowKey, Timestamp and Etag.
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// One row in a table.
///
/// `timestamp` and `etag` are managed by the service. The timestamp starts
/// at construction time and is replaced by the server value on read; the
/// etag is only ever sent as an `If-Match` header.
#[derive(Debug, Clone, PartialEq)]
pub struct TableEntity {
    pub partition_key: String,
    pub row_key: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub properties: PropertyMap,
}

impl TableEntity {
    /// Creates an entity with no properties.
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            timestamp: Some(Utc::now()),
            etag: None,
            properties: PropertyMap::new(),
        }
    }

    /// Builder-style property setter.
    #[must_use]
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<EntityProperty>,
    ) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn property(&self, name: &str) -> Option<&EntityProperty> {
        self.properties.get(name)
    }

    /// Inserts or replaces a property, returning the previous value.
    pub fn set_property(
        &mut self,
        name: impl Into<String>,
        value: impl Into<EntityProperty>,
    ) -> Option<EntityProperty> {
        self.properties.insert(name.into(), value.into())
    }

    pub fn remove_property(&mut self, name: &str) -> Option<EntityProperty> {
        self.properties.remove(name)
    }

    /// Properties eligible for a request body. Reserved names are skipped:
    /// the dedicated fields always win.
    pub fn writable_properties(&self) -> impl Iterator<Item = (&str, &EntityProperty)> {
        self.properties
            .iter()
            .filter(|(name, _)| !is_reserved(name))
            .map(|(name, prop)| (name.as_str(), prop))
    }
}
