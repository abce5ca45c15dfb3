//! Caller-supplied callbacks that steer decoding.

use crate::format::PayloadFormat;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tablestore_model::{EdmType, ModelResult, PropertyMap, TableEntity};

/// Chooses the EDM type of an unannotated property.
///
/// Called with `(partition_key, row_key, property_name, wire_value)`.
/// Returning `None` falls back to inference from the JSON token.
pub type PropertyResolver = Arc<dyn Fn(&str, &str, &str, &str) -> Option<EdmType> + Send + Sync>;

/// Projects a decoded row into an arbitrary result type.
///
/// Called with `(partition_key, row_key, timestamp, properties, etag)`.
pub type EntityResolver<R> = Arc<
    dyn Fn(&str, &str, Option<DateTime<Utc>>, PropertyMap, Option<&str>) -> ModelResult<R>
        + Send
        + Sync,
>;

/// Decoding options for one response.
#[derive(Clone, Default)]
pub struct ReadOptions {
    pub format: PayloadFormat,
    pub property_resolver: Option<PropertyResolver>,
    /// Declared types by property name, typically from a schema descriptor.
    pub type_hints: Option<Arc<HashMap<String, EdmType>>>,
}

impl std::fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOptions")
            .field("format", &self.format)
            .field("property_resolver", &self.property_resolver.is_some())
            .field("type_hints", &self.type_hints)
            .finish()
    }
}

impl ReadOptions {
    pub fn new(format: PayloadFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_property_resolver(mut self, resolver: PropertyResolver) -> Self {
        self.property_resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn with_type_hints(mut self, hints: HashMap<String, EdmType>) -> Self {
        self.type_hints = Some(Arc::new(hints));
        self
    }

    /// Type for an unannotated property: resolver first, then hints.
    ///
    /// The resolver is only consulted for non-null values; a null still
    /// takes its declared type from the hints.
    pub(crate) fn resolve_type(
        &self,
        partition_key: &str,
        row_key: &str,
        name: &str,
        value: Option<&str>,
    ) -> Option<EdmType> {
        value
            .and_then(|v| {
                self.property_resolver
                    .as_ref()
                    .and_then(|r| r(partition_key, row_key, name, v))
            })
            .or_else(|| self.type_hints.as_ref().and_then(|h| h.get(name).copied()))
    }
}

/// Applies an entity resolver to a decoded row.
pub fn resolve<R>(entity: TableEntity, resolver: &EntityResolver<R>) -> ModelResult<R> {
    resolver(
        &entity.partition_key,
        &entity.row_key,
        entity.timestamp,
        entity.properties,
        entity.etag.as_deref(),
    )
}
