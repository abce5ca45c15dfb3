//! Schema descriptor cache keyed by type identity.

use crate::edm::EdmType;
use crate::entity::TableEntity;
use crate::error::ModelResult;
use crate::schema::{EntitySchema, TypedEntity};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

type ErasedSchema = Arc<dyn Any + Send + Sync>;

/// Lazily populated cache of [`EntitySchema`] values.
///
/// Owned by the client configuration rather than living in a global. When
/// disabled, every lookup rebuilds the schema. Concurrent first lookups may
/// both build; the first to publish wins and the other result is dropped.
#[derive(Debug)]
pub struct SchemaCache {
    enabled: bool,
    schemas: RwLock<HashMap<TypeId, ErasedSchema>>,
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: true,
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// A cache that never stores anything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            schemas: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of cached schemas.
    pub fn len(&self) -> usize {
        self.schemas.read().map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut map) = self.schemas.write() {
            map.clear();
        }
    }

    /// Returns the schema for `T`, building it on first use.
    pub fn schema<T: TypedEntity>(&self) -> ModelResult<Arc<EntitySchema<T>>> {
        let key = TypeId::of::<T>();
        if self.enabled {
            let cached = self
                .schemas
                .read()
                .ok()
                .and_then(|map| map.get(&key).cloned());
            if let Some(schema) = cached.and_then(|s| s.downcast::<EntitySchema<T>>().ok()) {
                return Ok(schema);
            }
        }

        debug!("Building entity schema for {}", type_name::<T>());
        let schema = Arc::new(T::schema()?);
        if !self.enabled {
            return Ok(schema);
        }

        let mut map = match self.schemas.write() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        let published = map
            .entry(key)
            .or_insert_with(|| schema.clone() as ErasedSchema)
            .clone();
        Ok(published.downcast::<EntitySchema<T>>().unwrap_or(schema))
    }

    /// Declared property types of `T`.
    pub fn property_types<T: TypedEntity>(&self) -> ModelResult<HashMap<String, EdmType>> {
        Ok(self.schema::<T>()?.property_types())
    }

    /// Converts a typed entity into the generic form.
    pub fn to_entity<T: TypedEntity>(&self, typed: &T) -> ModelResult<TableEntity> {
        Ok(self.schema::<T>()?.to_entity(typed))
    }

    /// Materializes a typed entity from the generic form.
    pub fn from_entity<T: TypedEntity>(&self, entity: TableEntity) -> ModelResult<T> {
        self.schema::<T>()?.from_entity(entity)
    }
}
