//! Schema descriptors for statically typed entities.
//!
//! A schema maps each stored property name to a read accessor, a write
//! accessor and a declared EDM type. It is built once per Rust type through
//! [`EntitySchemaBuilder`] and cached by type identity in
//! [`SchemaCache`](crate::SchemaCache).

use crate::edm::EdmType;
use crate::entity::{is_reserved, PropertyMap, TableEntity};
use crate::error::{ModelError, ModelResult};
use crate::property::EntityProperty;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// A native Rust value that maps onto exactly one EDM type.
pub trait PropertyValue: Sized {
    const EDM_TYPE: EdmType;

    fn to_property(&self) -> EntityProperty;

    fn from_property(property: &EntityProperty) -> ModelResult<Self>;
}

impl PropertyValue for bool {
    const EDM_TYPE: EdmType = EdmType::Boolean;
    fn to_property(&self) -> EntityProperty {
        (*self).into()
    }
    fn from_property(property: &EntityProperty) -> ModelResult<Self> {
        property.as_bool()
    }
}

impl PropertyValue for i32 {
    const EDM_TYPE: EdmType = EdmType::Int32;
    fn to_property(&self) -> EntityProperty {
        (*self).into()
    }
    fn from_property(property: &EntityProperty) -> ModelResult<Self> {
        property.as_i32()
    }
}

impl PropertyValue for i64 {
    const EDM_TYPE: EdmType = EdmType::Int64;
    fn to_property(&self) -> EntityProperty {
        (*self).into()
    }
    fn from_property(property: &EntityProperty) -> ModelResult<Self> {
        property.as_i64()
    }
}

impl PropertyValue for f64 {
    const EDM_TYPE: EdmType = EdmType::Double;
    fn to_property(&self) -> EntityProperty {
        (*self).into()
    }
    fn from_property(property: &EntityProperty) -> ModelResult<Self> {
        property.as_f64()
    }
}

impl PropertyValue for String {
    const EDM_TYPE: EdmType = EdmType::String;
    fn to_property(&self) -> EntityProperty {
        self.as_str().into()
    }
    fn from_property(property: &EntityProperty) -> ModelResult<Self> {
        property
            .as_str()
            .map(str::to_string)
            .ok_or(ModelError::NullValue {
                edm_type: EdmType::String,
            })
    }
}

impl PropertyValue for Vec<u8> {
    const EDM_TYPE: EdmType = EdmType::Binary;
    fn to_property(&self) -> EntityProperty {
        self.as_slice().into()
    }
    fn from_property(property: &EntityProperty) -> ModelResult<Self> {
        property.as_binary()?.ok_or(ModelError::NullValue {
            edm_type: EdmType::Binary,
        })
    }
}

impl PropertyValue for DateTime<Utc> {
    const EDM_TYPE: EdmType = EdmType::DateTime;
    fn to_property(&self) -> EntityProperty {
        (*self).into()
    }
    fn from_property(property: &EntityProperty) -> ModelResult<Self> {
        property.as_datetime()
    }
}

impl PropertyValue for Uuid {
    const EDM_TYPE: EdmType = EdmType::Guid;
    fn to_property(&self) -> EntityProperty {
        (*self).into()
    }
    fn from_property(property: &EntityProperty) -> ModelResult<Self> {
        property.as_guid()
    }
}

impl<V: PropertyValue> PropertyValue for Option<V> {
    const EDM_TYPE: EdmType = V::EDM_TYPE;
    fn to_property(&self) -> EntityProperty {
        match self {
            Some(v) => v.to_property(),
            None => EntityProperty::null(V::EDM_TYPE),
        }
    }
    fn from_property(property: &EntityProperty) -> ModelResult<Self> {
        if property.is_null() {
            Ok(None)
        } else {
            V::from_property(property).map(Some)
        }
    }
}

/// The identity and concurrency fields every typed entity carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityKeys {
    pub partition_key: String,
    pub row_key: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

impl EntityKeys {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            timestamp: Some(Utc::now()),
            etag: None,
        }
    }
}

/// A statically typed entity with a schema descriptor.
///
/// `Default` stands in for the no-argument constructor used when
/// materializing query results.
pub trait TypedEntity: Default + Send + Sync + 'static {
    fn keys(&self) -> &EntityKeys;

    fn keys_mut(&mut self) -> &mut EntityKeys;

    /// Describes the stored properties of this type.
    fn schema() -> ModelResult<EntitySchema<Self>>;
}

type Reader<T> = Box<dyn Fn(&T) -> EntityProperty + Send + Sync>;
type Writer<T> = Box<dyn Fn(&mut T, &EntityProperty) -> ModelResult<()> + Send + Sync>;

/// Read/write access to one stored property of `T`.
pub struct PropertyAccessor<T> {
    name: String,
    edm_type: EdmType,
    read: Reader<T>,
    write: Writer<T>,
}

impl<T> PropertyAccessor<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn edm_type(&self) -> EdmType {
        self.edm_type
    }

    pub fn read(&self, entity: &T) -> EntityProperty {
        (self.read)(entity)
    }

    pub fn write(&self, entity: &mut T, property: &EntityProperty) -> ModelResult<()> {
        (self.write)(entity, property).map_err(|e| e.for_property(&self.name))
    }
}

impl<T> std::fmt::Debug for PropertyAccessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyAccessor")
            .field("name", &self.name)
            .field("edm_type", &self.edm_type)
            .finish_non_exhaustive()
    }
}

/// Property name to accessor mapping for one entity type.
#[derive(Debug)]
pub struct EntitySchema<T> {
    properties: Vec<PropertyAccessor<T>>,
}

impl<T> EntitySchema<T> {
    pub fn builder() -> EntitySchemaBuilder<T> {
        EntitySchemaBuilder {
            properties: Vec::new(),
            error: None,
        }
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn accessors(&self) -> impl Iterator<Item = &PropertyAccessor<T>> {
        self.properties.iter()
    }

    pub fn accessor(&self, name: &str) -> Option<&PropertyAccessor<T>> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Declared types by property name; used to override inferred types when
    /// a response carries no metadata.
    pub fn property_types(&self) -> HashMap<String, EdmType> {
        self.properties
            .iter()
            .map(|p| (p.name.clone(), p.edm_type))
            .collect()
    }

    /// Reads every described property out of `entity`.
    pub fn write_properties(&self, entity: &T) -> PropertyMap {
        self.properties
            .iter()
            .map(|p| (p.name.clone(), p.read(entity)))
            .collect()
    }

    /// Populates `entity` from `properties`. Unknown names are ignored and
    /// described properties absent from the map are left untouched.
    pub fn read_properties(&self, entity: &mut T, properties: &PropertyMap) -> ModelResult<()> {
        for accessor in &self.properties {
            if let Some(property) = properties.get(&accessor.name) {
                accessor.write(entity, property)?;
            }
        }
        Ok(())
    }
}

impl<T: TypedEntity> EntitySchema<T> {
    /// Converts a typed value into the generic entity form.
    pub fn to_entity(&self, typed: &T) -> TableEntity {
        let keys = typed.keys();
        TableEntity {
            partition_key: keys.partition_key.clone(),
            row_key: keys.row_key.clone(),
            timestamp: keys.timestamp,
            etag: keys.etag.clone(),
            properties: self.write_properties(typed),
        }
    }

    /// Materializes a typed value from the generic entity form.
    pub fn from_entity(&self, entity: TableEntity) -> ModelResult<T> {
        let mut typed = T::default();
        self.read_properties(&mut typed, &entity.properties)?;
        *typed.keys_mut() = EntityKeys {
            partition_key: entity.partition_key,
            row_key: entity.row_key,
            timestamp: entity.timestamp,
            etag: entity.etag,
        };
        Ok(typed)
    }
}

/// Registers accessors for an [`EntitySchema`].
///
/// Registration errors are deferred to [`build`](Self::build) so that the
/// builder chains without `?` at every step.
pub struct EntitySchemaBuilder<T> {
    properties: Vec<PropertyAccessor<T>>,
    error: Option<ModelError>,
}

impl<T: 'static> EntitySchemaBuilder<T> {
    /// Registers a field through plain getter/setter functions.
    #[must_use]
    pub fn field<V>(self, name: &str, get: fn(&T) -> &V, set: fn(&mut T, V)) -> Self
    where
        V: PropertyValue + 'static,
    {
        self.accessor(
            name,
            V::EDM_TYPE,
            move |entity: &T| get(entity).to_property(),
            move |entity: &mut T, property: &EntityProperty| {
                set(entity, V::from_property(property)?);
                Ok(())
            },
        )
    }

    /// Registers a fully custom accessor pair.
    #[must_use]
    pub fn accessor<R, W>(mut self, name: &str, edm_type: EdmType, read: R, write: W) -> Self
    where
        R: Fn(&T) -> EntityProperty + Send + Sync + 'static,
        W: Fn(&mut T, &EntityProperty) -> ModelResult<()> + Send + Sync + 'static,
    {
        if self.error.is_some() {
            return self;
        }
        if is_reserved(name) {
            self.error = Some(ModelError::ReservedName(name.to_string()));
            return self;
        }
        if self.properties.iter().any(|p| p.name == name) {
            self.error = Some(ModelError::DuplicateProperty(name.to_string()));
            return self;
        }
        self.properties.push(PropertyAccessor {
            name: name.to_string(),
            edm_type,
            read: Box::new(read),
            write: Box::new(write),
        });
        self
    }

    pub fn build(self) -> ModelResult<EntitySchema<T>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(EntitySchema {
                properties: self.properties,
            }),
        }
    }
}
