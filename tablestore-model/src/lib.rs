//! Entity model for tablestore.
//!
//! Defines the value types that the serialization engine and the client
//! operate on:
//! - [`EdmType`]: the primitive type system of the table service
//! - [`EntityProperty`]: a typed value held in its wire form
//! - [`TableEntity`]: one row with keys, timestamp, etag and a property map
//! - [`EntitySchema`] / [`TypedEntity`]: schema descriptors for Rust structs
//! - [`SchemaCache`]: per-client cache of schema descriptors

mod cache;
pub mod edm;
mod entity;
mod error;
mod property;
mod schema;

pub use cache::SchemaCache;
pub use edm::EdmType;
pub use entity::{
    is_reserved, PropertyMap, TableEntity, ETAG, PARTITION_KEY, RESERVED_NAMES, ROW_KEY,
    TIMESTAMP,
};
pub use error::{ModelError, ModelResult};
pub use property::EntityProperty;
pub use schema::{
    EntityKeys, EntitySchema, EntitySchemaBuilder, PropertyAccessor, PropertyValue, TypedEntity,
};
