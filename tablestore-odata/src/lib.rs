//! OData wire codec for tablestore.
//!
//! Converts [`TableEntity`] values to request bodies and response bodies back
//! to entities, for every [`PayloadFormat`]:
//!
//! - JSON with full, minimal or no metadata ([`json`])
//! - legacy AtomPub/XML ([`atom`])
//!
//! Everything here is pure, synchronous transformation: bytes in, a parsed
//! value or a classified [`ODataError`] out.
//!
//! # Example
//!
//! ```
//! use tablestore_model::TableEntity;
//! use tablestore_odata::{serialize_entity, PayloadFormat};
//!
//! let entity = TableEntity::new("P1", "R1").with_property("Count", 5i32);
//! let body = serialize_entity(&entity, PayloadFormat::JsonMinimalMetadata).unwrap();
//! assert!(body.contains(r#""Count":5"#));
//! assert!(!body.contains("Count@odata.type"));
//! ```

pub mod atom;
mod error;
mod etag;
mod format;
pub mod json;
mod resolver;
mod service_error;

pub use error::{ODataError, ODataResult};
pub use etag::etag_from_timestamp;
pub use format::PayloadFormat;
pub use resolver::{resolve, EntityResolver, PropertyResolver, ReadOptions};
pub use service_error::ExtendedErrorInfo;

use tablestore_model::TableEntity;

/// Serializes one entity as a request body in `format`.
///
/// All JSON variants produce the same body: annotations are written only
/// where a reader could not infer the type.
pub fn serialize_entity(entity: &TableEntity, format: PayloadFormat) -> ODataResult<String> {
    match format {
        PayloadFormat::AtomPub => atom::write_entity(entity),
        _ => json::write_entity(entity),
    }
}

/// Serializes a table entry as a request body in `format`.
pub fn serialize_table_entry(table_name: &str, format: PayloadFormat) -> ODataResult<String> {
    match format {
        PayloadFormat::AtomPub => Ok(atom::write_table_entry(table_name)),
        _ => json::write_table_entry(table_name),
    }
}

/// Parses a single-entity response body.
pub fn deserialize_entity(body: &str, options: &ReadOptions) -> ODataResult<TableEntity> {
    match options.format {
        PayloadFormat::AtomPub => atom::read_entity(body, options),
        _ => json::read_entity(body, options),
    }
}

/// Parses a query response body into entities, in response order.
pub fn deserialize_query(body: &str, options: &ReadOptions) -> ODataResult<Vec<TableEntity>> {
    match options.format {
        PayloadFormat::AtomPub => atom::read_query(body, options),
        _ => json::read_query(body, options),
    }
}

/// Parses a table listing into table names.
pub fn deserialize_table_names(body: &str, format: PayloadFormat) -> ODataResult<Vec<String>> {
    match format {
        PayloadFormat::AtomPub => atom::read_table_names(body),
        _ => json::read_table_names(body),
    }
}
