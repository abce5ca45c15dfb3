//! JSON (OData "light") payloads.

mod reader;
mod writer;

pub use reader::{read_entity, read_query, read_table_names};
pub use writer::{write_entity, write_table_entry};

/// Suffix of the sibling field that carries a property's EDM type.
pub const ODATA_TYPE_SUFFIX: &str = "@odata.type";

pub(crate) const TABLE_NAME: &str = "TableName";
pub(crate) const VALUE: &str = "value";
