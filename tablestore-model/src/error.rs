//! Error types for the entity model.

use crate::edm::EdmType;
use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while building, converting or reading entity properties.
///
/// All of these are deterministic given the same input and must never be
/// retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// The wire string cannot be parsed as the declared EDM type.
    #[error("value {value:?} is not a valid {edm_type}")]
    InvalidValue { edm_type: EdmType, value: String },

    /// A non-nullable accessor was called on a null property.
    #[error("{edm_type} property is null")]
    NullValue { edm_type: EdmType },

    /// An `m:type` / `@odata.type` annotation named an unsupported type.
    #[error("unknown EDM type: {0}")]
    UnknownEdmType(String),

    /// A schema tried to register PartitionKey, RowKey, Timestamp or Etag.
    #[error("'{0}' is a reserved property name")]
    ReservedName(String),

    /// A schema registered the same property name twice.
    #[error("duplicate property '{0}'")]
    DuplicateProperty(String),

    /// A field required for serialization is absent.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A property-level failure, tagged with the offending property name.
    #[error("property '{name}': {source}")]
    Property {
        name: String,
        #[source]
        source: Box<ModelError>,
    },
}

impl ModelError {
    /// Wraps this error with the name of the property it applies to.
    pub fn for_property(self, name: impl Into<String>) -> Self {
        ModelError::Property {
            name: name.into(),
            source: Box::new(self),
        }
    }
}
