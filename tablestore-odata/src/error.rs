//! Error types for the wire codec.

use tablestore_model::ModelError;
use thiserror::Error;

/// Result type for encode/decode operations.
pub type ODataResult<T> = Result<T, ODataError>;

/// Errors raised while reading or writing payloads.
#[derive(Debug, Error)]
pub enum ODataError {
    /// The body is not well-formed JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The body is not well-formed XML.
    #[error("XML error: {0}")]
    Xml(String),

    /// Well-formed input with an unexpected shape.
    #[error("unexpected content: {0}")]
    UnexpectedToken(String),

    /// A field the payload must carry is absent.
    #[error("missing field: {0}")]
    MissingField(String),

    /// A value failed to parse as its declared or inferred type.
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl ODataError {
    /// True when the service response broke the payload contract, as opposed
    /// to a value that could not be converted.
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(self, ODataError::Model(_))
    }
}

impl From<quick_xml::Error> for ODataError {
    fn from(err: quick_xml::Error) -> Self {
        ODataError::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ODataError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        ODataError::Xml(err.to_string())
    }
}
