use serde::{Deserialize, Serialize};

/// Payload format negotiated per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// JSON with every annotation, self links included.
    JsonFullMetadata,
    /// JSON annotated only where the type cannot be inferred.
    #[default]
    JsonMinimalMetadata,
    /// JSON without any annotation.
    JsonNoMetadata,
    /// Legacy AtomPub/XML.
    AtomPub,
}

impl PayloadFormat {
    /// Value of the `Accept` header.
    #[must_use]
    pub const fn accept(self) -> &'static str {
        match self {
            PayloadFormat::JsonFullMetadata => "application/json;odata=fullmetadata",
            PayloadFormat::JsonMinimalMetadata => "application/json;odata=minimalmetadata",
            PayloadFormat::JsonNoMetadata => "application/json;odata=nometadata",
            PayloadFormat::AtomPub => "application/atom+xml,application/xml",
        }
    }

    /// Value of the `Content-Type` header for request bodies.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            PayloadFormat::AtomPub => "application/atom+xml",
            _ => "application/json",
        }
    }

    #[must_use]
    pub const fn is_json(self) -> bool {
        !matches!(self, PayloadFormat::AtomPub)
    }
}
