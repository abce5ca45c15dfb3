//! EDM primitive types and their textual wire forms.
//!
//! Every property value travels as text (JSON string/number or XML element
//! content), so each type owns a canonical format and parse rule here.

use crate::error::{ModelError, ModelResult};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire token for positive infinity.
pub const INFINITY_TOKEN: &str = "Infinity";
/// Wire token for negative infinity.
pub const NEGATIVE_INFINITY_TOKEN: &str = "-Infinity";
/// Wire token for not-a-number.
pub const NAN_TOKEN: &str = "NaN";

/// The primitive types of the Entity Data Model supported by the table service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdmType {
    Binary,
    Boolean,
    DateTime,
    Double,
    Guid,
    Int32,
    Int64,
    String,
}

impl EdmType {
    /// All supported types, in declaration order.
    pub const ALL: [EdmType; 8] = [
        EdmType::Binary,
        EdmType::Boolean,
        EdmType::DateTime,
        EdmType::Double,
        EdmType::Guid,
        EdmType::Int32,
        EdmType::Int64,
        EdmType::String,
    ];

    /// The OData type name, e.g. `Edm.Int64`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EdmType::Binary => "Edm.Binary",
            EdmType::Boolean => "Edm.Boolean",
            EdmType::DateTime => "Edm.DateTime",
            EdmType::Double => "Edm.Double",
            EdmType::Guid => "Edm.Guid",
            EdmType::Int32 => "Edm.Int32",
            EdmType::Int64 => "Edm.Int64",
            EdmType::String => "Edm.String",
        }
    }

    /// Whether a JSON reader can recover this type from the token shape alone.
    ///
    /// Booleans, finite doubles, 32-bit integers and strings map onto native
    /// JSON values. Everything else needs an explicit `@odata.type` sibling.
    /// Non-finite doubles are the exception handled by
    /// [`EntityProperty::requires_type_annotation`](crate::EntityProperty::requires_type_annotation).
    #[must_use]
    pub const fn is_inferable(self) -> bool {
        matches!(
            self,
            EdmType::Boolean | EdmType::Double | EdmType::Int32 | EdmType::String
        )
    }

    /// Checks that `value` parses as this type.
    pub fn validate(self, value: &str) -> ModelResult<()> {
        let ok = match self {
            EdmType::Binary => decode_binary(value).is_ok(),
            EdmType::Boolean => parse_bool(value).is_ok(),
            EdmType::DateTime => parse_datetime(value).is_ok(),
            EdmType::Double => parse_double(value).is_ok(),
            EdmType::Guid => uuid::Uuid::parse_str(value).is_ok(),
            EdmType::Int32 => value.parse::<i32>().is_ok(),
            EdmType::Int64 => value.parse::<i64>().is_ok(),
            EdmType::String => true,
        };
        if ok {
            Ok(())
        } else {
            Err(ModelError::InvalidValue {
                edm_type: self,
                value: value.to_string(),
            })
        }
    }
}

impl fmt::Display for EdmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdmType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EdmType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ModelError::UnknownEdmType(s.to_string()))
    }
}

/// Parses `true`/`false` case-insensitively, as the service does.
pub fn parse_bool(value: &str) -> ModelResult<bool> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ModelError::InvalidValue {
            edm_type: EdmType::Boolean,
            value: value.to_string(),
        })
    }
}

/// Formats a double for the wire.
///
/// Non-finite values become `Infinity`, `-Infinity` or `NaN`. Finite values
/// always carry a decimal point or exponent so a reader without metadata does
/// not mistake `5.0` for an Int32.
#[must_use]
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        NAN_TOKEN.to_string()
    } else if value == f64::INFINITY {
        INFINITY_TOKEN.to_string()
    } else if value == f64::NEG_INFINITY {
        NEGATIVE_INFINITY_TOKEN.to_string()
    } else {
        format!("{value:?}")
    }
}

/// Parses a wire double, accepting the `INF`/`-INF` aliases.
pub fn parse_double(value: &str) -> ModelResult<f64> {
    match value {
        INFINITY_TOKEN | "INF" => Ok(f64::INFINITY),
        NEGATIVE_INFINITY_TOKEN | "-INF" => Ok(f64::NEG_INFINITY),
        NAN_TOKEN => Ok(f64::NAN),
        other => other.parse::<f64>().map_err(|_| ModelError::InvalidValue {
            edm_type: EdmType::Double,
            value: value.to_string(),
        }),
    }
}

/// Whether the wire string of a double names a non-finite value.
#[must_use]
pub fn is_special_double(value: &str) -> bool {
    matches!(
        value,
        INFINITY_TOKEN | "INF" | NEGATIVE_INFINITY_TOKEN | "-INF" | NAN_TOKEN
    )
}

/// Formats a UTC instant as ISO-8601 with a `Z` suffix.
#[must_use]
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parses an ISO-8601 instant. Values without an offset are taken as UTC.
pub fn parse_datetime(value: &str) -> ModelResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ModelError::InvalidValue {
            edm_type: EdmType::DateTime,
            value: value.to_string(),
        })
}

/// Base64-encodes binary content for textual transport.
#[must_use]
pub fn encode_binary(bytes: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decodes Base64 wire content.
pub fn decode_binary(value: &str) -> ModelResult<Vec<u8>> {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|_| ModelError::InvalidValue {
            edm_type: EdmType::Binary,
            value: value.to_string(),
        })
}
