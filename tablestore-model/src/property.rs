use crate::edm::{
    decode_binary, encode_binary, format_datetime, format_double, is_special_double, parse_bool,
    parse_datetime, parse_double, EdmType,
};
use crate::error::{ModelError, ModelResult};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A single typed property value.
///
/// The value is held in its wire form so that it can be written back exactly
/// as it was read. Binary values are held Base64-encoded and exposed decoded.
/// A null value keeps its declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityProperty {
    edm_type: EdmType,
    value: Option<String>,
}

impl EntityProperty {
    /// Builds a property from a wire string and its declared type.
    ///
    /// Fails fast if the string does not parse as `edm_type`.
    pub fn from_wire(value: Option<&str>, edm_type: EdmType) -> ModelResult<Self> {
        if let Some(v) = value {
            edm_type.validate(v)?;
        }
        Ok(Self {
            edm_type,
            value: value.map(str::to_string),
        })
    }

    /// A null value of the given type.
    #[must_use]
    pub const fn null(edm_type: EdmType) -> Self {
        Self {
            edm_type,
            value: None,
        }
    }

    #[must_use]
    pub const fn edm_type(&self) -> EdmType {
        self.edm_type
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// The raw wire string. Binary values are returned Base64-encoded.
    #[must_use]
    pub fn as_wire(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Whether a JSON writer must emit an `@odata.type` annotation for this value.
    #[must_use]
    pub fn requires_type_annotation(&self) -> bool {
        match self.edm_type {
            EdmType::Double => self.value.as_deref().is_some_and(is_special_double),
            other => !other.is_inferable(),
        }
    }

    /// Replaces type and value together.
    pub fn set<V: Into<EntityProperty>>(&mut self, value: V) {
        *self = value.into();
    }

    fn required(&self) -> ModelResult<&str> {
        self.value.as_deref().ok_or(ModelError::NullValue {
            edm_type: self.edm_type,
        })
    }

    fn invalid(&self, edm_type: EdmType, value: &str) -> ModelError {
        ModelError::InvalidValue {
            edm_type,
            value: value.to_string(),
        }
    }

    /// Textual content of the value, Base64 for binary. `None` only for null.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn as_bool(&self) -> ModelResult<bool> {
        parse_bool(self.required()?)
    }

    pub fn as_bool_opt(&self) -> ModelResult<Option<bool>> {
        self.value.as_deref().map(parse_bool).transpose()
    }

    pub fn as_i32(&self) -> ModelResult<i32> {
        let raw = self.required()?;
        raw.parse().map_err(|_| self.invalid(EdmType::Int32, raw))
    }

    pub fn as_i32_opt(&self) -> ModelResult<Option<i32>> {
        if self.is_null() {
            return Ok(None);
        }
        self.as_i32().map(Some)
    }

    pub fn as_i64(&self) -> ModelResult<i64> {
        let raw = self.required()?;
        raw.parse().map_err(|_| self.invalid(EdmType::Int64, raw))
    }

    pub fn as_i64_opt(&self) -> ModelResult<Option<i64>> {
        if self.is_null() {
            return Ok(None);
        }
        self.as_i64().map(Some)
    }

    pub fn as_f64(&self) -> ModelResult<f64> {
        parse_double(self.required()?)
    }

    pub fn as_f64_opt(&self) -> ModelResult<Option<f64>> {
        self.value.as_deref().map(parse_double).transpose()
    }

    pub fn as_datetime(&self) -> ModelResult<DateTime<Utc>> {
        parse_datetime(self.required()?)
    }

    pub fn as_datetime_opt(&self) -> ModelResult<Option<DateTime<Utc>>> {
        self.value.as_deref().map(parse_datetime).transpose()
    }

    pub fn as_guid(&self) -> ModelResult<Uuid> {
        let raw = self.required()?;
        Uuid::parse_str(raw).map_err(|_| self.invalid(EdmType::Guid, raw))
    }

    pub fn as_guid_opt(&self) -> ModelResult<Option<Uuid>> {
        if self.is_null() {
            return Ok(None);
        }
        self.as_guid().map(Some)
    }

    /// Decoded binary content. `Ok(None)` for null, `Ok(Some(vec![]))` for empty.
    pub fn as_binary(&self) -> ModelResult<Option<Vec<u8>>> {
        self.value.as_deref().map(decode_binary).transpose()
    }
}

impl From<bool> for EntityProperty {
    fn from(value: bool) -> Self {
        Self {
            edm_type: EdmType::Boolean,
            value: Some(value.to_string()),
        }
    }
}

impl From<i32> for EntityProperty {
    fn from(value: i32) -> Self {
        Self {
            edm_type: EdmType::Int32,
            value: Some(value.to_string()),
        }
    }
}

impl From<i64> for EntityProperty {
    fn from(value: i64) -> Self {
        Self {
            edm_type: EdmType::Int64,
            value: Some(value.to_string()),
        }
    }
}

impl From<f64> for EntityProperty {
    fn from(value: f64) -> Self {
        Self {
            edm_type: EdmType::Double,
            value: Some(format_double(value)),
        }
    }
}

impl From<String> for EntityProperty {
    fn from(value: String) -> Self {
        Self {
            edm_type: EdmType::String,
            value: Some(value),
        }
    }
}

impl From<&str> for EntityProperty {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Vec<u8>> for EntityProperty {
    fn from(value: Vec<u8>) -> Self {
        Self::from(value.as_slice())
    }
}

impl From<&[u8]> for EntityProperty {
    fn from(value: &[u8]) -> Self {
        Self {
            edm_type: EdmType::Binary,
            value: Some(encode_binary(value)),
        }
    }
}

impl From<DateTime<Utc>> for EntityProperty {
    fn from(value: DateTime<Utc>) -> Self {
        Self {
            edm_type: EdmType::DateTime,
            value: Some(format_datetime(&value)),
        }
    }
}

impl From<Uuid> for EntityProperty {
    fn from(value: Uuid) -> Self {
        Self {
            edm_type: EdmType::Guid,
            value: Some(value.hyphenated().to_string()),
        }
    }
}

macro_rules! impl_from_option {
    ($($ty:ty => $edm:expr),* $(,)?) => {
        $(
            impl From<Option<$ty>> for EntityProperty {
                fn from(value: Option<$ty>) -> Self {
                    value.map_or_else(|| EntityProperty::null($edm), EntityProperty::from)
                }
            }
        )*
    };
}

impl_from_option!(
    bool => EdmType::Boolean,
    i32 => EdmType::Int32,
    i64 => EdmType::Int64,
    f64 => EdmType::Double,
    String => EdmType::String,
    Vec<u8> => EdmType::Binary,
    DateTime<Utc> => EdmType::DateTime,
    Uuid => EdmType::Guid,
);
