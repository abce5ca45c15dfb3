//! JSON entity and feed reader.
//!
//! Handles all three metadata levels. `odata.*` fields are consumed as
//! metadata (only the etag is kept), `<name>@odata.type` fields fix the type
//! of their sibling, and everything else is typed by resolver, type hint or
//! inference from the token shape, in that order.

use super::{ODATA_TYPE_SUFFIX, TABLE_NAME, VALUE};
use crate::error::{ODataError, ODataResult};
use crate::etag::etag_from_timestamp;
use crate::resolver::ReadOptions;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tablestore_model::edm::parse_datetime;
use tablestore_model::{
    EdmType, EntityProperty, PropertyMap, TableEntity, PARTITION_KEY, ROW_KEY, TIMESTAMP,
};
use tracing::debug;

/// Parses a single-entity response body.
pub fn read_entity(body: &str, options: &ReadOptions) -> ODataResult<TableEntity> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(map) => entity_from_object(map, options),
        other => Err(unexpected("entity object", &other)),
    }
}

/// Parses a query response body (`{"value": [...]}`).
pub fn read_query(body: &str, options: &ReadOptions) -> ODataResult<Vec<TableEntity>> {
    let rows = feed_rows(body)?;
    debug!("Decoding {} entities from JSON feed", rows.len());
    rows.into_iter()
        .map(|row| match row {
            Value::Object(map) => entity_from_object(map, options),
            other => Err(unexpected("entity object", &other)),
        })
        .collect()
}

/// Parses a table listing into table names.
pub fn read_table_names(body: &str) -> ODataResult<Vec<String>> {
    feed_rows(body)?
        .into_iter()
        .map(|row| {
            row.get(TABLE_NAME)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ODataError::MissingField(TABLE_NAME.to_string()))
        })
        .collect()
}

fn feed_rows(body: &str) -> ODataResult<Vec<Value>> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(mut map) => match map.remove(VALUE) {
            Some(Value::Array(rows)) => Ok(rows),
            Some(other) => Err(unexpected("array", &other)),
            None => Err(ODataError::MissingField(VALUE.to_string())),
        },
        other => Err(unexpected("feed object", &other)),
    }
}

fn is_metadata(key: &str) -> bool {
    key.starts_with("odata.") || key.starts_with("@odata.")
}

fn entity_from_object(map: Map<String, Value>, options: &ReadOptions) -> ODataResult<TableEntity> {
    let mut etag = None;
    let mut annotations: HashMap<String, EdmType> = HashMap::new();
    let mut fields = Vec::with_capacity(map.len());

    for (key, value) in map {
        if is_metadata(&key) {
            if key.ends_with("etag") {
                etag = value.as_str().map(str::to_string);
            }
        } else if let Some(name) = key.strip_suffix(ODATA_TYPE_SUFFIX) {
            let type_name = value
                .as_str()
                .ok_or_else(|| unexpected("type annotation string", &value))?;
            annotations.insert(name.to_string(), type_name.parse()?);
        } else {
            fields.push((key, value));
        }
    }

    let partition_key = take_key(&mut fields, PARTITION_KEY)?;
    let row_key = take_key(&mut fields, ROW_KEY)?;
    let raw_timestamp = match take_field(&mut fields, TIMESTAMP) {
        Some(Value::String(s)) => Some(s),
        Some(Value::Null) | None => None,
        Some(other) => return Err(unexpected("timestamp string", &other)),
    };
    let timestamp = raw_timestamp
        .as_deref()
        .map(parse_datetime)
        .transpose()?;

    let mut properties = PropertyMap::new();
    for (name, value) in fields {
        let wire = wire_text(&value)?;
        let edm_type = match annotations.get(&name) {
            Some(t) => *t,
            None => options
                .resolve_type(&partition_key, &row_key, &name, wire.as_deref())
                .unwrap_or_else(|| infer_type(&value)),
        };
        let property = EntityProperty::from_wire(wire.as_deref(), edm_type)
            .map_err(|e| e.for_property(&name))?;
        properties.insert(name, property);
    }

    let etag = etag.or_else(|| raw_timestamp.as_deref().map(etag_from_timestamp));

    Ok(TableEntity {
        partition_key,
        row_key,
        timestamp,
        etag,
        properties,
    })
}

fn take_field(fields: &mut Vec<(String, Value)>, name: &str) -> Option<Value> {
    let index = fields.iter().position(|(k, _)| k == name)?;
    Some(fields.swap_remove(index).1)
}

fn take_key(fields: &mut Vec<(String, Value)>, name: &str) -> ODataResult<String> {
    match take_field(fields, name) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(unexpected("key string", &other)),
        None => Err(ODataError::MissingField(name.to_string())),
    }
}

fn wire_text(value: &Value) -> ODataResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(unexpected("primitive value", other)),
    }
}

/// Type of an unannotated value, from its JSON token alone.
///
/// Integers outside the Int32 range are read as Int64 rather than failed.
fn infer_type(value: &Value) -> EdmType {
    match value {
        Value::Bool(_) => EdmType::Boolean,
        Value::Number(n) if n.is_f64() => EdmType::Double,
        Value::Number(n) => match n.as_i64() {
            Some(i) if i32::try_from(i).is_ok() => EdmType::Int32,
            Some(_) => EdmType::Int64,
            None => EdmType::Double,
        },
        _ => EdmType::String,
    }
}

fn unexpected(expected: &str, found: &Value) -> ODataError {
    let kind = match found {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    ODataError::UnexpectedToken(format!("expected {expected}, found {kind}"))
}
