//! JSON entity writer.
//!
//! Leading fields are `PartitionKey`, `RowKey` and `Timestamp`, followed by
//! the remaining properties. A `<name>@odata.type` sibling precedes every
//! value whose type a reader could not infer from the token alone.

use super::{ODATA_TYPE_SUFFIX, TABLE_NAME};
use crate::error::{ODataError, ODataResult};
use serde_json::{Map, Number, Value};
use tablestore_model::edm::{format_datetime, format_double, parse_bool, parse_double};
use tablestore_model::{EdmType, EntityProperty, TableEntity, PARTITION_KEY, ROW_KEY, TIMESTAMP};

/// Serializes one entity for an insert, update or merge body.
pub fn write_entity(entity: &TableEntity) -> ODataResult<String> {
    let timestamp = entity
        .timestamp
        .as_ref()
        .ok_or_else(|| ODataError::MissingField(TIMESTAMP.to_string()))?;

    let mut map = Map::new();
    map.insert(
        PARTITION_KEY.to_string(),
        Value::String(entity.partition_key.clone()),
    );
    map.insert(ROW_KEY.to_string(), Value::String(entity.row_key.clone()));
    map.insert(
        TIMESTAMP.to_string(),
        Value::String(format_datetime(timestamp)),
    );

    for (name, property) in entity.writable_properties() {
        if property.requires_type_annotation() {
            map.insert(
                format!("{name}{ODATA_TYPE_SUFFIX}"),
                Value::String(property.edm_type().as_str().to_string()),
            );
        }
        let value = property_value(property).map_err(|e| e.for_property(name))?;
        map.insert(name.to_string(), value);
    }

    Ok(serde_json::to_string(&Value::Object(map))?)
}

/// Serializes a table entry (`{"TableName": ...}`) for table creation.
pub fn write_table_entry(table_name: &str) -> ODataResult<String> {
    let mut map = Map::new();
    map.insert(TABLE_NAME.to_string(), Value::String(table_name.to_string()));
    Ok(serde_json::to_string(&Value::Object(map))?)
}

fn property_value(property: &EntityProperty) -> tablestore_model::ModelResult<Value> {
    let Some(raw) = property.as_wire() else {
        return Ok(Value::Null);
    };
    let value = match property.edm_type() {
        EdmType::Boolean => Value::Bool(parse_bool(raw)?),
        EdmType::Int32 => Value::Number(property.as_i32()?.into()),
        EdmType::Double => {
            let v = parse_double(raw)?;
            Number::from_f64(v).map_or_else(|| Value::String(format_double(v)), Value::Number)
        }
        _ => Value::String(raw.to_string()),
    };
    Ok(value)
}
