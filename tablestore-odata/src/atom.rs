//! Legacy AtomPub payloads.
//!
//! An entity is an Atom `<entry>` whose `<content>` holds an
//! `<m:properties>` element. Each child is one property: the local name is
//! the property name, `m:type` gives the EDM type (absent means string) and
//! `m:null="true"` marks a null value. The etag rides on `<entry m:etag>`.

use crate::error::{ODataError, ODataResult};
use crate::etag::etag_from_timestamp;
use crate::resolver::ReadOptions;
use chrono::Utc;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tablestore_model::edm::{format_datetime, parse_datetime};
use tablestore_model::{
    EdmType, EntityProperty, PropertyMap, TableEntity, PARTITION_KEY, ROW_KEY, TIMESTAMP,
};
use tracing::debug;

const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";
const DATA_NAMESPACE: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices";
const METADATA_NAMESPACE: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices/metadata";
const TABLE_NAME: &str = "TableName";

// ── Writing ──────────────────────────────────────────────────────

/// Serializes one entity as an Atom entry.
pub fn write_entity(entity: &TableEntity) -> ODataResult<String> {
    let timestamp = entity
        .timestamp
        .as_ref()
        .ok_or_else(|| ODataError::MissingField(TIMESTAMP.to_string()))?;

    let mut xml = open_entry();
    push_property(&mut xml, PARTITION_KEY, None, Some(&entity.partition_key));
    push_property(&mut xml, ROW_KEY, None, Some(&entity.row_key));
    push_property(
        &mut xml,
        TIMESTAMP,
        Some(EdmType::DateTime),
        Some(&format_datetime(timestamp)),
    );
    for (name, property) in entity.writable_properties() {
        let edm_type = match property.edm_type() {
            EdmType::String => None,
            other => Some(other),
        };
        push_property(&mut xml, name, edm_type, property.as_wire());
    }
    close_entry(&mut xml);
    Ok(xml)
}

/// Serializes a table entry for table creation.
pub fn write_table_entry(table_name: &str) -> String {
    let mut xml = open_entry();
    push_property(&mut xml, TABLE_NAME, None, Some(table_name));
    close_entry(&mut xml);
    xml
}

fn open_entry() -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?>"#,
            r#"<entry xmlns:d="{}" xmlns:m="{}" xmlns="{}">"#,
            "<title /><updated>{}</updated><author><name /></author><id />",
            r#"<content type="application/xml"><m:properties>"#
        ),
        DATA_NAMESPACE,
        METADATA_NAMESPACE,
        ATOM_NAMESPACE,
        format_datetime(&Utc::now()),
    )
}

fn close_entry(xml: &mut String) {
    xml.push_str("</m:properties></content></entry>");
}

fn push_property(xml: &mut String, name: &str, edm_type: Option<EdmType>, value: Option<&str>) {
    xml.push_str("<d:");
    xml.push_str(name);
    if let Some(t) = edm_type {
        xml.push_str(r#" m:type=""#);
        xml.push_str(t.as_str());
        xml.push('"');
    }
    match value {
        Some(v) => {
            xml.push('>');
            xml.push_str(&escape(v));
            xml.push_str("</d:");
            xml.push_str(name);
            xml.push('>');
        }
        None => xml.push_str(r#" m:null="true" />"#),
    }
}

// ── Reading ──────────────────────────────────────────────────────

/// One `<d:...>` element as found on the wire.
#[derive(Debug)]
struct RawProperty {
    name: String,
    type_name: Option<String>,
    is_null: bool,
    text: String,
}

#[derive(Debug, Default)]
struct RawEntry {
    etag: Option<String>,
    properties: Vec<RawProperty>,
}

/// Parses a single-entry response body.
pub fn read_entity(body: &str, options: &ReadOptions) -> ODataResult<TableEntity> {
    let entry = read_entries(body)?
        .into_iter()
        .next()
        .ok_or_else(|| ODataError::MissingField("entry".to_string()))?;
    entity_from_entry(entry, options)
}

/// Parses an Atom feed into entities, in document order.
pub fn read_query(body: &str, options: &ReadOptions) -> ODataResult<Vec<TableEntity>> {
    let entries = read_entries(body)?;
    debug!("Decoding {} entities from Atom feed", entries.len());
    entries
        .into_iter()
        .map(|e| entity_from_entry(e, options))
        .collect()
}

/// Parses an Atom table listing into table names.
pub fn read_table_names(body: &str) -> ODataResult<Vec<String>> {
    read_entries(body)?
        .into_iter()
        .map(|entry| {
            entry
                .properties
                .into_iter()
                .find(|p| p.name == TABLE_NAME)
                .map(|p| p.text)
                .ok_or_else(|| ODataError::MissingField(TABLE_NAME.to_string()))
        })
        .collect()
}

fn attribute(element: &BytesStart<'_>, local: &[u8]) -> ODataResult<Option<String>> {
    for attr in element.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == local {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn start_property(element: &BytesStart<'_>) -> ODataResult<RawProperty> {
    let name = std::str::from_utf8(element.local_name().as_ref())
        .map_err(|e| ODataError::Xml(e.to_string()))?
        .to_string();
    Ok(RawProperty {
        name,
        type_name: attribute(element, b"type")?,
        is_null: attribute(element, b"null")?.is_some_and(|v| v == "true"),
        text: String::new(),
    })
}

fn read_entries(body: &str) -> ODataResult<Vec<RawEntry>> {
    let mut reader = Reader::from_str(body);
    let mut entries = Vec::new();
    let mut current: Option<RawEntry> = None;
    let mut in_properties = false;
    let mut pending: Option<RawProperty> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"entry" => {
                    current = Some(RawEntry {
                        etag: attribute(&e, b"etag")?,
                        properties: Vec::new(),
                    });
                }
                b"properties" if current.is_some() => in_properties = true,
                _ if in_properties => {
                    if pending.is_some() {
                        return Err(ODataError::UnexpectedToken(
                            "nested element inside a property".to_string(),
                        ));
                    }
                    pending = Some(start_property(&e)?);
                }
                _ => {}
            },
            Event::Empty(e) => {
                if in_properties {
                    let property = start_property(&e)?;
                    if let Some(entry) = current.as_mut() {
                        entry.properties.push(property);
                    }
                }
            }
            Event::Text(t) => {
                if let Some(p) = pending.as_mut() {
                    p.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(p) = pending.as_mut() {
                    let bytes = c.into_inner();
                    let text = std::str::from_utf8(&bytes)
                        .map_err(|e| ODataError::Xml(e.to_string()))?;
                    p.text.push_str(text);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"entry" => {
                    let entry = current.take().ok_or_else(|| {
                        ODataError::UnexpectedToken("</entry> without <entry>".to_string())
                    })?;
                    entries.push(entry);
                }
                b"properties" if in_properties => in_properties = false,
                _ => {
                    if let Some(p) = pending.take() {
                        if let Some(entry) = current.as_mut() {
                            entry.properties.push(p);
                        }
                    }
                }
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if current.is_some() || pending.is_some() {
        return Err(ODataError::UnexpectedToken(
            "document ended inside an entry".to_string(),
        ));
    }
    Ok(entries)
}

fn entity_from_entry(entry: RawEntry, options: &ReadOptions) -> ODataResult<TableEntity> {
    let mut partition_key = None;
    let mut row_key = None;
    let mut raw_timestamp = None;
    let mut others = Vec::new();

    for p in entry.properties {
        match p.name.as_str() {
            PARTITION_KEY => partition_key = Some(p.text),
            ROW_KEY => row_key = Some(p.text),
            TIMESTAMP => raw_timestamp = (!p.is_null).then_some(p.text),
            _ => others.push(p),
        }
    }

    let partition_key =
        partition_key.ok_or_else(|| ODataError::MissingField(PARTITION_KEY.to_string()))?;
    let row_key = row_key.ok_or_else(|| ODataError::MissingField(ROW_KEY.to_string()))?;
    let timestamp = raw_timestamp
        .as_deref()
        .map(parse_datetime)
        .transpose()?;

    let mut properties = PropertyMap::new();
    for p in others {
        let value = (!p.is_null).then_some(p.text);
        let edm_type = match p.type_name {
            Some(t) => t.parse::<EdmType>()?,
            None => options
                .resolve_type(&partition_key, &row_key, &p.name, value.as_deref())
                .unwrap_or(EdmType::String),
        };
        let property = EntityProperty::from_wire(value.as_deref(), edm_type)
            .map_err(|e| e.for_property(&p.name))?;
        properties.insert(p.name, property);
    }

    let etag = entry
        .etag
        .or_else(|| raw_timestamp.as_deref().map(etag_from_timestamp));

    Ok(TableEntity {
        partition_key,
        row_key,
        timestamp,
        etag,
        properties,
    })
}
