//! Single-entity operations and their HTTP mapping.
//!
//! | Operation        | Verb   | Tunnel   | If-Match | Success  |
//! |------------------|--------|----------|----------|----------|
//! | Insert           | POST   |          |          | 201/204  |
//! | Replace          | PUT    |          | yes      | 204      |
//! | Merge            | POST   | MERGE    | yes      | 204      |
//! | Delete           | DELETE |          | yes      | 204      |
//! | InsertOrReplace  | PUT    |          |          | 204      |
//! | InsertOrMerge    | POST   | MERGE    |          | 204      |
//! | Retrieve         | GET    |          |          | 200/404  |

use crate::error::{invalid, StorageResult};
use crate::result::TableResult;
use reqwest::Method;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tablestore_model::{EdmType, TableEntity, TypedEntity};
use tablestore_odata::{
    deserialize_entity, serialize_entity, PayloadFormat, PropertyResolver, ReadOptions,
};

pub const IF_MATCH: &str = "If-Match";
pub const PREFER: &str = "Prefer";
pub const X_HTTP_METHOD: &str = "X-HTTP-Method";
pub const ACCEPT: &str = "Accept";
pub const CONTENT_TYPE: &str = "Content-Type";

const RETURN_CONTENT: &str = "return-content";
const RETURN_NO_CONTENT: &str = "return-no-content";
const MERGE: &str = "MERGE";

/// Kind of a single-entity operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Insert,
    Replace,
    Merge,
    Delete,
    InsertOrReplace,
    InsertOrMerge,
    Retrieve,
}

impl OperationType {
    /// Whether an etag is required as an `If-Match` precondition.
    pub const fn requires_etag(self) -> bool {
        matches!(
            self,
            OperationType::Replace | OperationType::Merge | OperationType::Delete
        )
    }

    /// HTTP verb on the wire. Merges are tunneled through POST.
    pub fn method(self) -> Method {
        match self {
            OperationType::Insert | OperationType::Merge | OperationType::InsertOrMerge => {
                Method::POST
            }
            OperationType::Replace | OperationType::InsertOrReplace => Method::PUT,
            OperationType::Delete => Method::DELETE,
            OperationType::Retrieve => Method::GET,
        }
    }

    /// Value of `X-HTTP-Method`, for verbs tunneled through POST.
    pub const fn tunneled_method(self) -> Option<&'static str> {
        match self {
            OperationType::Merge | OperationType::InsertOrMerge => Some(MERGE),
            _ => None,
        }
    }

    /// Whether `status` is a success for this operation.
    pub fn is_expected_status(self, status: u16, echo_content: bool) -> bool {
        match self {
            OperationType::Insert if echo_content => status == 201,
            OperationType::Retrieve => status == 200 || status == 404,
            _ => status == 204,
        }
    }

    const fn carries_body(self) -> bool {
        !matches!(self, OperationType::Delete | OperationType::Retrieve)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationType::Insert => "Insert",
            OperationType::Replace => "Replace",
            OperationType::Merge => "Merge",
            OperationType::Delete => "Delete",
            OperationType::InsertOrReplace => "InsertOrReplace",
            OperationType::InsertOrMerge => "InsertOrMerge",
            OperationType::Retrieve => "Retrieve",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
enum Target {
    Entity(Box<TableEntity>),
    Keys { partition_key: String, row_key: String },
}

/// One operation against one entity.
#[derive(Clone)]
pub struct TableOperation {
    operation_type: OperationType,
    target: Target,
    echo_content: Option<bool>,
    property_resolver: Option<PropertyResolver>,
    type_hints: Option<Arc<HashMap<String, EdmType>>>,
}

impl fmt::Debug for TableOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableOperation")
            .field("operation_type", &self.operation_type)
            .field("target", &self.target)
            .field("echo_content", &self.echo_content)
            .field("property_resolver", &self.property_resolver.is_some())
            .finish_non_exhaustive()
    }
}

impl TableOperation {
    fn with_entity(operation_type: OperationType, entity: TableEntity) -> Self {
        Self {
            operation_type,
            target: Target::Entity(Box::new(entity)),
            echo_content: None,
            property_resolver: None,
            type_hints: None,
        }
    }

    /// Insert, echoing content as configured on the client.
    pub fn insert(entity: TableEntity) -> Self {
        Self::with_entity(OperationType::Insert, entity)
    }

    /// Insert with an explicit echo choice.
    pub fn insert_with_echo(entity: TableEntity, echo_content: bool) -> Self {
        let mut op = Self::insert(entity);
        op.echo_content = Some(echo_content);
        op
    }

    pub fn replace(entity: TableEntity) -> Self {
        Self::with_entity(OperationType::Replace, entity)
    }

    pub fn merge(entity: TableEntity) -> Self {
        Self::with_entity(OperationType::Merge, entity)
    }

    pub fn delete(entity: TableEntity) -> Self {
        Self::with_entity(OperationType::Delete, entity)
    }

    pub fn insert_or_replace(entity: TableEntity) -> Self {
        Self::with_entity(OperationType::InsertOrReplace, entity)
    }

    pub fn insert_or_merge(entity: TableEntity) -> Self {
        Self::with_entity(OperationType::InsertOrMerge, entity)
    }

    /// Point lookup by key.
    pub fn retrieve(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            operation_type: OperationType::Retrieve,
            target: Target::Keys {
                partition_key: partition_key.into(),
                row_key: row_key.into(),
            },
            echo_content: None,
            property_resolver: None,
            type_hints: None,
        }
    }

    /// Point lookup whose untyped properties are read with the declared
    /// types of `T`.
    pub fn retrieve_as<T: TypedEntity>(
        partition_key: impl Into<String>,
        row_key: impl Into<String>,
        cache: &tablestore_model::SchemaCache,
    ) -> StorageResult<Self> {
        let hints = cache.property_types::<T>()?;
        Ok(Self::retrieve(partition_key, row_key).with_type_hints(hints))
    }

    #[must_use]
    pub fn with_property_resolver(mut self, resolver: PropertyResolver) -> Self {
        self.property_resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn with_type_hints(mut self, hints: HashMap<String, EdmType>) -> Self {
        self.type_hints = Some(Arc::new(hints));
        self
    }

    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    pub fn partition_key(&self) -> &str {
        match &self.target {
            Target::Entity(e) => &e.partition_key,
            Target::Keys { partition_key, .. } => partition_key,
        }
    }

    pub fn row_key(&self) -> &str {
        match &self.target {
            Target::Entity(e) => &e.row_key,
            Target::Keys { row_key, .. } => row_key,
        }
    }

    /// The submitted entity. `None` for a retrieve.
    pub fn entity(&self) -> Option<&TableEntity> {
        match &self.target {
            Target::Entity(e) => Some(e.as_ref()),
            Target::Keys { .. } => None,
        }
    }

    /// Explicit echo choice, if one was made for this operation.
    pub fn echo_content(&self) -> Option<bool> {
        self.echo_content
    }

    pub(crate) fn resolve_echo(&self, default: bool) -> bool {
        self.operation_type == OperationType::Insert && self.echo_content.unwrap_or(default)
    }

    /// Checks preconditions that need no network round-trip.
    pub fn validate(&self) -> StorageResult<()> {
        let Target::Entity(entity) = &self.target else {
            return Ok(());
        };
        if self.operation_type.requires_etag()
            && entity.etag.as_deref().is_none_or(str::is_empty)
        {
            return Err(invalid(format!(
                "{} of ({}, {}) requires an etag; use \"*\" to match any",
                self.operation_type, entity.partition_key, entity.row_key
            )));
        }
        if self.operation_type.carries_body() && entity.timestamp.is_none() {
            return Err(invalid(format!(
                "{} of ({}, {}) requires a timestamp",
                self.operation_type, entity.partition_key, entity.row_key
            )));
        }
        Ok(())
    }

    /// Decoding options for this operation's response body.
    pub(crate) fn read_options(&self, format: PayloadFormat) -> ReadOptions {
        ReadOptions {
            format,
            property_resolver: self.property_resolver.clone(),
            type_hints: self.type_hints.clone(),
        }
    }

    /// Validates and builds the wire request, relative to the service root.
    pub fn to_request(
        &self,
        table: &str,
        format: PayloadFormat,
        default_echo: bool,
    ) -> StorageResult<OperationRequest> {
        self.validate()?;
        validate_table_name(table)?;

        let op = self.operation_type;
        let path = match op {
            OperationType::Insert => table.to_string(),
            _ => entity_path(table, self.partition_key(), self.row_key()),
        };

        let mut headers = vec![(ACCEPT, format.accept().to_string())];
        let mut body = None;
        if let Target::Entity(entity) = &self.target {
            if op.carries_body() {
                headers.push((CONTENT_TYPE, format.content_type().to_string()));
                body = Some(serialize_entity(entity, format)?);
            }
            if op.requires_etag() {
                if let Some(etag) = &entity.etag {
                    headers.push((IF_MATCH, etag.clone()));
                }
            }
        }
        if op == OperationType::Insert {
            let prefer = if self.resolve_echo(default_echo) {
                RETURN_CONTENT
            } else {
                RETURN_NO_CONTENT
            };
            headers.push((PREFER, prefer.to_string()));
        }
        if let Some(tunneled) = op.tunneled_method() {
            headers.push((X_HTTP_METHOD, tunneled.to_string()));
        }

        Ok(OperationRequest {
            method: op.method(),
            path,
            headers,
            body,
        })
    }

    /// Turns a successful response into a result.
    ///
    /// `status` must already satisfy [`OperationType::is_expected_status`].
    pub(crate) fn parse_response(
        &self,
        status: u16,
        etag: Option<&str>,
        body: &str,
        format: PayloadFormat,
        default_echo: bool,
    ) -> StorageResult<TableResult> {
        let etag = etag.map(str::to_string);
        match &self.target {
            Target::Keys { .. } if status == 404 => Ok(TableResult::not_found()),
            Target::Keys { .. } => {
                let entity = deserialize_entity(body, &self.read_options(format))?;
                Ok(TableResult::new(status, entity.etag.clone(), Some(entity)))
            }
            Target::Entity(_) if self.resolve_echo(default_echo) => {
                let entity = deserialize_entity(body, &self.read_options(format))?;
                let etag = etag.or_else(|| entity.etag.clone());
                Ok(TableResult::new(status, etag, Some(entity)))
            }
            Target::Entity(submitted) => {
                let mut entity = (**submitted).clone();
                if self.operation_type != OperationType::Delete {
                    entity.etag = etag.clone();
                }
                Ok(TableResult::new(status, etag, Some(entity)))
            }
        }
    }
}

/// An operation rendered for the wire, independent of transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub method: Method,
    /// Path below the service root, without a leading slash.
    pub path: String,
    /// Operation-specific headers, in canonical case and emission order.
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<String>,
}

impl OperationRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Key literal for an entity path: quotes doubled, then percent-encoded.
pub fn escape_key(key: &str) -> String {
    urlencoding::encode(&key.replace('\'', "''")).into_owned()
}

/// `table(PartitionKey='..',RowKey='..')`.
pub fn entity_path(table: &str, partition_key: &str, row_key: &str) -> String {
    format!(
        "{table}(PartitionKey='{}',RowKey='{}')",
        escape_key(partition_key),
        escape_key(row_key)
    )
}

/// Table names are alphanumeric, start with a letter and are 3 to 63 characters long.
pub fn validate_table_name(name: &str) -> StorageResult<()> {
    let valid = (3..=63).contains(&name.len())
        && name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(())
    } else {
        Err(invalid(format!("invalid table name: {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_escaping() {
        assert_eq!(escape_key("O'Brien"), "O%27%27Brien");
        assert_eq!(escape_key("a b/c"), "a%20b%2Fc");
        assert_eq!(
            entity_path("people", "P", "R"),
            "people(PartitionKey='P',RowKey='R')"
        );
    }

    #[test]
    fn table_names() {
        assert!(validate_table_name("people").is_ok());
        assert!(validate_table_name("abc123").is_ok());
        assert!(validate_table_name("ab").is_err());
        assert!(validate_table_name("1abc").is_err());
        assert!(validate_table_name("has-dash").is_err());
    }
}
