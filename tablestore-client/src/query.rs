//! Query construction.
//!
//! Filters are OData `$filter` expressions. Literal syntax depends on the
//! EDM type of the compared value:
//!
//! | Type     | Literal                 |
//! |----------|-------------------------|
//! | String   | `'O''Brien'`            |
//! | Int64    | `42L`                   |
//! | DateTime | `datetime'2024-01-02T03:04:05Z'` |
//! | Guid     | `guid'...'`             |
//! | Binary   | `X'0a0b'`               |

use crate::error::{invalid, StorageResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tablestore_model::{EdmType, EntityProperty, PARTITION_KEY, ROW_KEY, TIMESTAMP};
use tablestore_odata::{PayloadFormat, PropertyResolver, ReadOptions};

/// Comparison operator in a filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryComparison {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl QueryComparison {
    pub const fn as_str(self) -> &'static str {
        match self {
            QueryComparison::Equal => "eq",
            QueryComparison::NotEqual => "ne",
            QueryComparison::GreaterThan => "gt",
            QueryComparison::GreaterThanOrEqual => "ge",
            QueryComparison::LessThan => "lt",
            QueryComparison::LessThanOrEqual => "le",
        }
    }
}

/// Boolean operator joining two filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOperator {
    And,
    Or,
}

impl fmt::Display for TableOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TableOperator::And => "and",
            TableOperator::Or => "or",
        })
    }
}

/// Builds `<property> <op> <literal>`.
///
/// Fails for a null value: the service has no null literal.
pub fn generate_filter_condition(
    property: &str,
    comparison: QueryComparison,
    value: impl Into<EntityProperty>,
) -> StorageResult<String> {
    let value = value.into();
    let Some(raw) = value.as_wire() else {
        return Err(invalid(format!("cannot filter {property} on a null value")));
    };
    let literal = match value.edm_type() {
        EdmType::String => format!("'{}'", raw.replace('\'', "''")),
        EdmType::Boolean | EdmType::Int32 | EdmType::Double => raw.to_string(),
        EdmType::Int64 => format!("{raw}L"),
        EdmType::DateTime => format!("datetime'{raw}'"),
        EdmType::Guid => format!("guid'{raw}'"),
        EdmType::Binary => {
            let bytes = value.as_binary()?.unwrap_or_default();
            format!("X'{}'", hex::encode(bytes))
        }
    };
    Ok(format!("{property} {} {literal}", comparison.as_str()))
}

/// `(<left>) <op> (<right>)`.
pub fn combine_filters(left: &str, operator: TableOperator, right: &str) -> String {
    format!("({left}) {operator} ({right})")
}

/// A segmented entity query.
#[derive(Clone, Default)]
pub struct TableQuery {
    filter: Option<String>,
    select: Option<Vec<String>>,
    take: Option<u32>,
    property_resolver: Option<PropertyResolver>,
    type_hints: Option<Arc<HashMap<String, EdmType>>>,
}

impl fmt::Debug for TableQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableQuery")
            .field("filter", &self.filter)
            .field("select", &self.select)
            .field("take", &self.take)
            .field("property_resolver", &self.property_resolver.is_some())
            .finish_non_exhaustive()
    }
}

impl TableQuery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Projects the named columns. The key and timestamp columns are always
    /// requested so rows can be rebuilt into entities.
    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Caps the number of rows per segment.
    #[must_use]
    pub fn take(mut self, count: u32) -> Self {
        self.take = Some(count);
        self
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

    /// Adds declared types for properties that carry no explicit hint yet.
    pub(crate) fn with_default_hints(mut self, defaults: HashMap<String, EdmType>) -> Self {
        let mut merged = defaults;
        if let Some(explicit) = &self.type_hints {
            merged.extend(explicit.iter().map(|(name, t)| (name.clone(), *t)));
        }
        self.type_hints = Some(Arc::new(merged));
        self
    }

    pub fn filter_string(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn take_count(&self) -> Option<u32> {
        self.take
    }

    /// `$filter`, `$select` and `$top` parameters, unencoded.
    pub fn query_pairs(&self) -> StorageResult<Vec<(&'static str, String)>> {
        let mut pairs = Vec::new();
        if let Some(filter) = &self.filter {
            pairs.push(("$filter", filter.clone()));
        }
        if let Some(columns) = &self.select {
            let mut all: Vec<&str> = columns.iter().map(String::as_str).collect();
            for key in [PARTITION_KEY, ROW_KEY, TIMESTAMP] {
                if !all.contains(&key) {
                    all.push(key);
                }
            }
            pairs.push(("$select", all.join(",")));
        }
        if let Some(take) = self.take {
            if take == 0 {
                return Err(invalid("take count must be positive"));
            }
            pairs.push(("$top", take.to_string()));
        }
        Ok(pairs)
    }

    pub(crate) fn read_options(&self, format: PayloadFormat) -> ReadOptions {
        ReadOptions {
            format,
            property_resolver: self.property_resolver.clone(),
            type_hints: self.type_hints.clone(),
        }
    }
}
