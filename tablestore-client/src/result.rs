use crate::continuation::ContinuationToken;
use crate::error::StorageResult;
use tablestore_model::{SchemaCache, TableEntity, TypedEntity};
use tablestore_odata::{resolve, EntityResolver};

/// Outcome of one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TableResult {
    pub http_status: u16,
    pub etag: Option<String>,
    /// The stored entity: echoed or retrieved, or the submitted one with its
    /// new etag. `None` when a retrieve found nothing.
    pub entity: Option<TableEntity>,
}

impl TableResult {
    pub(crate) fn new(http_status: u16, etag: Option<String>, entity: Option<TableEntity>) -> Self {
        Self {
            http_status,
            etag,
            entity,
        }
    }

    pub(crate) fn not_found() -> Self {
        Self::new(404, None, None)
    }

    pub fn is_found(&self) -> bool {
        self.entity.is_some()
    }

    /// Materializes the entity as `T` through its schema.
    pub fn into_typed<T: TypedEntity>(self, cache: &SchemaCache) -> StorageResult<Option<T>> {
        match self.entity {
            Some(entity) => Ok(Some(cache.from_entity(entity)?)),
            None => Ok(None),
        }
    }

    /// Projects the entity through `resolver`.
    pub fn resolve<R>(self, resolver: &EntityResolver<R>) -> StorageResult<Option<R>> {
        match self.entity {
            Some(entity) => Ok(Some(resolve(entity, resolver)?)),
            None => Ok(None),
        }
    }
}

/// One page of a segmented query: raw entities, typed values or
/// resolver projections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableQuerySegment<E = TableEntity> {
    pub results: Vec<E>,
    /// Present when the service has more rows.
    pub continuation: Option<ContinuationToken>,
}

impl<E> TableQuerySegment<E> {
    pub fn has_more(&self) -> bool {
        self.continuation.is_some()
    }

    /// Converts every row, keeping the continuation. Stops at the first failure.
    pub fn try_map<U>(
        self,
        convert: impl FnMut(E) -> StorageResult<U>,
    ) -> StorageResult<TableQuerySegment<U>> {
        Ok(TableQuerySegment {
            results: self.results.into_iter().map(convert).collect::<StorageResult<_>>()?,
            continuation: self.continuation,
        })
    }
}

/// One page of a table listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableListSegment {
    pub tables: Vec<String>,
    pub continuation: Option<ContinuationToken>,
}
