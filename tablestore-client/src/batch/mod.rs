//! Entity group transactions.
//!
//! A batch holds up to [`MAX_BATCH_OPERATIONS`] writes against one partition,
//! or exactly one retrieve. The service applies the writes atomically, and
//! the client mirrors that: a batch either yields one result per operation,
//! in submission order, or fails as a whole with the offending operation
//! identified.

pub mod mime;

use crate::error::{invalid, protocol, ServiceError, StorageError, StorageResult};
use crate::operation::{OperationType, TableOperation};
use crate::result::TableResult;
use mime::{BatchBody, MimePart};
use tablestore_model::TableEntity;
use tablestore_odata::PayloadFormat;
use tracing::debug;

/// Service limit on operations per batch.
pub const MAX_BATCH_OPERATIONS: usize = 100;

/// An ordered set of operations executed as one transaction.
#[derive(Debug, Clone, Default)]
pub struct TableBatchOperation {
    operations: Vec<TableOperation>,
    partition_key: Option<String>,
    has_retrieve: bool,
}

impl TableBatchOperation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation.
    ///
    /// Fails if the batch already holds a retrieve, if `operation` is a
    /// retrieve and the batch is not empty, or if its partition key differs
    /// from the batch's.
    pub fn add(&mut self, operation: TableOperation) -> StorageResult<()> {
        if self.has_retrieve {
            return Err(invalid("a batch containing a retrieve cannot hold other operations"));
        }
        let is_retrieve = operation.operation_type() == OperationType::Retrieve;
        if is_retrieve && !self.operations.is_empty() {
            return Err(invalid("a retrieve must be the only operation in a batch"));
        }
        if let Some(locked) = &self.partition_key {
            if locked != operation.partition_key() {
                return Err(invalid(format!(
                    "all operations in a batch must share partition key {locked:?}, got {:?}",
                    operation.partition_key()
                )));
            }
        }

        self.partition_key = Some(operation.partition_key().to_string());
        self.has_retrieve = is_retrieve;
        self.operations.push(operation);
        Ok(())
    }

    pub fn insert(&mut self, entity: TableEntity) -> StorageResult<()> {
        self.add(TableOperation::insert(entity))
    }

    pub fn insert_with_echo(
        &mut self,
        entity: TableEntity,
        echo_content: bool,
    ) -> StorageResult<()> {
        self.add(TableOperation::insert_with_echo(entity, echo_content))
    }

    pub fn replace(&mut self, entity: TableEntity) -> StorageResult<()> {
        self.add(TableOperation::replace(entity))
    }

    pub fn merge(&mut self, entity: TableEntity) -> StorageResult<()> {
        self.add(TableOperation::merge(entity))
    }

    pub fn delete(&mut self, entity: TableEntity) -> StorageResult<()> {
        self.add(TableOperation::delete(entity))
    }

    pub fn insert_or_replace(&mut self, entity: TableEntity) -> StorageResult<()> {
        self.add(TableOperation::insert_or_replace(entity))
    }

    pub fn insert_or_merge(&mut self, entity: TableEntity) -> StorageResult<()> {
        self.add(TableOperation::insert_or_merge(entity))
    }

    pub fn retrieve(
        &mut self,
        partition_key: impl Into<String>,
        row_key: impl Into<String>,
    ) -> StorageResult<()> {
        self.add(TableOperation::retrieve(partition_key, row_key))
    }

    /// Removes the operation at `index`. Emptying the batch releases the
    /// partition key.
    pub fn remove(&mut self, index: usize) -> Option<TableOperation> {
        if index >= self.operations.len() {
            return None;
        }
        let removed = self.operations.remove(index);
        if self.operations.is_empty() {
            self.clear();
        }
        Some(removed)
    }

    /// Empties the batch and releases the partition key.
    pub fn clear(&mut self) {
        self.operations.clear();
        self.partition_key = None;
        self.has_retrieve = false;
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// The partition key every operation shares, once one has been added.
    pub fn partition_key(&self) -> Option<&str> {
        self.partition_key.as_deref()
    }

    pub fn operations(&self) -> &[TableOperation] {
        &self.operations
    }

    /// Validates the batch and renders it as a multipart body.
    pub fn encode(
        &self,
        base_url: &str,
        table: &str,
        format: PayloadFormat,
        default_echo: bool,
    ) -> StorageResult<BatchBody> {
        if self.operations.is_empty() {
            return Err(invalid("cannot execute an empty batch"));
        }
        if self.operations.len() > MAX_BATCH_OPERATIONS {
            return Err(invalid(format!(
                "a batch holds at most {MAX_BATCH_OPERATIONS} operations, got {}",
                self.operations.len()
            )));
        }

        let requests = self
            .operations
            .iter()
            .enumerate()
            .map(|(i, op)| {
                op.to_request(table, format, default_echo).map_err(|e| match e {
                    StorageError::InvalidArgument(msg) => {
                        invalid(format!("operation {i}: {msg}"))
                    }
                    other => other,
                })
            })
            .collect::<StorageResult<Vec<_>>>()?;

        debug!(
            "Encoding batch of {} operations (changeset: {})",
            requests.len(),
            !self.has_retrieve
        );
        Ok(mime::write_batch(&requests, base_url, !self.has_retrieve))
    }

    /// Maps response parts onto the submitted operations, in order.
    ///
    /// Any part whose status is unexpected for its operation fails the whole
    /// batch. A retrieve answered with 404 is a successful, empty result.
    pub fn decode_response(
        &self,
        parts: &[MimePart],
        format: PayloadFormat,
        default_echo: bool,
    ) -> StorageResult<Vec<TableResult>> {
        if self.operations.is_empty() {
            return Err(invalid("cannot decode a response for an empty batch"));
        }
        if parts.len() != self.operations.len() {
            return Err(self.mismatched_response(parts));
        }

        let mut results = Vec::with_capacity(parts.len());
        for (index, (op, part)) in self.operations.iter().zip(parts).enumerate() {
            let echo = op.resolve_echo(default_echo);
            if !op.operation_type().is_expected_status(part.status_code, echo) {
                return Err(part_error(part)
                    .with_failed_operation(index, op.operation_type())
                    .into());
            }
            results.push(op.parse_response(
                part.status_code,
                part.header("ETag"),
                &part.payload,
                format,
                default_echo,
            )?);
        }
        Ok(results)
    }

    /// A failed changeset comes back as a single error part whose message
    /// starts with the index of the failing operation.
    fn mismatched_response(&self, parts: &[MimePart]) -> StorageError {
        match parts {
            [part] if part.status_code >= 400 => {
                let error = part_error(part);
                let index = error
                    .batch_index()
                    .filter(|i| *i < self.operations.len())
                    .unwrap_or(0);
                let op_type = self.operations[index].operation_type();
                error.with_failed_operation(index, op_type).into()
            }
            _ => protocol(format!(
                "batch of {} operations answered with {} parts",
                self.operations.len(),
                parts.len()
            )),
        }
    }
}

fn part_error(part: &MimePart) -> ServiceError {
    ServiceError::from_response(part.status_code, &part.status_message, &part.payload)
}
