//! Client for a partitioned table storage service.
//!
//! - [`TableOperation`]: single-entity insert, replace, merge, delete,
//!   upserts and point lookups, validated before anything is sent
//! - [`TableBatchOperation`]: entity group transactions framed as nested
//!   MIME multipart, decoded all-or-nothing in submission order
//! - [`TableQuery`]: filtered, projected, segmented queries
//! - [`TableClient`]: the async HTTP client tying these together with
//!   credentials and retries
//!
//! Wire encoding lives in `tablestore-odata`; the entity model in
//! `tablestore-model`.

pub mod batch;
mod client;
mod config;
mod continuation;
mod credentials;
mod error;
mod operation;
mod query;
mod request;
mod result;
mod retry;

pub use batch::mime::{BatchBody, MimePart};
pub use batch::{TableBatchOperation, MAX_BATCH_OPERATIONS};
pub use client::TableClient;
pub use config::{RetryConfig, TableClientConfig, DEFAULT_SERVICE_VERSION};
pub use continuation::ContinuationToken;
pub use credentials::{Anonymous, Credentials, SasToken};
pub use error::{FailedOperation, ServiceError, StorageError, StorageResult};
pub use operation::{entity_path, escape_key, OperationRequest, OperationType, TableOperation};
pub use query::{
    combine_filters, generate_filter_condition, QueryComparison, TableOperator, TableQuery,
};
pub use request::PreparedRequest;
pub use result::{TableListSegment, TableQuerySegment, TableResult};
pub use retry::{ExponentialRetry, NoRetry, RetryPolicy};

pub use tablestore_model as model;
pub use tablestore_odata as odata;
