//! Async table service client.

use crate::batch::mime::read_batch_response;
use crate::batch::TableBatchOperation;
use crate::config::TableClientConfig;
use crate::continuation::ContinuationToken;
use crate::credentials::{Anonymous, Credentials};
use crate::error::{invalid, protocol, StorageError, StorageResult};
use crate::operation::{validate_table_name, TableOperation, ACCEPT, CONTENT_TYPE};
use crate::query::TableQuery;
use crate::request::{service_headers, Executor, PreparedRequest, RawResponse};
use crate::result::{TableListSegment, TableQuerySegment, TableResult};
use crate::retry::{ExponentialRetry, RetryPolicy};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Url};
use std::sync::Arc;
use std::time::Duration;
use tablestore_model::{SchemaCache, TableEntity, TypedEntity};
use tablestore_odata::{
    deserialize_query, deserialize_table_names, resolve, serialize_table_entry, EntityResolver,
};
use tracing::{debug, info};

const TABLES: &str = "Tables";

/// Client for one table service account.
///
/// Cheap to clone; clones share the HTTP connection pool and schema cache.
#[derive(Debug, Clone)]
pub struct TableClient {
    config: TableClientConfig,
    http: Client,
    credentials: Arc<dyn Credentials>,
    retry: Arc<dyn RetryPolicy>,
    schemas: Arc<SchemaCache>,
    common_headers: HeaderMap,
}

impl TableClient {
    /// Creates an anonymous client with the exponential retry policy from
    /// `config.retry`.
    pub fn new(config: TableClientConfig) -> StorageResult<Self> {
        config.validate()?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let schemas = if config.schema_cache_enabled {
            SchemaCache::new()
        } else {
            SchemaCache::disabled()
        };
        let common_headers = service_headers(&config.service_version)?;
        let retry = ExponentialRetry::from(&config.retry);

        info!(
            "Table client for {} ({:?})",
            config.base_url(),
            config.payload_format
        );
        Ok(Self {
            config,
            http,
            credentials: Arc::new(Anonymous),
            retry: Arc::new(retry),
            schemas: Arc::new(schemas),
            common_headers,
        })
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: impl Credentials + 'static) -> Self {
        self.credentials = Arc::new(credentials);
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: impl RetryPolicy + 'static) -> Self {
        self.retry = Arc::new(retry);
        self
    }

    pub fn config(&self) -> &TableClientConfig {
        &self.config
    }

    /// Schema cache used for typed entities.
    pub fn schema_cache(&self) -> &SchemaCache {
        &self.schemas
    }

    fn executor(&self) -> Executor<'_> {
        Executor {
            http: &self.http,
            credentials: self.credentials.as_ref(),
            retry: self.retry.as_ref(),
            common_headers: &self.common_headers,
        }
    }

    fn url(&self, path: &str) -> StorageResult<Url> {
        let raw = format!("{}/{path}", self.config.base_url());
        Url::parse(&raw).map_err(|e| invalid(format!("bad request URL {raw:?}: {e}")))
    }

    fn url_with_query<'a>(
        &self,
        path: &str,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> StorageResult<Url> {
        let mut url = self.url(path)?;
        let query = pairs
            .into_iter()
            .map(|(name, value)| format!("{name}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        if !query.is_empty() {
            url.set_query(Some(&query));
        }
        Ok(url)
    }

    // ── Single operations ────────────────────────────────────────

    /// Executes one operation.
    ///
    /// Preconditions are checked and the body serialized before anything is
    /// sent; retries re-send the same body.
    pub async fn execute(
        &self,
        table: &str,
        operation: &TableOperation,
    ) -> StorageResult<TableResult> {
        let format = self.config.payload_format;
        let echo_default = self.config.echo_content;
        let rendered = operation.to_request(table, format, echo_default)?;

        let mut prepared = PreparedRequest::new(rendered.method.clone(), self.url(&rendered.path)?);
        for (name, value) in &rendered.headers {
            prepared = prepared.header(name, value)?;
        }
        if let Some(body) = rendered.body {
            prepared = prepared.body(body);
        }

        let op_type = operation.operation_type();
        let echo = operation.resolve_echo(echo_default);
        let response = self
            .executor()
            .send(&prepared, |status| op_type.is_expected_status(status, echo))
            .await?;

        operation.parse_response(
            response.status,
            response.header("etag"),
            &response.body,
            format,
            echo_default,
        )
    }

    /// Looks up one entity and materializes it as `T`.
    pub async fn retrieve_typed<T: TypedEntity>(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> StorageResult<Option<T>> {
        let op = TableOperation::retrieve_as::<T>(partition_key, row_key, &self.schemas)?;
        self.execute(table, &op).await?.into_typed(&self.schemas)
    }

    /// Inserts or replaces a typed entity.
    pub async fn upsert_typed<T: TypedEntity>(
        &self,
        table: &str,
        entity: &T,
    ) -> StorageResult<TableResult> {
        let entity = self.schemas.to_entity(entity)?;
        self.execute(table, &TableOperation::insert_or_replace(entity))
            .await
    }

    // ── Batches ──────────────────────────────────────────────────

    /// Executes a batch as one transaction.
    ///
    /// Returns one result per operation in submission order, or the first
    /// failure with the offending operation's index.
    pub async fn execute_batch(
        &self,
        table: &str,
        batch: &TableBatchOperation,
    ) -> StorageResult<Vec<TableResult>> {
        let format = self.config.payload_format;
        let echo_default = self.config.echo_content;
        let encoded = batch.encode(self.config.base_url(), table, format, echo_default)?;

        let prepared = PreparedRequest::new(Method::POST, self.url("$batch")?)
            .header(CONTENT_TYPE, &encoded.content_type())?
            .header(ACCEPT, format.accept())?
            .body(encoded.body);

        let response = self.executor().send(&prepared, |s| s == 202).await?;
        let content_type = response
            .header("content-type")
            .ok_or_else(|| protocol("batch response has no Content-Type"))?;
        let parts = read_batch_response(&response.body, content_type)?;
        debug!("Batch response carried {} parts", parts.len());
        batch.decode_response(&parts, format, echo_default)
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Fetches one segment of a query.
    pub async fn execute_query_segmented(
        &self,
        table: &str,
        query: &TableQuery,
        continuation: Option<&ContinuationToken>,
    ) -> StorageResult<TableQuerySegment> {
        validate_table_name(table)?;
        let format = self.config.payload_format;
        let query_pairs = query.query_pairs()?;
        let pairs = query_pairs
            .iter()
            .map(|(n, v)| (*n, v.as_str()))
            .chain(continuation.map(ContinuationToken::query_pairs).unwrap_or_default());
        let url = self.url_with_query(&format!("{table}()"), pairs)?;

        let response = self.get(url, |s| s == 200).await?;
        let results = deserialize_query(&response.body, &query.read_options(format))?;
        let continuation = ContinuationToken::from_headers(&response.headers);
        if let Some(token) = &continuation {
            debug!("Query on {} continues at {:?}", table, token);
        }
        Ok(TableQuerySegment {
            results,
            continuation,
        })
    }

    /// Runs a query to completion, following continuation tokens.
    pub async fn execute_query(
        &self,
        table: &str,
        query: &TableQuery,
    ) -> StorageResult<Vec<TableEntity>> {
        self.drain_query(table, query, Ok).await
    }

    /// Fetches one segment of a query and materializes the rows as `T`.
    ///
    /// The declared property types of `T` steer decoding of unannotated
    /// values; hints set on `query` take precedence.
    pub async fn execute_query_typed_segmented<T: TypedEntity>(
        &self,
        table: &str,
        query: &TableQuery,
        continuation: Option<&ContinuationToken>,
    ) -> StorageResult<TableQuerySegment<T>> {
        let query = self.typed_query::<T>(query)?;
        self.execute_query_segmented(table, &query, continuation)
            .await?
            .try_map(|entity| Ok(self.schemas.from_entity(entity)?))
    }

    /// Runs a query to completion, materializing every row as `T`.
    pub async fn execute_query_typed<T: TypedEntity>(
        &self,
        table: &str,
        query: &TableQuery,
    ) -> StorageResult<Vec<T>> {
        let query = self.typed_query::<T>(query)?;
        self.drain_query(table, &query, |entity| Ok(self.schemas.from_entity(entity)?)).await
    }

    /// Fetches one segment of a query and projects each row through `resolver`.
    pub async fn execute_query_with_resolver_segmented<R>(
        &self,
        table: &str,
        query: &TableQuery,
        resolver: &EntityResolver<R>,
        continuation: Option<&ContinuationToken>,
    ) -> StorageResult<TableQuerySegment<R>> {
        self.execute_query_segmented(table, query, continuation)
            .await?
            .try_map(|entity| Ok(resolve(entity, resolver)?))
    }

    /// Runs a query to completion, projecting every row through `resolver`.
    pub async fn execute_query_with_resolver<R>(
        &self,
        table: &str,
        query: &TableQuery,
        resolver: &EntityResolver<R>,
    ) -> StorageResult<Vec<R>> {
        self.drain_query(table, query, |entity| Ok(resolve(entity, resolver)?)).await
    }

    fn typed_query<T: TypedEntity>(&self, query: &TableQuery) -> StorageResult<TableQuery> {
        let declared = self.schemas.property_types::<T>()?;
        Ok(query.clone().with_default_hints(declared))
    }

    async fn drain_query<E>(
        &self,
        table: &str,
        query: &TableQuery,
        mut convert: impl FnMut(TableEntity) -> StorageResult<E>,
    ) -> StorageResult<Vec<E>> {
        let mut all = Vec::new();
        let mut token = None;
        loop {
            let segment = self
                .execute_query_segmented(table, query, token.as_ref())
                .await?;
            for entity in segment.results {
                all.push(convert(entity)?);
            }
            match segment.continuation {
                Some(next) => token = Some(next),
                None => return Ok(all),
            }
        }
    }

    async fn get(&self, url: Url, accept: impl Fn(u16) -> bool) -> StorageResult<RawResponse> {
        let prepared = PreparedRequest::new(Method::GET, url)
            .header(ACCEPT, self.config.payload_format.accept())?;
        self.executor().send(&prepared, accept).await
    }

    // ── Tables ───────────────────────────────────────────────────

    /// Creates a table. Fails with a 409 service error if it exists.
    pub async fn create_table(&self, table: &str) -> StorageResult<()> {
        validate_table_name(table)?;
        let format = self.config.payload_format;
        let body = serialize_table_entry(table, format)?;
        let prepared = PreparedRequest::new(Method::POST, self.url(TABLES)?)
            .header(ACCEPT, format.accept())?
            .header(CONTENT_TYPE, format.content_type())?
            .header("Prefer", "return-no-content")?
            .body(body);
        self.executor()
            .send(&prepared, |s| s == 201 || s == 204)
            .await?;
        info!("Created table {}", table);
        Ok(())
    }

    /// Creates a table unless it exists. Returns whether it was created.
    pub async fn create_table_if_not_exists(&self, table: &str) -> StorageResult<bool> {
        match self.create_table(table).await {
            Ok(()) => Ok(true),
            Err(StorageError::Service(e)) if e.http_status == 409 => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Deletes a table and everything in it.
    pub async fn delete_table(&self, table: &str) -> StorageResult<()> {
        validate_table_name(table)?;
        let path = format!("{TABLES}('{table}')");
        let prepared = PreparedRequest::new(Method::DELETE, self.url(&path)?)
            .header(ACCEPT, self.config.payload_format.accept())?;
        self.executor().send(&prepared, |s| s == 204).await?;
        info!("Deleted table {}", table);
        Ok(())
    }

    /// Whether a table exists.
    pub async fn table_exists(&self, table: &str) -> StorageResult<bool> {
        validate_table_name(table)?;
        let url = self.url(&format!("{TABLES}('{table}')"))?;
        let response = self.get(url, |s| s == 200 || s == 404).await?;
        Ok(response.status == 200)
    }

    /// Fetches one segment of the table listing.
    pub async fn list_tables_segmented(
        &self,
        continuation: Option<&ContinuationToken>,
    ) -> StorageResult<TableListSegment> {
        let pairs = continuation.map(ContinuationToken::query_pairs).unwrap_or_default();
        let url = self.url_with_query(TABLES, pairs)?;
        let response = self.get(url, |s| s == 200).await?;
        let tables = deserialize_table_names(&response.body, self.config.payload_format)?;
        Ok(TableListSegment {
            tables,
            continuation: ContinuationToken::from_headers(&response.headers),
        })
    }

    /// Lists every table, following continuation tokens.
    pub async fn list_tables(&self) -> StorageResult<Vec<String>> {
        let mut all = Vec::new();
        let mut token = None;
        loop {
            let segment = self.list_tables_segmented(token.as_ref()).await?;
            all.extend(segment.tables);
            match segment.continuation {
                Some(next) => token = Some(next),
                None => return Ok(all),
            }
        }
    }
}
