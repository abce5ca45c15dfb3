use chrono::{DateTime, Utc};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tablestore_client::{
    ExponentialRetry, NoRetry, SasToken, StorageError, TableBatchOperation, TableClient,
    TableClientConfig, TableOperation, TableQuery, TableQuerySegment,
};
use tablestore_model::{
    EntityKeys, EntitySchema, ModelResult, PropertyMap, TableEntity, TypedEntity,
};
use tablestore_odata::{EntityResolver, PayloadFormat};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn mock_config(server: &MockServer) -> TableClientConfig {
    TableClientConfig::new(server.uri())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tablestore_client=debug")
        .with_test_writer()
        .try_init();
}

fn client(server: &MockServer) -> TableClient {
    TableClient::new(mock_config(server))
        .unwrap()
        .with_retry_policy(NoRetry)
}

const ENTITY_BODY: &str = r#"{"odata.metadata":"m","odata.etag":"W/\"datetime'2024-01-02T03%3A04%3A05Z'\"","PartitionKey":"P1","RowKey":"R1","Timestamp":"2024-01-02T03:04:05Z","Count":5,"Big@odata.type":"Edm.Int64","Big":"5000000000"}"#;

// ── Config ──────────────────────────────────────────────────────

#[test]
fn config_defaults() {
    let cfg = TableClientConfig::default();
    assert!(cfg.endpoint.is_empty());
    assert_eq!(cfg.payload_format, PayloadFormat::JsonMinimalMetadata);
    assert!(!cfg.echo_content);
    assert_eq!(cfg.timeout_secs, 60);
    assert_eq!(cfg.service_version, "2013-08-15");
    assert!(cfg.schema_cache_enabled);
    assert_eq!(cfg.retry.max_attempts, 3);
}

#[test]
fn config_serde_fills_missing_fields() {
    let cfg: TableClientConfig = serde_json::from_str(
        r#"{"endpoint":"https://acct.example.net","payload_format":"json_no_metadata"}"#,
    )
    .unwrap();
    assert_eq!(cfg.payload_format, PayloadFormat::JsonNoMetadata);
    assert_eq!(cfg.timeout_secs, 60);
    let json = serde_json::to_string(&cfg).unwrap();
    let back: TableClientConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, cfg);
}

#[test]
fn config_validation() {
    assert!(TableClient::new(TableClientConfig::default()).is_err());
    assert!(TableClient::new(TableClientConfig::new("ftp://x")).is_err());
    let zero_timeout = TableClientConfig {
        timeout_secs: 0,
        ..TableClientConfig::new("https://acct.example.net")
    };
    assert!(matches!(
        TableClient::new(zero_timeout).unwrap_err(),
        StorageError::Config(_)
    ));
    assert!(TableClient::new(TableClientConfig::new("https://acct.example.net/")).is_ok());
}

#[test]
fn disabled_schema_cache_is_honored() {
    let cfg = TableClientConfig {
        schema_cache_enabled: false,
        ..TableClientConfig::new("https://acct.example.net")
    };
    let client = TableClient::new(cfg).unwrap();
    assert!(!client.schema_cache().is_enabled());
}

// ── Single operations ───────────────────────────────────────────

#[tokio::test]
async fn simple_insert() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/people"))
        .and(header("Prefer", "return-no-content"))
        .and(header("x-ms-version", "2013-08-15"))
        .and(header("DataServiceVersion", "3.0;NetFx"))
        .and(body_string_contains(r#""PartitionKey":"P1","RowKey":"R1","Timestamp":"#))
        .and(body_string_contains(r#""Count":5}"#))
        .respond_with(ResponseTemplate::new(204).insert_header("ETag", "W/\"new\""))
        .expect(1)
        .mount(&server)
        .await;

    let entity = TableEntity::new("P1", "R1").with_property("Count", 5i32);
    let result = client(&server)
        .execute("people", &TableOperation::insert(entity))
        .await
        .unwrap();

    assert_eq!(result.http_status, 204);
    assert_eq!(result.etag.as_deref(), Some("W/\"new\""));
    assert_eq!(result.entity.unwrap().etag.as_deref(), Some("W/\"new\""));
}

#[tokio::test]
async fn insert_with_echo_returns_stored_entity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/people"))
        .and(header("Prefer", "return-content"))
        .respond_with(ResponseTemplate::new(201).set_body_string(ENTITY_BODY))
        .mount(&server)
        .await;

    let entity = TableEntity::new("P1", "R1").with_property("Count", 5i32);
    let result = client(&server)
        .execute("people", &TableOperation::insert_with_echo(entity, true))
        .await
        .unwrap();
    let stored = result.entity.unwrap();
    assert_eq!(stored.property("Big").unwrap().as_i64().unwrap(), 5_000_000_000);
}

#[tokio::test]
async fn retrieve_found_and_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people(PartitionKey='P1',RowKey='R1')"))
        .and(header("Accept", "application/json;odata=minimalmetadata"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ENTITY_BODY))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/people(PartitionKey='P1',RowKey='gone')"))
        .respond_with(ResponseTemplate::new(404).set_body_string(
            r#"{"odata.error":{"code":"ResourceNotFound","message":{"lang":"en-US","value":"nope"}}}"#,
        ))
        .mount(&server)
        .await;

    let client = client(&server);
    let found = client
        .execute("people", &TableOperation::retrieve("P1", "R1"))
        .await
        .unwrap();
    assert_eq!(found.http_status, 200);
    assert_eq!(
        found.etag.as_deref(),
        Some("W/\"datetime'2024-01-02T03%3A04%3A05Z'\"")
    );
    assert_eq!(found.entity.unwrap().property("Count").unwrap().as_i32().unwrap(), 5);

    let missing = client
        .execute("people", &TableOperation::retrieve("P1", "gone"))
        .await
        .unwrap();
    assert_eq!(missing.http_status, 404);
    assert!(!missing.is_found());
}

#[tokio::test]
async fn replace_sends_if_match() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/people(PartitionKey='P1',RowKey='R1')"))
        .and(header("If-Match", "W/\"old\""))
        .respond_with(ResponseTemplate::new(204).insert_header("ETag", "W/\"next\""))
        .expect(1)
        .mount(&server)
        .await;

    let entity = TableEntity::new("P1", "R1").with_etag("W/\"old\"");
    let result = client(&server)
        .execute("people", &TableOperation::replace(entity))
        .await
        .unwrap();
    assert_eq!(result.etag.as_deref(), Some("W/\"next\""));
}

#[tokio::test]
async fn merge_is_tunneled_through_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/people(PartitionKey='P1',RowKey='R1')"))
        .and(header("X-HTTP-Method", "MERGE"))
        .and(header("If-Match", "*"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let entity = TableEntity::new("P1", "R1").with_etag("*");
    client(&server)
        .execute("people", &TableOperation::merge(entity))
        .await
        .unwrap();
}

#[tokio::test]
async fn validation_fails_without_a_request() {
    let server = MockServer::start().await;
    let err = client(&server)
        .execute("people", &TableOperation::delete(TableEntity::new("P", "R")))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidArgument(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn service_error_is_structured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/people"))
        .respond_with(ResponseTemplate::new(409).set_body_string(
            r#"{"odata.error":{"code":"EntityAlreadyExists","message":{"lang":"en-US","value":"The specified entity already exists."}}}"#,
        ))
        .mount(&server)
        .await;

    let err = client(&server)
        .execute("people", &TableOperation::insert(TableEntity::new("P", "R")))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), Some(409));
    assert_eq!(err.error_code(), Some("EntityAlreadyExists"));
    assert_eq!(err.failed_operation_index(), None);
    assert!(!err.is_retryable());
    let StorageError::Service(service) = err else {
        panic!("expected service error");
    };
    assert_eq!(service.status_message, "Conflict");
    assert_eq!(
        service.message.as_deref(),
        Some("The specified entity already exists.")
    );
}

// ── Retries ─────────────────────────────────────────────────────

#[tokio::test]
async fn retry_resends_the_same_body() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/people"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/people"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = TableClient::new(mock_config(&server))
        .unwrap()
        .with_retry_policy(ExponentialRetry {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        });
    let entity = TableEntity::new("P", "R").with_property("Count", 1i32);
    client
        .execute("people", &TableOperation::insert(entity))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body, requests[1].body);
}

#[tokio::test]
async fn retry_gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let client = TableClient::new(mock_config(&server))
        .unwrap()
        .with_retry_policy(ExponentialRetry {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        });
    let err = client
        .execute("people", &TableOperation::retrieve("P", "R"))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), Some(500));
    assert!(err.is_retryable());
}

// ── Batches ─────────────────────────────────────────────────────

#[tokio::test]
async fn batch_round_trip() {
    let server = MockServer::start().await;
    let response = concat!(
        "--batchresponse_7\r\n",
        "Content-Type: multipart/mixed; boundary=changesetresponse_7\r\n",
        "\r\n",
        "--changesetresponse_7\r\n",
        "Content-Type: application/http\r\n",
        "Content-Transfer-Encoding: binary\r\n",
        "\r\n",
        "HTTP/1.1 204 No Content\r\n",
        "Content-ID: 0\r\n",
        "ETag: W/\"a\"\r\n",
        "\r\n",
        "\r\n",
        "--changesetresponse_7\r\n",
        "Content-Type: application/http\r\n",
        "Content-Transfer-Encoding: binary\r\n",
        "\r\n",
        "HTTP/1.1 204 No Content\r\n",
        "Content-ID: 1\r\n",
        "ETag: W/\"b\"\r\n",
        "\r\n",
        "\r\n",
        "--changesetresponse_7--\r\n",
        "--batchresponse_7--\r\n",
    );
    Mock::given(method("POST"))
        .and(path("/$batch"))
        .and(body_string_contains("Content-Type: multipart/mixed; boundary=changeset_"))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Content-Type", "multipart/mixed; boundary=batchresponse_7")
                .set_body_string(response),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut batch = TableBatchOperation::new();
    batch.insert(TableEntity::new("P", "1")).unwrap();
    batch.insert_or_replace(TableEntity::new("P", "2")).unwrap();
    let results = client(&server).execute_batch("people", &batch).await.unwrap();

    let etags: Vec<_> = results.iter().map(|r| r.etag.as_deref()).collect();
    assert_eq!(etags, vec![Some("W/\"a\""), Some("W/\"b\"")]);

    let request = &server.received_requests().await.unwrap()[0];
    let content_type = request.headers.get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("multipart/mixed; boundary=batch_"));
}

#[tokio::test]
async fn batch_without_multipart_response_is_protocol_violation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/$batch"))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Content-Type", "application/json")
                .set_body_string("{}"),
        )
        .mount(&server)
        .await;

    let mut batch = TableBatchOperation::new();
    batch.insert(TableEntity::new("P", "1")).unwrap();
    let err = client(&server).execute_batch("people", &batch).await.unwrap_err();
    assert!(err.is_protocol_violation());
}

// ── Queries and tables ──────────────────────────────────────────

#[tokio::test]
async fn query_follows_continuation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people()"))
        .and(query_param("NextPartitionKey", "1!4!UA--"))
        .and(query_param("NextRowKey", "1!4!Ug--"))
        .and(query_param("$filter", "PartitionKey eq 'P'"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"value":[{"PartitionKey":"P","RowKey":"3","Timestamp":"2024-01-01T00:00:00Z"}]}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/people()"))
        .and(query_param("$filter", "PartitionKey eq 'P'"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ms-continuation-NextPartitionKey", "1!4!UA--")
                .insert_header("x-ms-continuation-NextRowKey", "1!4!Ug--")
                .set_body_string(
                    r#"{"value":[
                        {"PartitionKey":"P","RowKey":"1","Timestamp":"2024-01-01T00:00:00Z"},
                        {"PartitionKey":"P","RowKey":"2","Timestamp":"2024-01-01T00:00:00Z"}
                    ]}"#,
                ),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let query = TableQuery::new().filter("PartitionKey eq 'P'");

    let first = client
        .execute_query_segmented("people", &query, None)
        .await
        .unwrap();
    assert_eq!(first.results.len(), 2);
    assert!(first.has_more());

    let second = client
        .execute_query_segmented("people", &query, first.continuation.as_ref())
        .await
        .unwrap();
    assert_eq!(second.results[0].row_key, "3");
    assert!(!second.has_more());
}

#[tokio::test]
async fn create_table_and_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Tables"))
        .and(body_string_contains(r#"{"TableName":"people"}"#))
        .respond_with(ResponseTemplate::new(204))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Tables"))
        .respond_with(ResponseTemplate::new(409).set_body_string(
            r#"{"odata.error":{"code":"TableAlreadyExists","message":{"lang":"en-US","value":"exists"}}}"#,
        ))
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(client.create_table_if_not_exists("people").await.unwrap());
    assert!(!client.create_table_if_not_exists("people").await.unwrap());
    assert!(client.create_table("bad-name").await.is_err());
}

#[tokio::test]
async fn delete_and_list_tables() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/Tables('people')"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Tables"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"value":[{"TableName":"orders"},{"TableName":"people"}]}"#),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    client.delete_table("people").await.unwrap();
    assert_eq!(client.list_tables().await.unwrap(), vec!["orders", "people"]);
}

#[tokio::test]
async fn sas_token_is_appended() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Tables"))
        .and(query_param("sv", "2013-08-15"))
        .and(query_param("sig", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"value":[]}"#))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).with_credentials(SasToken::new("?sv=2013-08-15&sig=abc"));
    assert!(client.list_tables().await.unwrap().is_empty());
}

// ── Typed entities ──────────────────────────────────────────────

#[derive(Debug, Default, PartialEq)]
struct Order {
    keys: EntityKeys,
    total: i64,
    note: Option<String>,
}

impl TypedEntity for Order {
    fn keys(&self) -> &EntityKeys {
        &self.keys
    }

    fn keys_mut(&mut self) -> &mut EntityKeys {
        &mut self.keys
    }

    fn schema() -> ModelResult<EntitySchema<Self>> {
        EntitySchema::builder()
            .field("Total", |o: &Order| &o.total, |o, v| o.total = v)
            .field("Note", |o: &Order| &o.note, |o, v| o.note = v)
            .build()
    }
}

#[tokio::test]
async fn typed_retrieve_uses_declared_types_without_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders(PartitionKey='P',RowKey='1')"))
        .and(header("Accept", "application/json;odata=nometadata"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"PartitionKey":"P","RowKey":"1","Timestamp":"2024-01-01T00:00:00Z","Total":"5000000000","Note":null}"#,
        ))
        .mount(&server)
        .await;

    let cfg = TableClientConfig {
        payload_format: PayloadFormat::JsonNoMetadata,
        ..mock_config(&server)
    };
    let client = TableClient::new(cfg).unwrap().with_retry_policy(NoRetry);
    let order: Order = client
        .retrieve_typed("orders", "P", "1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.total, 5_000_000_000);
    assert_eq!(order.note, None);
    assert_eq!(order.keys.row_key, "1");
    assert!(order.keys.etag.is_some());
}

fn no_metadata_client(server: &MockServer) -> TableClient {
    let cfg = TableClientConfig {
        payload_format: PayloadFormat::JsonNoMetadata,
        ..mock_config(server)
    };
    TableClient::new(cfg).unwrap().with_retry_policy(NoRetry)
}

async fn mount_paged_orders(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/orders()"))
        .and(query_param("NextRowKey", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"value":[{"PartitionKey":"P","RowKey":"2","Timestamp":"2024-01-02T00:00:00Z","Total":"7","Note":"second"}]}"#,
        ))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders()"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ms-continuation-NextPartitionKey", "P")
                .insert_header("x-ms-continuation-NextRowKey", "2")
                .set_body_string(
                    r#"{"value":[{"PartitionKey":"P","RowKey":"1","Timestamp":"2024-01-01T00:00:00Z","Total":"5000000000","Note":null}]}"#,
                ),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn typed_query_materializes_every_segment() {
    let server = MockServer::start().await;
    mount_paged_orders(&server).await;
    let client = no_metadata_client(&server);

    let first: TableQuerySegment<Order> = client
        .execute_query_typed_segmented("orders", &TableQuery::new(), None)
        .await
        .unwrap();
    assert_eq!(first.results.len(), 1);
    assert_eq!(first.results[0].total, 5_000_000_000);
    assert!(first.has_more());

    let orders: Vec<Order> = client
        .execute_query_typed("orders", &TableQuery::new())
        .await
        .unwrap();
    let rows: Vec<_> = orders
        .iter()
        .map(|o| (o.keys.row_key.as_str(), o.total, o.note.as_deref()))
        .collect();
    assert_eq!(rows, vec![("1", 5_000_000_000, None), ("2", 7, Some("second"))]);
    assert!(orders.iter().all(|o| o.keys.etag.is_some()));
}

#[tokio::test]
async fn resolver_query_projects_rows() {
    let server = MockServer::start().await;
    mount_paged_orders(&server).await;
    let client = no_metadata_client(&server);

    let resolver: EntityResolver<String> = Arc::new(
        |pk: &str,
         rk: &str,
         _timestamp: Option<DateTime<Utc>>,
         properties: PropertyMap,
         _etag: Option<&str>| {
            let note = properties["Note"].as_str().unwrap_or("-").to_string();
            Ok(format!("{pk}/{rk}:{note}"))
        },
    );

    let first = client
        .execute_query_with_resolver_segmented("orders", &TableQuery::new(), &resolver, None)
        .await
        .unwrap();
    assert_eq!(first.results, vec!["P/1:-"]);
    assert!(first.continuation.is_some());

    let all = client
        .execute_query_with_resolver("orders", &TableQuery::new(), &resolver)
        .await
        .unwrap();
    assert_eq!(all, vec!["P/1:-", "P/2:second"]);
}

#[tokio::test]
async fn retrieve_result_projects_through_resolver() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people(PartitionKey='P1',RowKey='R1')"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ENTITY_BODY))
        .mount(&server)
        .await;

    let resolver: EntityResolver<(i32, bool)> = Arc::new(
        |_pk: &str,
         _rk: &str,
         _timestamp: Option<DateTime<Utc>>,
         properties: PropertyMap,
         etag: Option<&str>| {
            Ok((properties["Count"].as_i32()?, etag.is_some()))
        },
    );
    let projected = client(&server)
        .execute("people", &TableOperation::retrieve("P1", "R1"))
        .await
        .unwrap()
        .resolve(&resolver)
        .unwrap();
    assert_eq!(projected, Some((5, true)));
}
