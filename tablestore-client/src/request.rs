//! Prepared requests and the retrying executor.
//!
//! A request is rendered once into a [`PreparedRequest`] whose body is an
//! immutable [`Bytes`] buffer. Each attempt clones the buffer handle, stamps
//! a fresh `x-ms-date`, authorizes and sends.

use crate::credentials::Credentials;
use crate::error::{invalid, ServiceError, StorageError, StorageResult};
use crate::retry::RetryPolicy;
use bytes::Bytes;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method, Url};
use std::time::Duration;
use tracing::{debug, warn};

const DATA_SERVICE_VERSION: &str = "3.0;NetFx";

/// A fully rendered request, ready to be sent any number of times.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl PreparedRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Adds a header given in any case.
    pub fn header(mut self, name: &str, value: &str) -> StorageResult<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| invalid(format!("bad header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| invalid(format!("bad value for header {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Status, headers and body of a response that passed its status check.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Headers sent on every request.
pub(crate) fn service_headers(service_version: &str) -> StorageResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    let mut put = |name: &'static str, value: &str| -> StorageResult<()> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| invalid(format!("bad value for header {name}: {e}")))?;
        headers.insert(HeaderName::from_static(name), value);
        Ok(())
    };
    put("x-ms-version", service_version)?;
    put("dataserviceversion", DATA_SERVICE_VERSION)?;
    put("maxdataserviceversion", DATA_SERVICE_VERSION)?;
    Ok(headers)
}

/// Sends prepared requests with authorization and retries.
#[derive(Debug, Clone)]
pub(crate) struct Executor<'a> {
    pub http: &'a Client,
    pub credentials: &'a dyn Credentials,
    pub retry: &'a dyn RetryPolicy,
    pub common_headers: &'a HeaderMap,
}

impl Executor<'_> {
    /// Sends `request` until it succeeds, the policy gives up, or an error is
    /// not retryable. `accept` decides which statuses count as success.
    pub async fn send(
        &self,
        request: &PreparedRequest,
        accept: impl Fn(u16) -> bool,
    ) -> StorageResult<RawResponse> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.send_once(request, &accept).await {
                Ok(response) => return Ok(response),
                Err(err) => match self.retry.next_delay(attempts, &err) {
                    Some(delay) => {
                        warn!(
                            "Attempt {} of {} {} failed ({}), retrying in {:?}",
                            attempts, request.method, request.url, err, delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(err),
                },
            }
        }
    }

    async fn send_once(
        &self,
        request: &PreparedRequest,
        accept: &impl Fn(u16) -> bool,
    ) -> StorageResult<RawResponse> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let mut outgoing = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(self.common_headers.clone())
            .headers(request.headers.clone())
            .header("x-ms-date", date)
            .body(request.body.clone())
            .build()?;
        self.credentials.authorize(&mut outgoing)?;

        debug!("Dispatching {} {}", request.method, request.url);
        let response = self.http.execute(outgoing).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        debug!("Received {} for {} {}", status, request.method, request.url);

        if accept(status.as_u16()) {
            return Ok(RawResponse {
                status: status.as_u16(),
                headers,
                body,
            });
        }

        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        Err(StorageError::from(
            ServiceError::from_response(
                status.as_u16(),
                status.canonical_reason().unwrap_or_default(),
                &body,
            )
            .with_retry_after(retry_after),
        ))
    }
}
