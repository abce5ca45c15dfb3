//! Client configuration.

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use tablestore_odata::PayloadFormat;

/// Service version sent as `x-ms-version`.
pub const DEFAULT_SERVICE_VERSION: &str = "2013-08-15";

/// Retry settings for the default exponential policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

/// Table client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableClientConfig {
    /// Base URL of the table service account (e.g. `https://acct.table.example.net`).
    pub endpoint: String,
    /// Payload format for requests and responses.
    pub payload_format: PayloadFormat,
    /// Whether inserts ask the service to echo the stored entity back.
    pub echo_content: bool,
    /// Per-attempt HTTP timeout in seconds.
    pub timeout_secs: u64,
    pub service_version: String,
    /// Cache entity schemas per type. Disable to rebuild on every use.
    pub schema_cache_enabled: bool,
    pub retry: RetryConfig,
}

impl Default for TableClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            payload_format: PayloadFormat::default(),
            echo_content: false,
            timeout_secs: 60,
            service_version: DEFAULT_SERVICE_VERSION.to_string(),
            schema_cache_enabled: true,
            retry: RetryConfig::default(),
        }
    }
}

impl TableClientConfig {
    /// Config pointing at `endpoint` with every other field defaulted.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Checks the fields a client cannot work without.
    pub fn validate(&self) -> StorageResult<()> {
        if self.endpoint.trim().is_empty() {
            return Err(StorageError::Config("endpoint is empty".to_string()));
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(StorageError::Config(format!(
                "endpoint must be an http(s) URL: {}",
                self.endpoint
            )));
        }
        if self.timeout_secs == 0 {
            return Err(StorageError::Config("timeout_secs must be positive".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(StorageError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.service_version.is_empty() {
            return Err(StorageError::Config("service_version is empty".to_string()));
        }
        Ok(())
    }

    /// Endpoint without a trailing slash.
    pub(crate) fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}
