//! Client error types.
//!
//! Every failure surfaces as a [`StorageError`]. Service failures carry the
//! HTTP status, the service's error code and message, any extended details,
//! and for a batch the operation that caused the abort.

use crate::operation::OperationType;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tablestore_model::ModelError;
use tablestore_odata::{ExtendedErrorInfo, ODataError};
use thiserror::Error;

/// Result type for client operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the table client.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Deterministic input problem caught before any network attempt.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The service response broke the wire contract.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The service answered with a non-success status.
    #[error("{0}")]
    Service(Box<ServiceError>),

    #[error("payload error: {0}")]
    OData(#[from] ODataError),

    #[error("value error: {0}")]
    Model(#[from] ModelError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<ServiceError> for StorageError {
    fn from(err: ServiceError) -> Self {
        StorageError::Service(Box::new(err))
    }
}

/// The operation in a batch whose response aborted the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedOperation {
    pub index: usize,
    pub operation_type: OperationType,
}

/// A non-success response from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub http_status: u16,
    pub status_message: String,
    pub error_code: Option<String>,
    pub message: Option<String>,
    pub details: BTreeMap<String, String>,
    pub failed_operation: Option<FailedOperation>,
    /// From a `Retry-After` header, when the service sent one.
    pub retry_after: Option<Duration>,
}

impl ServiceError {
    /// Builds an error from a response status line and body.
    ///
    /// A body that is not a recognizable error document is kept as the
    /// message verbatim when it is non-empty.
    pub fn from_response(http_status: u16, status_message: &str, body: &str) -> Self {
        let (error_code, message, details) = match ExtendedErrorInfo::parse(body) {
            Some(info) => (info.error_code, info.message, info.details),
            None => {
                let text = body.trim();
                let message = (!text.is_empty()).then(|| text.to_string());
                (None, message, BTreeMap::new())
            }
        };
        Self {
            http_status,
            status_message: status_message.to_string(),
            error_code,
            message,
            details,
            failed_operation: None,
            retry_after: None,
        }
    }

    #[must_use]
    pub fn with_failed_operation(mut self, index: usize, operation_type: OperationType) -> Self {
        self.failed_operation = Some(FailedOperation {
            index,
            operation_type,
        });
        self
    }

    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Operation index from a batch error message of the form `"<index>:<text>"`.
    pub fn batch_index(&self) -> Option<usize> {
        let message = self.message.as_deref()?;
        let (prefix, _) = message.split_once(':')?;
        prefix.trim().parse().ok()
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service returned {} {}", self.http_status, self.status_message)?;
        if let Some(code) = &self.error_code {
            write!(f, " ({code})")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(op) = &self.failed_operation {
            write!(f, " [operation {} ({})]", op.index, op.operation_type)?;
        }
        Ok(())
    }
}

impl StorageError {
    /// HTTP status of the failed response, if one was received.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            StorageError::Service(e) => Some(e.http_status),
            StorageError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The service's error code string, if it sent one.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            StorageError::Service(e) => e.error_code.as_deref(),
            _ => None,
        }
    }

    /// Index of the batch operation that aborted the batch.
    pub fn failed_operation_index(&self) -> Option<usize> {
        match self {
            StorageError::Service(e) => e.failed_operation.map(|op| op.index),
            _ => None,
        }
    }

    /// Whether the response is worth another attempt.
    ///
    /// Timeouts, throttling and server faults are retryable. Validation,
    /// payload and other client-side errors are deterministic and never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Service(e) => is_retryable_status(e.http_status),
            StorageError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| is_retryable_status(s.as_u16()))
            }
            _ => false,
        }
    }

    /// Returns the retry-after duration if the service asked for one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            StorageError::Service(e) => e.retry_after,
            _ => None,
        }
    }

    /// True when the failure is a broken service response rather than bad input.
    pub fn is_protocol_violation(&self) -> bool {
        match self {
            StorageError::Protocol(_) => true,
            StorageError::OData(e) => e.is_protocol_violation(),
            _ => false,
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    match status {
        408 | 429 => true,
        501 | 505 => false,
        s => s >= 500,
    }
}

pub(crate) fn protocol(message: impl Into<String>) -> StorageError {
    StorageError::Protocol(message.into())
}

pub(crate) fn invalid(message: impl Into<String>) -> StorageError {
    StorageError::InvalidArgument(message.into())
}
