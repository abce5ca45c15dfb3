//! Request authorization.
//!
//! Credentials run once per attempt, after the request is fully built, so a
//! retried request is authorized afresh.

use crate::error::StorageResult;
use std::fmt;

/// Authorizes an outgoing request.
pub trait Credentials: Send + Sync + fmt::Debug {
    fn authorize(&self, request: &mut reqwest::Request) -> StorageResult<()>;
}

/// Sends requests unauthenticated, e.g. against a local emulator or a
/// publicly readable table.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl Credentials for Anonymous {
    fn authorize(&self, _request: &mut reqwest::Request) -> StorageResult<()> {
        Ok(())
    }
}

/// A shared access signature appended to every request's query string.
#[derive(Clone)]
pub struct SasToken {
    token: String,
}

impl SasToken {
    /// Accepts the token with or without its leading `?`. The token is
    /// expected to be percent-encoded already.
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            token: token.trim_start_matches('?').to_string(),
        }
    }
}

impl fmt::Debug for SasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SasToken").finish_non_exhaustive()
    }
}

impl Credentials for SasToken {
    fn authorize(&self, request: &mut reqwest::Request) -> StorageResult<()> {
        if self.token.is_empty() {
            return Ok(());
        }
        let url = request.url_mut();
        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{}", self.token),
            _ => self.token.clone(),
        };
        url.set_query(Some(&query));
        Ok(())
    }
}
