//! Continuation tokens for segmented listings.
//!
//! The service returns the resume point in `x-ms-continuation-*` response
//! headers; the next request replays them as query parameters.

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

const HEADER_NEXT_PARTITION_KEY: &str = "x-ms-continuation-nextpartitionkey";
const HEADER_NEXT_ROW_KEY: &str = "x-ms-continuation-nextrowkey";
const HEADER_NEXT_TABLE_NAME: &str = "x-ms-continuation-nexttablename";

const PARAM_NEXT_PARTITION_KEY: &str = "NextPartitionKey";
const PARAM_NEXT_ROW_KEY: &str = "NextRowKey";
const PARAM_NEXT_TABLE_NAME: &str = "NextTableName";

/// Where the next segment of a listing starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationToken {
    pub next_partition_key: Option<String>,
    pub next_row_key: Option<String>,
    pub next_table_name: Option<String>,
}

impl ContinuationToken {
    /// Reads the token from response headers. `None` when the listing is complete.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let token = Self {
            next_partition_key: get(HEADER_NEXT_PARTITION_KEY),
            next_row_key: get(HEADER_NEXT_ROW_KEY),
            next_table_name: get(HEADER_NEXT_TABLE_NAME),
        };
        (!token.is_empty()).then_some(token)
    }

    pub fn is_empty(&self) -> bool {
        self.next_partition_key.is_none()
            && self.next_row_key.is_none()
            && self.next_table_name.is_none()
    }

    /// Query parameters that resume the listing.
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        [
            (PARAM_NEXT_PARTITION_KEY, &self.next_partition_key),
            (PARAM_NEXT_ROW_KEY, &self.next_row_key),
            (PARAM_NEXT_TABLE_NAME, &self.next_table_name),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn absent_headers_end_the_listing() {
        assert!(ContinuationToken::from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn reads_partition_and_row_keys() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-ms-continuation-nextpartitionkey",
            HeaderValue::from_static("1!8!UA--"),
        );
        headers.insert(
            "x-ms-continuation-nextrowkey",
            HeaderValue::from_static("1!8!Ug--"),
        );
        let token = ContinuationToken::from_headers(&headers).unwrap();
        assert_eq!(
            token.query_pairs(),
            vec![("NextPartitionKey", "1!8!UA--"), ("NextRowKey", "1!8!Ug--")]
        );
    }
}
