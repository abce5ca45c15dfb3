/// Builds the weak ETag the service derives from an entity timestamp.
///
/// Used when a response carries no `odata.etag`. The timestamp is
/// URL-encoded exactly as received, so no precision is lost.
#[must_use]
pub fn etag_from_timestamp(raw_timestamp: &str) -> String {
    format!("W/\"datetime'{}'\"", urlencoding::encode(raw_timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colons_are_percent_encoded() {
        assert_eq!(
            etag_from_timestamp("2013-08-19T22:45:51.1426542Z"),
            "W/\"datetime'2013-08-19T22%3A45%3A51.1426542Z'\""
        );
    }
}
