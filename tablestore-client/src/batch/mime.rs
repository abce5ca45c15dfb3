//! MIME multipart framing for entity group transactions.
//!
//! Request layout, with CRLF line endings:
//!
//! ```text
//! --batch_<id>
//! Content-Type: multipart/mixed; boundary=changeset_<id>
//!
//! --changeset_<id>
//! Content-Type: application/http
//! Content-Transfer-Encoding: binary
//!
//! POST https://acct.example.net/people HTTP/1.1
//! Content-ID: 0
//! Accept: application/json;odata=minimalmetadata
//! Content-Type: application/json
//! Prefer: return-no-content
//!
//! {"PartitionKey":"P1",...}
//! --changeset_<id>--
//! --batch_<id>--
//! ```
//!
//! A lone retrieve is framed directly under the batch boundary. Responses
//! mirror the layout with an HTTP status line in place of the request line.

use crate::error::{protocol, StorageResult};
use crate::operation::OperationRequest;
use uuid::Uuid;

const CRLF: &str = "\r\n";
const HTTP_VERSION: &str = "HTTP/1.1";

/// One response inside a batch response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    pub status_code: u16,
    pub status_message: String,
    /// Headers in wire order.
    pub headers: Vec<(String, String)>,
    pub payload: String,
}

impl MimePart {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An encoded batch request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchBody {
    pub boundary: String,
    pub body: String,
}

impl BatchBody {
    /// `Content-Type` header value for the outer request.
    pub fn content_type(&self) -> String {
        multipart_content_type(&self.boundary)
    }
}

fn multipart_content_type(boundary: &str) -> String {
    format!("multipart/mixed; boundary={boundary}")
}

/// Frames already-rendered operation requests into a batch body.
///
/// `base_url` prefixes each request path in the synthetic request lines.
/// Writes are wrapped in a changeset; a retrieve-only batch is not.
pub fn write_batch(requests: &[OperationRequest], base_url: &str, changeset: bool) -> BatchBody {
    let batch_boundary = format!("batch_{}", Uuid::new_v4());
    let mut body = String::new();

    if changeset {
        let changeset_boundary = format!("changeset_{}", Uuid::new_v4());
        push_line(&mut body, &format!("--{batch_boundary}"));
        push_line(
            &mut body,
            &format!("Content-Type: {}", multipart_content_type(&changeset_boundary)),
        );
        body.push_str(CRLF);
        for (content_id, request) in requests.iter().enumerate() {
            push_line(&mut body, &format!("--{changeset_boundary}"));
            write_part(&mut body, request, base_url, content_id);
        }
        push_line(&mut body, &format!("--{changeset_boundary}--"));
    } else {
        for (content_id, request) in requests.iter().enumerate() {
            push_line(&mut body, &format!("--{batch_boundary}"));
            write_part(&mut body, request, base_url, content_id);
        }
    }
    push_line(&mut body, &format!("--{batch_boundary}--"));

    BatchBody {
        boundary: batch_boundary,
        body,
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push_str(CRLF);
}

fn write_part(out: &mut String, request: &OperationRequest, base_url: &str, content_id: usize) {
    push_line(out, "Content-Type: application/http");
    push_line(out, "Content-Transfer-Encoding: binary");
    out.push_str(CRLF);

    push_line(
        out,
        &format!("{} {base_url}/{} {HTTP_VERSION}", request.method, request.path),
    );
    push_line(out, &format!("Content-ID: {content_id}"));
    for (name, value) in &request.headers {
        push_line(out, &format!("{name}: {value}"));
    }
    out.push_str(CRLF);
    if let Some(body) = &request.body {
        push_line(out, body);
    }
}

// ── Parsing ──────────────────────────────────────────────────────

/// Extracts the `boundary` parameter of a multipart content type.
pub fn boundary_from_content_type(content_type: &str) -> StorageResult<String> {
    let mut params = content_type.split(';');
    let media_type = params.next().unwrap_or_default().trim();
    if !media_type.eq_ignore_ascii_case("multipart/mixed") {
        return Err(protocol(format!(
            "expected multipart/mixed, got {content_type:?}"
        )));
    }
    params
        .filter_map(|p| p.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
        .ok_or_else(|| protocol(format!("no boundary in {content_type:?}")))
}

/// Parses a batch response body into its parts, flattening any changesets.
pub fn read_batch_response(body: &str, content_type: &str) -> StorageResult<Vec<MimePart>> {
    let boundary = boundary_from_content_type(content_type)?;
    let mut parts = Vec::new();
    read_multipart(body, &boundary, &mut parts)?;
    Ok(parts)
}

fn read_multipart(body: &str, boundary: &str, out: &mut Vec<MimePart>) -> StorageResult<()> {
    for section in split_sections(body, boundary)? {
        let (mime_headers, rest) = read_headers(section)?;
        let content_type = mime_headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case("Content-Type"))
            .map(|(_, v)| v.as_str())
            .unwrap_or_default();

        if content_type.to_ascii_lowercase().starts_with("multipart/mixed") {
            let nested = boundary_from_content_type(content_type)?;
            read_multipart(rest, &nested, out)?;
        } else {
            out.push(read_http_response(rest)?);
        }
    }
    Ok(())
}

/// Slices the text between `--boundary` delimiters, up to `--boundary--`.
fn split_sections<'a>(body: &'a str, boundary: &str) -> StorageResult<Vec<&'a str>> {
    let delimiter = format!("--{boundary}");
    let start = body
        .find(&delimiter)
        .ok_or_else(|| protocol(format!("boundary {boundary} not found")))?;
    let mut rest = &body[start + delimiter.len()..];
    let mut sections = Vec::new();

    loop {
        if rest.starts_with("--") {
            return Ok(sections);
        }
        rest = skip_line(rest);
        let end = rest
            .find(&delimiter)
            .ok_or_else(|| protocol(format!("unterminated multipart section for {boundary}")))?;
        sections.push(trim_line_end(&rest[..end]));
        rest = &rest[end + delimiter.len()..];
    }
}

/// Splits off the first line, without its terminator.
fn next_line(text: &str) -> (&str, &str) {
    match text.find('\n') {
        Some(i) => (text[..i].trim_end_matches('\r'), &text[i + 1..]),
        None => (text.trim_end_matches('\r'), ""),
    }
}

fn skip_line(text: &str) -> &str {
    next_line(text).1
}

fn trim_line_end(text: &str) -> &str {
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.strip_suffix('\r').unwrap_or(text)
}

/// Reads header lines up to the first blank line.
fn read_headers(mut text: &str) -> StorageResult<(Vec<(String, String)>, &str)> {
    let mut headers = Vec::new();
    while !text.is_empty() {
        let (line, rest) = next_line(text);
        text = rest;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| protocol(format!("malformed header line {line:?}")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
    Ok((headers, text))
}

fn read_http_response(text: &str) -> StorageResult<MimePart> {
    let text = text.trim_start_matches(['\r', '\n']);
    let (status_line, rest) = next_line(text);
    let mut fields = status_line.splitn(3, ' ');
    let version = fields.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(protocol(format!("malformed status line {status_line:?}")));
    }
    let status_code = fields
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| protocol(format!("malformed status line {status_line:?}")))?;
    let status_message = fields.next().unwrap_or_default().trim().to_string();

    let (headers, payload) = read_headers(rest)?;
    Ok(MimePart {
        status_code,
        status_message,
        headers,
        payload: payload.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_parameter() {
        assert_eq!(
            boundary_from_content_type("multipart/mixed; boundary=batchresponse_1").unwrap(),
            "batchresponse_1"
        );
        assert_eq!(
            boundary_from_content_type("Multipart/Mixed;charset=utf-8; Boundary=\"b\"").unwrap(),
            "b"
        );
        assert!(boundary_from_content_type("application/json").is_err());
        assert!(boundary_from_content_type("multipart/mixed").is_err());
    }

    #[test]
    fn status_line_with_multi_word_message() {
        let part = read_http_response("HTTP/1.1 404 Not Found\r\nETag: x\r\n\r\n{}").unwrap();
        assert_eq!(part.status_code, 404);
        assert_eq!(part.status_message, "Not Found");
        assert_eq!(part.header("etag"), Some("x"));
        assert_eq!(part.payload, "{}");
    }

    #[test]
    fn lf_only_framing_is_accepted() {
        let body = "--b\nContent-Type: application/http\n\nHTTP/1.1 204 No Content\n\n--b--\n";
        let parts = read_batch_response(body, "multipart/mixed; boundary=b").unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].status_code, 204);
        assert_eq!(parts[0].payload, "");
    }

    #[test]
    fn unterminated_section() {
        let body = "--b\r\nContent-Type: application/http\r\n\r\nHTTP/1.1 204 No Content\r\n";
        let err = read_batch_response(body, "multipart/mixed; boundary=b").unwrap_err();
        assert!(err.is_protocol_violation());
    }
}
