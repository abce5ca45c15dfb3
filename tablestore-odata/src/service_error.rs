//! Structured error bodies returned by the service.
//!
//! JSON form:
//! `{"odata.error":{"code":"...","message":{"lang":"en-US","value":"..."}}}`
//!
//! XML form:
//! `<error><code>...</code><message xml:lang="en-US">...</message></error>`
//!
//! Either may carry an `innererror` block whose fields land in `details`
//! under `innererror.<field>`.

use crate::error::ODataResult;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;
use std::collections::BTreeMap;

/// Error code, message and extra details from a failed response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendedErrorInfo {
    pub error_code: Option<String>,
    pub message: Option<String>,
    pub details: BTreeMap<String, String>,
}

impl ExtendedErrorInfo {
    /// Parses a JSON or XML error body, sniffing the first non-blank byte.
    ///
    /// Returns `None` for an empty or unrecognizable body; the caller still
    /// has the HTTP status to report.
    pub fn parse(body: &str) -> Option<Self> {
        let trimmed = body.trim_start();
        let parsed = if trimmed.starts_with('{') {
            parse_json(trimmed).ok()
        } else if trimmed.starts_with('<') {
            parse_xml(trimmed).ok()
        } else {
            None
        };
        parsed.filter(|info| info.error_code.is_some() || info.message.is_some())
    }
}

fn parse_json(body: &str) -> ODataResult<ExtendedErrorInfo> {
    let root: Value = serde_json::from_str(body)?;
    let error = root
        .get("odata.error")
        .or_else(|| root.get("error"))
        .unwrap_or(&Value::Null);

    let mut info = ExtendedErrorInfo {
        error_code: error.get("code").and_then(Value::as_str).map(str::to_string),
        message: error.get("message").and_then(message_text),
        details: BTreeMap::new(),
    };

    if let Some(Value::Object(inner)) = error.get("innererror") {
        for (key, value) in inner {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            info.details.insert(format!("innererror.{key}"), text);
        }
    }
    Ok(info)
}

/// `message` is either a bare string or `{"lang": .., "value": ..}`.
fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(m) => m.get("value").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn parse_xml(body: &str) -> ODataResult<ExtendedErrorInfo> {
    let mut reader = Reader::from_str(body);
    let mut path: Vec<String> = Vec::new();
    let mut info = ExtendedErrorInfo::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Text(t) => {
                let text = t.unescape()?.into_owned();
                let segments: Vec<&str> = path.iter().map(String::as_str).collect();
                match segments.as_slice() {
                    [.., "error", "code"] => info.error_code = Some(text),
                    [.., "error", "message"] => info.message = Some(text),
                    [.., "innererror", field] => {
                        info.details.insert(format!("innererror.{field}"), text);
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(info)
}
