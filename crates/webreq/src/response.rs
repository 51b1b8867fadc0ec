//! Decoded HTTP responses.
//!
//! A [`Response`] keeps the raw body bytes and decodes them lazily by
//! `Content-Type` on the first call to [`Response::body`]. The outcome
//! (success or [`DecodeError`]) is memoized, so decoding happens at most once
//! per instance.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DecodeError, Error};
use crate::xml::{XmlElement, parse_document};

/// Decoded body, borrowed from its [`Response`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Body<'a> {
    /// Undecoded bytes: no or unknown content type, or an empty body.
    Raw(&'a [u8]),
    /// Parsed JSON document. Integers outside the 64-bit range are strings.
    Json(&'a Value),
    /// Parsed XML document root.
    Xml(&'a XmlElement),
}

/// Memoized decode outcome.
#[derive(Debug, Clone)]
enum Decoded {
    Raw,
    Json(Value),
    Xml(XmlElement),
}

/// An HTTP response: status, lower-cased headers, and raw body.
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
    decoded: OnceLock<Result<Decoded, DecodeError>>,
}

impl Response {
    /// Create a response from already-parsed parts.
    ///
    /// Header names are lower-cased; on duplicates the last one wins.
    pub fn new<I, K, V>(status: u16, headers: I, body: Vec<u8>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        Self {
            status,
            headers,
            body,
            decoded: OnceLock::new(),
        }
    }

    /// Create a response from the raw transport output: a header block of
    /// `header_size` bytes followed by the body.
    ///
    /// A `header_size` past the end of `raw` treats everything as headers.
    pub fn from_raw(status: u16, raw: &[u8], header_size: usize) -> Self {
        let split = header_size.min(raw.len());
        let (header_block, body) = raw.split_at(split);
        let headers = parse_header_block(&String::from_utf8_lossy(header_block));
        Self {
            status,
            headers,
            body: body.to_vec(),
            decoded: OnceLock::new(),
        }
    }

    /// HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether the status is in `200..=299`.
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// Header value by case-insensitive name, `None` if absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// All headers, keyed by lower-cased name.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Raw body bytes.
    pub fn raw_body(&self) -> &[u8] {
        &self.body
    }

    /// Raw body as text, replacing invalid UTF-8.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Whether the body has already been decoded.
    pub fn is_decoded(&self) -> bool {
        self.decoded.get().is_some()
    }

    /// Decoded body, computed on first access.
    pub fn body(&self) -> Result<Body<'_>, DecodeError> {
        let decoded = self
            .decoded
            .get_or_init(|| decode(self.header("content-type"), &self.body));
        match decoded {
            Ok(Decoded::Raw) => Ok(Body::Raw(&self.body)),
            Ok(Decoded::Json(value)) => Ok(Body::Json(value)),
            Ok(Decoded::Xml(element)) => Ok(Body::Xml(element)),
            Err(err) => Err(err.clone()),
        }
    }

    /// Deserialize a JSON body into `T`.
    ///
    /// Fails with [`Error::InvalidArgument`] when the body did not decode as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        match self.body()? {
            Body::Json(value) => Ok(T::deserialize(value)?),
            _ => Err(Error::invalid(format!(
                "response body is not JSON (content-type: {})",
                self.header("content-type").unwrap_or("none")
            ))),
        }
    }

    /// Rebuild a stored response, decoding eagerly if it had been decoded before.
    pub(crate) fn restore(
        status: u16,
        headers: BTreeMap<String, String>,
        body: Vec<u8>,
        decoded: bool,
    ) -> Self {
        let response = Self {
            status,
            headers,
            body,
            decoded: OnceLock::new(),
        };
        if decoded {
            // The outcome is memoized either way; errors resurface on access.
            let _ = response.body();
        }
        response
    }
}

/// Parse a raw header block into lower-cased name/value pairs.
///
/// Blank lines and status lines (`HTTP/...`) are skipped, as are lines
/// without a `": "` separator. Later duplicates overwrite earlier ones.
fn parse_header_block(block: &str) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for line in block.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with("HTTP/") {
            continue;
        }
        if let Some((name, value)) = line.split_once(": ") {
            headers.insert(name.to_ascii_lowercase(), value.to_owned());
        }
    }
    headers
}

/// Decode `body` according to `content_type`.
fn decode(content_type: Option<&str>, body: &[u8]) -> Result<Decoded, DecodeError> {
    let Some(content_type) = content_type else {
        return Ok(Decoded::Raw);
    };
    if body.is_empty() {
        return Ok(Decoded::Raw);
    }

    if content_type.starts_with("application/json") {
        let value: Value = serde_json::from_slice(body).map_err(|e| DecodeError::json(&e))?;
        Ok(Decoded::Json(stringify_big_integers(value)))
    } else if content_type.starts_with("application/xml") || content_type.starts_with("text/xml")
    {
        let text = std::str::from_utf8(body).map_err(|e| DecodeError::xml(e.to_string()))?;
        Ok(Decoded::Xml(parse_document(text)?))
    } else {
        Ok(Decoded::Raw)
    }
}

/// Replace integers that do not fit in 64 bits with their decimal string.
fn stringify_big_integers(value: Value) -> Value {
    match value {
        Value::Number(n) if n.as_i64().is_none() && n.as_u64().is_none() => {
            let digits = n.to_string();
            if digits.contains(['.', 'e', 'E']) {
                Value::Number(n)
            } else {
                Value::String(digits)
            }
        }
        Value::Array(items) => {
            Value::Array(items.into_iter().map(stringify_big_integers).collect())
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, stringify_big_integers(v)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn json_response(body: &str) -> Response {
        Response::new(
            200,
            [("Content-Type", "application/json; charset=utf-8")],
            body.as_bytes().to_vec(),
        )
    }

    #[test]
    fn test_from_raw_parses_headers() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nX-Thing: a: b\r\n\r\nhello";
        let header_size = raw.len() - 5;
        let response = Response::from_raw(200, raw, header_size);

        assert_eq!(response.status(), 200);
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.header("X-THING"), Some("a: b"));
        assert_eq!(response.raw_body(), b"hello");
        assert_eq!(response.headers().len(), 2);
    }

    #[test]
    fn test_duplicate_headers_last_wins() {
        let block = "HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nSet-Cookie: a=1\r\nset-cookie: b=2\r\n";
        let headers = parse_header_block(block);
        assert_eq!(headers.get("set-cookie").map(String::as_str), Some("b=2"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_header_lines_without_separator_skipped() {
        let headers = parse_header_block("Broken-Line\r\nGood: yes\r\n");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("good").map(String::as_str), Some("yes"));
    }

    #[test]
    fn test_missing_header_is_none() {
        let response = Response::new(200, Vec::<(String, String)>::new(), Vec::new());
        assert_eq!(response.header("content-type"), None);
    }

    #[test]
    fn test_decode_json_object() {
        let response = json_response(r#"{"ip":"1.2.3.4"}"#);
        assert_eq!(response.body().unwrap(), Body::Json(&json!({"ip": "1.2.3.4"})));
    }

    #[test]
    fn test_decode_json_null_is_null() {
        let response = json_response("null");
        assert_eq!(response.body().unwrap(), Body::Json(&Value::Null));
    }

    #[test]
    fn test_decode_malformed_json_fails() {
        let response = json_response(r#"{"ip":"#);
        let err = response.body().unwrap_err();
        assert_eq!(err.format, crate::error::BodyFormat::Json);
        assert!(!err.message.is_empty());
        // Failure is memoized too
        assert!(response.is_decoded());
        assert_eq!(response.body().unwrap_err(), err);
    }

    #[test]
    fn test_decode_big_integers_as_strings() {
        let response = json_response(r#"{"id":123456789012345678901234567890,"n":42,"f":1.5}"#);
        let Body::Json(value) = response.body().unwrap() else {
            panic!("expected JSON body");
        };
        assert_eq!(value["id"], json!("123456789012345678901234567890"));
        assert_eq!(value["n"].as_i64(), Some(42));
        assert_eq!(value["f"].as_f64(), Some(1.5));
    }

    #[test]
    fn test_decode_is_memoized() {
        let response = json_response(r#"[1,2]"#);
        assert!(!response.is_decoded());
        let first = response.body().unwrap();
        assert!(response.is_decoded());
        let second = response.body().unwrap();
        let (Body::Json(a), Body::Json(b)) = (first, second) else {
            panic!("expected JSON bodies");
        };
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn test_decode_xml() {
        let response = Response::new(
            200,
            [("content-type", "text/xml")],
            b"<ip>1.2.3.4</ip>".to_vec(),
        );
        let Body::Xml(root) = response.body().unwrap() else {
            panic!("expected XML body");
        };
        assert_eq!(root.tag, "ip");
        assert_eq!(root.text, "1.2.3.4");
    }

    #[test]
    fn test_decode_without_content_type_is_raw() {
        let response = Response::new(200, Vec::<(String, String)>::new(), b"{}".to_vec());
        assert_eq!(response.body().unwrap(), Body::Raw(b"{}"));
    }

    #[test]
    fn test_decode_empty_body_is_raw() {
        let response = json_response("");
        assert_eq!(response.body().unwrap(), Body::Raw(b""));
    }

    #[test]
    fn test_decode_content_type_prefix_is_case_sensitive() {
        let response = Response::new(200, [("content-type", "Application/JSON")], b"{".to_vec());
        assert_eq!(response.body().unwrap(), Body::Raw(b"{"));
    }

    #[test]
    fn test_decode_other_type_is_raw() {
        let response = Response::new(200, [("content-type", "image/png")], vec![0x89, 0x50]);
        assert_eq!(response.body().unwrap(), Body::Raw(&[0x89, 0x50]));
    }

    #[test]
    fn test_typed_json() {
        #[derive(serde::Deserialize)]
        struct Ip {
            ip: String,
        }

        let response = json_response(r#"{"ip":"1.2.3.4"}"#);
        let ip: Ip = response.json().unwrap();
        assert_eq!(ip.ip, "1.2.3.4");

        let plain = Response::new(200, [("content-type", "text/plain")], b"x".to_vec());
        assert!(matches!(plain.json::<Ip>(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_is_success_range() {
        let ok = |status| Response::new(status, Vec::<(String, String)>::new(), Vec::new());
        assert!(ok(200).is_success());
        assert!(ok(299).is_success());
        assert!(!ok(199).is_success());
        assert!(!ok(300).is_success());
    }
}
