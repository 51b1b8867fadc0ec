//! Blocking transport built on `ureq`.
//!
//! Everything below the request builder lives here: agent configuration,
//! multipart encoding, and turning a `ureq` response back into the raw
//! header block + body pair that [`Response::from_raw`] parses.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::RngExt;
use ureq::{Agent, RequestBuilder};

use crate::error::{Error, Result};
use crate::method::Method;
use crate::response::Response;

/// Redirect hops followed when redirects are enabled.
const MAX_REDIRECTS: u32 = 10;

/// Upper bound on a response body read into memory (1 GiB).
const MAX_BODY_SIZE: u64 = 1 << 30;

/// Agent settings derived from a request.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TransportOptions {
    pub(crate) follow_redirects: bool,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) timeout: Option<Duration>,
}

/// Create an agent for a single send.
///
/// HTTP error statuses are returned as responses, not errors, so that their
/// bodies reach the caller.
pub(crate) fn create_agent(options: TransportOptions) -> Agent {
    let max_redirects = if options.follow_redirects {
        MAX_REDIRECTS
    } else {
        0
    };
    Agent::config_builder()
        .timeout_connect(options.connect_timeout)
        .timeout_global(options.timeout)
        .max_redirects(max_redirects)
        .max_redirects_will_error(options.follow_redirects)
        .http_status_as_error(false)
        .build()
        .into()
}

/// Send one request and collect the full response.
///
/// `method` is the verb on the wire; PUT and PATCH have already been turned
/// into POST by the caller. A GET or DELETE with a payload still carries it.
pub(crate) fn execute(
    agent: &Agent,
    method: Method,
    url: &str,
    headers: &[(String, String)],
    payload: Option<&[u8]>,
) -> Result<Response> {
    let result = match (method, payload) {
        (Method::Get, None) => with_headers(agent.get(url), headers).call(),
        (Method::Get, Some(body)) => {
            with_headers(agent.get(url).force_send_body(), headers).send(body)
        }
        (Method::Delete, None) => with_headers(agent.delete(url), headers).call(),
        (Method::Delete, Some(body)) => {
            with_headers(agent.delete(url).force_send_body(), headers).send(body)
        }
        (Method::Post | Method::Put | Method::Patch, None) => {
            with_headers(agent.post(url), headers).send_empty()
        }
        (Method::Post | Method::Put | Method::Patch, Some(body)) => {
            with_headers(agent.post(url), headers).send(body)
        }
    };

    let mut response = result.map_err(transport_error)?;
    let status = response.status().as_u16();
    let header_block = render_header_block(&response);
    let body = response
        .body_mut()
        .with_config()
        .limit(MAX_BODY_SIZE)
        .read_to_vec()
        .map_err(transport_error)?;

    let mut raw = header_block.into_bytes();
    let header_size = raw.len();
    raw.extend_from_slice(&body);
    Ok(Response::from_raw(status, &raw, header_size))
}

fn with_headers<B>(
    mut builder: RequestBuilder<B>,
    headers: &[(String, String)],
) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn transport_error(err: ureq::Error) -> Error {
    let message = err.to_string();
    Error::Request {
        message: if message.is_empty() {
            "HTTP transport failed".to_owned()
        } else {
            message
        },
        status: None,
    }
}

/// Render the status line and headers the way they arrived on the wire.
fn render_header_block(response: &ureq::http::Response<ureq::Body>) -> String {
    let status = response.status();
    let mut block = format!(
        "{:?} {} {}\r\n",
        response.version(),
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );
    for (name, value) in response.headers() {
        let value = value.to_str().map_or_else(
            |_| String::from_utf8_lossy(value.as_bytes()).into_owned(),
            str::to_owned,
        );
        let _ = write!(block, "{name}: {value}\r\n");
    }
    block.push_str("\r\n");
    block
}

/// A `multipart/form-data` body ready to send.
#[derive(Debug)]
pub(crate) struct Multipart {
    pub(crate) content_type: String,
    pub(crate) body: Vec<u8>,
}

/// Encode local files as `multipart/form-data`, one part per field.
///
/// A file that cannot be read fails with [`Error::InvalidArgument`].
pub(crate) fn encode_multipart(files: &[(String, PathBuf)]) -> Result<Multipart> {
    let boundary = format!("----WebreqFormBoundary{:016x}", rand::rng().random::<u64>());
    let mut body = Vec::new();

    for (field, path) in files {
        let data = fs::read(path).map_err(|e| {
            Error::invalid(format!(
                "cannot read file {} for field {field:?}: {e}",
                path.display()
            ))
        })?;
        let filename = file_name(path);

        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(&data);
        body.extend_from_slice(b"\r\n");
    }

    // End boundary
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    Ok(Multipart {
        content_type: format!("multipart/form-data; boundary={boundary}"),
        body,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().replace('"', "%22"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_multipart_contains_each_file() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.bin");
        fs::write(&a, b"alpha").unwrap();
        fs::write(&b, [0u8, 1, 2]).unwrap();

        let multipart =
            encode_multipart(&[("first".to_owned(), a), ("second".to_owned(), b)]).unwrap();
        let boundary = multipart
            .content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap();
        let text = String::from_utf8_lossy(&multipart.body);

        assert!(text.starts_with(&format!("--{boundary}\r\n")));
        assert!(text.ends_with(&format!("--{boundary}--\r\n")));
        assert!(text.contains("name=\"first\"; filename=\"a.txt\""));
        assert!(text.contains("name=\"second\"; filename=\"b.bin\""));
        assert!(text.contains("\r\n\r\nalpha\r\n"));
        assert_eq!(text.matches(&format!("--{boundary}\r\n")).count(), 2);
    }

    #[test]
    fn test_multipart_missing_file_is_invalid_argument() {
        let err = encode_multipart(&[("f".to_owned(), PathBuf::from("/nonexistent/file"))])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_agent_builds_with_all_options() {
        // Construction must not panic for any combination
        for follow_redirects in [true, false] {
            let _agent = create_agent(TransportOptions {
                follow_redirects,
                connect_timeout: Some(Duration::from_secs(1)),
                timeout: None,
            });
        }
    }
}
