//! Request builder and executor.
//!
//! A [`Request`] collects method, URL, query arguments, body or files,
//! headers, and transport options, then [`send`](Request::send)s them:
//!
//! 1. Validate the configuration (no network activity on failure)
//! 2. Compute the final URL and consult the [`CacheStore`]
//! 3. On a miss, execute the call and wrap the result in a [`Response`]
//! 4. Fail with [`Error::Request`] on non-2xx, otherwise cache and return
//!
//! # Example
//!
//! ```no_run
//! use webreq::{Body, Request};
//!
//! let response = Request::get("https://api.example.com/ip")
//!     .arg("format", "json")
//!     .json(true)
//!     .send()?;
//!
//! if let Body::Json(value) = response.body()? {
//!     println!("{}", value["ip"]);
//! }
//! # Ok::<(), webreq::Error>(())
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, info, warn};
use ureq::http::{HeaderName, HeaderValue};

use crate::cache::{CacheStore, NullCache};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::method::Method;
use crate::response::{Body, Response};
use crate::transport::{TransportOptions, create_agent, encode_multipart, execute};

/// Characters left unescaped in query arguments: A-Z a-z 0-9 - . _ ~
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Header carrying the intended verb when PUT/PATCH travel as POST.
pub const METHOD_OVERRIDE_HEADER: &str = "X-HTTP-Method-Override";

/// An HTTP request under construction.
pub struct Request {
    method: Method,
    url: String,
    args: Vec<(String, String)>,
    query_string: Option<String>,
    body: Option<Vec<u8>>,
    files: Vec<(String, PathBuf)>,
    headers: Vec<String>,
    json: bool,
    cache: Arc<dyn CacheStore>,
    follow_redirects: bool,
    credentials: Option<(String, String)>,
    connect_timeout: Option<Duration>,
    timeout: Option<Duration>,
    debug: bool,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("args", &self.args)
            .field("query_string", &self.query_string)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .field("files", &self.files)
            .field("headers", &self.headers)
            .field("json", &self.json)
            .field("follow_redirects", &self.follow_redirects)
            .field("has_credentials", &self.credentials.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .field("timeout", &self.timeout)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

/// A validated request, ready for the transport.
#[derive(Debug)]
struct Prepared {
    url: String,
    method: Method,
    headers: Vec<(String, String)>,
    payload: Option<Vec<u8>>,
}

impl Request {
    /// Create a request with no cache, redirects followed, and no timeouts.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            args: Vec::new(),
            query_string: None,
            body: None,
            files: Vec::new(),
            headers: Vec::new(),
            json: false,
            cache: Arc::new(NullCache),
            follow_redirects: true,
            credentials: None,
            connect_timeout: None,
            timeout: None,
            debug: false,
        }
    }

    /// Create a request with defaults taken from `config`.
    pub fn from_config(
        method: Method,
        url: impl Into<String>,
        config: &ClientConfig,
    ) -> Result<Self> {
        let mut request = Self::new(method, url)
            .json(config.json)
            .follow_redirects(config.follow_redirects)
            .debug(config.debug)
            .cache(config.cache_store()?);
        request.connect_timeout = config.connect_timeout();
        request.timeout = config.timeout();
        if let Some(ref auth) = config.auth {
            request = request.basic_auth(&auth.username, &auth.password);
        }
        Ok(request)
    }

    /// `GET` request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// `POST` request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// `PUT` request (sent as POST with a method override header).
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    /// `PATCH` request (sent as POST with a method override header).
    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::Patch, url)
    }

    /// `DELETE` request.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    /// Append a query argument. Order is preserved.
    #[must_use]
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((key.into(), value.into()));
        self
    }

    /// Append several query arguments.
    #[must_use]
    pub fn args<I, K, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.args
            .extend(args.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Use a raw, already-encoded query string instead of arguments.
    #[must_use]
    pub fn query_string(mut self, query: impl Into<String>) -> Self {
        self.query_string = Some(query.into());
        self
    }

    /// Request body, sent as-is.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Attach a local file as a multipart form field.
    #[must_use]
    pub fn file(mut self, field: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.files.push((field.into(), path.into()));
        self
    }

    /// Add a raw `"Name: Value"` header line.
    #[must_use]
    pub fn header(mut self, line: impl Into<String>) -> Self {
        self.headers.push(line.into());
        self
    }

    /// Add JSON `Accept` and `Content-Type` headers when not already present.
    #[must_use]
    pub fn json(mut self, enabled: bool) -> Self {
        self.json = enabled;
        self
    }

    /// Cache store consulted before and written after the network call.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = cache;
        self
    }

    /// Whether redirects are followed (default: true).
    #[must_use]
    pub fn follow_redirects(mut self, enabled: bool) -> Self {
        self.follow_redirects = enabled;
        self
    }

    /// HTTP Basic credentials.
    #[must_use]
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Time allowed to establish the connection.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Time allowed for the whole request.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Log cache decisions, timings, and error bodies at `info`/`warn`.
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// URL with its resolved query string.
    ///
    /// A raw query string wins; otherwise arguments are form-encoded and
    /// joined with `&` in insertion order. Without either, the URL is unchanged.
    pub fn final_url(&self) -> String {
        if let Some(ref query) = self.query_string {
            return format!("{}?{query}", self.url);
        }
        if self.args.is_empty() {
            return self.url.clone();
        }
        let query = self
            .args
            .iter()
            .map(|(k, v)| format!("{}={}", form_encode(k), form_encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", self.url)
    }

    /// Check the configuration without sending anything.
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(Error::invalid("url is required"));
        }
        if self.body.is_some() && !self.files.is_empty() {
            return Err(Error::invalid("body and files are mutually exclusive"));
        }
        if !self.args.is_empty() && self.query_string.is_some() {
            return Err(Error::invalid("args and query string are mutually exclusive"));
        }
        for line in &self.headers {
            split_header(line)?;
        }
        Ok(())
    }

    /// Send the request.
    ///
    /// Returns a cached response when the cache store has one for the final
    /// URL. Otherwise performs the call, stores a successful response in the
    /// cache, and returns it.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for an invalid configuration or an
    ///   unreadable upload file
    /// - [`Error::Request`] for transport failures (no status) and non-2xx
    ///   responses (status set, body as message)
    pub fn send(self) -> Result<Response> {
        self.validate()?;
        let url = self.final_url();

        match self.cache.get_from_cache(&url) {
            Ok(Some(response)) => {
                self.log(format_args!("cache hit for {url}"));
                return Ok(response);
            }
            Ok(None) => self.log(format_args!("cache miss for {url}")),
            Err(e) => warn!("ignoring unreadable cache entry for {url}: {e}"),
        }

        let options = TransportOptions {
            follow_redirects: self.follow_redirects,
            connect_timeout: self.connect_timeout,
            timeout: self.timeout,
        };
        let debug_mode = self.debug;
        let method = self.method;
        let cache = Arc::clone(&self.cache);
        let prepared = self.prepare(url)?;

        let agent = create_agent(options);
        let started = Instant::now();
        debug!("{} {} (as {})", method, prepared.url, prepared.method);

        let response = match execute(
            &agent,
            prepared.method,
            &prepared.url,
            &prepared.headers,
            prepared.payload.as_deref(),
        ) {
            Ok(response) => response,
            Err(e) => {
                if debug_mode {
                    warn!("{method} {} failed: {e}", prepared.url);
                }
                return Err(e);
            }
        };

        let status = response.status();
        if !response.is_success() {
            if debug_mode {
                warn!(
                    "{method} {} returned HTTP {status}:\n{}",
                    prepared.url,
                    describe_body(&response)
                );
            }
            return Err(Error::Request {
                message: response.text().into_owned(),
                status: Some(status),
            });
        }

        if debug_mode {
            info!(
                "{method} {} returned HTTP {status} in {:?}",
                prepared.url,
                started.elapsed()
            );
        }

        if let Err(e) = cache.save_to_cache(&prepared.url, &response) {
            warn!("failed to cache response for {}: {e}", prepared.url);
        }
        Ok(response)
    }

    /// Assemble wire method, headers, and payload.
    fn prepare(self, url: String) -> Result<Prepared> {
        let mut headers = self
            .headers
            .iter()
            .map(|line| split_header(line))
            .collect::<Result<Vec<_>>>()?;

        let (method, override_verb) = self.method.dispatch();
        if let Some(verb) = override_verb {
            set_header(&mut headers, METHOD_OVERRIDE_HEADER, verb);
        }

        let payload = if self.files.is_empty() {
            if self.body.is_some() && self.json && !has_header(&headers, "content-type") {
                headers.push(("Content-Type".to_owned(), "application/json".to_owned()));
            }
            self.body
        } else {
            let multipart = encode_multipart(&self.files)?;
            set_header(&mut headers, "Content-Type", &multipart.content_type);
            // Suppresses the 100-Continue interim response on uploads
            set_header(&mut headers, "Expect", "");
            Some(multipart.body)
        };

        if self.json && !has_header(&headers, "accept") {
            headers.push(("Accept".to_owned(), "application/json".to_owned()));
        }

        if let Some((username, password)) = self.credentials {
            let token = BASE64_STANDARD.encode(format!("{username}:{password}"));
            set_header(&mut headers, "Authorization", &format!("Basic {token}"));
        }

        Ok(Prepared {
            url,
            method,
            headers,
            payload,
        })
    }

    fn log(&self, message: fmt::Arguments<'_>) {
        if self.debug {
            info!("{message}");
        } else {
            debug!("{message}");
        }
    }
}

/// Form-encode a query component (spaces as `+`).
///
/// `%20` can only come from an encoded space, since a literal `%` is itself
/// encoded as `%25`.
fn form_encode(input: &str) -> String {
    utf8_percent_encode(input, QUERY_ENCODE_SET)
        .to_string()
        .replace("%20", "+")
}

/// Split a `"Name: Value"` line. The value may be empty.
fn split_header(line: &str) -> Result<(String, String)> {
    let Some((name, value)) = line.split_once(':') else {
        return Err(Error::invalid(format!("malformed header line: {line:?}")));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid(format!("header line has no name: {line:?}")));
    }
    let value = value.trim();
    if HeaderName::from_bytes(name.as_bytes()).is_err() {
        return Err(Error::invalid(format!("invalid header name: {name:?}")));
    }
    if HeaderValue::from_str(value).is_err() {
        return Err(Error::invalid(format!("invalid value for header {name}: {value:?}")));
    }
    Ok((name.to_owned(), value.to_owned()))
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

/// Replace every header called `name` with a single `name: value`.
fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    headers.push((name.to_owned(), value.to_owned()));
}

/// Error body for logs: pretty JSON when it decodes as JSON, raw text otherwise.
fn describe_body(response: &Response) -> String {
    match response.body() {
        Ok(Body::Json(value)) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| response.text().into_owned())
        }
        _ => response.text().into_owned(),
    }
}
