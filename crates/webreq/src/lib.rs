//! Blocking HTTP requests with content-type decoding and response caching.
//!
//! This crate is a thin convenience layer over [`ureq`]:
//!
//! - [`Request`]: Builder for method, URL, query arguments, body or multipart
//!   files, headers, basic auth, and timeouts; [`Request::send`] executes it
//! - [`Response`]: Status, headers, and a body decoded lazily by
//!   `Content-Type` (JSON, XML, or raw bytes)
//! - [`cache`]: [`CacheStore`](cache::CacheStore) implementations keyed by
//!   the final request URL
//! - [`config`]: Request defaults loaded from TOML
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use webreq::Request;
//! use webreq::cache::FixedExpirationCache;
//!
//! let cache = Arc::new(FixedExpirationCache::new(Duration::from_secs(300))?);
//! let response = Request::get("https://api.example.com/status")
//!     .json(true)
//!     .cache(cache)
//!     .send()?;
//! assert!(response.is_success());
//! # Ok::<(), webreq::Error>(())
//! ```

pub mod cache;
pub mod config;
mod error;
mod method;
mod request;
mod response;
mod transport;
pub mod xml;

pub use error::{BodyFormat, DecodeError, Error, Result};
pub use method::Method;
pub use request::{METHOD_OVERRIDE_HEADER, Request};
pub use response::{Body, Response};
