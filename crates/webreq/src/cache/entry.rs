//! On-disk format of cache entries.
//!
//! Each entry is a JSON document:
//!
//! ```text
//! {"status":200,"headers":{"content-type":"..."},"body":"<base64>","decoded":false}
//! ```
//!
//! `decoded` records whether the body had been decoded when it was stored;
//! restored responses re-populate their decode memo accordingly.

use std::collections::BTreeMap;
use std::io;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::response::Response;

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    status: u16,
    headers: BTreeMap<String, String>,
    body: String,
    decoded: bool,
}

/// Serialize a response to entry bytes.
pub(super) fn encode(response: &Response) -> Result<Vec<u8>> {
    let entry = CacheEntry {
        status: response.status(),
        headers: response.headers().clone(),
        body: BASE64_STANDARD.encode(response.raw_body()),
        decoded: response.is_decoded(),
    };
    Ok(serde_json::to_vec(&entry)?)
}

/// Deserialize entry bytes back into a response.
pub(super) fn decode(bytes: &[u8]) -> Result<Response> {
    let entry: CacheEntry = serde_json::from_slice(bytes)?;
    let body = BASE64_STANDARD
        .decode(entry.body.as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Response::restore(
        entry.status,
        entry.headers,
        body,
        entry.decoded,
    ))
}
