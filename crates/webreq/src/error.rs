//! Error types for request building, execution, and decoding.

use std::fmt;

use crate::config::ConfigError;

/// Body format that failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    /// `application/json`.
    Json,
    /// `application/xml` or `text/xml`.
    Xml,
}

impl fmt::Display for BodyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("JSON"),
            Self::Xml => f.write_str("XML"),
        }
    }
}

/// The response body claimed a decodable content type but failed to parse.
///
/// Cloneable so the memoized decode result can be returned on every access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{format} decode error: {message}")]
pub struct DecodeError {
    /// Format the body was decoded as.
    pub format: BodyFormat,
    /// Parser diagnostic.
    pub message: String,
}

impl DecodeError {
    pub(crate) fn json(err: &serde_json::Error) -> Self {
        Self {
            format: BodyFormat::Json,
            message: err.to_string(),
        }
    }

    pub(crate) fn xml(message: impl Into<String>) -> Self {
        Self {
            format: BodyFormat::Xml,
            message: message.into(),
        }
    }
}

/// Error from building, sending, or decoding a request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed request configuration, detected before any network activity.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport failure or non-2xx response.
    #[error("{}", format_request_error(message, *status))]
    Request {
        /// Transport error text, or the response body for HTTP errors.
        message: String,
        /// HTTP status code, when a response was received.
        status: Option<u16>,
    },

    /// Response body failed to decode.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The environment cannot supply a cache location, or configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Cache file I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache entry serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// HTTP status carried by a request error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => *status,
            _ => None,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

fn format_request_error(message: &str, status: Option<u16>) -> String {
    match status {
        Some(status) => format!("HTTP {status}: {message}"),
        None => format!("request failed: {message}"),
    }
}

/// Result alias for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
