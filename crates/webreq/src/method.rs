//! HTTP verbs and their transport dispatch.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT` (dispatched as POST with a method override header)
    Put,
    /// `PATCH` (dispatched as POST with a method override header)
    Patch,
    /// `DELETE`
    Delete,
}

impl Method {
    /// Upper-case verb name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Verb actually put on the wire, and the `X-HTTP-Method-Override` value if any.
    ///
    /// PUT and PATCH travel as POST so that chunked bodies survive transports
    /// that mishandle them. The receiving server must honor the override header.
    pub fn dispatch(self) -> (Self, Option<&'static str>) {
        match self {
            Self::Put | Self::Patch => (Self::Post, Some(self.as_str())),
            other => (other, None),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(Error::invalid(format!("unsupported method: {s:?}"))),
        }
    }
}
