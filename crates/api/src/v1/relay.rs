//! Types relating to the relay API.

use super::ErrorResponse;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use std::time::Duration;
use thiserror::Error;

/// The method used when a relay request does not specify one.
pub const DEFAULT_METHOD: &str = "GET";

/// Represents the body of a relay request.
///
/// A string is forwarded verbatim; any other JSON value is forwarded as
/// its serialized JSON text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayBody {
    /// A textual body.
    Text(String),
    /// A structured JSON body.
    Json(serde_json::Value),
}

impl RelayBody {
    /// Converts the body into the text sent to the target.
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Json(value) => value.to_string(),
        }
    }
}

impl From<String> for RelayBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RelayBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<serde_json::Value> for RelayBody {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(text) => Self::Text(text),
            value => Self::Json(value),
        }
    }
}

/// Represents a request to relay to a target server.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    /// The absolute URL of the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// The HTTP method; defaults to `GET`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// The headers to send to the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<IndexMap<String, String>>,
    /// The body to send to the target.
    ///
    /// The body is never sent for `GET` or `HEAD` requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<RelayBody>,
}

impl RelayRequest {
    /// Creates a new relay request for the given target URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Sets the HTTP method of the request.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Adds a header to the request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Sets the body of the request.
    pub fn with_body(mut self, body: impl Into<RelayBody>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// The encoding applied to a captured response body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    /// The body was not valid UTF-8 and is base64 encoded.
    Base64,
}

/// Represents the captured response of a target server.
///
/// A capture is a successful relay outcome regardless of the target's
/// status code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    /// The status code returned by the target.
    pub status: u16,
    /// The reason phrase of the status code.
    #[serde(default)]
    pub status_text: String,
    /// The flattened response headers of the target.
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// The complete response body.
    #[serde(default)]
    pub body: String,
    /// The encoding of the body, if it is not plain text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_encoding: Option<BodyEncoding>,
}

impl RelayResponse {
    /// Gets the raw bytes of the response body, decoding it if necessary.
    pub fn body_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        match self.body_encoding {
            None => Ok(self.body.clone().into_bytes()),
            Some(BodyEncoding::Base64) => STANDARD.decode(&self.body),
        }
    }

    /// Whether the target responded with a success status code.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The category of a relay error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The relay request itself was invalid; no network call was made.
    Input,
    /// The target was rejected by the relay's target policy.
    Policy,
    /// Communicating with the target failed.
    Transport,
}

/// Represents a relay API error.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RelayError {
    /// The request did not specify a target URL.
    #[error("a target `url` is required")]
    MissingUrl,
    /// The target URL could not be parsed.
    #[error("invalid target URL `{url}`: {message}")]
    InvalidUrl {
        /// The URL as given.
        url: String,
        /// The reason the URL is invalid.
        message: String,
    },
    /// The target URL uses a scheme other than `http` or `https`.
    #[error("unsupported URL scheme `{0}`: only `http` and `https` targets can be relayed")]
    UnsupportedScheme(String),
    /// The method is not a valid HTTP method token.
    #[error("invalid HTTP method `{0}`")]
    InvalidMethod(String),
    /// A request header has an invalid name or value.
    #[error("invalid header `{name}`: {message}")]
    InvalidHeader {
        /// The header name as given.
        name: String,
        /// The reason the header is invalid.
        message: String,
    },
    /// The target was rejected by policy.
    #[error("target rejected by policy: {0}")]
    TargetRejected(String),
    /// The target did not respond in time.
    #[error("request to `{url}` timed out after {timeout:?}")]
    Timeout {
        /// The target URL.
        url: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },
    /// A connection to the target could not be established.
    #[error("failed to connect to `{url}`: {message}")]
    Connect {
        /// The target URL.
        url: String,
        /// The underlying cause.
        message: String,
    },
    /// The target's response body exceeded the maximum size.
    #[error("response from `{url}` exceeded the maximum body size of {limit} bytes")]
    ResponseTooLarge {
        /// The target URL.
        url: String,
        /// The maximum body size in bytes.
        limit: u64,
    },
    /// Any other failure communicating with the target.
    #[error("request to `{url}` failed: {message}")]
    Transport {
        /// The target URL.
        url: String,
        /// The underlying cause.
        message: String,
    },
}

impl RelayError {
    /// Returns the HTTP status code of the error.
    pub fn status(&self) -> u16 {
        match self {
            Self::MissingUrl
            | Self::InvalidUrl { .. }
            | Self::UnsupportedScheme(_)
            | Self::InvalidMethod(_)
            | Self::InvalidHeader { .. } => 400,
            Self::TargetRejected(_) => 403,
            Self::Timeout { .. } => 504,
            Self::Connect { .. } | Self::ResponseTooLarge { .. } | Self::Transport { .. } => 502,
        }
    }

    /// Returns the category of the error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TargetRejected(_) => ErrorCategory::Policy,
            Self::Timeout { .. }
            | Self::Connect { .. }
            | Self::ResponseTooLarge { .. }
            | Self::Transport { .. } => ErrorCategory::Transport,
            Self::MissingUrl
            | Self::InvalidUrl { .. }
            | Self::UnsupportedScheme(_)
            | Self::InvalidMethod(_)
            | Self::InvalidHeader { .. } => ErrorCategory::Input,
        }
    }
}

impl Serialize for RelayError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ErrorResponse::new(self.to_string()).serialize(serializer)
    }
}
