//! Types representing v1 of the API Lab REST API.

pub mod content;
pub mod paths;
pub mod relay;

use serde::{Deserialize, Serialize};

/// The body of every error response returned by the API.
///
/// The HTTP status code of the response describes the outcome of the
/// API call itself and is not part of the body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// The human-readable error message.
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new error response from the given message.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
