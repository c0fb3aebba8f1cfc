//! Types relating to the content API.

use super::ErrorResponse;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Represents the query of a content request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentQuery {
    /// The path of the file, relative to the content directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Represents a response for a content request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentResponse {
    /// The text contents of the file.
    pub content: String,
}

/// Represents a content API error.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ContentError {
    /// The request did not specify a file path.
    #[error("file path is required")]
    MissingPath,
    /// The file path escapes the content directory.
    #[error("file path `{0}` is not a relative path within the content directory")]
    InvalidPath(String),
    /// The file does not exist or could not be read.
    #[error("file not found")]
    NotFound(String),
}

impl ContentError {
    /// Returns the HTTP status code of the error.
    pub fn status(&self) -> u16 {
        match self {
            Self::MissingPath | Self::InvalidPath(_) => 400,
            Self::NotFound(_) => 404,
        }
    }
}

impl Serialize for ContentError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ErrorResponse::new(self.to_string()).serialize(serializer)
    }
}
