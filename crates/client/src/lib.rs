//! A client library for the API Lab relay server.

#![deny(missing_docs)]

pub mod api;

pub use self::api::{ApiError, ApiResult, Client};

/// The URL of a relay server running with its default configuration.
pub const DEFAULT_URL: &str = "http://127.0.0.1:8090";
