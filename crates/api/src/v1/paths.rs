//! The paths of the API Lab REST API.

/// The path of the "relay request" API.
pub fn relay() -> &'static str {
    "v1/relay"
}

/// The path of the "read content" API.
pub fn content() -> &'static str {
    "v1/content"
}
