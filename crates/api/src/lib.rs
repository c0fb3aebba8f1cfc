//! The serializable types for the API Lab REST API.
#![deny(missing_docs)]

pub mod v1;
