//! Module for server policy implementations.

pub mod target;
