//! The `apilab` command line tool.

#![deny(missing_docs)]

pub mod commands;
