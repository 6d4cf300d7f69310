//! dockhand CLI library
//!
//! Command implementations live here so integration tests can drive them
//! against a mock engine; `main.rs` only parses arguments and wires up the
//! service.

pub mod commands;
pub mod output;
