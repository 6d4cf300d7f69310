//! Configuration for dockhand
//!
//! Loads the global configuration (`~/.config/dockhand/config.toml`) that
//! selects the container engine endpoint and tunes call timeouts, compose
//! storage and log streaming.

mod error;
mod global;

pub use error::*;
pub use global::*;
