//! Control plane for containers, networks, volumes and compose stacks
//!
//! This crate provides:
//! - Paginated queries and inspection of engine resources
//! - Lifecycle operations with state checks and batch reporting
//! - Compose stack parsing, provisioning and teardown
//! - Live log streaming sessions with cancellation
//!
//! Everything hangs off one [`ContainerService`] built around an
//! `Arc<dyn ContainerEngine>`.

pub mod compose;
mod dispatch;
mod error;
pub mod logs;
mod query;
mod service;

pub use compose::{
    ComposeAction, ComposeFile, ComposeOperation, ComposeRequest, ExecutionLog,
};
pub use dispatch::*;
pub use error::*;
pub use logs::{CloseReason, LogFrame, LogRequest, LogSubscriber};
pub use query::*;
pub use service::*;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
