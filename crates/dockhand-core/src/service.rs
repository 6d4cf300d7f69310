//! Container service - the single entry point callers hold

use crate::{CoreError, Result};
use dockhand_config::GlobalConfig;
use dockhand_engine::ContainerEngine;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Settings the service needs, derived from [`GlobalConfig`]
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Upper bound for a single engine call
    pub call_timeout: Duration,
    /// Grace period handed to the engine on stop/restart
    pub stop_grace_secs: u32,
    /// Where compose definitions are persisted (None disables persistence)
    pub compose_dir: Option<PathBuf>,
    /// Keep stack-private networks when a stack loses its last member
    pub retain_networks: bool,
    /// Frames buffered between a log session and its caller
    pub log_channel_capacity: usize,
    /// Liveness probe period for following log sessions
    pub log_probe_interval: Duration,
    /// Tail applied when a log request does not set one
    pub default_log_tail: Option<u64>,
}

impl ServiceConfig {
    pub fn from_global(config: &GlobalConfig) -> Self {
        Self {
            call_timeout: config.call_timeout(),
            stop_grace_secs: config.operations.stop_grace_secs,
            compose_dir: config.compose_dir(),
            retain_networks: config.compose.retain_networks,
            log_channel_capacity: config.logs.channel_capacity,
            log_probe_interval: config.probe_interval(),
            default_log_tail: config.logs.default_tail,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
            stop_grace_secs: 10,
            compose_dir: None,
            retain_networks: false,
            log_channel_capacity: 256,
            log_probe_interval: Duration::from_secs(2),
            default_log_tail: None,
        }
    }
}

/// Control plane over one container engine
///
/// Cheap to share behind an `Arc`; holds no locks of its own.
pub struct ContainerService {
    pub(crate) engine: Arc<dyn ContainerEngine>,
    pub(crate) config: ServiceConfig,
}

impl ContainerService {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: ServiceConfig) -> Self {
        Self { engine, config }
    }

    /// Create from the global config
    pub fn from_global(engine: Arc<dyn ContainerEngine>, config: &GlobalConfig) -> Self {
        Self::new(engine, ServiceConfig::from_global(config))
    }

    /// Replace the per-call engine timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn ContainerEngine> {
        &self.engine
    }

    /// Run one engine call under the configured timeout
    pub(crate) async fn call<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = dockhand_engine::Result<T>>,
    {
        bounded(self.config.call_timeout, fut).await
    }
}

pub(crate) async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = dockhand_engine::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(CoreError::from),
        Err(_) => Err(CoreError::Timeout(format!(
            "engine call did not finish within {:?}",
            limit
        ))),
    }
}

/// Send a progress message if a channel is available
pub(crate) fn send_progress(progress: Option<&mpsc::UnboundedSender<String>>, msg: &str) {
    if let Some(tx) = progress {
        let _ = tx.send(msg.to_string());
    }
}

/// Lowercase substring match used by every name filter
pub(crate) fn name_matches(filter: Option<&str>, name: &str) -> bool {
    match filter.map(str::trim) {
        None | Some("") => true,
        Some(f) => name.to_lowercase().contains(&f.to_lowercase()),
    }
}

/// Engine-compatible resource name: `[a-zA-Z0-9][a-zA-Z0-9_.-]*`
pub(crate) fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
