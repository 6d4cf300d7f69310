//! Container engine trait and implementations for dockhand
//!
//! This crate provides a narrow, async interface over the container engine
//! (Docker-compatible API) so the control plane never talks to the engine
//! directly. Engine failures are translated into [`EngineError`] variants
//! and idempotent mutations report an [`Outcome`].

mod docker;
mod error;
mod types;

pub use docker::DockerEngine;
pub use error::*;
pub use types::*;

use async_trait::async_trait;

/// Trait for container engines
///
/// Containers, networks and volumes are addressed by name or ID; the engine
/// resolves either.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// List containers (including stopped ones when `all` is set)
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>>;

    /// Get detailed information about a container
    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails>;

    /// Create a container from an image
    async fn create_container(&self, config: &CreateContainerConfig) -> Result<ContainerId>;

    /// Start a container
    async fn start(&self, name: &str) -> Result<Outcome>;

    /// Stop a container, giving it `grace_secs` before it is killed
    async fn stop(&self, name: &str, grace_secs: Option<u32>) -> Result<Outcome>;

    /// Restart a container
    async fn restart(&self, name: &str, grace_secs: Option<u32>) -> Result<()>;

    /// Pause all processes in a container
    async fn pause(&self, name: &str) -> Result<Outcome>;

    /// Resume a paused container
    async fn unpause(&self, name: &str) -> Result<Outcome>;

    /// Send a signal (SIGKILL by default)
    async fn kill(&self, name: &str, signal: Option<&str>) -> Result<()>;

    /// Remove a container
    async fn remove(&self, name: &str, force: bool) -> Result<()>;

    /// Rename a container
    async fn rename(&self, name: &str, new_name: &str) -> Result<()>;

    /// Change CPU/memory limits of an existing container
    async fn update_resources(&self, name: &str, limits: &ResourceLimits) -> Result<()>;

    /// One-shot resource usage sample
    async fn stats(&self, name: &str) -> Result<ContainerStats>;

    /// Get container logs
    async fn logs(&self, name: &str, config: &LogConfig) -> Result<LogStream>;

    /// Remove unused resources of one kind
    async fn prune(&self, kind: PruneKind) -> Result<PruneResult>;

    /// List networks
    async fn list_networks(&self) -> Result<Vec<NetworkSummary>>;

    /// Get a network with its attached containers
    async fn inspect_network(&self, name: &str) -> Result<NetworkSummary>;

    /// Create a network, returning its ID
    async fn create_network(&self, config: &CreateNetworkConfig) -> Result<String>;

    /// Remove a network
    async fn remove_network(&self, name: &str) -> Result<()>;

    /// Attach a container to an additional network
    async fn connect_network(&self, network: &str, container: &str, aliases: &[String])
        -> Result<()>;

    /// List volumes
    async fn list_volumes(&self) -> Result<Vec<VolumeSummary>>;

    /// Get a volume
    async fn inspect_volume(&self, name: &str) -> Result<VolumeSummary>;

    /// Create a volume
    async fn create_volume(&self, config: &CreateVolumeConfig) -> Result<VolumeSummary>;

    /// Remove a volume
    async fn remove_volume(&self, name: &str, force: bool) -> Result<()>;

    /// Host CPU/memory capacity
    async fn host_info(&self) -> Result<HostInfo>;

    /// Check if the engine is available/connected
    async fn ping(&self) -> Result<()>;

    /// Get engine information
    fn info(&self) -> EngineInfo;
}

/// Connect to the engine configured in the global config
pub async fn create_engine(config: &dockhand_config::GlobalConfig) -> Result<DockerEngine> {
    let socket = &config.engine.socket;
    match DockerEngine::connect(socket, config.engine.connect_timeout_secs).await {
        Ok(engine) => Ok(engine),
        Err(e) => {
            let path = socket.trim_start_matches("unix://");
            let is_socket = !socket.starts_with("http://") && !socket.starts_with("https://");
            let socket_exists = !is_socket || std::path::Path::new(path).exists();
            Err(EngineError::ConnectionError(format_connection_error(
                socket,
                socket_exists,
                &e,
            )))
        }
    }
}

/// Format a helpful connection error message with actionable instructions
fn format_connection_error(socket: &str, socket_exists: bool, underlying: &EngineError) -> String {
    let mut msg = String::from("Cannot connect to the container engine\n\n");

    if !socket_exists {
        msg.push_str(&format!(
            "The engine API socket was not found at:\n  {}\n\n",
            socket
        ));
        msg.push_str("To start Docker, run:\n");
        msg.push_str("  sudo systemctl enable --now docker\n");
        msg.push_str("Or point [engine].socket in the dockhand config at a running engine.\n");
    } else {
        msg.push_str(&format!(
            "The endpoint {} exists but the engine is not responding.\n\n",
            socket
        ));
        msg.push_str(&format!("Underlying error: {}\n", underlying));
    }

    msg
}
