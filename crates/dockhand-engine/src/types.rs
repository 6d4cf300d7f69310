//! Common types for the container engine

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Label marking the compose stack a container, network or volume belongs to
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
/// Label naming the compose service a container was created for
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";
/// Label naming the stack-level network key a network was created for
pub const COMPOSE_NETWORK_LABEL: &str = "com.docker.compose.network";
/// Label naming the stack-level volume key a volume was created for
pub const COMPOSE_VOLUME_LABEL: &str = "com.docker.compose.volume";
/// Directory holding the stack's persisted definition
pub const COMPOSE_WORKDIR_LABEL: &str = "com.docker.compose.project.working_dir";
/// Definition file(s) the stack was applied from
pub const COMPOSE_CONFIG_FILES_LABEL: &str = "com.docker.compose.project.config_files";

/// Container ID wrapper
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        if self.0.len() > 12 {
            &self.0[..12]
        } else {
            &self.0
        }
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Container status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Unknown,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Restarting => write!(f, "restarting"),
            Self::Removing => write!(f, "removing"),
            Self::Exited => write!(f, "exited"),
            Self::Dead => write!(f, "dead"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl From<&str> for ContainerStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }
}

/// Result of an idempotent mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The engine changed the resource
    Applied,
    /// The resource was already in the requested state
    NoOp,
}

/// CPU and memory limits of a container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Relative CPU weight (0 = engine default)
    pub cpu_shares: i64,
    /// CPU quota in units of 1e-9 CPUs (0 = unlimited)
    pub nano_cpus: i64,
    /// Memory limit in bytes (0 = unlimited)
    pub memory_bytes: i64,
}

/// Configuration for creating a container
#[derive(Debug, Clone, Default)]
pub struct CreateContainerConfig {
    /// Image to use
    pub image: String,
    /// Container name
    pub name: Option<String>,
    /// Command to run
    pub cmd: Option<Vec<String>>,
    /// Entrypoint override
    pub entrypoint: Option<Vec<String>>,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Working directory
    pub working_dir: Option<String>,
    /// Volume mounts
    pub mounts: Vec<MountConfig>,
    /// Port mappings
    pub ports: Vec<PortConfig>,
    /// Labels
    pub labels: HashMap<String, String>,
    /// Hostname
    pub hostname: Option<String>,
    /// Allocate TTY
    pub tty: bool,
    /// Keep STDIN open
    pub stdin_open: bool,
    /// Network mode or primary network
    pub network_mode: Option<String>,
    /// Aliases on the primary network
    pub network_aliases: Vec<String>,
    /// Restart policy name (no, always, on-failure, unless-stopped)
    pub restart_policy: Option<String>,
    /// Resource limits
    pub resources: ResourceLimits,
    /// Privileged mode
    pub privileged: bool,
}

/// Mount configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Mount type (bind, volume, tmpfs)
    pub mount_type: MountType,
    /// Source path or volume name
    pub source: String,
    /// Target path in container
    pub target: String,
    /// Read-only
    pub read_only: bool,
}

/// Mount type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountType {
    Bind,
    Volume,
    Tmpfs,
}

impl std::fmt::Display for MountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bind => write!(f, "bind"),
            Self::Volume => write!(f, "volume"),
            Self::Tmpfs => write!(f, "tmpfs"),
        }
    }
}

impl From<&str> for MountType {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "volume" => Self::Volume,
            "tmpfs" => Self::Tmpfs,
            _ => Self::Bind,
        }
    }
}

/// Port configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    /// Host port (None for auto-assign)
    pub host_port: Option<u16>,
    /// Container port
    pub container_port: u16,
    /// Protocol (tcp/udp)
    pub protocol: String,
    /// Host IP to bind to
    pub host_ip: Option<String>,
}

/// Basic container info for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    /// Engine's human readable status ("Up 3 hours")
    pub status_text: String,
    pub created: i64,
    pub labels: HashMap<String, String>,
    pub ports: Vec<PortConfig>,
    pub networks: Vec<String>,
}

impl ContainerSummary {
    /// Name of the compose stack this container belongs to
    pub fn compose_project(&self) -> Option<&str> {
        self.labels.get(COMPOSE_PROJECT_LABEL).map(|s| s.as_str())
    }

    /// Compose service this container was created for
    pub fn compose_service(&self) -> Option<&str> {
        self.labels.get(COMPOSE_SERVICE_LABEL).map(|s| s.as_str())
    }
}

/// Detailed container information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerDetails {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub image_id: String,
    pub status: ContainerStatus,
    pub created: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub exit_code: Option<i64>,
    pub labels: HashMap<String, String>,
    pub env: Vec<String>,
    pub cmd: Vec<String>,
    pub mounts: Vec<MountConfig>,
    pub ports: Vec<PortConfig>,
    pub networks: Vec<String>,
    pub restart_policy: Option<String>,
    pub resources: ResourceLimits,
    /// Host path of the engine's json log file
    pub log_path: Option<String>,
}

impl ContainerDetails {
    pub fn compose_project(&self) -> Option<&str> {
        self.labels.get(COMPOSE_PROJECT_LABEL).map(|s| s.as_str())
    }
}

/// Point-in-time resource usage of a container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStats {
    pub cpu_percent: f64,
    pub mem_usage_bytes: u64,
    pub mem_limit_bytes: u64,
    pub net_rx_bytes: u64,
    pub net_tx_bytes: u64,
    pub block_read_bytes: u64,
    pub block_write_bytes: u64,
    /// Unix seconds the engine sampled the counters
    pub read_at: i64,
}

impl ContainerStats {
    pub fn net_io_bytes(&self) -> u64 {
        self.net_rx_bytes.saturating_add(self.net_tx_bytes)
    }

    pub fn block_io_bytes(&self) -> u64 {
        self.block_read_bytes.saturating_add(self.block_write_bytes)
    }
}

/// Network information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
    pub driver: String,
    pub subnet: Option<String>,
    pub gateway: Option<String>,
    pub created: i64,
    pub labels: HashMap<String, String>,
    /// Names of containers attached to the network
    pub containers: Vec<String>,
}

impl NetworkSummary {
    pub fn is_in_use(&self) -> bool {
        !self.containers.is_empty()
    }
}

/// Configuration for creating a network
#[derive(Debug, Clone, Default)]
pub struct CreateNetworkConfig {
    pub name: String,
    pub driver: String,
    pub subnet: Option<String>,
    pub gateway: Option<String>,
    pub ip_range: Option<String>,
    pub labels: HashMap<String, String>,
    pub options: HashMap<String, String>,
}

/// Volume information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeSummary {
    pub name: String,
    pub driver: String,
    pub mountpoint: String,
    pub created: i64,
    pub labels: HashMap<String, String>,
}

/// Configuration for creating a volume
#[derive(Debug, Clone, Default)]
pub struct CreateVolumeConfig {
    pub name: String,
    pub driver: String,
    pub driver_opts: HashMap<String, String>,
    pub labels: HashMap<String, String>,
}

/// Kind of unused resource to reclaim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PruneKind {
    /// Stopped containers
    Containers,
    /// Dangling images
    Images,
    /// Volumes not referenced by any container
    Volumes,
    /// Networks without attached containers
    Networks,
}

impl std::fmt::Display for PruneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Containers => write!(f, "containers"),
            Self::Images => write!(f, "images"),
            Self::Volumes => write!(f, "volumes"),
            Self::Networks => write!(f, "networks"),
        }
    }
}

impl std::str::FromStr for PruneKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "container" | "containers" => Ok(Self::Containers),
            "image" | "images" => Ok(Self::Images),
            "volume" | "volumes" => Ok(Self::Volumes),
            "network" | "networks" => Ok(Self::Networks),
            _ => Err(format!("Unknown prune type: {}", s)),
        }
    }
}

/// What the engine removed during a prune
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneResult {
    pub deleted: Vec<String>,
    pub space_reclaimed: u64,
}

/// Host capacity as reported by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub cpu_count: u64,
    pub memory_bytes: u64,
    pub server_version: String,
}

/// Log configuration
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Follow log output
    pub follow: bool,
    /// Show stdout
    pub stdout: bool,
    /// Show stderr
    pub stderr: bool,
    /// Number of lines from end to show
    pub tail: Option<u64>,
    /// Show timestamps
    pub timestamps: bool,
    /// Show logs since this time (unix timestamp)
    pub since: Option<i64>,
    /// Show logs until this time (unix timestamp)
    pub until: Option<i64>,
}

/// Log stream; dropping it closes the engine tail
pub struct LogStream {
    pub stream: Pin<Box<dyn AsyncRead + Send>>,
}

/// Engine information
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub name: String,
    pub api_version: String,
    pub os: String,
    pub arch: String,
}
