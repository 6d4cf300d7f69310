//! Global configuration for dockhand
//!
//! Located at `~/.config/dockhand/config.toml`

use crate::{ConfigError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global dockhand configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub engine: EngineConfig,
    pub operations: OperationsConfig,
    pub compose: ComposeConfig,
    pub logs: LogsConfig,
}

/// Container engine endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine API socket path or URL (`unix://`, `http://`, bare path)
    pub socket: String,
    /// Seconds the HTTP client waits on a single engine request
    pub connect_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            socket: default_docker_socket(),
            connect_timeout_secs: 120,
        }
    }
}

#[cfg(windows)]
fn default_docker_socket() -> String {
    "//./pipe/docker_engine".to_string()
}

#[cfg(not(windows))]
fn default_docker_socket() -> String {
    "/var/run/docker.sock".to_string()
}

/// Bounds applied to control-plane operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationsConfig {
    /// Upper bound for any single engine call
    pub call_timeout_secs: u64,
    /// Grace period handed to the engine on stop/restart before it kills
    pub stop_grace_secs: u32,
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 60,
            stop_grace_secs: 10,
        }
    }
}

/// Compose stack storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    /// Directory where compose definitions are persisted, one folder per stack.
    /// Empty disables persistence.
    pub dir: String,
    /// Keep stack-private networks when a stack loses its last member
    pub retain_networks: bool,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            dir: "~/.local/share/dockhand/compose".to_string(),
            retain_networks: false,
        }
    }
}

/// Log streaming sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Frames buffered between a session and its caller
    pub channel_capacity: usize,
    /// How often a following session checks that its container still exists
    pub probe_interval_ms: u64,
    /// Lines replayed when the caller does not ask for a tail
    pub default_tail: Option<u64>,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            probe_interval_ms: 2000,
            default_tail: None,
        }
    }
}

impl GlobalConfig {
    /// Load global configuration from the default path
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load global configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;

        tracing::debug!(
            "Loaded config from {:?}: socket={}, call_timeout={}s",
            path,
            config.engine.socket,
            config.operations.call_timeout_secs
        );

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Reject values that would make every call fail or hang
    pub fn validate(&self) -> Result<()> {
        if self.engine.socket.trim().is_empty() {
            return Err(ConfigError::Invalid("engine.socket must not be empty".into()));
        }
        if self.operations.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "operations.call_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.logs.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "logs.channel_capacity must be greater than zero".into(),
            ));
        }
        if self.logs.probe_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "logs.probe_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.operations.call_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.logs.probe_interval_ms)
    }

    /// Compose definition directory with `~` and env vars expanded
    pub fn compose_dir(&self) -> Option<PathBuf> {
        let raw = self.compose.dir.trim();
        if raw.is_empty() {
            return None;
        }
        match shellexpand::full(raw) {
            Ok(expanded) => Some(PathBuf::from(expanded.as_ref())),
            Err(e) => {
                tracing::warn!("Could not expand compose dir {}: {}", raw, e);
                Some(PathBuf::from(raw))
            }
        }
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "dockhand").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path
    pub fn data_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "dockhand").ok_or(ConfigError::NoDataDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GlobalConfig::default();
        assert_eq!(config.operations.call_timeout_secs, 60);
        assert_eq!(config.operations.stop_grace_secs, 10);
        assert!(!config.compose.retain_networks);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[engine]
socket = "unix:///run/user/1000/docker.sock"

[operations]
call_timeout_secs = 15

[compose]
dir = "/srv/compose"
retain_networks = true

[logs]
default_tail = 200
"#;

        let config: GlobalConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.engine.socket, "unix:///run/user/1000/docker.sock");
        assert_eq!(config.call_timeout(), Duration::from_secs(15));
        assert_eq!(config.compose_dir(), Some(PathBuf::from("/srv/compose")));
        assert!(config.compose.retain_networks);
        assert_eq!(config.logs.default_tail, Some(200));
        // untouched sections keep their defaults
        assert_eq!(config.logs.channel_capacity, 256);
    }

    #[test]
    fn test_empty_compose_dir_disables_persistence() {
        let mut config = GlobalConfig::default();
        config.compose.dir = "  ".to_string();
        assert_eq!(config.compose_dir(), None);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[operations]\ncall_timeout_secs = 0\n").unwrap();

        let err = GlobalConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = GlobalConfig::load_from(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.engine.socket, default_docker_socket());
    }

    #[test]
    fn test_save_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/config.toml");
        let mut config = GlobalConfig::default();
        config.logs.probe_interval_ms = 500;
        config.save_to(&path).unwrap();

        let loaded = GlobalConfig::load_from(&path).unwrap();
        assert_eq!(loaded.probe_interval(), Duration::from_millis(500));
    }
}
