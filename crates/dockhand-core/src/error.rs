//! Error types for dockhand-core

use crate::OperationKind;
use dockhand_engine::{ContainerStatus, EngineError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification every caller can switch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidParams,
    NotFound,
    Conflict,
    EngineError,
    Timeout,
    StreamClosed,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidParams => write!(f, "invalid_params"),
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::EngineError => write!(f, "engine_error"),
            Self::Timeout => write!(f, "timeout"),
            Self::StreamClosed => write!(f, "stream_closed"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] dockhand_config::ConfigError),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Cannot {requested} container {name} while it is {current}")]
    InvalidState {
        name: String,
        current: ContainerStatus,
        requested: OperationKind,
    },

    #[error("Invalid compose definition: {0}")]
    ComposeParse(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Stream closed: {0}")]
    StreamClosed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::InvalidParams(_) | Self::ComposeParse(_) => {
                ErrorKind::InvalidParams
            }
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) | Self::InvalidState { .. } => ErrorKind::Conflict,
            Self::Engine(_) | Self::Io(_) => ErrorKind::EngineError,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::StreamClosed(_) => ErrorKind::StreamClosed,
        }
    }
}

impl From<EngineError> for CoreError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound(msg) => CoreError::NotFound(msg),
            EngineError::Conflict(msg) => CoreError::Conflict(msg),
            EngineError::BadRequest(msg) => CoreError::InvalidParams(msg),
            EngineError::Timeout => CoreError::Timeout("engine request".to_string()),
            other => CoreError::Engine(other.to_string()),
        }
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(e: serde_yaml::Error) -> Self {
        CoreError::ComposeParse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_keep_message() {
        let err = CoreError::from(EngineError::RuntimeError("disk full".into()));
        assert_eq!(err.kind(), ErrorKind::EngineError);
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_engine_status_errors_map_to_kinds() {
        assert_eq!(
            CoreError::from(EngineError::NotFound("web".into())).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CoreError::from(EngineError::Conflict("in use".into())).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(CoreError::from(EngineError::Timeout).kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_invalid_state_is_conflict() {
        let err = CoreError::InvalidState {
            name: "web".into(),
            current: ContainerStatus::Exited,
            requested: OperationKind::Pause,
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "Cannot pause container web while it is exited");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::InvalidParams.to_string(), "invalid_params");
        assert_eq!(
            serde_json::to_string(&ErrorKind::StreamClosed).unwrap(),
            "\"stream_closed\""
        );
    }
}
