//! Error types for the container engine adapter

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to connect to container engine: {0}")]
    ConnectionError(String),

    #[error("No such resource: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Engine rejected request: {0}")]
    BadRequest(String),

    #[error("Container engine error: {0}")]
    RuntimeError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Timeout waiting for engine")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<bollard::errors::Error> for EngineError {
    fn from(e: bollard::errors::Error) -> Self {
        use bollard::errors::Error as BollardError;

        match e {
            BollardError::DockerResponseServerError {
                status_code,
                message,
            } => match status_code {
                400 => EngineError::BadRequest(message),
                404 => EngineError::NotFound(message),
                409 => EngineError::Conflict(message),
                _ => EngineError::RuntimeError(format!("{} (HTTP {})", message, status_code)),
            },
            BollardError::RequestTimeoutError => EngineError::Timeout,
            BollardError::IOError { err } => EngineError::IoError(err),
            other => EngineError::RuntimeError(other.to_string()),
        }
    }
}

impl EngineError {
    /// HTTP 304 from the engine: the resource is already in the requested state
    pub(crate) fn is_not_modified(e: &bollard::errors::Error) -> bool {
        matches!(
            e,
            bollard::errors::Error::DockerResponseServerError {
                status_code: 304,
                ..
            }
        )
    }
}
