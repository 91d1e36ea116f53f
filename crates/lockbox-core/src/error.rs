//! Error types for lockbox-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] lockbox_config::ConfigError),

    #[error("Backend error: {0}")]
    Backend(#[from] lockbox_backend::BackendError),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Container name already in use: {0}")]
    NameInUse(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Host port already in use: {0}")]
    PortInUse(u16),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("State file corrupted: {0}")]
    StateCorrupted(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
