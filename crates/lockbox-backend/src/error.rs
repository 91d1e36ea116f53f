//! Error types for isolation backends

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to import root filesystem for {id}: {reason}")]
    ImportFailed { id: String, reason: String },

    #[error("Exec failed in {id}: {reason}")]
    ExecFailed { id: String, reason: String },

    #[error("Failed to terminate {id}: {reason}")]
    TerminateFailed { id: String, reason: String },

    #[error("Failed to destroy {id}: {reason}")]
    DestroyFailed { id: String, reason: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unsupported on this host: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;
