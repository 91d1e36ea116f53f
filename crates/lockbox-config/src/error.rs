//! Error types for configuration and manifest parsing

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse TOML config at {path}: {source}")]
    TomlParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to write config file at {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to determine config directory")]
    NoConfigDir,

    #[error("Instruction file not found (looked for app.lbox, lbox)")]
    InstructionFileNotFound,

    #[error("Failed to read instruction file {path}: {source}")]
    InstructionReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid instruction at line {line}: {message}")]
    InstructionParseError { line: usize, message: String },

    #[error("Manifest file not found: {0}")]
    ManifestNotFound(PathBuf),

    #[error("Failed to read manifest {path}: {source}")]
    ManifestReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse manifest {path}: {source}")]
    ManifestParseError {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Manifest 'services' must be a mapping")]
    ServicesNotMapping,

    #[error("Cyclic or unresolved depends_on among services: {0}")]
    DependencyCycle(String),

    #[error("Service '{service}' depends on unknown service '{unknown}'")]
    UnknownDependency { service: String, unknown: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
