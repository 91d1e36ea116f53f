//! Common types for isolation backends

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which isolation backend is active on this host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Chroot,
    Subsystem,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chroot => write!(f, "chroot"),
            Self::Subsystem => write!(f, "subsystem"),
        }
    }
}

/// The backend for the host this binary was built for.
pub const NATIVE_BACKEND: BackendKind = {
    #[cfg(target_os = "linux")]
    {
        BackendKind::Chroot
    }
    #[cfg(windows)]
    {
        BackendKind::Subsystem
    }
};

/// Result of running a command through `exec`
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub exit_code: i32,
    pub output: String,
}

/// Parameters for `IsolationBackend::exec`
#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    pub shell_command: String,
    pub stdin: Option<String>,
    pub working_directory: Option<String>,
}

impl ExecRequest {
    pub fn new(shell_command: impl Into<String>) -> Self {
        Self {
            shell_command: shell_command.into(),
            stdin: None,
            working_directory: None,
        }
    }

    pub fn with_working_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }
}

/// Where a container's root filesystem lives, and the handle used to refer
/// to it within the backend (chroot path, or subsystem instance name).
#[derive(Debug, Clone)]
pub struct RootHandle {
    pub id: String,
    pub root_dir: PathBuf,
}
