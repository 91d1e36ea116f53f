//! Isolation backend abstraction for lockbox
//!
//! Two platforms, one contract: materialize a root filesystem under a
//! handle, run a command inside it, terminate what's running, and tear the
//! whole thing down. `ChrootBackend` realizes this with a host-native
//! chroot on Linux; `SubsystemBackend` realizes it as one subsystem
//! instance per container on Windows.

#[cfg(target_os = "linux")]
mod chroot;
mod error;
#[cfg(windows)]
mod subsystem;
mod types;

#[cfg(target_os = "linux")]
pub use chroot::ChrootBackend;
pub use error::*;
#[cfg(windows)]
pub use subsystem::SubsystemBackend;
pub use types::*;

use async_trait::async_trait;
use std::path::Path;

/// Uniform contract realized by both the chroot and subsystem backends.
#[async_trait]
pub trait IsolationBackend: Send + Sync {
    /// Materialize the image's root filesystem at `root_dir` under handle
    /// `id`. Idempotent only if the caller first destroys residue from a
    /// prior failed attempt.
    async fn import(&self, id: &str, root_dir: &Path, image_path: &Path) -> Result<()>;

    /// Run a command, returning its exit code. May block until completion.
    async fn exec(&self, id: &str, root_dir: &Path, request: &ExecRequest) -> Result<ExecResult>;

    /// Stop all processes under `id`. Best-effort, idempotent.
    async fn terminate(&self, id: &str) -> Result<()>;

    /// Free the backing filesystem. Must tolerate partial state.
    async fn destroy(&self, id: &str, root_dir: &Path) -> Result<()>;

    fn kind(&self) -> BackendKind;
}

/// Construct the backend appropriate for the host this binary runs on.
pub fn create_backend() -> Box<dyn IsolationBackend> {
    #[cfg(target_os = "linux")]
    {
        Box::new(ChrootBackend::new())
    }
    #[cfg(windows)]
    {
        Box::new(SubsystemBackend::new())
    }
}
