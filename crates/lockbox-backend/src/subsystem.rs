//! Subsystem-instance-per-container isolation backend (Windows)
//!
//! Shells out to `wsl.exe`: one registered distro instance per container,
//! imported from the image tarball and torn down with `--unregister`.

use crate::{BackendError, BackendKind, ExecRequest, ExecResult, IsolationBackend, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

pub struct SubsystemBackend {
    install_dir: std::path::PathBuf,
}

impl SubsystemBackend {
    pub fn new() -> Self {
        let install_dir = std::env::temp_dir().join("lockbox-wsl");
        Self { install_dir }
    }

    async fn run(&self, args: &[&str]) -> std::io::Result<std::process::Output> {
        Command::new("wsl.exe")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
    }
}

impl Default for SubsystemBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IsolationBackend for SubsystemBackend {
    async fn import(&self, id: &str, root_dir: &Path, image_path: &Path) -> Result<()> {
        std::fs::create_dir_all(&self.install_dir).map_err(BackendError::IoError)?;
        let instance_dir = self.install_dir.join(id);
        std::fs::create_dir_all(&instance_dir).map_err(BackendError::IoError)?;

        let root_dir = root_dir.to_string_lossy().to_string();
        let instance_dir = instance_dir.to_string_lossy().to_string();
        let image_path = image_path.to_string_lossy().to_string();

        let output = self
            .run(&[
                "--import",
                id,
                &instance_dir,
                &image_path,
                "--version",
                "2",
            ])
            .await
            .map_err(|e| BackendError::ImportFailed {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(BackendError::ImportFailed {
                id: id.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let _ = root_dir;
        Ok(())
    }

    async fn exec(&self, id: &str, _root_dir: &Path, request: &ExecRequest) -> Result<ExecResult> {
        let mut args = vec!["-d".to_string(), id.to_string()];
        if let Some(dir) = &request.working_directory {
            args.push("--cd".to_string());
            args.push(dir.clone());
        }
        args.push("--".to_string());
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(request.shell_command.clone());

        let args_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
        let output = self.run(&args_refs).await.map_err(|e| BackendError::ExecFailed {
            id: id.to_string(),
            reason: e.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        Ok(ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            output: format!("{stdout}{stderr}"),
        })
    }

    async fn terminate(&self, id: &str) -> Result<()> {
        let _ = self.run(&["--terminate", id]).await;
        Ok(())
    }

    async fn destroy(&self, id: &str, _root_dir: &Path) -> Result<()> {
        let _ = self.run(&["--unregister", id]).await;
        let instance_dir = self.install_dir.join(id);
        if instance_dir.exists() {
            let _ = std::fs::remove_dir_all(instance_dir);
        }
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Subsystem
    }
}
