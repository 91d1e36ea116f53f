//! Host-native chroot isolation backend (Linux)

use crate::{BackendError, BackendKind, ExecRequest, ExecResult, IsolationBackend, Result};
use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use tokio::process::Command as TokioCommand;

/// Chroots into a container's root filesystem to run commands.
///
/// Tracks the pid of each container's most recent foreground process so
/// `terminate` can signal it; this backend owns no process tree beyond
/// that, matching the supervisor's "one live command at a time" model.
pub struct ChrootBackend {
    running: Mutex<HashMap<String, u32>>,
}

impl ChrootBackend {
    pub fn new() -> Self {
        Self {
            running: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for ChrootBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IsolationBackend for ChrootBackend {
    async fn import(&self, id: &str, root_dir: &Path, image_path: &Path) -> Result<()> {
        let id = id.to_string();
        let root_dir = root_dir.to_path_buf();
        let image_path = image_path.to_path_buf();

        tokio::task::spawn_blocking(move || extract_archive(&root_dir, &image_path))
            .await
            .map_err(|e| BackendError::ImportFailed {
                id: id.clone(),
                reason: e.to_string(),
            })?
            .map_err(|e| BackendError::ImportFailed {
                id,
                reason: e.to_string(),
            })
    }

    async fn exec(&self, id: &str, root_dir: &Path, request: &ExecRequest) -> Result<ExecResult> {
        let root = root_dir.to_path_buf();
        let shell_command = request.shell_command.clone();
        let working_directory = request
            .working_directory
            .clone()
            .unwrap_or_else(|| "/".to_string());

        let mut cmd = TokioCommand::new("/bin/sh");
        cmd.arg("-c").arg(&shell_command);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(if request.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        // SAFETY: runs before exec in the forked child, single-threaded at
        // that point; chroot+chdir must both succeed or the child aborts.
        unsafe {
            cmd.pre_exec(move || {
                nix::unistd::chroot(&root).map_err(std::io::Error::from)?;
                std::env::set_current_dir(&working_directory)?;
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|e| BackendError::ExecFailed {
            id: id.to_string(),
            reason: e.to_string(),
        })?;

        if let Some(pid) = child.id() {
            self.running.lock().unwrap().insert(id.to_string(), pid);
        }

        if let Some(input) = &request.stdin {
            use tokio::io::AsyncWriteExt;
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(input.as_bytes()).await;
            }
        }

        let output = child.wait_with_output().await.map_err(|e| BackendError::ExecFailed {
            id: id.to_string(),
            reason: e.to_string(),
        })?;

        self.running.lock().unwrap().remove(id);

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        Ok(ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            output: format!("{stdout}{stderr}"),
        })
    }

    async fn terminate(&self, id: &str) -> Result<()> {
        let pid = self.running.lock().unwrap().get(id).copied();
        if let Some(pid) = pid {
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
        Ok(())
    }

    async fn destroy(&self, id: &str, root_dir: &Path) -> Result<()> {
        self.running.lock().unwrap().remove(id);
        if root_dir.exists() {
            tokio::fs::remove_dir_all(root_dir)
                .await
                .map_err(|e| BackendError::DestroyFailed {
                    id: id.to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Chroot
    }
}

fn extract_archive(root_dir: &PathBuf, image_path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(root_dir)?;
    let file = File::open(image_path)?;

    if image_path.extension().and_then(|e| e.to_str()) == Some("gz") {
        let decoder = flate2::read::GzDecoder::new(file);
        tar::Archive::new(decoder).unpack(root_dir)
    } else {
        tar::Archive::new(file).unpack(root_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_kind_is_chroot() {
        let backend = ChrootBackend::new();
        assert_eq!(backend.kind(), BackendKind::Chroot);
    }

    #[tokio::test]
    async fn test_terminate_unknown_id_is_noop() {
        let backend = ChrootBackend::new();
        assert!(backend.terminate("ghost").await.is_ok());
    }

    #[tokio::test]
    async fn test_import_extracts_tar() {
        let tmp = tempfile::tempdir().unwrap();
        let archive_path = tmp.path().join("img.tar");
        {
            let file = File::create(&archive_path).unwrap();
            let mut builder = tar::Builder::new(file);
            let mut header = tar::Header::new_gnu();
            header.set_size(5);
            header.set_cksum();
            builder
                .append_data(&mut header, "hello.txt", &b"world"[..])
                .unwrap();
            builder.finish().unwrap();
        }

        let root_dir = tmp.path().join("root");
        let backend = ChrootBackend::new();
        backend.import("abc123", &root_dir, &archive_path).await.unwrap();

        let content = std::fs::read_to_string(root_dir.join("hello.txt")).unwrap();
        assert_eq!(content, "world");
    }

    #[tokio::test]
    async fn test_destroy_tolerates_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = ChrootBackend::new();
        let missing = tmp.path().join("does-not-exist");
        assert!(backend.destroy("abc123", &missing).await.is_ok());
    }
}
