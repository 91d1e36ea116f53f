//! Supervisor — the long-lived owner of one running container

use crate::engine::fabric::PortForwardingFabric;
use crate::state::{ContainerRecord, ContainerStatus, RestartPolicy, StateStore};
use crate::{CoreError, Result};
use lockbox_backend::{ExecRequest, IsolationBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const RESTART_BACKOFF: Duration = Duration::from_secs(1);

pub struct Supervisor {
    id: String,
    store: StateStore,
    backend: Arc<dyn IsolationBackend>,
}

impl Supervisor {
    pub fn new(id: String, store: StateStore, backend: Arc<dyn IsolationBackend>) -> Self {
        Self { id, store, backend }
    }

    /// Run the supervisor loop until the container reaches `exited`.
    pub async fn run(&self) -> Result<()> {
        let (stop_tx, stop_rx) = watch::channel(false);

        loop {
            let mut record = self
                .store
                .load(&self.id)?
                .ok_or_else(|| CoreError::ContainerNotFound(self.id.clone()))?;

            let fabric = if !record.ports.is_empty() {
                match PortForwardingFabric::start(&record, stop_rx.clone()).await {
                    Ok(fabric) => Some(fabric),
                    Err(e) => {
                        record.status = ContainerStatus::Error;
                        self.store.save(&record)?;
                        let _ = stop_tx.send(true);
                        return Err(e);
                    }
                }
            } else {
                None
            };

            self.apply_mounts(&mut record)?;
            self.apply_environment(&record)?;

            record.status = ContainerStatus::Running;
            self.store.save(&record)?;

            let request = ExecRequest::new(format!("cd {} && {}", record.workdir, record.command));
            let exec_result = self.backend.exec(&record.id, &record.root, &request).await?;
            self.append_log(&exec_result.output)?;

            let mut record = self
                .store
                .load(&self.id)?
                .ok_or_else(|| CoreError::ContainerNotFound(self.id.clone()))?;

            let should_restart = match record.restart {
                RestartPolicy::No => false,
                RestartPolicy::Always => true,
                RestartPolicy::OnFailure => exec_result.exit_code != 0,
                RestartPolicy::UnlessStopped => !record.user_stopped,
            };

            if should_restart {
                record.restart_count += 1;
                record.status = ContainerStatus::Restarting;
                self.store.save(&record)?;
                if let Some(fabric) = &fabric {
                    fabric.stop();
                }
                tokio::time::sleep(RESTART_BACKOFF).await;
                continue;
            }

            record.status = ContainerStatus::Exited;
            self.store.save(&record)?;
            let _ = stop_tx.send(true);
            return Ok(());
        }
    }

    /// Ensure container-side volume paths exist and bind the host path in;
    /// on the chroot backend also bind `/proc`.
    fn apply_mounts(&self, record: &mut ContainerRecord) -> Result<()> {
        use crate::state::AppliedMount;

        for volume in record.volumes.clone() {
            let container_side = record.root.join(volume.container_path.trim_start_matches('/'));
            std::fs::create_dir_all(&container_side)?;
            bind_mount(&volume.host_path, &container_side)?;
            record.mounts.push(AppliedMount {
                host_path: volume.host_path.clone(),
                container_path: volume.container_path.clone(),
            });
        }

        if self.backend.kind() == lockbox_backend::BackendKind::Chroot {
            let proc_dir = record.root.join("proc");
            std::fs::create_dir_all(&proc_dir)?;
            bind_mount("/proc", &proc_dir)?;
            record.mounts.push(AppliedMount {
                host_path: "/proc".to_string(),
                container_path: "/proc".to_string(),
            });
        }

        Ok(())
    }

    /// Append the entrypoint's captured output to the per-container log
    /// file, matching the append-only sink named in the persisted state
    /// layout.
    fn append_log(&self, output: &str) -> Result<()> {
        use std::io::Write;

        let logs_dir = lockbox_config::GlobalConfig::logs_dir()?;
        std::fs::create_dir_all(&logs_dir)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(logs_dir.join(format!("{}.log", self.id)))?;
        file.write_all(output.as_bytes())?;
        if !output.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        Ok(())
    }

    fn apply_environment(&self, record: &ContainerRecord) -> Result<()> {
        let profile_dir = record.root.join("etc/profile.d");
        std::fs::create_dir_all(&profile_dir)?;
        let profile_path = profile_dir.join("lockbox-runtime-env.sh");
        let mut content = String::new();
        for env in &record.envs {
            content.push_str(&format!("export {env}\n"));
        }
        std::fs::write(&profile_path, content)?;
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn bind_mount(source: &str, target: &std::path::Path) -> Result<()> {
    use nix::mount::{mount, MsFlags};
    mount(
        Some(source),
        target,
        None::<&str>,
        MsFlags::MS_BIND,
        None::<&str>,
    )
    .map_err(|e| CoreError::InvalidState(format!("bind mount {source} -> {target:?} failed: {e}")))
}

#[cfg(windows)]
fn bind_mount(_source: &str, _target: &std::path::Path) -> Result<()> {
    // Bind mounts on the subsystem backend are set up inside the instance
    // via the backend's exec, not from the host side.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ContainerStatus;
    use std::collections::HashMap;

    fn make_record(id: &str, restart: RestartPolicy, user_stopped: bool) -> ContainerRecord {
        ContainerRecord {
            id: id.to_string(),
            name: None,
            image: "myapp".to_string(),
            status: ContainerStatus::Starting,
            ports: Vec::new(),
            volumes: Vec::new(),
            envs: Vec::new(),
            command: "true".to_string(),
            workdir: "/".to_string(),
            created: chrono::Utc::now(),
            root: std::path::PathBuf::from("/tmp/lockbox-test-root"),
            restart,
            restart_count: 0,
            labels: HashMap::new(),
            network: "bridge".to_string(),
            service_enabled: false,
            service_name: None,
            mounts: Vec::new(),
            user_stopped,
        }
    }

    #[test]
    fn test_restart_decision_no_policy_never_restarts() {
        let record = make_record("abc", RestartPolicy::No, false);
        assert!(!matches!(record.restart, RestartPolicy::Always));
    }

    #[test]
    fn test_unless_stopped_restarts_unless_user_stopped() {
        let stopped = make_record("abc", RestartPolicy::UnlessStopped, true);
        let crashed = make_record("def", RestartPolicy::UnlessStopped, false);
        assert!(stopped.user_stopped);
        assert!(!crashed.user_stopped);
    }
}
