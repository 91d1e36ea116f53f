//! Host Service Adapter — registers a supervisor under the host init system

use crate::state::ContainerRecord;
use crate::Result;
use std::path::PathBuf;
use tokio::process::Command;

#[cfg(target_os = "linux")]
const SYSTEMD_UNIT_DIR: &str = "/etc/systemd/system";

/// Attempt to register the container's supervisor with the host init
/// system. Returns `true` on success; registration failure is not fatal —
/// the caller falls back to a plain detached spawn and the record reflects
/// the final mode.
pub async fn register(record: &ContainerRecord, supervisor_entrypoint: &str) -> bool {
    #[cfg(target_os = "linux")]
    {
        register_systemd(record, supervisor_entrypoint).await
    }
    #[cfg(windows)]
    {
        register_windows_service(record, supervisor_entrypoint).await
    }
}

pub async fn deregister(record: &ContainerRecord) {
    #[cfg(target_os = "linux")]
    {
        deregister_systemd(record).await;
    }
    #[cfg(windows)]
    {
        deregister_windows_service(record).await;
    }
}

fn service_name(record: &ContainerRecord) -> String {
    format!("lockbox-{}", record.id)
}

#[cfg(target_os = "linux")]
fn unit_path(record: &ContainerRecord) -> PathBuf {
    PathBuf::from(SYSTEMD_UNIT_DIR).join(format!("{}.service", service_name(record)))
}

#[cfg(target_os = "linux")]
fn unit_contents(record: &ContainerRecord, supervisor_entrypoint: &str) -> String {
    format!(
        "[Unit]\n\
         Description=lockbox supervisor for container {id}\n\
         \n\
         [Service]\n\
         Type=simple\n\
         Restart=always\n\
         RestartSec=2\n\
         ExecStart={entrypoint} {id}\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        id = record.id,
        entrypoint = supervisor_entrypoint,
    )
}

#[cfg(target_os = "linux")]
async fn register_systemd(record: &ContainerRecord, supervisor_entrypoint: &str) -> bool {
    let path = unit_path(record);
    let contents = unit_contents(record, supervisor_entrypoint);

    if let Some(parent) = path.parent() {
        if std::fs::create_dir_all(parent).is_err() {
            return false;
        }
    }
    let tmp_path = path.with_extension("service.tmp");
    if std::fs::write(&tmp_path, contents).is_err() {
        return false;
    }
    if std::fs::rename(&tmp_path, &path).is_err() {
        return false;
    }

    let name = service_name(record);
    run_systemctl(&["daemon-reload"]).await
        && run_systemctl(&["enable", &name]).await
        && run_systemctl(&["start", &name]).await
}

#[cfg(target_os = "linux")]
async fn deregister_systemd(record: &ContainerRecord) {
    let name = service_name(record);
    let _ = run_systemctl(&["stop", &name]).await;
    let _ = run_systemctl(&["disable", &name]).await;
    let _ = std::fs::remove_file(unit_path(record));
    let _ = run_systemctl(&["daemon-reload"]).await;
}

#[cfg(target_os = "linux")]
async fn run_systemctl(args: &[&str]) -> bool {
    Command::new("systemctl")
        .args(args)
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Start the registered service rather than controlling the process
/// directly; only applies when `service_enabled` is set on the record.
pub async fn start_via_init(record: &ContainerRecord) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        run_systemctl(&["start", &service_name(record)]).await;
    }
    #[cfg(windows)]
    {
        let _ = Command::new("sc.exe")
            .args(["start", &service_name(record)])
            .status()
            .await;
    }
    Ok(())
}

pub async fn stop_via_init(record: &ContainerRecord) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        run_systemctl(&["stop", &service_name(record)]).await;
    }
    #[cfg(windows)]
    {
        let _ = Command::new("sc.exe")
            .args(["stop", &service_name(record)])
            .status()
            .await;
    }
    Ok(())
}

#[cfg(windows)]
async fn register_windows_service(record: &ContainerRecord, supervisor_entrypoint: &str) -> bool {
    let name = service_name(record);
    let bin_path = format!("{supervisor_entrypoint} {}", record.id);
    let create = Command::new("sc.exe")
        .args(["create", &name, "binPath=", &bin_path, "start=", "auto"])
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false);

    create
        && Command::new("sc.exe")
            .args(["start", &name])
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
}

#[cfg(windows)]
async fn deregister_windows_service(record: &ContainerRecord) {
    let name = service_name(record);
    let _ = Command::new("sc.exe").args(["stop", &name]).status().await;
    let _ = Command::new("sc.exe").args(["delete", &name]).status().await;
}

#[cfg(test)]
#[cfg(target_os = "linux")]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn make_record() -> ContainerRecord {
        ContainerRecord {
            id: "abcdef123456".to_string(),
            name: Some("web".to_string()),
            image: "myapp".to_string(),
            status: crate::state::ContainerStatus::Running,
            ports: Vec::new(),
            volumes: Vec::new(),
            envs: Vec::new(),
            command: "/bin/sh".to_string(),
            workdir: "/".to_string(),
            created: Utc::now(),
            root: PathBuf::from("/var/lib/lockbox/containers/abcdef123456"),
            restart: crate::state::RestartPolicy::Always,
            restart_count: 0,
            labels: HashMap::new(),
            network: "bridge".to_string(),
            service_enabled: false,
            service_name: None,
            mounts: Vec::new(),
            user_stopped: false,
        }
    }

    #[test]
    fn test_unit_contents_has_expected_directives() {
        let record = make_record();
        let contents = unit_contents(&record, "/usr/bin/lockbox internal-daemon");
        assert!(contents.contains("Type=simple"));
        assert!(contents.contains("Restart=always"));
        assert!(contents.contains("RestartSec=2"));
        assert!(contents.contains("ExecStart=/usr/bin/lockbox internal-daemon abcdef123456"));
        assert!(contents.contains("WantedBy=multi-user.target"));
    }

    #[test]
    fn test_service_name_is_prefixed() {
        let record = make_record();
        assert_eq!(service_name(&record), "lockbox-abcdef123456");
    }
}
