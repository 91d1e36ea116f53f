//! Compose Orchestrator — dependency-ordered project startup/teardown

use crate::engine::build::{resolve_image_archive, ImageBuilder};
use crate::state::{ContainerRecord, ContainerStatus, PortMapping, RestartPolicy, StateStore, VolumeMapping};
use crate::{CoreError, Result};
use lockbox_backend::IsolationBackend;
use lockbox_config::{GlobalConfig, Manifest};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const IP_POLL_ITERATIONS: u32 = 10;
const IP_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub enum RecreatePolicy {
    ForceRecreate,
    NoRecreate,
    Default,
}

pub struct UpOptions {
    pub build: bool,
    pub recreate: RecreatePolicy,
    pub remove_orphans: bool,
}

impl Default for UpOptions {
    fn default() -> Self {
        Self {
            build: true,
            recreate: RecreatePolicy::Default,
            remove_orphans: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveImages {
    None,
    Local,
    All,
}

pub struct ComposeOrchestrator {
    store: StateStore,
    backend: Arc<dyn IsolationBackend>,
}

impl ComposeOrchestrator {
    pub fn new(store: StateStore, backend: Arc<dyn IsolationBackend>) -> Self {
        Self { store, backend }
    }

    /// Derive the project name from a directory: lowercased, spaces
    /// stripped.
    pub fn project_name(dir: &Path) -> String {
        dir.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("project")
            .to_lowercase()
            .replace(' ', "")
    }

    pub async fn up(&self, manifest_path: &Path, project: &str, options: &UpOptions) -> Result<bool> {
        let manifest = Manifest::load(manifest_path)?;
        let service_names: Vec<String> = manifest.services.keys().cloned().collect();

        if options.remove_orphans {
            self.remove_orphans(project, &service_names)?;
        }

        let order = manifest.topological_order()?;
        let mut needs_monitor = false;

        for name in &order {
            let svc = &manifest.services[name];
            let container_name = Manifest::container_name(project, name);
            let image_tag = svc.image.clone().unwrap_or_else(|| container_name.clone());

            if let (Some(build_ctx), true) = (&svc.build, options.build) {
                let builder = ImageBuilder::new(self.backend.clone());
                if let Err(e) = builder.build(&image_tag, &PathBuf::from(build_ctx)).await {
                    tracing::error!("build failed for service {name}: {e}");
                    continue;
                }
            }

            if !image_exists(&image_tag)? {
                tracing::error!("image not found for service {name}, skipping");
                continue;
            }

            let existing = self.store.resolve(&container_name)?;
            if let Some(existing) = existing {
                match options.recreate {
                    RecreatePolicy::ForceRecreate => {
                        self.backend.terminate(&existing.id).await?;
                        self.backend.destroy(&existing.id, &existing.root).await?;
                        self.store.remove(&existing.id)?;
                    }
                    RecreatePolicy::NoRecreate => {
                        tracing::info!("{container_name} already running (no-recreate)");
                        continue;
                    }
                    RecreatePolicy::Default => {
                        tracing::info!("{container_name} already running");
                        continue;
                    }
                }
            }

            let record = self.create_record(
                &container_name,
                &image_tag,
                svc.ports.iter().filter_map(|p| PortMapping::from_str(p).ok()).collect(),
                svc.volumes
                    .iter()
                    .filter_map(|v| VolumeMapping::from_str(v).ok())
                    .collect(),
                svc.environment.clone(),
                RestartPolicy::from_str(&svc.restart).unwrap_or(RestartPolicy::No),
                svc.labels.clone(),
                svc.network.clone(),
            )?;

            let image_tar_path = match resolve_image_archive(&image_tag) {
                Ok(path) => path,
                Err(e) => {
                    tracing::error!("image archive missing for service {name}: {e}");
                    continue;
                }
            };
            if let Err(e) = self.backend.import(&record.id, &record.root, &image_tar_path).await {
                tracing::error!("failed to import image for service {name}: {e}");
                continue;
            }

            self.store.save(&record)?;
            tracing::info!("started {container_name}");

            if let Err(e) = crate::spawn_daemon(&["internal-daemon", &record.id]) {
                tracing::error!("failed to start supervisor for {container_name}: {e}");
            }

            if svc.auto_update.enabled {
                needs_monitor = true;
            }
        }

        self.inject_dns(project, &manifest).await?;

        Ok(needs_monitor)
    }

    pub async fn down(&self, manifest_path: &Path, project: &str, rmi: RemoveImages, remove_orphans: bool) -> Result<()> {
        if !manifest_path.exists() {
            return Ok(());
        }
        let manifest = Manifest::load(manifest_path)?;

        for name in manifest.services.keys() {
            let container_name = Manifest::container_name(project, name);
            if let Some(record) = self.store.resolve(&container_name)? {
                self.backend.terminate(&record.id).await?;
                self.backend.destroy(&record.id, &record.root).await?;
                self.store.remove(&record.id)?;
            }
        }

        if remove_orphans {
            let service_names: Vec<String> = manifest.services.keys().cloned().collect();
            self.remove_orphans(project, &service_names)?;
        }

        if rmi != RemoveImages::None {
            let images_dir = GlobalConfig::images_dir()?;
            for (name, svc) in &manifest.services {
                if rmi == RemoveImages::Local && svc.build.is_none() {
                    continue;
                }
                let image_tag = svc
                    .image
                    .clone()
                    .unwrap_or_else(|| Manifest::container_name(project, name));
                let _ = std::fs::remove_file(images_dir.join(format!("{image_tag}.tar")));
                let _ = std::fs::remove_file(images_dir.join(format!("{image_tag}.json")));
            }
        }

        Ok(())
    }

    fn remove_orphans(&self, project: &str, defined_services: &[String]) -> Result<()> {
        for record in self.store.orphans(project, defined_services)? {
            tracing::info!("removing orphan container {}", record.name.as_deref().unwrap_or(&record.id));
            self.store.remove(&record.id)?;
        }
        Ok(())
    }

    async fn inject_dns(&self, project: &str, manifest: &Manifest) -> Result<()> {
        let mut hosts_map = std::collections::HashMap::new();

        for _ in 0..IP_POLL_ITERATIONS {
            let mut all_found = true;
            for name in manifest.services.keys() {
                let container_name = Manifest::container_name(project, name);
                if hosts_map.contains_key(name) {
                    continue;
                }
                if let Some(record) = self.store.resolve(&container_name)? {
                    if let Some(ip) = container_ip(self.backend.as_ref(), &record).await {
                        hosts_map.insert(name.clone(), ip.clone());
                        hosts_map.insert(container_name.clone(), ip);
                        continue;
                    }
                }
                all_found = false;
            }
            if all_found {
                break;
            }
            tokio::time::sleep(IP_POLL_INTERVAL).await;
        }

        for name in manifest.services.keys() {
            let container_name = Manifest::container_name(project, name);
            if let Some(record) = self.store.resolve(&container_name)? {
                append_hosts_entries(&record.root, &hosts_map)?;
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn create_record(
        &self,
        name: &str,
        image: &str,
        ports: Vec<PortMapping>,
        volumes: Vec<VolumeMapping>,
        envs: Vec<String>,
        restart: RestartPolicy,
        labels: std::collections::HashMap<String, String>,
        network: String,
    ) -> Result<ContainerRecord> {
        let id = ContainerRecord::generate_id();
        let root = GlobalConfig::containers_dir()?.join(&id);
        let (command, workdir) = image_defaults(image)?;

        Ok(ContainerRecord {
            id,
            name: Some(name.to_string()),
            image: image.to_string(),
            status: ContainerStatus::Starting,
            ports,
            volumes,
            envs,
            command,
            workdir,
            created: chrono::Utc::now(),
            root,
            restart,
            restart_count: 0,
            labels,
            network,
            service_enabled: false,
            service_name: None,
            mounts: Vec::new(),
            user_stopped: false,
        })
    }
}

fn image_exists(tag: &str) -> Result<bool> {
    let images_dir = GlobalConfig::images_dir()?;
    Ok(images_dir.join(format!("{tag}.tar")).exists() || images_dir.join(format!("{tag}.tar.gz")).exists())
}

fn image_defaults(tag: &str) -> Result<(String, String)> {
    let images_dir = GlobalConfig::images_dir()?;
    let metadata_path = images_dir.join(format!("{tag}.json"));
    if !metadata_path.exists() {
        return Ok(("/bin/sh".to_string(), "/".to_string()));
    }
    let content = std::fs::read_to_string(metadata_path)?;
    let metadata: crate::engine::build::ImageMetadata = serde_json::from_str(&content)?;
    Ok((
        metadata.entrypoint_command.unwrap_or_else(|| "/bin/sh".to_string()),
        metadata.working_directory,
    ))
}

async fn container_ip(backend: &dyn IsolationBackend, record: &ContainerRecord) -> Option<String> {
    let request = lockbox_backend::ExecRequest::new("hostname -i".to_string());
    let result = backend.exec(&record.id, &record.root, &request).await.ok()?;
    let ip = result.output.split_whitespace().next()?.to_string();
    if ip.is_empty() || ip == "127.0.0.1" {
        None
    } else {
        Some(ip)
    }
}

fn append_hosts_entries(root: &Path, hosts_map: &std::collections::HashMap<String, String>) -> Result<()> {
    let hosts_path = root.join("etc/hosts");
    let mut content = std::fs::read_to_string(&hosts_path).unwrap_or_default();
    for (name, ip) in hosts_map {
        content.push_str(&format!("{ip}\t{name}\n"));
    }
    if let Some(parent) = hosts_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(hosts_path, content).map_err(CoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_name_lowercases_and_strips_spaces() {
        let dir = PathBuf::from("/home/user/My Cool Project");
        assert_eq!(ComposeOrchestrator::project_name(&dir), "mycoolproject");
    }

    #[test]
    fn test_append_hosts_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("etc")).unwrap();
        std::fs::write(root.join("etc/hosts"), "127.0.0.1\tlocalhost\n").unwrap();

        let mut hosts_map = std::collections::HashMap::new();
        hosts_map.insert("web".to_string(), "172.20.0.2".to_string());
        append_hosts_entries(root, &hosts_map).unwrap();

        let content = std::fs::read_to_string(root.join("etc/hosts")).unwrap();
        assert!(content.contains("127.0.0.1\tlocalhost"));
        assert!(content.contains("172.20.0.2\tweb"));
    }
}
