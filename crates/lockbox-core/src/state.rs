//! Container state management
//!
//! Persists one JSON file per container under the install root's `state/`
//! directory, keyed by container ID. Writes are whole-file replacements
//! via temp-file-plus-rename; lookups by name iterate files and skip
//! entries that fail to parse.

use crate::Result;
use chrono::{DateTime, Utc};
use lockbox_config::GlobalConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Container lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Starting,
    Running,
    Restarting,
    Exited,
    Error,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Restarting => write!(f, "restarting"),
            Self::Exited => write!(f, "exited"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Restart policy, as declared on `run` or in a manifest service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    #[default]
    No,
    Always,
    OnFailure,
    UnlessStopped,
}

impl std::str::FromStr for RestartPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "no" => Ok(Self::No),
            "always" => Ok(Self::Always),
            "on-failure" => Ok(Self::OnFailure),
            "unless-stopped" => Ok(Self::UnlessStopped),
            other => Err(format!("unknown restart policy '{other}'")),
        }
    }
}

impl std::fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::No => write!(f, "no"),
            Self::Always => write!(f, "always"),
            Self::OnFailure => write!(f, "on-failure"),
            Self::UnlessStopped => write!(f, "unless-stopped"),
        }
    }
}

/// A `host:container` TCP port mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

impl std::str::FromStr for PortMapping {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (host, container) = s
            .split_once(':')
            .ok_or_else(|| format!("invalid port mapping '{s}', expected HOST:CONTAINER"))?;
        Ok(Self {
            host: host.parse().map_err(|_| format!("invalid host port '{host}'"))?,
            container: container
                .parse()
                .map_err(|_| format!("invalid container port '{container}'"))?,
        })
    }
}

/// A `host_path:container_path` bind mount request, as declared on the CLI
/// or in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMapping {
    pub host_path: String,
    pub container_path: String,
}

impl std::str::FromStr for VolumeMapping {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (host, container) = s
            .split_once(':')
            .ok_or_else(|| format!("invalid volume mapping '{s}', expected HOST:CONTAINER"))?;
        Ok(Self {
            host_path: host.to_string(),
            container_path: container.to_string(),
        })
    }
}

/// A mount actually applied by the supervisor, recorded so it can be
/// unwound on teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMount {
    pub host_path: String,
    pub container_path: String,
}

/// Per-container persisted record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// 12-hex-char unique identifier, generated at create
    pub id: String,
    /// Optional human name, globally unique across records
    pub name: Option<String>,
    /// Tag of the source image
    pub image: String,
    pub status: ContainerStatus,
    pub ports: Vec<PortMapping>,
    pub volumes: Vec<VolumeMapping>,
    pub envs: Vec<String>,
    pub command: String,
    pub workdir: String,
    pub created: DateTime<Utc>,
    /// Absolute host path of the container's root filesystem
    pub root: PathBuf,
    pub restart: RestartPolicy,
    pub restart_count: u32,
    pub labels: HashMap<String, String>,
    pub network: String,
    pub service_enabled: bool,
    pub service_name: Option<String>,
    pub mounts: Vec<AppliedMount>,
    /// Set when an external actor (CLI `stop`) requested the container
    /// stop, as opposed to the command simply exiting. Distinguishes the
    /// two so `unless-stopped` restarts correctly: a record whose status
    /// reached `exited` because the user asked for it must not restart,
    /// but one whose command happened to exit naturally should.
    #[serde(default)]
    pub user_stopped: bool,
}

impl ContainerRecord {
    /// Generate a fresh 12-hex-char container ID
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
    }

    pub fn short_id(&self) -> &str {
        if self.id.len() > 12 {
            &self.id[..12]
        } else {
            &self.id
        }
    }

    /// Identifier a record can be addressed by: ID first, then name
    pub fn matches_ident(&self, ident: &str) -> bool {
        self.id == ident || self.name.as_deref() == Some(ident)
    }
}

/// Flat directory of per-container JSON records under `state/`
#[derive(Debug, Default, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Open the store at the install root's default state directory
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(GlobalConfig::state_dir()?))
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Whole-file replacement via temp-file-plus-rename.
    pub fn save(&self, record: &ContainerRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.record_path(&record.id);
        let tmp_path = self.dir.join(format!("{}.json.tmp", record.id));
        let content = serde_json::to_string_pretty(record)?;
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    pub fn load(&self, id: &str) -> Result<Option<ContainerRecord>> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        let path = self.record_path(id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// All valid records in the store; corrupt entries are skipped.
    pub fn list(&self) -> Result<Vec<ContainerRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<ContainerRecord>(&content) {
                    Ok(record) => records.push(record),
                    Err(e) => tracing::debug!("skipping corrupt state file {:?}: {}", path, e),
                },
                Err(e) => tracing::debug!("skipping unreadable state file {:?}: {}", path, e),
            }
        }
        Ok(records)
    }

    /// Resolve a CLI-provided identifier: ID matches are tried first, then
    /// a unique name match.
    pub fn resolve(&self, ident: &str) -> Result<Option<ContainerRecord>> {
        if let Some(record) = self.load(ident)? {
            return Ok(Some(record));
        }
        let records = self.list()?;
        Ok(records.into_iter().find(|r| r.name.as_deref() == Some(ident)))
    }

    /// Records whose container name begins with `<project>_` and whose
    /// service part is not in `defined_services`.
    pub fn orphans(&self, project: &str, defined_services: &[String]) -> Result<Vec<ContainerRecord>> {
        let prefix = format!("{project}_");
        let defined: std::collections::HashSet<&str> =
            defined_services.iter().map(|s| s.as_str()).collect();
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| {
                r.name
                    .as_deref()
                    .map(|name| {
                        name.strip_prefix(&prefix)
                            .map(|service| !defined.contains(service))
                            .unwrap_or(false)
                    })
                    .unwrap_or(false)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(name: &str, status: ContainerStatus) -> ContainerRecord {
        ContainerRecord {
            id: ContainerRecord::generate_id(),
            name: Some(name.to_string()),
            image: "myapp".to_string(),
            status,
            ports: Vec::new(),
            volumes: Vec::new(),
            envs: Vec::new(),
            command: "/bin/sh".to_string(),
            workdir: "/".to_string(),
            created: Utc::now(),
            root: PathBuf::from("/var/lib/lockbox/containers").join(name),
            restart: RestartPolicy::No,
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
    fn test_generate_id_is_12_hex_chars() {
        let id = ContainerRecord::generate_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_save_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().to_path_buf());
        let record = make_record("roundtrip", ContainerStatus::Running);
        let id = record.id.clone();

        store.save(&record).unwrap();
        let loaded = store.load(&id).unwrap().unwrap();
        assert_eq!(loaded.name.as_deref(), Some("roundtrip"));
        assert_eq!(loaded.status, ContainerStatus::Running);
    }

    #[test]
    fn test_load_missing_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().to_path_buf());
        assert!(store.load("ghost").unwrap().is_none());
    }

    #[test]
    fn test_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().to_path_buf());
        let record = make_record("to-remove", ContainerStatus::Exited);
        let id = record.id.clone();
        store.save(&record).unwrap();
        store.remove(&id).unwrap();
        assert!(store.load(&id).unwrap().is_none());
    }

    #[test]
    fn test_list_skips_corrupt_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().to_path_buf());
        let good = make_record("good", ContainerStatus::Running);
        store.save(&good).unwrap();
        std::fs::write(tmp.path().join("deadbeefdead.json"), "not json {{{").unwrap();

        let records = store.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name.as_deref(), Some("good"));
    }

    #[test]
    fn test_resolve_by_id_then_name() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().to_path_buf());
        let record = make_record("web", ContainerStatus::Running);
        let id = record.id.clone();
        store.save(&record).unwrap();

        assert_eq!(store.resolve(&id).unwrap().unwrap().id, id);
        assert_eq!(store.resolve("web").unwrap().unwrap().id, id);
        assert!(store.resolve("ghost").unwrap().is_none());
    }

    #[test]
    fn test_orphans_detects_undeclared_project_containers() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().to_path_buf());

        let mut web = make_record("myproj_web", ContainerStatus::Running);
        web.name = Some("myproj_web".to_string());
        store.save(&web).unwrap();

        let mut orphan = make_record("myproj_legacy", ContainerStatus::Running);
        orphan.name = Some("myproj_legacy".to_string());
        store.save(&orphan).unwrap();

        let mut other_project = make_record("otherproj_db", ContainerStatus::Running);
        other_project.name = Some("otherproj_db".to_string());
        store.save(&other_project).unwrap();

        let orphans = store.orphans("myproj", &["web".to_string()]).unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].name.as_deref(), Some("myproj_legacy"));
    }

    #[test]
    fn test_matches_ident() {
        let record = make_record("web", ContainerStatus::Running);
        assert!(record.matches_ident(&record.id));
        assert!(record.matches_ident("web"));
        assert!(!record.matches_ident("ghost"));
    }
}
