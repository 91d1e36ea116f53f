//! Project manifest (`lockbox-create.yml`) parsing and dependency ordering

use crate::{ConfigError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;

pub const DEFAULT_MANIFEST_NAME: &str = "lockbox-create.yml";

/// A parsed `lockbox-create.yml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub services: IndexMap<String, ServiceSpec>,
}

/// One service entry in the manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSpec {
    pub image: Option<String>,
    pub build: Option<String>,
    pub ports: Vec<String>,
    pub volumes: Vec<String>,
    pub environment: Vec<String>,
    pub restart: String,
    pub labels: HashMap<String, String>,
    pub network: String,
    pub depends_on: Vec<String>,
    #[serde(rename = "auto-update")]
    pub auto_update: AutoUpdateSpec,
}

impl Default for ServiceSpec {
    fn default() -> Self {
        Self {
            image: None,
            build: None,
            ports: Vec::new(),
            volumes: Vec::new(),
            environment: Vec::new(),
            restart: "no".to_string(),
            labels: HashMap::new(),
            network: "bridge".to_string(),
            depends_on: Vec::new(),
            auto_update: AutoUpdateSpec::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoUpdateSpec {
    pub enabled: bool,
    pub url: Option<String>,
}

impl Manifest {
    /// Load and validate a manifest from disk.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::ManifestNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ManifestReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content, path)
    }

    /// Parse manifest YAML, validating structure and dependency graph.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ManifestParseError {
                path: path.to_path_buf(),
                source: e,
            })?;

        if let Some(mapping) = value.get("services") {
            if !mapping.is_mapping() {
                return Err(ConfigError::ServicesNotMapping);
            }
        }

        let manifest: Self =
            serde_yaml::from_value(value).map_err(|e| ConfigError::ManifestParseError {
                path: path.to_path_buf(),
                source: e,
            })?;

        manifest.validate_dependencies()?;
        Ok(manifest)
    }

    fn validate_dependencies(&self) -> Result<()> {
        for (name, svc) in &self.services {
            for dep in &svc.depends_on {
                if !self.services.contains_key(dep) {
                    return Err(ConfigError::UnknownDependency {
                        service: name.clone(),
                        unknown: dep.clone(),
                    });
                }
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Compute a start order honoring `depends_on`, via Kahn's algorithm.
    /// Services with no ordering constraints between them keep their
    /// manifest (insertion) order.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut in_degree: IndexMap<String, usize> = self
            .services
            .keys()
            .map(|name| (name.clone(), 0usize))
            .collect();
        let mut dependents: IndexMap<String, Vec<String>> = self
            .services
            .keys()
            .map(|name| (name.clone(), Vec::new()))
            .collect();

        for (name, svc) in &self.services {
            for dep in &svc.depends_on {
                *in_degree.get_mut(name).unwrap() += 1;
                dependents.get_mut(dep).unwrap().push(name.clone());
            }
        }

        let mut queue: VecDeque<String> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(name, _)| name.clone())
            .collect();

        let mut order = Vec::with_capacity(self.services.len());
        while let Some(name) = queue.pop_front() {
            order.push(name.clone());
            for dependent in &dependents[&name] {
                let deg = in_degree.get_mut(dependent).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(dependent.clone());
                }
            }
        }

        if order.len() != self.services.len() {
            let unresolved: Vec<&str> = in_degree
                .iter()
                .filter(|(name, _)| !order.contains(name))
                .map(|(name, _)| name.as_str())
                .collect();
            return Err(ConfigError::DependencyCycle(unresolved.join(", ")));
        }

        Ok(order)
    }

    /// A container name for a service under a given project name, matching
    /// the `{project}_{service}` convention.
    pub fn container_name(project: &str, service: &str) -> String {
        format!("{project}_{service}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<Manifest> {
        Manifest::parse(yaml, Path::new("lockbox-create.yml"))
    }

    #[test]
    fn test_parse_minimal() {
        let m = parse("services:\n  web:\n    image: myapp\n").unwrap();
        assert_eq!(m.services.len(), 1);
        assert_eq!(m.services["web"].image.as_deref(), Some("myapp"));
        assert_eq!(m.services["web"].restart, "no");
        assert_eq!(m.services["web"].network, "bridge");
    }

    #[test]
    fn test_parse_full_service() {
        let yaml = r#"
services:
  web:
    image: myapp
    ports: ["8080:80"]
    volumes: ["/data:/data"]
    environment: ["FOO=bar"]
    restart: always
    network: lockbox0
    depends_on: [db]
    auto-update:
      enabled: true
      url: https://example.com/img.tar
  db:
    image: mydb
"#;
        let m = parse(yaml).unwrap();
        assert_eq!(m.services["web"].depends_on, vec!["db".to_string()]);
        assert!(m.services["web"].auto_update.enabled);
        assert_eq!(
            m.services["web"].auto_update.url.as_deref(),
            Some("https://example.com/img.tar")
        );
    }

    #[test]
    fn test_topological_order_respects_depends_on() {
        let yaml = "services:\n  web:\n    depends_on: [db]\n  db: {}\n";
        let m = parse(yaml).unwrap();
        let order = m.topological_order().unwrap();
        let web_pos = order.iter().position(|n| n == "web").unwrap();
        let db_pos = order.iter().position(|n| n == "db").unwrap();
        assert!(db_pos < web_pos);
    }

    #[test]
    fn test_topological_order_preserves_manifest_order_for_independent_services() {
        let yaml = "services:\n  c: {}\n  a: {}\n  b: {}\n";
        let m = parse(yaml).unwrap();
        let order = m.topological_order().unwrap();
        assert_eq!(order, vec!["c".to_string(), "a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_cyclic_dependency_rejected() {
        let yaml = "services:\n  a:\n    depends_on: [b]\n  b:\n    depends_on: [a]\n";
        let err = parse(yaml).unwrap_err();
        match err {
            ConfigError::DependencyCycle(names) => {
                assert!(names.contains('a'));
                assert!(names.contains('b'));
            }
            other => panic!("expected DependencyCycle, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let yaml = "services:\n  a:\n    depends_on: [ghost]\n";
        let err = parse(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDependency { .. }));
    }

    #[test]
    fn test_services_not_mapping_rejected() {
        let yaml = "services: [a, b]\n";
        let err = parse(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::ServicesNotMapping));
    }

    #[test]
    fn test_container_name_convention() {
        assert_eq!(Manifest::container_name("myproj", "web"), "myproj_web");
    }
}
