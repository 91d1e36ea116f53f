//! Install-root configuration for lockbox
//!
//! The install root holds `images/`, `containers/`, `state/`, and `logs/`.
//! It defaults to the platform data directory and can be overridden with
//! the `LOCKBOX_HOME` environment variable. An optional `config.toml` at
//! the root of the install root carries default settings for new
//! containers; a missing or unparsable file silently falls back to
//! defaults, matching this codebase's usual config-loading resilience.

use crate::{ConfigError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global lockbox configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub defaults: DefaultsConfig,
}

/// Default settings applied to new containers when not overridden
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Default restart policy: "no" | "always" | "on-failure" | "unless-stopped"
    pub restart: String,
    /// Default logical network name
    pub network: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            restart: "no".to_string(),
            network: "bridge".to_string(),
        }
    }
}

impl GlobalConfig {
    /// Load global configuration from the default path, falling back to
    /// defaults if the file is missing or fails to parse.
    pub fn load() -> Self {
        match Self::config_path() {
            Ok(path) => Self::load_from(&path).unwrap_or_else(|e| {
                tracing::debug!("Using default config: {}", e);
                Self::default()
            }),
            Err(e) => {
                tracing::debug!("Using default config: {}", e);
                Self::default()
            }
        }
    }

    /// Load global configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            path: path.clone(),
            source: e,
        })?;

        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.clone(),
                source: e,
            })?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.clone(),
            source: e,
        })
    }

    /// The install root: `$LOCKBOX_HOME` if set, otherwise the platform
    /// data directory for "lockbox".
    pub fn install_root() -> Result<PathBuf> {
        if let Ok(home) = std::env::var("LOCKBOX_HOME") {
            return Ok(PathBuf::from(home));
        }
        let dirs = ProjectDirs::from("", "", "lockbox").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Path to the install root's config file
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::install_root()?.join("config.toml"))
    }

    pub fn images_dir() -> Result<PathBuf> {
        Ok(Self::install_root()?.join("images"))
    }

    pub fn containers_dir() -> Result<PathBuf> {
        Ok(Self::install_root()?.join("containers"))
    }

    pub fn state_dir() -> Result<PathBuf> {
        Ok(Self::install_root()?.join("state"))
    }

    pub fn logs_dir() -> Result<PathBuf> {
        Ok(Self::install_root()?.join("logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GlobalConfig::default();
        assert_eq!(config.defaults.restart, "no");
        assert_eq!(config.defaults.network, "bridge");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[defaults]
restart = "always"
network = "lockbox0"
"#;
        let config: GlobalConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.defaults.restart, "always");
        assert_eq!(config.defaults.network, "lockbox0");
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        let config = GlobalConfig::load_from(&path).unwrap();
        assert_eq!(config.defaults.restart, "no");
    }

    #[test]
    fn test_save_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        let mut config = GlobalConfig::default();
        config.defaults.restart = "on-failure".to_string();
        config.save_to(&path).unwrap();

        let loaded = GlobalConfig::load_from(&path).unwrap();
        assert_eq!(loaded.defaults.restart, "on-failure");
    }

    #[test]
    fn test_install_root_env_override() {
        std::env::set_var("LOCKBOX_HOME", "/tmp/lockbox-test-home");
        let root = GlobalConfig::install_root().unwrap();
        assert_eq!(root, PathBuf::from("/tmp/lockbox-test-home"));
        std::env::remove_var("LOCKBOX_HOME");
    }
}
