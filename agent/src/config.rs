//! Agent configuration: the set of drivers to host.
//!
//! Loaded once at startup from JSON. A missing or corrupt file yields an
//! empty configuration so the agent still starts and answers `health.check`.

use std::path::{Path, PathBuf};

use fsrelay_core::DriverConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Environment variable overriding the config path.
pub const CONFIG_ENV: &str = "FSRELAY_CONFIG";

fn default_name() -> String {
    "fsrelay-agent".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub drivers: Vec<DriverConfig>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            drivers: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Load from `path`, or from [`AgentConfig::default_path`] when `None`.
    pub fn load(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::load_from(&Self::default_path()),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<AgentConfig>(&contents) {
                Ok(config) => {
                    debug!(
                        "Loaded agent config with {} drivers from {}",
                        config.drivers.len(),
                        path.display()
                    );
                    config.without_duplicates()
                }
                Err(e) => {
                    warn!("Failed to parse agent config from {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                debug!("No agent config file at {}", path.display());
                Self::default()
            }
        }
    }

    /// `$FSRELAY_CONFIG`, else `config.json` in the platform config dir.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        config_dir().join("config.json")
    }

    /// Keep the first driver of each name.
    fn without_duplicates(mut self) -> Self {
        let mut seen = std::collections::HashSet::new();
        self.drivers.retain(|d| {
            let first = seen.insert(d.name.clone());
            if !first {
                warn!("Ignoring duplicate driver '{}'", d.name);
            }
            first
        });
        self
    }
}

/// Get the platform config directory for the agent.
fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("fsrelay-agent");
    }
    if let Ok(home) = std::env::var("HOME") {
        #[cfg(target_os = "macos")]
        return PathBuf::from(&home)
            .join("Library")
            .join("Application Support")
            .join("fsrelay-agent");
        #[cfg(not(target_os = "macos"))]
        return PathBuf::from(&home).join(".config").join("fsrelay-agent");
    }
    PathBuf::from(".config").join("fsrelay-agent")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsrelay_core::Permission;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn load_missing_file_returns_default() {
        let dir = TempDir::new().unwrap();
        let config = AgentConfig::load_from(&dir.path().join("nope.json"));
        assert_eq!(config.name, "fsrelay-agent");
        assert!(config.drivers.is_empty());
    }

    #[test]
    fn load_corrupt_file_returns_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(AgentConfig::load_from(&path).drivers.is_empty());
    }

    #[test]
    fn load_reads_drivers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let contents = json!({
            "name": "edge-1",
            "drivers": [
                {"name": "docs", "path": "/srv/docs", "permissions": "read"},
                {"name": "uploads", "path": "/srv/uploads"}
            ]
        });
        std::fs::write(&path, contents.to_string()).unwrap();

        let config = AgentConfig::load(Some(&path));
        assert_eq!(config.name, "edge-1");
        assert_eq!(config.drivers.len(), 2);
        assert_eq!(config.drivers[0].permissions, Permission::Read);
        assert_eq!(config.drivers[1].permissions, Permission::ReadWrite);
    }

    #[test]
    fn duplicate_driver_names_keep_first() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let contents = json!({
            "drivers": [
                {"name": "docs", "path": "/a"},
                {"name": "docs", "path": "/b"}
            ]
        });
        std::fs::write(&path, contents.to_string()).unwrap();

        let config = AgentConfig::load_from(&path);
        assert_eq!(config.drivers.len(), 1);
        assert_eq!(config.drivers[0].path, PathBuf::from("/a"));
    }
}
