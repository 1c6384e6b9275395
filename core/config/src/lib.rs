//! Configuration loading for Lagoon.
//!
//! Configuration lives in a single YAML document with an optional
//! `settings` block and a `repositories` list. Everything is validated
//! up front; a configuration that loads is safe to bootstrap from.

pub mod repository;
pub mod settings;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use lagoon_common::{Error, Result};

pub use repository::{validate_abs_path, validate_cron, validate_id, RepositorySpec, TransportKind};
pub use settings::Settings;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "lagoon.yaml";

/// Root of the configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LagoonConfig {
    /// Process-wide settings.
    #[serde(default)]
    pub settings: Settings,
    /// One entry per mirrored repository.
    #[serde(default)]
    pub repositories: Vec<RepositorySpec>,
}

impl LagoonConfig {
    /// Load and validate configuration from a file.
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - YAML does not decode
    /// - Any validation failure (see [`LagoonConfig::validate`])
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading config from {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::Config(format!("no config file found at {}", path.display()))
            }
            _ => Error::Config(format!("unable to read {}: {}", path.display(), e)),
        })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("unable to decode repo configs: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every repository entry and the uniqueness of their ids.
    pub fn validate(&self) -> Result<()> {
        if self.repositories.is_empty() {
            return Err(Error::Config("no repo configs found".to_string()));
        }

        let mut seen = HashSet::new();
        for spec in &self.repositories {
            spec.validate()?;
            if !seen.insert(spec.id.as_str()) {
                return Err(Error::Config(format!(
                    "Repository id must be unique, found duplicate entry for: {}",
                    spec.id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
settings:
  metrics_addr: "127.0.0.1:9100"
repositories:
  - id: dummy-1
    name: Dummy one
    type: simulated
    dest: /var/lib/lagoon
    cron: "*/30 * * * * *"
    snapshots: 3
  - id: centos
    name: CentOS mirror
    type: rsync
    src: rsync://mirror.example.org/centos/
    dest: /var/lib/lagoon
    cron: "0 0 3 * * *"
    exclude:
      - "*.iso"
      - "isos/"
    snapshots: 7
"#;

    #[test]
    fn test_parse_sample() {
        let config = LagoonConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.repositories.len(), 2);
        assert_eq!(config.settings.metrics_addr.port(), 9100);

        let centos = &config.repositories[1];
        assert_eq!(centos.kind, TransportKind::PullMirror);
        assert_eq!(centos.exclude, vec!["*.iso", "isos/"]);
        assert_eq!(centos.snapshots, 7);
    }

    #[test]
    fn test_settings_default_when_absent() {
        let yaml = r#"
repositories:
  - id: r1
    type: simulated
    dest: /srv
    cron: "0 * * * * *"
    snapshots: 1
"#;
        let config = LagoonConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.settings, Settings::default());
    }

    #[test]
    fn test_empty_repositories_rejected() {
        let err = LagoonConfig::from_yaml("repositories: []").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let yaml = r#"
repositories:
  - id: r1
    type: simulated
    dest: /srv
    cron: "0 * * * * *"
    snapshots: 1
  - id: r1
    type: simulated
    dest: /data
    cron: "0 * * * * *"
    snapshots: 1
"#;
        let err = LagoonConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate entry for: r1"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let yaml = r#"
repositories:
  - id: r1
    type: ftp
    dest: /srv
    cron: "0 * * * * *"
    snapshots: 1
"#;
        assert!(LagoonConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = LagoonConfig::load(file.path()).unwrap();
        assert_eq!(config.repositories[0].id, "dummy-1");
    }

    #[test]
    fn test_load_missing_file() {
        let err = LagoonConfig::load("/nonexistent/lagoon.yaml").unwrap_err();
        assert!(err.to_string().contains("no config file found"));
    }
}
