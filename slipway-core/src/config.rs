//! Orchestration configuration
//!
//! The orchestration document names the repositories to process, the
//! auxiliary script repositories to clone, and the global defaults that
//! templates inherit when they leave `schedule` or `webhook` unset.

use serde::Deserialize;
use std::path::Path;

use crate::error::{BuildError, Result};
use crate::template::GlobalDefaults;

/// Top-level orchestration document
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestrationConfig {
    /// GitHub organization to scan when `scan_organization` is set
    pub organization: Option<String>,

    /// Discover repositories from the organization listing instead of the
    /// static `repositories` list
    #[serde(default)]
    pub scan_organization: bool,

    /// Auxiliary script repositories cloned once at startup
    #[serde(default)]
    pub script_repositories: Vec<ScriptRepoSpec>,

    /// Statically configured repositories
    #[serde(default)]
    pub repositories: Vec<RepoSpec>,

    /// Default build schedule applied to templates without one
    #[serde(default = "default_schedule")]
    pub default_schedule: String,

    /// Default webhook setting applied to templates without one
    #[serde(default = "default_webhook")]
    pub default_webhook: bool,
}

fn default_schedule() -> String {
    "0 * * * *".to_string()
}

fn default_webhook() -> bool {
    true
}

/// An auxiliary repository holding shared build scripts
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptRepoSpec {
    pub name: String,
    pub url: String,
}

/// A repository to build and publish
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RepoSpec {
    /// Repository name, also the publish identity
    pub name: String,
    /// Clone URL
    pub url: String,
    /// Branch or tag to clone, default branch when absent
    pub commit: Option<String>,
    /// Template reference relative to the config directory
    pub template: Option<String>,
}

impl OrchestrationConfig {
    /// Loads the orchestration document from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BuildError::ConfigNotFound(path.to_path_buf()),
            _ => BuildError::Io(e),
        })?;
        serde_yaml::from_str(&raw).map_err(|e| BuildError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.scan_organization
            && self
                .organization
                .as_deref()
                .is_none_or(|org| org.is_empty())
        {
            return Err(BuildError::InvalidConfig(
                "organization is required when scan_organization is set".to_string(),
            ));
        }

        for repo in &self.script_repositories {
            if repo.name.is_empty() || repo.url.is_empty() {
                return Err(BuildError::InvalidConfig(format!(
                    "script repository entries need a name and a url, got name='{}' url='{}'",
                    repo.name, repo.url
                )));
            }
        }

        for repo in &self.repositories {
            if repo.name.is_empty() || repo.url.is_empty() {
                return Err(BuildError::InvalidConfig(format!(
                    "repository entries need a name and a url, got name='{}' url='{}'",
                    repo.name, repo.url
                )));
            }
        }

        Ok(())
    }

    /// Global defaults handed to template resolution
    pub fn defaults(&self) -> GlobalDefaults {
        GlobalDefaults {
            schedule: self.default_schedule.clone(),
            webhook: self.default_webhook,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> OrchestrationConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_full_document_parses() {
        let config = parse(
            r#"
organization: example-org
scan_organization: false
script_repositories:
  - name: build-scripts
    url: https://example.com/build-scripts.git
repositories:
  - name: app-one
    url: https://example.com/app-one.git
    commit: main
    template: templates/app.yaml
  - name: app-two
    url: https://example.com/app-two.git
default_schedule: "30 2 * * *"
default_webhook: false
"#,
        );

        assert_eq!(config.organization.as_deref(), Some("example-org"));
        assert_eq!(config.repositories.len(), 2);
        assert_eq!(config.repositories[0].commit.as_deref(), Some("main"));
        assert_eq!(config.repositories[1].commit, None);
        assert_eq!(config.repositories[1].template, None);
        assert_eq!(config.default_schedule, "30 2 * * *");
        assert!(!config.default_webhook);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_applied_when_absent() {
        let config = parse("repositories: []\n");
        assert_eq!(config.default_schedule, "0 * * * *");
        assert!(config.default_webhook);
        assert!(!config.scan_organization);
        assert!(config.script_repositories.is_empty());
    }

    #[test]
    fn test_scan_without_organization_is_invalid() {
        let config = parse("scan_organization: true\n");
        assert!(matches!(
            config.validate(),
            Err(BuildError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = OrchestrationConfig::load(&dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(BuildError::ConfigNotFound(_))));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "repositories: [unclosed").unwrap();
        assert!(matches!(
            OrchestrationConfig::load(&path),
            Err(BuildError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_empty_script_repo_url_is_invalid() {
        let config = parse(
            r#"
script_repositories:
  - name: build-scripts
    url: ""
"#,
        );
        assert!(matches!(
            config.validate(),
            Err(BuildError::InvalidConfig(_))
        ));
    }
}
