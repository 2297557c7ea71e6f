//! Build templates and per-repository overrides
//!
//! A template names the artifacts a repository produces. Repositories
//! inherit a template by reference and may carry a `.build-template.yaml`
//! override file in their working copy that re-targets the template and
//! patches individual artifact fields.
//!
//! Resolution never mutates a loaded template in place: every resolve
//! produces a fresh artifact list, so one template file can back any
//! number of repositories.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{BuildError, Result};

/// Template reference used when a repository declares none
pub const DEFAULT_TEMPLATE: &str = "templates/script-project.yaml";

/// Override file probed at the working-copy root
pub const REPO_OVERRIDE_FILE: &str = ".build-template.yaml";

const REPO_NAME_TOKEN: &str = "{{repo_name}}";
const GLOBAL_SCHEDULE_TOKEN: &str = "{{global_schedule}}";

/// One buildable and publishable unit
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArtifactSpec {
    /// Artifact kind, matched against builder keys and override entries
    #[serde(rename = "type")]
    pub artifact_type: String,
    /// Toolchain language for `binary` artifacts
    pub language: Option<String>,
    /// Version used in release tags and file names, may be filled from
    /// tag metadata when absent
    pub version: Option<String>,
    /// Image the build runs in, builder default when absent
    pub docker_image: Option<String>,
    /// Script descriptor, forces dispatch to the script builder
    pub build_script: Option<BuildScriptSpec>,
    /// Target registry for container publishing
    pub registry: Option<String>,
    /// Image name, supports the `{{repo_name}}` token
    pub image_name: Option<String>,
}

/// Descriptor of an externally supplied build script
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BuildScriptSpec {
    /// Auxiliary script repository the script sources helpers from
    pub repo_name: Option<String>,
    /// Script path inside the working copy, required at build time
    pub path: Option<String>,
    /// Extra arguments appended to the script invocation
    pub args: Option<String>,
    /// Pass outer container access and credentials into the build
    #[serde(default)]
    pub docker_required: bool,
    /// Image the script runs in
    pub docker_image: Option<String>,
}

/// Global defaults inherited by templates without own values
#[derive(Debug, Clone)]
pub struct GlobalDefaults {
    pub schedule: String,
    pub webhook: bool,
}

/// A template resolved for one repository
#[derive(Debug, Clone)]
pub struct BuildTemplate {
    pub artifacts: Vec<ArtifactSpec>,
    pub schedule: String,
    pub webhook: bool,
}

/// On-disk template document
#[derive(Debug, Deserialize)]
struct TemplateFile {
    #[serde(default)]
    artifacts: Vec<ArtifactSpec>,
    schedule: Option<String>,
    webhook: Option<bool>,
}

/// On-disk `.build-template.yaml` override document
#[derive(Debug, Deserialize)]
struct OverrideFile {
    /// Template to resolve instead of the repository-level one
    template: Option<String>,
    #[serde(default)]
    overrides: OverrideSet,
}

#[derive(Debug, Default, Deserialize)]
struct OverrideSet {
    #[serde(default)]
    artifacts: Vec<ArtifactSpec>,
}

/// Loads and resolves templates from a fixed directory
#[derive(Debug, Clone)]
pub struct TemplateStore {
    root: PathBuf,
}

impl TemplateStore {
    /// Creates a store rooted at the orchestration config's directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves a template reference for one repository.
    ///
    /// Substitutes `{{repo_name}}` into artifact image names and the
    /// global schedule token into the schedule, and fills `schedule` and
    /// `webhook` from the global defaults when the template leaves them
    /// unset.
    pub fn resolve(
        &self,
        template_ref: &str,
        repo_name: &str,
        defaults: &GlobalDefaults,
    ) -> Result<BuildTemplate> {
        let path = self.root.join(template_ref);
        let raw = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BuildError::ConfigNotFound(path.clone()),
            _ => BuildError::Io(e),
        })?;
        let file: TemplateFile =
            serde_yaml::from_str(&raw).map_err(|e| BuildError::ConfigParse {
                path: path.clone(),
                message: e.to_string(),
            })?;

        let artifacts = file
            .artifacts
            .into_iter()
            .map(|artifact| substitute_repo_name(artifact, repo_name))
            .collect();
        let schedule = file
            .schedule
            .unwrap_or_else(|| defaults.schedule.clone())
            .replace(GLOBAL_SCHEDULE_TOKEN, &defaults.schedule);
        let webhook = file.webhook.unwrap_or(defaults.webhook);

        Ok(BuildTemplate {
            artifacts,
            schedule,
            webhook,
        })
    }

    /// Resolves the effective template for a cloned repository.
    ///
    /// Starts from the repository-level template reference. When the
    /// working copy carries an override file, the template it names is
    /// resolved instead (defaulting schedule and webhook from the already
    /// resolved base) and its artifact overrides are merged in.
    pub fn resolve_for_repo(
        &self,
        workdir: &Path,
        template_ref: &str,
        repo_name: &str,
        defaults: &GlobalDefaults,
    ) -> Result<BuildTemplate> {
        let base = self.resolve(template_ref, repo_name, defaults)?;

        let override_path = workdir.join(REPO_OVERRIDE_FILE);
        if !override_path.exists() {
            return Ok(base);
        }

        let raw = std::fs::read_to_string(&override_path)?;
        let file: OverrideFile =
            serde_yaml::from_str(&raw).map_err(|e| BuildError::ConfigParse {
                path: override_path,
                message: e.to_string(),
            })?;

        let repo_defaults = GlobalDefaults {
            schedule: base.schedule.clone(),
            webhook: base.webhook,
        };
        let mut template = match file.template.as_deref() {
            Some(named) => self.resolve(named, repo_name, &repo_defaults)?,
            None => base,
        };
        template.artifacts =
            apply_overrides(template.artifacts, file.overrides.artifacts, repo_name);
        Ok(template)
    }
}

fn substitute_repo_name(mut artifact: ArtifactSpec, repo_name: &str) -> ArtifactSpec {
    if let Some(image_name) = artifact.image_name.take() {
        artifact.image_name = Some(image_name.replace(REPO_NAME_TOKEN, repo_name));
    }
    artifact
}

/// Merges override artifacts into a resolved artifact list.
///
/// Each override patches every artifact of the same `type`, override
/// fields winning per field. An override whose `type` matches nothing is
/// appended as a new artifact.
fn apply_overrides(
    base: Vec<ArtifactSpec>,
    overrides: Vec<ArtifactSpec>,
    repo_name: &str,
) -> Vec<ArtifactSpec> {
    let mut merged = base;
    for over in overrides {
        let over = substitute_repo_name(over, repo_name);
        let mut matched = false;
        for artifact in merged
            .iter_mut()
            .filter(|a| a.artifact_type == over.artifact_type)
        {
            *artifact = merge_artifact(artifact, &over);
            matched = true;
        }
        if !matched {
            info!(
                "Override artifact type '{}' matches no template artifact, appending",
                over.artifact_type
            );
            merged.push(over);
        }
    }
    merged
}

fn merge_artifact(base: &ArtifactSpec, over: &ArtifactSpec) -> ArtifactSpec {
    ArtifactSpec {
        artifact_type: base.artifact_type.clone(),
        language: over.language.clone().or_else(|| base.language.clone()),
        version: over.version.clone().or_else(|| base.version.clone()),
        docker_image: over
            .docker_image
            .clone()
            .or_else(|| base.docker_image.clone()),
        build_script: over
            .build_script
            .clone()
            .or_else(|| base.build_script.clone()),
        registry: over.registry.clone().or_else(|| base.registry.clone()),
        image_name: over.image_name.clone().or_else(|| base.image_name.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> GlobalDefaults {
        GlobalDefaults {
            schedule: "0 * * * *".to_string(),
            webhook: true,
        }
    }

    fn artifact(artifact_type: &str) -> ArtifactSpec {
        ArtifactSpec {
            artifact_type: artifact_type.to_string(),
            language: None,
            version: None,
            docker_image: None,
            build_script: None,
            registry: None,
            image_name: None,
        }
    }

    fn store_with(templates: &[(&str, &str)]) -> (tempfile::TempDir, TemplateStore) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("templates")).unwrap();
        for (name, contents) in templates {
            std::fs::write(dir.path().join(name), contents).unwrap();
        }
        let store = TemplateStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_resolve_substitutes_repo_name_into_image_name_only() {
        let (_dir, store) = store_with(&[(
            "templates/app.yaml",
            r#"
artifacts:
  - type: archive
    version: "2.1"
    image_name: "{{repo_name}}-image"
"#,
        )]);

        let template = store
            .resolve("templates/app.yaml", "myrepo", &defaults())
            .unwrap();
        assert_eq!(
            template.artifacts[0].image_name.as_deref(),
            Some("myrepo-image")
        );
        assert_eq!(template.artifacts[0].version.as_deref(), Some("2.1"));
    }

    #[test]
    fn test_resolve_defaults_schedule_and_webhook() {
        let (_dir, store) = store_with(&[("templates/app.yaml", "artifacts: []\n")]);

        let template = store
            .resolve("templates/app.yaml", "myrepo", &defaults())
            .unwrap();
        assert_eq!(template.schedule, "0 * * * *");
        assert!(template.webhook);
    }

    #[test]
    fn test_resolve_substitutes_global_schedule_token() {
        let (_dir, store) = store_with(&[(
            "templates/app.yaml",
            "artifacts: []\nschedule: \"{{global_schedule}}\"\nwebhook: false\n",
        )]);

        let globals = GlobalDefaults {
            schedule: "15 3 * * *".to_string(),
            webhook: true,
        };
        let template = store
            .resolve("templates/app.yaml", "myrepo", &globals)
            .unwrap();
        assert_eq!(template.schedule, "15 3 * * *");
        assert!(!template.webhook);
    }

    #[test]
    fn test_resolve_missing_template() {
        let (_dir, store) = store_with(&[]);
        let result = store.resolve("templates/absent.yaml", "myrepo", &defaults());
        assert!(matches!(result, Err(BuildError::ConfigNotFound(_))));
    }

    #[test]
    fn test_resolve_malformed_template() {
        let (_dir, store) = store_with(&[("templates/bad.yaml", "artifacts: [unclosed")]);
        let result = store.resolve("templates/bad.yaml", "myrepo", &defaults());
        assert!(matches!(result, Err(BuildError::ConfigParse { .. })));
    }

    #[test]
    fn test_merge_override_wins_per_field() {
        let base = ArtifactSpec {
            version: Some("1.0".to_string()),
            ..artifact("binary")
        };
        let over = ArtifactSpec {
            version: Some("2.0".to_string()),
            docker_image: Some("x".to_string()),
            ..artifact("binary")
        };

        let merged = apply_overrides(vec![base], vec![over], "myrepo");
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].artifact_type, "binary");
        assert_eq!(merged[0].version.as_deref(), Some("2.0"));
        assert_eq!(merged[0].docker_image.as_deref(), Some("x"));
    }

    #[test]
    fn test_merge_keeps_base_fields_absent_from_override() {
        let base = ArtifactSpec {
            language: Some("go".to_string()),
            version: Some("1.0".to_string()),
            ..artifact("binary")
        };
        let over = ArtifactSpec {
            version: Some("2.0".to_string()),
            ..artifact("binary")
        };

        let merged = apply_overrides(vec![base], vec![over], "myrepo");
        assert_eq!(merged[0].language.as_deref(), Some("go"));
        assert_eq!(merged[0].version.as_deref(), Some("2.0"));
    }

    #[test]
    fn test_unmatched_override_is_appended() {
        let base = artifact("binary");
        let over = ArtifactSpec {
            version: Some("3.0".to_string()),
            ..artifact("archive")
        };

        let merged = apply_overrides(vec![base], vec![over], "myrepo");
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].artifact_type, "archive");
        assert_eq!(merged[1].version.as_deref(), Some("3.0"));
    }

    #[test]
    fn test_appended_override_gets_repo_name_substitution() {
        let over = ArtifactSpec {
            image_name: Some("{{repo_name}}-extra".to_string()),
            ..artifact("archive")
        };

        let merged = apply_overrides(Vec::new(), vec![over], "myrepo");
        assert_eq!(merged[0].image_name.as_deref(), Some("myrepo-extra"));
    }

    #[test]
    fn test_override_replaces_whole_build_script() {
        let base = ArtifactSpec {
            build_script: Some(BuildScriptSpec {
                repo_name: Some("build-scripts".to_string()),
                path: Some("old.sh".to_string()),
                args: Some("--flag".to_string()),
                docker_required: false,
                docker_image: None,
            }),
            ..artifact("archive")
        };
        let over = ArtifactSpec {
            build_script: Some(BuildScriptSpec {
                repo_name: None,
                path: Some("new.sh".to_string()),
                args: None,
                docker_required: true,
                docker_image: None,
            }),
            ..artifact("archive")
        };

        let merged = apply_overrides(vec![base], vec![over], "myrepo");
        let script = merged[0].build_script.as_ref().unwrap();
        assert_eq!(script.path.as_deref(), Some("new.sh"));
        assert_eq!(script.args, None);
        assert!(script.docker_required);
    }

    #[test]
    fn test_resolve_for_repo_without_override_file() {
        let (_dir, store) = store_with(&[(
            "templates/app.yaml",
            "artifacts:\n  - type: binary\n    language: go\n",
        )]);
        let workdir = tempfile::tempdir().unwrap();

        let template = store
            .resolve_for_repo(workdir.path(), "templates/app.yaml", "myrepo", &defaults())
            .unwrap();
        assert_eq!(template.artifacts.len(), 1);
        assert_eq!(template.artifacts[0].language.as_deref(), Some("go"));
    }

    #[test]
    fn test_resolve_for_repo_applies_override_file() {
        let (_dir, store) = store_with(&[
            (
                "templates/app.yaml",
                "artifacts:\n  - type: binary\n    language: go\n    version: \"1.0\"\n",
            ),
            (
                "templates/other.yaml",
                "artifacts:\n  - type: binary\n    language: go\n    version: \"9.9\"\nschedule: \"5 5 * * *\"\n",
            ),
        ]);
        let workdir = tempfile::tempdir().unwrap();
        std::fs::write(
            workdir.path().join(REPO_OVERRIDE_FILE),
            r#"
template: templates/other.yaml
overrides:
  artifacts:
    - type: binary
      version: "2.0"
"#,
        )
        .unwrap();

        let template = store
            .resolve_for_repo(workdir.path(), "templates/app.yaml", "myrepo", &defaults())
            .unwrap();
        assert_eq!(template.artifacts[0].version.as_deref(), Some("2.0"));
        assert_eq!(template.schedule, "5 5 * * *");
    }

    #[test]
    fn test_resolve_for_repo_override_without_template_key() {
        let (_dir, store) = store_with(&[(
            "templates/app.yaml",
            "artifacts:\n  - type: binary\n    language: go\n    version: \"1.0\"\n",
        )]);
        let workdir = tempfile::tempdir().unwrap();
        std::fs::write(
            workdir.path().join(REPO_OVERRIDE_FILE),
            "overrides:\n  artifacts:\n    - type: binary\n      version: \"4.0\"\n",
        )
        .unwrap();

        let template = store
            .resolve_for_repo(workdir.path(), "templates/app.yaml", "myrepo", &defaults())
            .unwrap();
        assert_eq!(template.artifacts[0].version.as_deref(), Some("4.0"));
        assert_eq!(template.artifacts[0].language.as_deref(), Some("go"));
    }

    #[test]
    fn test_resolve_for_repo_malformed_override_file() {
        let (_dir, store) = store_with(&[("templates/app.yaml", "artifacts: []\n")]);
        let workdir = tempfile::tempdir().unwrap();
        std::fs::write(workdir.path().join(REPO_OVERRIDE_FILE), "overrides: [bad").unwrap();

        let result =
            store.resolve_for_repo(workdir.path(), "templates/app.yaml", "myrepo", &defaults());
        assert!(matches!(result, Err(BuildError::ConfigParse { .. })));
    }
}
