//! Script-driven builds
//!
//! Runs a build script shipped in the repository's working copy inside a
//! disposable container, with an auxiliary script repository mounted
//! alongside for shared helpers. Scripts that drive the outer container
//! runtime themselves opt into privileged mode via `docker_required`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::docker::DockerRun;
use crate::error::{BuildError, Result};
use crate::release;
use crate::template::ArtifactSpec;

use super::{ArtifactBuilder, artifact_version, publish_primary, publish_secondary};

/// Script repository used when the descriptor names none
pub const DEFAULT_SCRIPT_REPO: &str = "build-scripts";

const DEFAULT_IMAGE: &str = "ubuntu:22.04";
const DEFAULT_REGISTRY: &str = "ghcr.io";

/// Environment handed through to privileged build scripts
const PRIVILEGED_ENV: [&str; 4] = [
    "DOCKER_USERNAME",
    "DOCKER_PASSWORD",
    release::GH_TOKEN_VAR,
    release::GH_PUSH_USER_VAR,
];

/// Builds artifacts by running a repository-provided build script.
///
/// The script path is relative to the working copy; the auxiliary script
/// repository named by the descriptor (or [`DEFAULT_SCRIPT_REPO`]) must be
/// among the clones the builder was constructed with.
pub struct ScriptBuilder {
    script_repos: HashMap<String, PathBuf>,
}

impl ScriptBuilder {
    pub fn new(script_repos: HashMap<String, PathBuf>) -> Self {
        Self { script_repos }
    }

    fn script_repo(&self, name: &str) -> Result<&PathBuf> {
        self.script_repos.get(name).ok_or_else(|| {
            BuildError::MissingBuildInput(format!(
                "script repository '{}' is not configured",
                name
            ))
        })
    }
}

fn output_archive(publish_name: &str, version: &str) -> String {
    format!("{}-{}-linux-s390x.tar.gz", publish_name, version)
}

impl ArtifactBuilder for ScriptBuilder {
    fn build(
        &self,
        workdir: &Path,
        publish_name: &str,
        artifact: &ArtifactSpec,
    ) -> Result<PathBuf> {
        let script = artifact
            .build_script
            .as_ref()
            .ok_or_else(|| BuildError::MissingBuildInput("build_script".to_string()))?;
        let script_path = script
            .path
            .as_deref()
            .ok_or_else(|| BuildError::MissingBuildInput("build_script.path".to_string()))?;

        let repo_name = script.repo_name.as_deref().unwrap_or(DEFAULT_SCRIPT_REPO);
        let helpers = self.script_repo(repo_name)?;

        let full_script = workdir.join(script_path);
        if !full_script.is_file() {
            return Err(BuildError::MissingBuildInput(format!(
                "build script '{}' not found in working copy",
                script_path
            )));
        }

        let version = artifact_version(artifact);
        let image = script.docker_image.as_deref().unwrap_or(DEFAULT_IMAGE);

        let mut run = DockerRun::new(image)
            .mount(workdir, workdir)
            .mount(workdir, Path::new("/app"))
            .mount(helpers, helpers)
            .workdir(Path::new("/app"));

        if script.docker_required {
            run = run.docker_socket();
            for var in PRIVILEGED_ENV {
                match std::env::var(var) {
                    Ok(value) => run = run.env(var, value),
                    Err(_) => warn!("Privileged build without {} in the environment", var),
                }
            }
        }

        let mut command = vec![
            "bash".to_string(),
            full_script.display().to_string(),
            "version".to_string(),
            version.clone(),
        ];
        if let Some(args) = &script.args {
            command.extend(args.split_whitespace().map(str::to_string));
        }

        info!("Running build script '{}' for {}", script_path, publish_name);
        run.run(&command)?;

        let output = workdir.join(output_archive(publish_name, &version));
        if !output.is_file() {
            return Err(BuildError::ExpectedOutputMissing(
                output.display().to_string(),
            ));
        }
        Ok(output)
    }

    fn publish(
        &self,
        artifact_path: &Path,
        publish_name: &str,
        artifact: &ArtifactSpec,
    ) -> Result<()> {
        let version = artifact_version(artifact);
        publish_primary(artifact_path, &version)?;

        let dir = artifact_path.parent().unwrap_or_else(|| Path::new("."));
        let registry = artifact.registry.as_deref().unwrap_or(DEFAULT_REGISTRY);
        publish_secondary(dir, publish_name, &version, registry)
    }
}
