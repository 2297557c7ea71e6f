//! Containerized Go builds

use std::path::{Path, PathBuf};
use tracing::info;

use crate::docker::DockerRun;
use crate::error::{BuildError, Result};
use crate::template::ArtifactSpec;

use super::{ArtifactBuilder, artifact_version, publish_primary};

const DEFAULT_IMAGE: &str = "ubuntu:22.04";

/// Builds Go binaries with `go build` inside a disposable container
#[derive(Default)]
pub struct GoBuilder;

impl GoBuilder {
    pub fn new() -> Self {
        Self
    }
}

fn output_name(publish_name: &str, version: &str) -> String {
    format!("{}_{}_s390x", publish_name, version)
}

impl ArtifactBuilder for GoBuilder {
    fn build(
        &self,
        workdir: &Path,
        publish_name: &str,
        artifact: &ArtifactSpec,
    ) -> Result<PathBuf> {
        let version = artifact_version(artifact);
        let build_dir = workdir.join("build");
        std::fs::create_dir_all(&build_dir)?;

        let output = build_dir.join(output_name(publish_name, &version));
        let image = artifact.docker_image.as_deref().unwrap_or(DEFAULT_IMAGE);

        info!("Building Go binary {} in {}", output.display(), image);
        DockerRun::new(image)
            .mount(workdir, workdir)
            .mount(workdir, Path::new("/app"))
            .workdir(Path::new("/app"))
            .run(&[
                "go".to_string(),
                "build".to_string(),
                "-o".to_string(),
                output.display().to_string(),
                ".".to_string(),
            ])?;

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
        _publish_name: &str,
        artifact: &ArtifactSpec,
    ) -> Result<()> {
        publish_primary(artifact_path, &artifact_version(artifact))
    }
}
