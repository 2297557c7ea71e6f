//! Containerized JVM builds
//!
//! Detects the repository's build system (Maven before Gradle), runs its
//! packaging command in a disposable container and selects the produced
//! jar from the tool's output directory.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::docker::DockerRun;
use crate::error::{BuildError, Result};
use crate::template::ArtifactSpec;

use super::{ArtifactBuilder, artifact_version, publish_primary};

const DEFAULT_IMAGE: &str = "maven:3.9-eclipse-temurin-17";

struct BuildSystem {
    marker: &'static str,
    command: &'static [&'static str],
    output_dir: &'static str,
}

/// Detection order: a `pom.xml` wins over Gradle files
static BUILD_SYSTEMS: [BuildSystem; 3] = [
    BuildSystem {
        marker: "pom.xml",
        command: &["mvn", "-DskipTests", "clean", "package"],
        output_dir: "target",
    },
    BuildSystem {
        marker: "build.gradle",
        command: &["gradle", "clean", "build", "-x", "test"],
        output_dir: "build/libs",
    },
    BuildSystem {
        marker: "build.gradle.kts",
        command: &["gradle", "clean", "build", "-x", "test"],
        output_dir: "build/libs",
    },
];

fn detect(workdir: &Path) -> Result<&'static BuildSystem> {
    BUILD_SYSTEMS
        .iter()
        .find(|system| workdir.join(system.marker).is_file())
        .ok_or_else(|| {
            BuildError::MissingBuildInput(
                "no pom.xml or build.gradle in working copy".to_string(),
            )
        })
}

/// Picks the published jar from a build output directory.
///
/// Source and javadoc jars are filtered out; the remaining candidates are
/// taken in lexical order, first one wins.
fn select_jar(output_dir: &Path) -> Result<PathBuf> {
    let entries = std::fs::read_dir(output_dir)
        .map_err(|_| BuildError::ExpectedOutputMissing(output_dir.display().to_string()))?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| is_candidate_jar(path))
        .collect();
    candidates.sort();

    if candidates.is_empty() {
        return Err(BuildError::ExpectedOutputMissing(format!(
            "no jar produced under {}",
            output_dir.display()
        )));
    }
    if candidates.len() > 1 {
        warn!(
            "{} candidate jars under {}, taking {}",
            candidates.len(),
            output_dir.display(),
            candidates[0].display()
        );
    }
    Ok(candidates.remove(0))
}

fn is_candidate_jar(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".jar") && !name.ends_with("-sources.jar") && !name.ends_with("-javadoc.jar")
}

/// Builds jars with Maven or Gradle inside a disposable container
#[derive(Default)]
pub struct JavaBuilder;

impl JavaBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl ArtifactBuilder for JavaBuilder {
    fn build(
        &self,
        workdir: &Path,
        publish_name: &str,
        artifact: &ArtifactSpec,
    ) -> Result<PathBuf> {
        let version = artifact_version(artifact);
        let system = detect(workdir)?;
        let image = artifact.docker_image.as_deref().unwrap_or(DEFAULT_IMAGE);

        info!("Building via {} in {}", system.marker, image);
        let command: Vec<String> = system.command.iter().map(|s| s.to_string()).collect();
        DockerRun::new(image)
            .mount(workdir, workdir)
            .mount(workdir, Path::new("/app"))
            .workdir(Path::new("/app"))
            .run(&command)?;

        let jar = select_jar(&workdir.join(system.output_dir))?;

        let build_dir = workdir.join("build");
        std::fs::create_dir_all(&build_dir)?;
        let output = build_dir.join(format!("{}_{}.jar", publish_name, version));
        std::fs::copy(&jar, &output)?;
        info!("Selected {} as {}", jar.display(), output.display());
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
