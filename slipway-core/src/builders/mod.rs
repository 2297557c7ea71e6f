//! Artifact builders
//!
//! Each builder knows how to produce one kind of artifact from a checked
//! out working copy and how to publish the result. Builders are looked up
//! by a string key derived from the artifact entry:
//!
//! - `"script"` when the entry carries a build script
//! - `"binary_{language}"` when the entry is a binary with a language
//! - the raw `type` value otherwise

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{BuildError, Result};
use crate::template::ArtifactSpec;
use crate::{checksum, release};

mod golang;
mod java;
mod script;

pub use golang::GoBuilder;
pub use java::JavaBuilder;
pub use script::ScriptBuilder;

/// Builds and publishes one kind of artifact.
pub trait ArtifactBuilder: Send + Sync {
    /// Produces the artifact from the working copy at `workdir` and
    /// returns the path to the built file.
    fn build(
        &self,
        workdir: &Path,
        publish_name: &str,
        artifact: &ArtifactSpec,
    ) -> Result<PathBuf>;

    /// Publishes a built artifact under `publish_name`.
    fn publish(
        &self,
        artifact_path: &Path,
        publish_name: &str,
        artifact: &ArtifactSpec,
    ) -> Result<()>;
}

/// Derives the builder lookup key for an artifact entry.
pub fn dispatch_key(artifact: &ArtifactSpec) -> String {
    if artifact.build_script.is_some() {
        return "script".to_string();
    }
    if artifact.artifact_type == "binary" {
        if let Some(language) = &artifact.language {
            return format!("binary_{}", language);
        }
    }
    artifact.artifact_type.clone()
}

/// The version an artifact is published under, defaulting to `1.0`.
pub fn artifact_version(artifact: &ArtifactSpec) -> String {
    artifact.version.clone().unwrap_or_else(|| "1.0".to_string())
}

/// Builder lookup table keyed by dispatch key
pub struct BuilderRegistry {
    builders: HashMap<String, Box<dyn ArtifactBuilder>>,
}

impl BuilderRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Creates the standard registry with the script, go and java builders.
    ///
    /// `script_repos` maps script repository names to their local checkouts
    /// for the script builder.
    pub fn standard(script_repos: HashMap<String, PathBuf>) -> Self {
        let mut registry = Self::new();
        registry.register("script", ScriptBuilder::new(script_repos));
        registry.register("binary_go", GoBuilder::new());
        registry.register("binary_java", JavaBuilder::new());
        registry
    }

    /// Registers a builder under a dispatch key, replacing any previous one
    pub fn register(&mut self, key: impl Into<String>, builder: impl ArtifactBuilder + 'static) {
        self.builders.insert(key.into(), Box::new(builder));
    }

    /// Looks up the builder for a dispatch key
    pub fn resolve(&self, key: &str) -> Option<&dyn ArtifactBuilder> {
        self.builders.get(key).map(|b| b.as_ref())
    }

    /// Registered dispatch keys
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(|k| k.as_str())
    }
}

impl Default for BuilderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes the primary artifact: writes its checksum proof and creates
/// the release with both files attached.
pub fn publish_primary(artifact_path: &Path, version: &str) -> Result<()> {
    let digest = checksum::generate(artifact_path)?;
    info!("sha256 {} {}", digest, artifact_path.display());

    let proof_path = checksum::proof_path(artifact_path);
    let cwd = artifact_path.parent().unwrap_or_else(|| Path::new("."));
    release::create_release(cwd, version, &[artifact_path, &proof_path])?;
    Ok(())
}

/// Conventional names of the secondary packaging formats
fn secondary_candidates(publish_name: &str, version: &str) -> [String; 3] {
    [
        format!("{}-{}-1.s390x.rpm", publish_name, version),
        format!("{}_{}_s390x.deb", publish_name, version),
        format!("{}-{}-linux-s390x.container.tar", publish_name, version),
    ]
}

/// Publishes the secondary packaging formats found next to the primary
/// artifact, then pushes the container archive when one exists.
///
/// Each format is probed by its conventional name and skipped silently
/// when absent. A present container archive is both uploaded to the
/// release and pushed to the registry.
pub fn publish_secondary(
    artifact_dir: &Path,
    publish_name: &str,
    version: &str,
    registry: &str,
) -> Result<()> {
    let candidates = secondary_candidates(publish_name, version);

    let mut container: Option<PathBuf> = None;
    for name in &candidates {
        let path = artifact_dir.join(name);
        if !path.is_file() {
            continue;
        }
        release::upload_asset(artifact_dir, version, &path)?;
        info!("Uploaded {}", name);
        if name.ends_with(".container.tar") {
            container = Some(path);
        }
    }

    if let Some(archive) = container {
        match release::push_container_archive(&archive, registry) {
            Ok(reference) => info!("Pushed container image {}", reference),
            Err(e) => {
                warn!("Container push failed: {}", e);
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Verifies that a builder actually produced its declared output.
pub fn verify_artifact(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path)
        .map_err(|_| BuildError::ExpectedOutputMissing(path.display().to_string()))?;
    if metadata.len() == 0 {
        return Err(BuildError::ExpectedOutputMissing(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok(())
}
