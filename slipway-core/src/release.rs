//! Release creation and container publishing
//!
//! Wraps the `gh` CLI for release creation and asset uploads, and drives
//! the container leg of the publish protocol: registry login, loading the
//! image archive, re-tagging under the push identity and pushing.
//!
//! The pushed tag is always the image's self-declared repository tag read
//! from `manifest.json` inside the archive, never a configured name.

use std::path::Path;
use std::process::Command;
use tracing::info;

use crate::docker;
use crate::error::{BuildError, Result};

/// Environment variable holding the release and registry token
pub const GH_TOKEN_VAR: &str = "GH_TOKEN";

/// Environment variable holding the registry push identity
pub const GH_PUSH_USER_VAR: &str = "GH_PUSH_USER";

/// Creates the release `v{version}` and uploads the given assets with it.
///
/// The release gets the title `Version {version}` and generated notes.
/// `cwd` decides which repository the `gh` CLI targets.
pub fn create_release(cwd: &Path, version: &str, assets: &[&Path]) -> Result<()> {
    let mut cmd = Command::new("gh");
    cmd.args([
        "release",
        "create",
        &format!("v{}", version),
        "--title",
        &format!("Version {}", version),
        "--generate-notes",
    ]);
    for asset in assets {
        cmd.arg(asset);
    }
    cmd.current_dir(cwd);

    let output = cmd
        .output()
        .map_err(|e| BuildError::tool_spawn("gh release create", e))?;

    if !output.status.success() {
        return Err(BuildError::PublishUpload(
            BuildError::tool_failure("gh release create", &output).to_string(),
        ));
    }

    info!("Created release v{}", version);
    Ok(())
}

/// Uploads one asset to the release `v{version}`
pub fn upload_asset(cwd: &Path, version: &str, asset: &Path) -> Result<()> {
    let output = Command::new("gh")
        .args(["release", "upload", &format!("v{}", version)])
        .arg(asset)
        .current_dir(cwd)
        .output()
        .map_err(|e| BuildError::tool_spawn("gh release upload", e))?;

    if !output.status.success() {
        return Err(BuildError::PublishUpload(
            BuildError::tool_failure("gh release upload", &output).to_string(),
        ));
    }

    Ok(())
}

/// Pushes a saved container image archive to a registry.
///
/// Authenticates with the token and push identity from the environment,
/// loads the archive, extracts the image's own repository tag from its
/// manifest and pushes `{registry}/{push_identity}/{tag}`. Returns the
/// pushed reference.
pub fn push_container_archive(archive: &Path, registry: &str) -> Result<String> {
    let token = std::env::var(GH_TOKEN_VAR)
        .map_err(|_| BuildError::MissingCredential(GH_TOKEN_VAR.to_string()))?;
    let push_user = std::env::var(GH_PUSH_USER_VAR)
        .map_err(|_| BuildError::MissingCredential(GH_PUSH_USER_VAR.to_string()))?;

    docker::login(registry, &push_user, &token)?;
    docker::load_archive(archive).map_err(as_publish_failure)?;

    let tag = manifest_repo_tag(archive)?;
    info!("Container image tag: {}", tag);

    let target = push_target(registry, &push_user, &tag);
    docker::tag_image(&tag, &target).map_err(as_publish_failure)?;
    docker::push_image(&target).map_err(as_publish_failure)?;

    Ok(target)
}

/// Registry reference the image is re-tagged and pushed under
fn push_target(registry: &str, push_user: &str, tag: &str) -> String {
    format!("{}/{}/{}", registry, push_user, tag)
}

fn as_publish_failure(e: BuildError) -> BuildError {
    BuildError::PublishUpload(e.to_string())
}

/// Reads the first declared repository tag from a saved image archive.
///
/// `manifest.json` in a docker-save archive is a list of image entries,
/// each with an optional `RepoTags` list. The first non-empty tag wins.
pub fn manifest_repo_tag(archive: &Path) -> Result<String> {
    let output = Command::new("tar")
        .args(["-xOf"])
        .arg(archive)
        .arg("manifest.json")
        .output()
        .map_err(|e| BuildError::tool_spawn("tar", e))?;

    if !output.status.success() {
        return Err(BuildError::PublishUpload(format!(
            "manifest.json not readable from {}: {}",
            archive.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let manifest: Vec<ManifestEntry> =
        serde_json::from_slice(&output.stdout).map_err(|e| {
            BuildError::PublishUpload(format!(
                "invalid manifest.json in {}: {}",
                archive.display(),
                e
            ))
        })?;

    manifest
        .iter()
        .find_map(|entry| entry.repo_tags.as_ref().and_then(|tags| tags.first()))
        .cloned()
        .ok_or_else(|| {
            BuildError::PublishUpload(format!(
                "no RepoTags declared in manifest.json of {}",
                archive.display()
            ))
        })
}

#[derive(Debug, serde::Deserialize)]
struct ManifestEntry {
    #[serde(rename = "RepoTags")]
    repo_tags: Option<Vec<String>>,
}
