//! Version derivation from tag metadata

use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Returns the version named by a tag pointing exactly at HEAD.
///
/// A leading `v` is stripped so that release tags do not double it.
/// Returns `None` when HEAD carries no exact tag, the directory is not a
/// repository, or git is unavailable.
pub fn describe_exact_tag(repo_dir: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--exact-match"])
        .current_dir(repo_dir)
        .output()
        .ok()?;

    if !output.status.success() {
        debug!("No exact tag at HEAD of {}", repo_dir.display());
        return None;
    }

    let tag = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if tag.is_empty() {
        return None;
    }
    Some(tag.strip_prefix('v').map(str::to_string).unwrap_or(tag))
}
