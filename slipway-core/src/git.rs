//! Repository access
//!
//! Acquires shallow working copies of remote repositories and guarantees
//! their removal after processing, success or failure.

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{BuildError, Result};

/// Clones a repository into `dest` with `--depth 1`.
///
/// When `revision` is given it is passed as `--branch`, so it must name a
/// branch or tag. Without a revision the default branch is cloned.
pub fn clone_repository(url: &str, revision: Option<&str>, dest: &Path) -> Result<()> {
    let mut cmd = Command::new("git");
    cmd.args(["clone", "--depth", "1"]);
    if let Some(revision) = revision {
        cmd.args(["--branch", revision]);
    }
    cmd.arg(url).arg(dest);

    let output = cmd
        .output()
        .map_err(|e| BuildError::tool_spawn("git clone", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(BuildError::Clone {
            url: url.to_string(),
            message: stderr,
        });
    }

    info!(
        "Cloned {} at {}",
        url,
        revision.unwrap_or("default branch")
    );
    Ok(())
}

/// A cloned working copy that is removed when processing ends
///
/// Removal is guaranteed: call [`Workdir::cleanup`] for logged removal on
/// the normal path, and the `Drop` implementation covers early exits.
#[derive(Debug)]
pub struct Workdir {
    path: PathBuf,
}

impl Workdir {
    /// Clones `url` into a fresh uniquely-named directory under `base`
    pub fn create(base: &Path, name: &str, url: &str, revision: Option<&str>) -> Result<Self> {
        std::fs::create_dir_all(base)?;
        let path = base.join(format!("{}-{}", name, Uuid::new_v4()));
        clone_repository(url, revision, &path)?;
        Ok(Self { path })
    }

    /// Path of the working copy
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the working copy
    ///
    /// Idempotent: succeeds when the directory is already gone.
    pub fn cleanup(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_dir_all(&self.path)?;
            info!("Removed working copy {}", self.path.display());
        }
        Ok(())
    }
}

impl Drop for Workdir {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!(
                    "Failed to remove working copy {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        std::fs::write(dir.path().join("README.md"), "fixture").unwrap();
        run_git(dir.path(), &["add", "."]);
        run_git(dir.path(), &["commit", "-m", "initial"]);
        dir
    }

    #[test]
    fn test_clone_default_branch() {
        let source = make_git_repo();
        let dest = tempfile::tempdir().unwrap();
        let target = dest.path().join("copy");

        clone_repository(&source.path().display().to_string(), None, &target).unwrap();
        assert!(target.join("README.md").exists());
    }

    #[test]
    fn test_clone_named_tag() {
        let source = make_git_repo();
        run_git(source.path(), &["tag", "v1.0"]);
        let dest = tempfile::tempdir().unwrap();
        let target = dest.path().join("copy");

        clone_repository(
            &source.path().display().to_string(),
            Some("v1.0"),
            &target,
        )
        .unwrap();
        assert!(target.join("README.md").exists());
    }

    #[test]
    fn test_clone_failure_reports_url() {
        let dest = tempfile::tempdir().unwrap();
        let result = clone_repository(
            "/nonexistent/source/repo",
            None,
            &dest.path().join("copy"),
        );
        match result {
            Err(BuildError::Clone { url, .. }) => assert_eq!(url, "/nonexistent/source/repo"),
            other => panic!("expected clone error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_workdir_cleanup_removes_clone() {
        let source = make_git_repo();
        let base = tempfile::tempdir().unwrap();

        let workdir = Workdir::create(
            base.path(),
            "fixture",
            &source.path().display().to_string(),
            None,
        )
        .unwrap();
        let path = workdir.path().to_path_buf();
        assert!(path.join("README.md").exists());

        workdir.cleanup().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_workdir_drop_removes_clone() {
        let source = make_git_repo();
        let base = tempfile::tempdir().unwrap();

        let path = {
            let workdir = Workdir::create(
                base.path(),
                "fixture",
                &source.path().display().to_string(),
                None,
            )
            .unwrap();
            workdir.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
