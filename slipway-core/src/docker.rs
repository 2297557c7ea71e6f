//! Docker invocation plumbing
//!
//! Builds run inside disposable containers and container publishing
//! shells out to the docker CLI:
//! - Checking docker availability
//! - Running one-shot build containers with mounts, env and a workdir
//! - Registry login, image load, tag and push for container publishing

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, error, info};

use crate::error::{BuildError, Result};

/// Host socket mounted into privileged build containers
pub const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Checks if docker is installed and available
pub fn check_docker_available() -> Result<()> {
    let output = Command::new("docker")
        .arg("--version")
        .output()
        .map_err(|e| BuildError::tool_spawn("docker --version", e))?;

    if !output.status.success() {
        return Err(BuildError::tool_failure("docker --version", &output));
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("Docker is available: {}", version.trim());

    Ok(())
}

/// A one-shot `docker run --rm` invocation
///
/// The container is disposable: it runs a single command to completion
/// and is removed. Builders mount the working copy read-write and run the
/// toolchain command inside.
#[derive(Debug, Clone)]
pub struct DockerRun {
    image: String,
    mounts: Vec<(PathBuf, PathBuf)>,
    env: Vec<(String, String)>,
    workdir: Option<PathBuf>,
}

impl DockerRun {
    /// Creates a run against the given image
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            mounts: Vec::new(),
            env: Vec::new(),
            workdir: None,
        }
    }

    /// Mounts a host path at a container path
    pub fn mount(mut self, host: &Path, container: &Path) -> Self {
        self.mounts
            .push((host.to_path_buf(), container.to_path_buf()));
        self
    }

    /// Mounts the host docker socket for builds that drive docker themselves
    pub fn docker_socket(self) -> Self {
        self.mount(Path::new(DOCKER_SOCKET), Path::new(DOCKER_SOCKET))
    }

    /// Sets an environment variable inside the container
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets the working directory inside the container
    pub fn workdir(mut self, dir: &Path) -> Self {
        self.workdir = Some(dir.to_path_buf());
        self
    }

    /// Full docker argument vector for the given command
    fn command_args(&self, command: &[String]) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        for (host, container) in &self.mounts {
            args.push("-v".to_string());
            args.push(format!("{}:{}", host.display(), container.display()));
        }
        if let Some(dir) = &self.workdir {
            args.push("-w".to_string());
            args.push(dir.display().to_string());
        }
        args.push(self.image.clone());
        args.extend(command.iter().cloned());
        args
    }

    /// Runs the command to completion inside the container
    pub fn run(&self, command: &[String]) -> Result<()> {
        debug!("Executing in image {}: {:?}", self.image, command);

        let output = Command::new("docker")
            .args(self.command_args(command))
            .output()
            .map_err(|e| BuildError::tool_spawn("docker run", e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !stdout.trim().is_empty() {
            debug!("docker run stdout: {}", stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("docker run stderr: {}", stderr.trim());
        }

        if !output.status.success() {
            let failure = BuildError::tool_failure("docker run", &output);
            error!("{}", failure);
            return Err(failure);
        }

        Ok(())
    }
}

/// Authenticates to a registry by piping the password on stdin
pub fn login(registry: &str, username: &str, password: &str) -> Result<()> {
    let mut child = Command::new("docker")
        .args(["login", registry, "-u", username, "--password-stdin"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| BuildError::tool_spawn("docker login", e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(password.as_bytes())?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| BuildError::tool_spawn("docker login", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(BuildError::RegistryAuth(format!(
            "{}: {}",
            registry, stderr
        )));
    }

    info!("Authenticated to registry {}", registry);
    Ok(())
}

/// Loads a saved image archive into the local daemon
pub fn load_archive(archive: &Path) -> Result<()> {
    let output = Command::new("docker")
        .args(["load", "-i"])
        .arg(archive)
        .output()
        .map_err(|e| BuildError::tool_spawn("docker load", e))?;

    if !output.status.success() {
        return Err(BuildError::tool_failure("docker load", &output));
    }

    debug!("Loaded image archive {}", archive.display());
    Ok(())
}

/// Tags a local image under a new reference
pub fn tag_image(source: &str, target: &str) -> Result<()> {
    let output = Command::new("docker")
        .args(["tag", source, target])
        .output()
        .map_err(|e| BuildError::tool_spawn("docker tag", e))?;

    if !output.status.success() {
        return Err(BuildError::tool_failure("docker tag", &output));
    }

    Ok(())
}

/// Pushes an image reference to its registry
pub fn push_image(reference: &str) -> Result<()> {
    let output = Command::new("docker")
        .args(["push", reference])
        .output()
        .map_err(|e| BuildError::tool_spawn("docker push", e))?;

    if !output.status.success() {
        return Err(BuildError::tool_failure("docker push", &output));
    }

    info!("Pushed image {}", reference);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_args_order() {
        let run = DockerRun::new("ubuntu:22.04")
            .env("GH_TOKEN", "secret")
            .mount(Path::new("/work/repo"), Path::new("/work/repo"))
            .mount(Path::new("/work/repo"), Path::new("/app"))
            .workdir(Path::new("/app"));

        let args = run.command_args(&["bash".to_string(), "build.sh".to_string()]);
        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "-e",
                "GH_TOKEN=secret",
                "-v",
                "/work/repo:/work/repo",
                "-v",
                "/work/repo:/app",
                "-w",
                "/app",
                "ubuntu:22.04",
                "bash",
                "build.sh",
            ]
        );
    }

    #[test]
    fn test_docker_socket_mount() {
        let run = DockerRun::new("ubuntu:22.04").docker_socket();
        let args = run.command_args(&[]);
        assert!(args.contains(&format!("{}:{}", DOCKER_SOCKET, DOCKER_SOCKET)));
    }

    #[test]
    fn test_command_args_without_workdir() {
        let run = DockerRun::new("alpine");
        let args = run.command_args(&["true".to_string()]);
        assert_eq!(args, vec!["run", "--rm", "alpine", "true"]);
    }
}
