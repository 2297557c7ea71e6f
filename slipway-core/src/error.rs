//! Error types for the build-and-publish pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, BuildError>;

/// Errors that can occur while resolving configuration, building or
/// publishing artifacts
#[derive(Debug, Error)]
pub enum BuildError {
    /// A configuration or template file does not exist
    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    /// A configuration or template file could not be parsed
    #[error("failed to parse {path}: {message}")]
    ConfigParse {
        /// Path of the offending file
        path: PathBuf,
        /// Parser error detail
        message: String,
    },

    /// The loaded configuration is structurally valid but unusable
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An artifact declaration is missing an input the builder requires
    #[error("missing build input: {0}")]
    MissingBuildInput(String),

    /// An external tool could not be started
    #[error("failed to execute {tool}: {source}")]
    ToolSpawn {
        /// Tool that failed to start
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// An external tool ran but exited unsuccessfully
    #[error("{tool} failed: exit_code={exit_code}, stdout='{stdout}', stderr='{stderr}'")]
    ToolInvocation {
        /// Tool that failed
        tool: String,
        /// Exit code, -1 when terminated by a signal
        exit_code: i32,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// A build ran but its expected output is absent or unusable
    #[error("expected build output missing: {0}")]
    ExpectedOutputMissing(String),

    /// Reading an artifact or writing its integrity proof failed
    #[error("checksum I/O failed for {path}: {source}")]
    ChecksumIo {
        /// File being checksummed or written
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A release creation or asset upload failed
    #[error("publish upload failed: {0}")]
    PublishUpload(String),

    /// Authentication against a container registry failed
    #[error("registry authentication failed for {0}")]
    RegistryAuth(String),

    /// Cloning a repository failed
    #[error("failed to clone {url}: {message}")]
    Clone {
        /// Repository URL
        url: String,
        /// Stderr captured from the clone tool
        message: String,
    },

    /// A required environment credential is not set
    #[error("required credential {0} is not set")]
    MissingCredential(String),

    /// An allow-list was supplied but matched no repository
    #[error("no matching repositories found for {0:?}")]
    NoMatchingRepositories(Vec<String>),

    /// The repository listing API returned an error status code
    #[error("repository listing failed (status {status}): {message}")]
    Listing {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Create a tool-invocation error from a finished process output
    pub fn tool_failure(tool: impl Into<String>, output: &std::process::Output) -> Self {
        Self::ToolInvocation {
            tool: tool.into(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    /// Create a spawn error for a tool that could not be started
    pub fn tool_spawn(tool: impl Into<String>, source: std::io::Error) -> Self {
        Self::ToolSpawn {
            tool: tool.into(),
            source,
        }
    }

    /// Check if this error means a referenced file was absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ConfigNotFound(_))
    }
}
