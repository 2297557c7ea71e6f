//! Slipway Core
//!
//! Build-and-publish orchestration for an s390x packaging project.
//!
//! This crate contains:
//! - Configuration: the orchestration document, build templates and
//!   per-repository overrides
//! - Builders: pluggable build-and-publish strategies (script, Go, JVM)
//!   dispatched by a key derived from each artifact entry
//! - Pipeline: the per-repository clone, resolve, build, verify, publish,
//!   cleanup loop with isolated failures
//! - External-tool plumbing: `git`, `docker`, `gh` and the GitHub listing
//!   API

pub mod builders;
pub mod checksum;
pub mod config;
pub mod docker;
pub mod error;
pub mod git;
pub mod github;
pub mod pipeline;
pub mod release;
pub mod template;
pub mod version;

pub use error::{BuildError, Result};
