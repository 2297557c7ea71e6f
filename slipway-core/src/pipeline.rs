//! The build pipeline
//!
//! Top-level per-repository loop: enumerate the repositories, clone each
//! one, resolve its effective template, dispatch every artifact to its
//! builder and remove the working copy.
//!
//! Failures are isolated: an artifact error is recorded and the next
//! artifact runs, a repository error is recorded and the next repository
//! runs. Only configuration and enumeration problems abort the run.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::builders::{self, BuilderRegistry};
use crate::config::{OrchestrationConfig, RepoSpec, ScriptRepoSpec};
use crate::error::{BuildError, Result};
use crate::git::{self, Workdir};
use crate::github::{self, GithubClient};
use crate::template::{ArtifactSpec, DEFAULT_TEMPLATE, TemplateStore};
use crate::version;

/// Where an artifact dispatch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStage {
    Build,
    Publish,
}

impl fmt::Display for ArtifactStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactStage::Build => write!(f, "build"),
            ArtifactStage::Publish => write!(f, "publish"),
        }
    }
}

/// Outcome of one artifact dispatch
#[derive(Debug)]
pub enum ArtifactOutcome {
    Published { artifact: PathBuf },
    Skipped { reason: String },
    Failed { stage: ArtifactStage, message: String },
}

/// Report for one dispatched artifact
#[derive(Debug)]
pub struct ArtifactReport {
    pub builder_key: String,
    pub outcome: ArtifactOutcome,
}

/// Report for one processed repository
#[derive(Debug)]
pub struct RepoReport {
    pub name: String,
    pub artifacts: Vec<ArtifactReport>,
    /// Repository-level failure (clone or configuration), artifacts empty
    pub error: Option<String>,
    pub duration: Duration,
}

impl RepoReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            artifacts: Vec::new(),
            error: None,
            duration: Duration::default(),
        }
    }

    /// True when the repository was processed without a failure.
    ///
    /// Skipped artifacts do not count as failures.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
            && !self
                .artifacts
                .iter()
                .any(|a| matches!(a.outcome, ArtifactOutcome::Failed { .. }))
    }
}

/// Report for a full pipeline run
#[derive(Debug)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub repositories: Vec<RepoReport>,
}

impl RunReport {
    /// Count of published artifacts across all repositories
    pub fn published(&self) -> usize {
        self.repositories
            .iter()
            .flat_map(|r| &r.artifacts)
            .filter(|a| matches!(a.outcome, ArtifactOutcome::Published { .. }))
            .count()
    }

    /// Count of failed artifacts plus repositories that failed outright
    pub fn failed(&self) -> usize {
        self.repositories
            .iter()
            .map(|r| {
                let artifacts = r
                    .artifacts
                    .iter()
                    .filter(|a| matches!(a.outcome, ArtifactOutcome::Failed { .. }))
                    .count();
                artifacts + usize::from(r.error.is_some())
            })
            .sum()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

/// Drives the clone, resolve, build, publish, cleanup loop.
///
/// Repositories already processed by this pipeline instance are skipped,
/// so repeated runs are idempotent within one process.
pub struct BuildPipeline {
    config: OrchestrationConfig,
    templates: TemplateStore,
    registry: BuilderRegistry,
    workspace: PathBuf,
    processed: HashSet<String>,
}

impl BuildPipeline {
    pub fn new(
        config: OrchestrationConfig,
        templates: TemplateStore,
        registry: BuilderRegistry,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            templates,
            registry,
            workspace: workspace.into(),
            processed: HashSet::new(),
        }
    }

    /// Builds a pipeline from an orchestration document on disk.
    ///
    /// Loads and validates the configuration, roots the template store at
    /// the document's directory, clones the auxiliary script repositories
    /// and registers the standard builders. Script repository clone
    /// failures are fatal.
    pub fn from_config_path(config_path: &Path, workspace: impl Into<PathBuf>) -> Result<Self> {
        let workspace = workspace.into();
        let config = OrchestrationConfig::load(config_path)?;
        config.validate()?;

        let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        let templates = TemplateStore::new(config_dir);
        let script_repos = clone_script_repositories(&config.script_repositories, &workspace)?;
        let registry = BuilderRegistry::standard(script_repos);

        Ok(Self::new(config, templates, registry, workspace))
    }

    /// Processes every enumerated repository and reports the outcomes.
    ///
    /// `selected` is an allow-list of repository names; empty means all.
    /// An allow-list that matches nothing is fatal, as are configuration
    /// and enumeration errors. Build and publish failures are not.
    pub async fn run(&mut self, selected: &[String]) -> Result<RunReport> {
        let started_at = Utc::now();

        let repos = self.enumerate_repositories().await?;
        let repos = dedup_repositories(repos);
        let repos = filter_repositories(repos, selected)?;
        info!("Processing {} repositories", repos.len());

        let mut reports = Vec::with_capacity(repos.len());
        for repo in repos {
            if !self.processed.insert(repo.name.clone()) {
                debug!("Repository {} already processed, skipping", repo.name);
                continue;
            }
            reports.push(self.process_repository(&repo));
        }

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            repositories: reports,
        };
        info!(
            "Run complete: {} artifacts published, {} failures",
            report.published(),
            report.failed()
        );
        Ok(report)
    }

    /// The repository list for this run: the static configuration, or the
    /// organization listing when scanning is enabled.
    async fn enumerate_repositories(&self) -> Result<Vec<RepoSpec>> {
        if !self.config.scan_organization {
            return Ok(self.config.repositories.clone());
        }

        let org = self.config.organization.as_deref().unwrap_or_default();
        let token = std::env::var(github::GITHUB_TOKEN_VAR)
            .map_err(|_| BuildError::MissingCredential(github::GITHUB_TOKEN_VAR.to_string()))?;
        GithubClient::new(token)
            .list_organization_repositories(org)
            .await
    }

    fn process_repository(&self, repo: &RepoSpec) -> RepoReport {
        let start = Instant::now();
        let mut report = RepoReport::new(&repo.name);
        info!("Processing repository {}", repo.name);

        let workdir = match Workdir::create(
            &self.workspace,
            &repo.name,
            &repo.url,
            repo.commit.as_deref(),
        ) {
            Ok(workdir) => workdir,
            Err(e) => {
                error!("Cloning {} failed: {}", repo.name, e);
                report.error = Some(e.to_string());
                report.duration = start.elapsed();
                return report;
            }
        };

        let template_ref = repo.template.as_deref().unwrap_or(DEFAULT_TEMPLATE);
        match self.templates.resolve_for_repo(
            workdir.path(),
            template_ref,
            &repo.name,
            &self.config.defaults(),
        ) {
            Ok(template) => {
                let tag_version = version::describe_exact_tag(workdir.path());
                for artifact in &template.artifacts {
                    let artifact = fill_version(artifact, tag_version.as_deref());
                    report
                        .artifacts
                        .push(self.run_artifact(workdir.path(), &repo.name, &artifact));
                }
            }
            Err(e) => {
                error!("Resolving configuration for {} failed: {}", repo.name, e);
                report.error = Some(e.to_string());
            }
        }

        if let Err(e) = workdir.cleanup() {
            warn!("Cleanup of {} failed: {}", repo.name, e);
        }
        report.duration = start.elapsed();
        report
    }

    fn run_artifact(
        &self,
        workdir: &Path,
        publish_name: &str,
        artifact: &ArtifactSpec,
    ) -> ArtifactReport {
        let key = builders::dispatch_key(artifact);
        let Some(builder) = self.registry.resolve(&key) else {
            warn!(
                "No builder registered for '{}', skipping artifact of {}",
                key, publish_name
            );
            return ArtifactReport {
                outcome: ArtifactOutcome::Skipped {
                    reason: format!("no builder registered for '{}'", key),
                },
                builder_key: key,
            };
        };

        info!("Dispatching '{}' artifact of {}", key, publish_name);
        let built = match builder
            .build(workdir, publish_name, artifact)
            .and_then(|path| builders::verify_artifact(&path).map(|_| path))
        {
            Ok(path) => path,
            Err(e) => {
                error!("Building '{}' artifact of {} failed: {}", key, publish_name, e);
                return ArtifactReport {
                    builder_key: key,
                    outcome: ArtifactOutcome::Failed {
                        stage: ArtifactStage::Build,
                        message: e.to_string(),
                    },
                };
            }
        };

        match builder.publish(&built, publish_name, artifact) {
            Ok(()) => {
                info!("Published {} for {}", built.display(), publish_name);
                ArtifactReport {
                    builder_key: key,
                    outcome: ArtifactOutcome::Published { artifact: built },
                }
            }
            Err(e) => {
                error!(
                    "Publishing '{}' artifact of {} failed: {}",
                    key, publish_name, e
                );
                ArtifactReport {
                    builder_key: key,
                    outcome: ArtifactOutcome::Failed {
                        stage: ArtifactStage::Publish,
                        message: e.to_string(),
                    },
                }
            }
        }
    }
}

/// Copies an artifact entry, filling a missing version from tag metadata.
fn fill_version(artifact: &ArtifactSpec, tag_version: Option<&str>) -> ArtifactSpec {
    let mut artifact = artifact.clone();
    if artifact.version.is_none() {
        if let Some(tag) = tag_version {
            info!("Using version {} from tag metadata", tag);
            artifact.version = Some(tag.to_string());
        }
    }
    artifact
}

/// Drops repeated repository names, keeping the first occurrence's fields.
fn dedup_repositories(repos: Vec<RepoSpec>) -> Vec<RepoSpec> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(repos.len());
    for repo in repos {
        if seen.insert(repo.name.clone()) {
            unique.push(repo);
        } else {
            warn!("Duplicate repository '{}' dropped, first occurrence wins", repo.name);
        }
    }
    unique
}

/// Applies the allow-list, preserving enumeration order.
///
/// An empty allow-list keeps everything; one that matches nothing is an
/// error.
fn filter_repositories(repos: Vec<RepoSpec>, selected: &[String]) -> Result<Vec<RepoSpec>> {
    if selected.is_empty() {
        return Ok(repos);
    }

    let filtered: Vec<RepoSpec> = repos
        .into_iter()
        .filter(|repo| selected.iter().any(|name| name == &repo.name))
        .collect();
    if filtered.is_empty() {
        return Err(BuildError::NoMatchingRepositories(selected.to_vec()));
    }
    Ok(filtered)
}

/// Clones the auxiliary script repositories under `<workspace>/script-repos`.
///
/// A clone left by an earlier run is reused. Returns the name to path map
/// handed to the script builder.
pub fn clone_script_repositories(
    specs: &[ScriptRepoSpec],
    workspace: &Path,
) -> Result<HashMap<String, PathBuf>> {
    let base = workspace.join("script-repos");
    let mut repos = HashMap::with_capacity(specs.len());
    for spec in specs {
        let dest = base.join(&spec.name);
        if dest.exists() {
            debug!("Reusing script repository clone {}", dest.display());
        } else {
            std::fs::create_dir_all(&base)?;
            git::clone_repository(&spec.url, None, &dest)?;
        }
        repos.insert(spec.name.clone(), dest);
    }
    Ok(repos)
}
