//! GitHub organization repository listing

use serde::Deserialize;
use tracing::debug;

use crate::config::RepoSpec;
use crate::error::{BuildError, Result};

/// Environment variable holding the listing token
pub const GITHUB_TOKEN_VAR: &str = "GITHUB_TOKEN";

const GITHUB_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "slipway-build-orchestrator";

/// Client for the GitHub repository listing API
#[derive(Debug, Clone)]
pub struct GithubClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

/// One repository entry from the organization listing
#[derive(Debug, Deserialize)]
struct OrgRepository {
    name: String,
    clone_url: String,
}

impl GithubClient {
    /// Create a client against the public GitHub API
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, GITHUB_API_URL)
    }

    /// Create a client against a custom API base URL
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Get the API base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Lists an organization's repositories as buildable specs.
    ///
    /// Discovered repositories carry no revision, so they are cloned at
    /// their default branch, and no template reference, so they inherit
    /// the default template.
    pub async fn list_organization_repositories(&self, org: &str) -> Result<Vec<RepoSpec>> {
        let url = format!("{}/orgs/{}/repos?per_page=100", self.base_url, org);
        debug!("Listing repositories of organization {}", org);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BuildError::Listing {
                status: status.as_u16(),
                message,
            });
        }

        let repositories: Vec<OrgRepository> = response.json().await?;
        Ok(into_repo_specs(repositories))
    }
}

fn into_repo_specs(repositories: Vec<OrgRepository>) -> Vec<RepoSpec> {
    repositories
        .into_iter()
        .map(|repo| RepoSpec {
            name: repo.name,
            url: repo.clone_url,
            commit: None,
            template: None,
        })
        .collect()
}
