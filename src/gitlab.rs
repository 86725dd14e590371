//! GitLab REST API client (the source platform)

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::provider::{ProviderError, RepositoryDescriptor, SourceProvider, Visibility};

/// Default page size for API requests.
const PAGE_SIZE: u32 = 100;

/// GitLab API client wrapper for the account whose repositories are mirrored.
pub struct GitLabClient {
    http: reqwest::Client,
    host: String,
    token: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct GitLabUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct GitLabProject {
    id: u64,
    name: String,
    visibility: String,
    description: Option<String>,
    default_branch: Option<String>,
    ssh_url_to_repo: String,
    http_url_to_repo: String,
}

#[derive(Debug, Deserialize)]
struct GitLabCommit {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GitLabBranch {
    name: String,
}

impl GitLabClient {
    /// Create a new GitLab client and verify the token against the instance.
    pub async fn new(config: &Config) -> Result<Self> {
        let token = config.gitlab_token()?;
        let host = config.gitlab.host.trim_end_matches('/').to_string();

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let client = Self {
            http,
            host,
            token,
            username: String::new(),
        };

        let user: GitLabUser = client
            .get_json("/user")
            .await
            .context("GitLab authentication failed. Check GITLAB_TOKEN.")?;

        info!("Authenticated as GitLab user: {}", user.username);

        Ok(Self {
            username: user.username,
            ..client
        })
    }

    /// The authenticated username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Make an authenticated GET request against the v4 API.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path_and_query: &str,
    ) -> Result<T, ProviderError> {
        let url = format!("{}/api/v4{}", self.host, path_and_query);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|err| ProviderError::Decode(err.to_string()))
    }

    fn to_descriptor(project: GitLabProject) -> RepositoryDescriptor {
        // Only an explicitly public project gets a public mirror. GitLab's
        // `internal` visibility must not widen to public on the destination.
        let visibility = if project.visibility == "public" {
            Visibility::Public
        } else {
            Visibility::Private
        };

        RepositoryDescriptor {
            id: project.id,
            name: project.name,
            visibility,
            description: project.description,
            default_branch: project.default_branch,
            ssh_url: project.ssh_url_to_repo,
            http_url: project.http_url_to_repo,
        }
    }
}

#[async_trait]
impl SourceProvider for GitLabClient {
    async fn list_owned_repositories(&self) -> Result<Vec<RepositoryDescriptor>, ProviderError> {
        let mut projects = Vec::new();
        let mut page = 1u32;

        loop {
            let page_projects: Vec<GitLabProject> = self
                .get_json(&format!(
                    "/projects?owned=true&per_page={}&page={}",
                    PAGE_SIZE, page
                ))
                .await?;

            let count = page_projects.len();
            projects.extend(page_projects);

            // A partial page means we've reached the end
            if count < PAGE_SIZE as usize {
                break;
            }

            page += 1;
        }

        info!("Found {} repositories on GitLab", projects.len());
        Ok(projects.into_iter().map(Self::to_descriptor).collect())
    }

    async fn latest_commit(
        &self,
        repo: &RepositoryDescriptor,
        branch: &str,
    ) -> Result<Option<String>, ProviderError> {
        let result: Result<Vec<GitLabCommit>, ProviderError> = self
            .get_json(&format!(
                "/projects/{}/repository/commits?ref_name={}&per_page=1",
                repo.id, branch
            ))
            .await;

        match result {
            Ok(commits) => Ok(commits.into_iter().next().map(|c| c.id)),
            // The branch not existing is a legitimate observation
            Err(ProviderError::Api { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn branch_names(
        &self,
        repo: &RepositoryDescriptor,
    ) -> Result<BTreeSet<String>, ProviderError> {
        let mut branches = BTreeSet::new();
        let mut page = 1u32;

        loop {
            let page_branches: Vec<GitLabBranch> = self
                .get_json(&format!(
                    "/projects/{}/repository/branches?per_page={}&page={}",
                    repo.id, PAGE_SIZE, page
                ))
                .await?;

            let count = page_branches.len();
            branches.extend(page_branches.into_iter().map(|b| b.name));

            if count < PAGE_SIZE as usize {
                break;
            }

            page += 1;
        }

        Ok(branches)
    }
}
