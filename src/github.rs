use std::collections::BTreeSet;
use std::env;
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use octocrab::Octocrab;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{Config, TransportMode};
use crate::provider::{
    CreateRepoError, DestinationProvider, DestinationRepository, ProviderError,
};

/// Default page size for API requests.
const PAGE_SIZE: u32 = 100;

/// GitHub client wrapper with authentication management
pub struct GitHubClient {
    client: Octocrab,
    username: String,
    token: String,
}

/// GitHub authentication strategies
#[derive(Debug, Clone)]
pub enum AuthStrategy {
    /// Use GitHub CLI authentication
    GitHubCLI,
    /// Use environment variable token
    EnvironmentToken,
}

#[derive(Debug, Deserialize)]
struct CreatedRepo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct BranchPayload {
    name: String,
    commit: BranchCommit,
}

#[derive(Debug, Deserialize)]
struct BranchCommit {
    sha: String,
}

impl GitHubClient {
    /// Create a new GitHub client with automatic authentication
    pub async fn new(config: &Config) -> Result<Self> {
        let (auth_strategy, token) = Self::detect_authentication(config)?;

        info!("Using authentication strategy: {:?}", auth_strategy);

        let client = Octocrab::builder()
            .personal_token(token.clone())
            .build()
            .context("Failed to create GitHub client")?;

        // Get authenticated user information
        let user = client
            .current()
            .user()
            .await
            .context("Failed to get current user information. Check your authentication.")?;

        let username = config
            .github_username_override()
            .unwrap_or_else(|| user.login.clone());

        info!("Authenticated as GitHub user: {}", username);

        Ok(Self {
            client,
            username,
            token,
        })
    }

    /// Detect and obtain GitHub authentication
    fn detect_authentication(config: &Config) -> Result<(AuthStrategy, String)> {
        match config.github.auth_method.as_str() {
            "auto" => {
                // Try environment token first, then GitHub CLI
                if let Ok(token) = Self::try_environment_token() {
                    Ok((AuthStrategy::EnvironmentToken, token))
                } else if let Ok(token) = Self::try_github_cli() {
                    Ok((AuthStrategy::GitHubCLI, token))
                } else {
                    Err(anyhow!(
                        "No GitHub authentication found. Please either:\n\
                         1. Set GITHUB_TOKEN environment variable\n\
                         2. Install and authenticate GitHub CLI: gh auth login"
                    ))
                }
            }
            "gh_cli" => {
                let token = Self::try_github_cli()
                    .context("GitHub CLI authentication failed. Run: gh auth login")?;
                Ok((AuthStrategy::GitHubCLI, token))
            }
            "token" => {
                let token = Self::try_environment_token()
                    .context("GITHUB_TOKEN environment variable not found or invalid")?;
                Ok((AuthStrategy::EnvironmentToken, token))
            }
            other => Err(anyhow!("Unknown auth method: {}", other)),
        }
    }

    /// Try to get token from GitHub CLI
    fn try_github_cli() -> Result<String> {
        debug!("Attempting GitHub CLI authentication");

        if !Self::is_command_available("gh") {
            return Err(anyhow!("GitHub CLI (gh) is not installed"));
        }

        let auth_status = Command::new("gh")
            .args(["auth", "status"])
            .output()
            .context("Failed to check GitHub CLI auth status")?;

        if !auth_status.status.success() {
            return Err(anyhow!(
                "GitHub CLI is not authenticated. Run: gh auth login"
            ));
        }

        let token_output = Command::new("gh")
            .args(["auth", "token"])
            .output()
            .context("Failed to get GitHub CLI token")?;

        if !token_output.status.success() {
            return Err(anyhow!(
                "Failed to retrieve token from GitHub CLI: {}",
                String::from_utf8_lossy(&token_output.stderr)
            ));
        }

        let token = String::from_utf8(token_output.stdout)
            .context("GitHub CLI token is not valid UTF-8")?
            .trim()
            .to_string();

        if token.is_empty() {
            return Err(anyhow!("GitHub CLI returned empty token"));
        }

        debug!("Successfully obtained token from GitHub CLI");
        Ok(token)
    }

    /// Try to get token from environment variable
    fn try_environment_token() -> Result<String> {
        debug!("Attempting environment variable authentication");

        let token =
            env::var("GITHUB_TOKEN").context("GITHUB_TOKEN environment variable not set")?;

        if token.is_empty() {
            return Err(anyhow!("GITHUB_TOKEN is empty"));
        }

        if !token.starts_with("ghp_") && !token.starts_with("gho_") && !token.starts_with("ghs_") {
            warn!("GITHUB_TOKEN doesn't look like a valid GitHub token (should start with ghp_, gho_, or ghs_)");
        }

        debug!("Successfully found GITHUB_TOKEN environment variable");
        Ok(token)
    }

    /// Check if a command is available in PATH
    fn is_command_available(command: &str) -> bool {
        Command::new("which")
            .arg(command)
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Get the authenticated (or overridden) username
    pub fn username(&self) -> &str {
        &self.username
    }
}

/// Extract the HTTP status from an API-level octocrab error.
fn error_status(err: &octocrab::Error) -> Option<u16> {
    match err {
        octocrab::Error::GitHub { source, .. } => Some(source.status_code.as_u16()),
        _ => None,
    }
}

/// Map an octocrab error to the provider error taxonomy.
fn map_api_error(err: octocrab::Error) -> ProviderError {
    match err {
        octocrab::Error::GitHub { source, .. } => ProviderError::Api {
            status: source.status_code.as_u16(),
            message: source.message.clone(),
        },
        other => ProviderError::Transport(other.to_string()),
    }
}

/// GitHub reports a taken repository name as a 422 with a well-known message.
fn is_duplicate_name_error(
    status: u16,
    message: &str,
    errors: Option<&Vec<serde_json::Value>>,
) -> bool {
    if status != 422 {
        return false;
    }

    if message.to_lowercase().contains("name already exists") {
        return true;
    }

    errors
        .map(|list| {
            list.iter().any(|entry| {
                entry
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(|m| m.contains("name already exists"))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

#[async_trait]
impl DestinationProvider for GitHubClient {
    fn owner_login(&self) -> &str {
        &self.username
    }

    async fn find_repository(
        &self,
        name: &str,
    ) -> Result<Option<DestinationRepository>, ProviderError> {
        match self.client.repos(&self.username, name).get().await {
            Ok(_) => Ok(Some(DestinationRepository {
                name: name.to_string(),
                owner: self.username.clone(),
            })),
            Err(err) if error_status(&err) == Some(404) => Ok(None),
            Err(err) => Err(map_api_error(err)),
        }
    }

    async fn create_repository(
        &self,
        name: &str,
        private: bool,
        description: &str,
    ) -> Result<DestinationRepository, CreateRepoError> {
        let body = serde_json::json!({
            "name": name,
            "private": private,
            "description": description,
        });

        let result: Result<CreatedRepo, octocrab::Error> =
            self.client.post("/user/repos", Some(&body)).await;

        match result {
            Ok(created) => {
                info!("Created GitHub repository {}/{}", self.username, created.name);
                Ok(DestinationRepository {
                    name: created.name,
                    owner: self.username.clone(),
                })
            }
            Err(octocrab::Error::GitHub { source, .. })
                if is_duplicate_name_error(
                    source.status_code.as_u16(),
                    &source.message,
                    source.errors.as_ref(),
                ) =>
            {
                Err(CreateRepoError::NameAlreadyExists(name.to_string()))
            }
            Err(err) => Err(CreateRepoError::Other(map_api_error(err))),
        }
    }

    async fn latest_commit(
        &self,
        repo: &DestinationRepository,
        branch: &str,
    ) -> Result<Option<String>, ProviderError> {
        let route = format!("/repos/{}/{}/branches/{}", repo.owner, repo.name, branch);

        let result: Result<BranchPayload, octocrab::Error> =
            self.client.get(&route, None::<&()>).await;

        match result {
            Ok(payload) => Ok(Some(payload.commit.sha)),
            // Absent branch on a new or empty repository is a clean observation
            Err(err) if error_status(&err) == Some(404) => Ok(None),
            Err(err) => Err(map_api_error(err)),
        }
    }

    async fn branch_names(
        &self,
        repo: &DestinationRepository,
    ) -> Result<BTreeSet<String>, ProviderError> {
        let mut branches = BTreeSet::new();
        let mut page = 1u32;

        loop {
            let route = format!(
                "/repos/{}/{}/branches?per_page={}&page={}",
                repo.owner, repo.name, PAGE_SIZE, page
            );

            let page_branches: Vec<BranchPayload> = self
                .client
                .get(&route, None::<&()>)
                .await
                .map_err(map_api_error)?;

            let count = page_branches.len();
            branches.extend(page_branches.into_iter().map(|b| b.name));

            // A partial page means we've reached the end
            if count < PAGE_SIZE as usize {
                break;
            }

            page += 1;
        }

        Ok(branches)
    }

    fn push_url(&self, name: &str, transport: TransportMode) -> String {
        match transport {
            TransportMode::Ssh => format!("git@github.com:{}/{}.git", self.username, name),
            TransportMode::Https => {
                format!("https://{}@github.com/{}/{}.git", self.token, self.username, name)
            }
        }
    }
}
