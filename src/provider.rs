//! Platform abstraction layer
//!
//! This module defines the provider-agnostic view of the two hosting
//! platforms: a [`SourceProvider`] the repositories are read from and a
//! [`DestinationProvider`] they are mirrored into. Concrete implementations
//! live in [`crate::gitlab`] and [`crate::github`].

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::TransportMode;

/// Repository visibility on either platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Private,
    Public,
}

impl Visibility {
    /// Whether the mirrored copy must be created as a private repository.
    pub fn is_private(self) -> bool {
        matches!(self, Visibility::Private)
    }
}

/// Immutable snapshot of one source repository, fetched once per sync attempt.
#[derive(Debug, Clone)]
pub struct RepositoryDescriptor {
    /// Source platform project id.
    pub id: u64,

    /// Repository name as it appears on the source platform.
    pub name: String,

    /// Visibility of the source repository.
    pub visibility: Visibility,

    /// Free-text description, unsanitized.
    pub description: Option<String>,

    /// Default branch name, if the platform reports one.
    pub default_branch: Option<String>,

    /// SSH clone URL.
    pub ssh_url: String,

    /// HTTPS clone URL.
    pub http_url: String,
}

impl RepositoryDescriptor {
    /// The branch used for staleness comparison. Platforms may omit the
    /// default branch on empty repositories; `main` is assumed then.
    pub fn comparison_branch(&self) -> &str {
        self.default_branch.as_deref().unwrap_or("main")
    }

    /// Clone URL for the configured transport mode.
    pub fn clone_url(&self, transport: TransportMode) -> &str {
        match transport {
            TransportMode::Ssh => &self.ssh_url,
            TransportMode::Https => &self.http_url,
        }
    }
}

/// Handle to a repository that exists on the destination platform.
///
/// Carries identity only; branch and commit queries go through the
/// [`DestinationProvider`] that produced it. All content mutation happens via
/// the mirror push against the repository's git endpoint, never through this
/// handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationRepository {
    pub name: String,
    pub owner: String,
}

impl DestinationRepository {
    /// Display name in `owner/name` form.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// A provider call failed outright. Clean "not found" observations are not
/// errors; lookups return `Ok(None)` for those.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("response decode error: {0}")]
    Decode(String),
}

/// Failure modes of repository creation, with the duplicate-name condition
/// kept distinguishable so the provisioner can re-resolve by lookup.
#[derive(Debug, Error)]
pub enum CreateRepoError {
    #[error("a repository named {0} already exists on the destination account")]
    NameAlreadyExists(String),

    #[error(transparent)]
    Other(#[from] ProviderError),
}

/// Read access to the account whose repositories are being mirrored.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// All repositories owned by the authenticated account. A failure here
    /// is fatal to the whole run.
    async fn list_owned_repositories(&self) -> Result<Vec<RepositoryDescriptor>, ProviderError>;

    /// Latest commit id on the named branch, or `None` if the branch does
    /// not exist (a legitimate observation, not an error).
    async fn latest_commit(
        &self,
        repo: &RepositoryDescriptor,
        branch: &str,
    ) -> Result<Option<String>, ProviderError>;

    /// The full set of branch names.
    async fn branch_names(
        &self,
        repo: &RepositoryDescriptor,
    ) -> Result<BTreeSet<String>, ProviderError>;
}

/// Lookup, creation, and state queries against the mirror target account.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DestinationProvider: Send + Sync {
    /// Login of the account the mirrors are created under.
    fn owner_login(&self) -> &str;

    /// Look up a repository by name. `Ok(None)` means it does not exist.
    async fn find_repository(
        &self,
        name: &str,
    ) -> Result<Option<DestinationRepository>, ProviderError>;

    /// Create a repository with the given visibility and description.
    async fn create_repository(
        &self,
        name: &str,
        private: bool,
        description: &str,
    ) -> Result<DestinationRepository, CreateRepoError>;

    /// Latest commit id on the named branch, or `None` if the branch does
    /// not exist (new or empty repositories report no commit).
    async fn latest_commit(
        &self,
        repo: &DestinationRepository,
        branch: &str,
    ) -> Result<Option<String>, ProviderError>;

    /// The full set of branch names.
    async fn branch_names(
        &self,
        repo: &DestinationRepository,
    ) -> Result<BTreeSet<String>, ProviderError>;

    /// Git endpoint the mirror push targets, credentials embedded for HTTPS.
    fn push_url(&self, name: &str, transport: TransportMode) -> String;
}
