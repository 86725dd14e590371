//! Sync Engine - drives the reconciliation-and-mirror run
//!
//! This module provides the per-repository driver and the sequential run
//! loop over all source repositories. One repository's failure of any kind
//! is demoted to a logged outcome; only upfront authentication or listing
//! failure aborts a run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::compare::{StateComparator, SyncDecision};
use crate::config::Config;
use crate::github::GitHubClient;
use crate::gitlab::GitLabClient;
use crate::provider::{DestinationProvider, RepositoryDescriptor, SourceProvider};
use crate::provision::DestinationProvisioner;
use crate::sanitize::{sanitize_description, sanitize_repo_name};
use crate::transfer::{MirrorTransfer, TransferOutcome};

/// Outcome of one repository's handling
#[derive(Debug)]
pub enum RepoOutcome {
    /// Destination already matched the source
    UpToDate { name: String },
    /// A mirror transfer ran; `verified` reports the post-transfer re-check
    Synced { name: String, verified: bool },
    /// Repository was deliberately not processed
    Skipped { name: String, reason: String },
    /// Operation failed with error
    Failed { name: String, error: String },
}

/// Results from a complete mirroring run
#[derive(Debug)]
pub struct SyncSummary {
    pub total_repositories: usize,
    pub synced: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration: Duration,
    pub results: Vec<RepoOutcome>,
}

/// What a real run would do, reported by dry-run mode
#[derive(Debug)]
pub enum PlannedAction {
    /// Destination does not exist yet: create it and transfer
    CreateAndSync { destination: String },
    /// Destination exists but differs
    Sync {
        destination: String,
        decision: SyncDecision,
    },
    /// Destination already matches
    Nothing { destination: String },
    /// Repository would not be processed
    Skip { reason: String },
}

/// The engine that drives a full mirroring run
pub struct SyncEngine {
    config: Arc<Config>,
    source: Arc<dyn SourceProvider>,
    destination: Arc<dyn DestinationProvider>,
    transfer: MirrorTransfer,
}

impl SyncEngine {
    /// Create an engine over already-connected providers.
    pub fn new(
        config: Config,
        source: Arc<dyn SourceProvider>,
        destination: Arc<dyn DestinationProvider>,
    ) -> Self {
        let transfer = MirrorTransfer::new(config.workdir_root());
        Self {
            config: Arc::new(config),
            source,
            destination,
            transfer,
        }
    }

    /// Connect both platform clients and build the engine. Authentication
    /// failure on either platform is fatal to the run.
    pub async fn connect(config: Config) -> Result<Self> {
        let source = GitLabClient::new(&config)
            .await
            .context("Failed to connect to GitLab")?;
        let destination = GitHubClient::new(&config)
            .await
            .context("Failed to connect to GitHub")?;

        Ok(Self::new(config, Arc::new(source), Arc::new(destination)))
    }

    /// Run a complete mirroring pass over every owned source repository.
    pub async fn run_sync(&self) -> Result<SyncSummary> {
        let start_time = Instant::now();

        info!("Starting repository mirroring run");

        let repositories = self
            .source
            .list_owned_repositories()
            .await
            .context("Failed to list source repositories")?;

        info!("Processing {} source repositories", repositories.len());

        let collisions = collision_groups(&repositories);

        let mut results = Vec::with_capacity(repositories.len());
        for repo in &repositories {
            let outcome = self.process_with_limits(repo, &collisions).await;
            log_outcome(&outcome);
            results.push(outcome);
        }

        let summary = compile_summary(results, start_time.elapsed());

        info!(
            "Run completed in {:.2}s: {} synced, {} up to date, {} skipped, {} failed",
            summary.duration.as_secs_f64(),
            summary.synced,
            summary.up_to_date,
            summary.skipped,
            summary.failed
        );

        Ok(summary)
    }

    /// Analyze without transferring: report what a real run would do.
    pub async fn plan(&self) -> Result<Vec<(String, PlannedAction)>> {
        let repositories = self
            .source
            .list_owned_repositories()
            .await
            .context("Failed to list source repositories")?;

        let collisions = collision_groups(&repositories);
        let comparator = StateComparator::new(self.source.as_ref(), self.destination.as_ref());

        let mut planned = Vec::with_capacity(repositories.len());
        for repo in &repositories {
            let action = self.plan_one(repo, &collisions, &comparator).await;
            planned.push((repo.name.clone(), action));
        }

        Ok(planned)
    }

    async fn plan_one(
        &self,
        repo: &RepositoryDescriptor,
        collisions: &HashSet<String>,
        comparator: &StateComparator<'_>,
    ) -> PlannedAction {
        if let Some(pattern) = matching_exclusion(&repo.name, &self.config.sync.exclude_patterns) {
            return PlannedAction::Skip {
                reason: format!("matches exclusion pattern `{pattern}`"),
            };
        }

        let destination_name = sanitize_repo_name(&repo.name);
        if destination_name.is_empty() || collisions.contains(&destination_name) {
            return PlannedAction::Skip {
                reason: format!("destination name `{destination_name}` is unusable"),
            };
        }

        match self.destination.find_repository(&destination_name).await {
            Ok(None) => PlannedAction::CreateAndSync {
                destination: destination_name,
            },
            Ok(Some(existing)) => match comparator.decide(repo, &existing).await {
                SyncDecision::UpToDate => PlannedAction::Nothing {
                    destination: destination_name,
                },
                decision => PlannedAction::Sync {
                    destination: destination_name,
                    decision,
                },
            },
            Err(err) => PlannedAction::Skip {
                reason: format!("destination lookup failed: {err}"),
            },
        }
    }

    /// Apply the pre-flight gates and the per-repository time budget, and
    /// demote every error to an outcome. This is the single catch point:
    /// nothing crosses a repository-iteration boundary.
    async fn process_with_limits(
        &self,
        repo: &RepositoryDescriptor,
        collisions: &HashSet<String>,
    ) -> RepoOutcome {
        if let Some(pattern) = matching_exclusion(&repo.name, &self.config.sync.exclude_patterns) {
            return RepoOutcome::Skipped {
                name: repo.name.clone(),
                reason: format!("matches exclusion pattern `{pattern}`"),
            };
        }

        let destination_name = sanitize_repo_name(&repo.name);
        if destination_name.is_empty() {
            return RepoOutcome::Failed {
                name: repo.name.clone(),
                error: "repository name sanitizes to an empty string".to_string(),
            };
        }
        if collisions.contains(&destination_name) {
            return RepoOutcome::Failed {
                name: repo.name.clone(),
                error: format!(
                    "destination name `{destination_name}` collides with another source repository"
                ),
            };
        }

        let budget = self.config.per_repo_timeout();
        match timeout(budget, self.process_repository(repo, &destination_name)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => RepoOutcome::Failed {
                name: repo.name.clone(),
                error: format!("{err:#}"),
            },
            Err(_) => RepoOutcome::Failed {
                name: repo.name.clone(),
                error: format!("timed out after {}s", budget.as_secs()),
            },
        }
    }

    async fn process_repository(
        &self,
        repo: &RepositoryDescriptor,
        destination_name: &str,
    ) -> Result<RepoOutcome> {
        info!("Examining repository: {} -> {}", repo.name, destination_name);

        let provisioner = DestinationProvisioner::new(self.destination.as_ref());
        let description = sanitize_description(repo.description.as_deref());

        let (destination, existed) = provisioner
            .ensure_repository(destination_name, repo.visibility.is_private(), &description)
            .await
            .with_context(|| format!("Failed to provision destination {destination_name}"))?;

        let comparator = StateComparator::new(self.source.as_ref(), self.destination.as_ref());

        if existed {
            match comparator.decide(repo, &destination).await {
                SyncDecision::UpToDate => {
                    return Ok(RepoOutcome::UpToDate {
                        name: repo.name.clone(),
                    });
                }
                SyncDecision::NeedsSync => {
                    info!(
                        "Differences detected in {}, starting transfer",
                        destination.full_name()
                    );
                }
                SyncDecision::VerificationFailedForceSync => {
                    warn!(
                        "State of {} could not be verified, forcing a transfer",
                        destination.full_name()
                    );
                }
            }
        }

        let transport = self.config.sync.transport;
        let source_url = repo.clone_url(transport);
        let destination_url = self.destination.push_url(destination_name, transport);

        match self
            .transfer
            .transfer(destination_name, source_url, &destination_url)
            .await
        {
            TransferOutcome::Success => {
                let verified =
                    matches!(comparator.decide(repo, &destination).await, SyncDecision::UpToDate);
                if !verified {
                    warn!(
                        "Post-transfer verification of {} did not converge; a concurrent \
                         source push may have raced it",
                        destination.full_name()
                    );
                }
                Ok(RepoOutcome::Synced {
                    name: repo.name.clone(),
                    verified,
                })
            }
            failure => Ok(RepoOutcome::Failed {
                name: repo.name.clone(),
                error: failure.describe(),
            }),
        }
    }

    /// Get configuration for external inspection
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Destination names claimed by more than one distinct source repository.
/// Every member of a colliding group is a configuration error; none of them
/// may silently overwrite the shared destination.
fn collision_groups(repositories: &[RepositoryDescriptor]) -> HashSet<String> {
    let mut owners: HashMap<String, &str> = HashMap::new();
    let mut collisions = HashSet::new();

    for repo in repositories {
        let sanitized = sanitize_repo_name(&repo.name);
        match owners.get(sanitized.as_str()) {
            Some(first) if *first != repo.name => {
                collisions.insert(sanitized);
            }
            Some(_) => {}
            None => {
                owners.insert(sanitized, &repo.name);
            }
        }
    }

    collisions
}

/// First exclusion pattern matching `name`, if any. Patterns are literal
/// names or simple globs with `*`.
fn matching_exclusion<'p>(name: &str, patterns: &'p [String]) -> Option<&'p str> {
    patterns.iter().map(String::as_str).find(|pattern| {
        if pattern.contains('*') {
            let pattern_regex = pattern.replace('.', r"\.").replace('*', ".*");

            regex::Regex::new(&format!("^{}$", pattern_regex))
                .map(|re| re.is_match(name))
                .unwrap_or(false)
        } else {
            name == *pattern
        }
    })
}

fn log_outcome(outcome: &RepoOutcome) {
    match outcome {
        RepoOutcome::UpToDate { name } => {
            info!("{} is fully up to date (commits and branch structure)", name);
        }
        RepoOutcome::Synced { name, verified } => {
            if *verified {
                info!("{} synchronized and verified", name);
            } else {
                warn!("{} synchronized, post-transfer verification inconclusive", name);
            }
        }
        RepoOutcome::Skipped { name, reason } => {
            info!("{} skipped: {}", name, reason);
        }
        RepoOutcome::Failed { name, error } => {
            error!("{} failed: {}", name, error);
        }
    }
}

/// Compile the run summary from per-repository outcomes
fn compile_summary(results: Vec<RepoOutcome>, duration: Duration) -> SyncSummary {
    let total_repositories = results.len();
    let mut synced = 0;
    let mut up_to_date = 0;
    let mut skipped = 0;
    let mut failed = 0;

    for result in &results {
        match result {
            RepoOutcome::Synced { .. } => synced += 1,
            RepoOutcome::UpToDate { .. } => up_to_date += 1,
            RepoOutcome::Skipped { .. } => skipped += 1,
            RepoOutcome::Failed { .. } => failed += 1,
        }
    }

    SyncSummary {
        total_repositories,
        synced,
        up_to_date,
        skipped,
        failed,
        duration,
        results,
    }
}
