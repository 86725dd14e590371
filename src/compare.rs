//! Staleness detection between a source repository and its mirror
//!
//! The comparison is deliberately conservative: a false "needs sync" costs
//! one redundant transfer, while a false "up to date" silently diverges
//! history. Any lookup failure therefore forces a transfer instead of
//! skipping one.

use tracing::warn;

use crate::provider::{
    DestinationProvider, DestinationRepository, ProviderError, RepositoryDescriptor, SourceProvider,
};

/// Whether a mirror transfer is required for one repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// Commit ids and branch sets match on both sides
    UpToDate,
    /// An observed difference requires a transfer
    NeedsSync,
    /// State could not be verified cleanly; transfer rather than skip
    VerificationFailedForceSync,
}

impl SyncDecision {
    /// Everything except a confirmed match triggers a transfer.
    pub fn requires_transfer(self) -> bool {
        !matches!(self, SyncDecision::UpToDate)
    }
}

/// Compares observed source and destination state to produce a [`SyncDecision`].
pub struct StateComparator<'a> {
    source: &'a dyn SourceProvider,
    destination: &'a dyn DestinationProvider,
}

impl<'a> StateComparator<'a> {
    pub fn new(source: &'a dyn SourceProvider, destination: &'a dyn DestinationProvider) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Decide whether `destination` is stale relative to `source`.
    ///
    /// The destination repository is expected to exist; provisioning happens
    /// before comparison.
    pub async fn decide(
        &self,
        source: &RepositoryDescriptor,
        destination: &DestinationRepository,
    ) -> SyncDecision {
        match self.observe(source, destination).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!(
                    "Could not verify state of {}, forcing a transfer: {}",
                    destination.full_name(),
                    err
                );
                SyncDecision::VerificationFailedForceSync
            }
        }
    }

    async fn observe(
        &self,
        source: &RepositoryDescriptor,
        destination: &DestinationRepository,
    ) -> Result<SyncDecision, ProviderError> {
        let branch = source.comparison_branch();

        let source_commit = self.source.latest_commit(source, branch).await?;
        let destination_commit = self.destination.latest_commit(destination, branch).await?;

        // A missing commit on either side (new or empty repository) is a
        // clean observation that already settles the decision.
        let (Some(source_commit), Some(destination_commit)) =
            (source_commit, destination_commit)
        else {
            return Ok(SyncDecision::NeedsSync);
        };

        if source_commit != destination_commit {
            return Ok(SyncDecision::NeedsSync);
        }

        let source_branches = self.source.branch_names(source).await?;
        let destination_branches = self.destination.branch_names(destination).await?;

        if source_branches == destination_branches {
            Ok(SyncDecision::UpToDate)
        } else {
            Ok(SyncDecision::NeedsSync)
        }
    }
}
