//! Idempotent provisioning of destination repositories

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::provider::{
    CreateRepoError, DestinationProvider, DestinationRepository, ProviderError,
};

/// Provisioning failed for one repository. Never fatal to the run; the
/// orchestrator logs it and moves on.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("destination lookup failed: {0}")]
    Lookup(#[source] ProviderError),

    #[error("destination creation failed: {0}")]
    Create(#[source] ProviderError),

    #[error("destination reported the name as taken but lookup finds nothing")]
    Unresolvable,
}

/// Ensures a destination repository exists before comparison and transfer.
pub struct DestinationProvisioner<'a> {
    provider: &'a dyn DestinationProvider,
}

impl<'a> DestinationProvisioner<'a> {
    pub fn new(provider: &'a dyn DestinationProvider) -> Self {
        Self { provider }
    }

    /// Get-or-create by name. Returns the repository handle and whether it
    /// already existed. Metadata of an existing repository is never updated.
    pub async fn ensure_repository(
        &self,
        name: &str,
        private: bool,
        description: &str,
    ) -> Result<(DestinationRepository, bool), ProvisionError> {
        if let Some(existing) = self
            .provider
            .find_repository(name)
            .await
            .map_err(ProvisionError::Lookup)?
        {
            debug!("Destination repository {} already exists", existing.full_name());
            return Ok((existing, true));
        }

        match self
            .provider
            .create_repository(name, private, description)
            .await
        {
            Ok(created) => {
                info!("Provisioned destination repository {}", created.full_name());
                Ok((created, false))
            }
            Err(CreateRepoError::NameAlreadyExists(_)) => {
                // Lost a creation race or the platform knows the name under a
                // lookup we missed; re-resolve and use what is there.
                warn!(
                    "Destination repository {} appeared concurrently, re-resolving",
                    name
                );
                match self
                    .provider
                    .find_repository(name)
                    .await
                    .map_err(ProvisionError::Lookup)?
                {
                    Some(existing) => Ok((existing, true)),
                    None => Err(ProvisionError::Unresolvable),
                }
            }
            Err(CreateRepoError::Other(err)) => Err(ProvisionError::Create(err)),
        }
    }
}
