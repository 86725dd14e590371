//! RepoMirror - One-way GitLab to GitHub repository mirroring
//!
//! RepoMirror keeps the repositories owned by a GitLab account mirrored into
//! equivalently-named repositories on GitHub. Each run decides, per
//! repository, whether the destination is stale, and if so performs a full
//! mirror transfer (all branches, all tags, ref deletions included) and
//! re-verifies the sync afterward.
//!
//! ## Core Features
//!
//! - **Change Detection**: commit and branch-set comparison skips
//!   repositories that are already identical
//! - **Full Mirror Transfers**: `git clone --mirror` + `git push --mirror`
//!   through an ephemeral, auto-cleaned working area
//! - **Idempotent Provisioning**: destination repositories are created on
//!   demand and reused on every later run
//! - **Fault Isolation**: one repository's failure never aborts the run
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`provider`]: Source/destination platform abstractions
//! - [`sync`]: The per-repository driver and run loop

pub mod compare;
pub mod config;
pub mod github;
pub mod gitlab;
pub mod provider;
pub mod provision;
pub mod sanitize;
pub mod sync;
pub mod transfer;

pub use compare::{StateComparator, SyncDecision};
pub use config::{Config, TransportMode};
pub use github::GitHubClient;
pub use gitlab::GitLabClient;
pub use provider::{DestinationProvider, DestinationRepository, RepositoryDescriptor, SourceProvider};
pub use provision::DestinationProvisioner;
pub use sync::{RepoOutcome, SyncEngine, SyncSummary};
pub use transfer::{MirrorTransfer, TransferOutcome, WorkingArea};
