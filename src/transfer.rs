//! Mirror transfer engine
//!
//! One transfer stages a full mirror clone of the source repository inside an
//! ephemeral working area, re-points the clone's remote at the destination,
//! and performs a forced mirror push. The mirror push is what makes "sync"
//! mean "identical ref set": every destination ref is updated to match the
//! source exactly, including deleting refs that no longer exist there.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tempfile::{Builder, TempDir};
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info, warn};

/// Remote name the mirror push targets.
const DESTINATION_REMOTE: &str = "mirror";

/// Bounded retry schedule for working-area removal. Some platforms release
/// directory handles of a just-finished git process with a delay.
const REMOVE_RETRIES: u32 = 5;
const REMOVE_BACKOFF: Duration = Duration::from_millis(50);

/// Result of a mirror transfer attempt
#[derive(Debug)]
pub enum TransferOutcome {
    /// Every ref on the destination now matches the source
    Success,
    /// The mirror clone from the source failed
    CloneFailed { cause: String },
    /// Removing or adding a remote in the working copy failed
    RemoteConfigFailed { cause: String },
    /// The mirror push to the destination failed
    PushFailed { cause: String },
    /// Anything outside the three git steps failed
    UnexpectedError { cause: String },
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success)
    }

    /// Human-readable step + cause for logging.
    pub fn describe(&self) -> String {
        match self {
            TransferOutcome::Success => "success".to_string(),
            TransferOutcome::CloneFailed { cause } => format!("mirror clone failed: {cause}"),
            TransferOutcome::RemoteConfigFailed { cause } => {
                format!("remote configuration failed: {cause}")
            }
            TransferOutcome::PushFailed { cause } => format!("mirror push failed: {cause}"),
            TransferOutcome::UnexpectedError { cause } => format!("unexpected error: {cause}"),
        }
    }
}

/// Ephemeral, uniquely named filesystem scope holding one bare mirror clone.
///
/// The directory is removed on every exit path: explicitly through
/// [`WorkingArea::remove`] with a bounded retry, or best-effort on drop if a
/// transfer panics or is cancelled mid-flight.
pub struct WorkingArea {
    dir: TempDir,
}

impl WorkingArea {
    /// Create a fresh working area, uniquely named with `key` as prefix so
    /// repeated runs against the same repository never collide.
    pub fn create(root: Option<&Path>, key: &str) -> Result<Self> {
        let prefix = format!("{key}_");
        let mut builder = Builder::new();
        builder.prefix(&prefix);

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root).with_context(|| {
                    format!("Failed to create working-area root {}", root.display())
                })?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .context("Failed to create working area")?;

        debug!("Created working area {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the working area, retrying with backoff on delayed-release
    /// filesystem errors.
    pub async fn remove(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();

        if self.dir.close().is_ok() {
            return Ok(());
        }

        for attempt in 1..=REMOVE_RETRIES {
            tokio::time::sleep(REMOVE_BACKOFF * attempt).await;

            if !path.exists() {
                return Ok(());
            }

            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt == REMOVE_RETRIES => {
                    return Err(err).with_context(|| {
                        format!("Failed to remove working area {}", path.display())
                    });
                }
                Err(err) => {
                    debug!(
                        "Retrying working-area removal for {}: {}",
                        path.display(),
                        err
                    );
                }
            }
        }

        Ok(())
    }
}

/// Executes mirror transfers, one repository at a time.
pub struct MirrorTransfer {
    workdir_root: Option<PathBuf>,
}

impl MirrorTransfer {
    /// `workdir_root` overrides where working areas are created; the system
    /// temp directory is used when absent.
    pub fn new(workdir_root: Option<PathBuf>) -> Self {
        Self { workdir_root }
    }

    /// Run one full mirror transfer. `key` names the working area (the
    /// destination repository name); the returned outcome never escalates to
    /// an error, and the working area is gone when this returns.
    pub async fn transfer(
        &self,
        key: &str,
        source_url: &str,
        destination_url: &str,
    ) -> TransferOutcome {
        let area = match WorkingArea::create(self.workdir_root.as_deref(), key) {
            Ok(area) => area,
            Err(err) => {
                return TransferOutcome::UnexpectedError {
                    cause: format!("{err:#}"),
                }
            }
        };

        let outcome = self.run(area.path(), source_url, destination_url).await;

        // All handles tied to this transfer must be released before the next
        // repository starts; a lingering handle on a similarly named path can
        // fail its clone.
        if let Err(err) = area.remove().await {
            warn!("Working-area cleanup for {} failed: {:#}", key, err);
        }

        outcome
    }

    async fn run(&self, workdir: &Path, source_url: &str, destination_url: &str) -> TransferOutcome {
        info!("Mirror-cloning from {}", source_url);
        if let Err(cause) = git(workdir, &["clone", "--mirror", source_url, "."]).await {
            return TransferOutcome::CloneFailed {
                cause: redact_secrets(&cause, destination_url),
            };
        }

        // The clone's own remote would leave two candidates on a re-pointed
        // working copy; drop it before adding the destination remote.
        if let Err(cause) = git(workdir, &["remote", "remove", "origin"]).await {
            if !cause.contains("No such remote") {
                return TransferOutcome::RemoteConfigFailed {
                    cause: redact_secrets(&cause, destination_url),
                };
            }
        }

        if let Err(cause) = git(workdir, &["remote", "add", DESTINATION_REMOTE, destination_url]).await
        {
            return TransferOutcome::RemoteConfigFailed {
                cause: redact_secrets(&cause, destination_url),
            };
        }

        info!("Mirror-pushing to {}", display_url(destination_url));
        if let Err(cause) = git(workdir, &["push", "--mirror", DESTINATION_REMOTE]).await {
            return TransferOutcome::PushFailed {
                cause: redact_secrets(&cause, destination_url),
            };
        }

        TransferOutcome::Success
    }
}

/// Run one git command, mapping a non-zero exit to its stderr text.
async fn git(workdir: &Path, args: &[&str]) -> Result<(), String> {
    debug!("git {} in {}", args.join(" "), workdir.display());

    let output = AsyncCommand::new("git")
        .args(args)
        .current_dir(workdir)
        .output()
        .await
        .map_err(|err| format!("failed to execute git: {err}"))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}

/// Replace any occurrence of the credentialed destination URL in `text` with
/// its redacted form, so embedded tokens never reach logs or error causes.
fn redact_secrets(text: &str, destination_url: &str) -> String {
    match redact_userinfo(destination_url) {
        Some(clean) => text.replace(destination_url, &clean),
        None => text.to_string(),
    }
}

/// Display form of a push URL with the userinfo (token) masked.
fn display_url(url: &str) -> String {
    redact_userinfo(url).unwrap_or_else(|| url.to_string())
}

fn redact_userinfo(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let (userinfo, host) = rest.split_once('@')?;
    if userinfo.is_empty() {
        return None;
    }
    Some(format!("{scheme}://***@{host}"))
}
