// src/retention.rs

//! Bounded release history
//!
//! After each deploy the oldest non-current releases beyond `keep` are
//! deleted, cache copy included. The current release is never a candidate.

use crate::error::{Error, Result};
use crate::release::{Release, ReleaseStore};
use crate::target::DeploymentTarget;
use tracing::{debug, info, warn};

/// Versions to delete from an oldest-first list of previous releases
pub fn select_for_pruning<'r>(
    previous: &'r [Release],
    keep: usize,
    current: Option<&str>,
) -> Vec<&'r Release> {
    let candidates: Vec<&Release> = previous
        .iter()
        .filter(|release| Some(release.version.as_str()) != current)
        .collect();

    if candidates.len() <= keep {
        return Vec::new();
    }
    let excess = candidates.len() - keep;
    candidates.into_iter().take(excess).collect()
}

/// Deletes releases beyond the target's `keep`
pub struct RetentionManager<'a> {
    target: &'a DeploymentTarget,
}

impl<'a> RetentionManager<'a> {
    pub fn new(target: &'a DeploymentTarget) -> Self {
        Self { target }
    }

    /// Delete the oldest releases beyond `keep`. Returns the pruned versions.
    ///
    /// Every candidate is attempted; if any deletion failed the run fails
    /// with [`Error::Prune`] naming them.
    pub fn prune(&self) -> Result<Vec<String>> {
        let store = ReleaseStore::new(self.target);
        let current = store.current_version()?;
        let previous = store.list_releases_excluding(current.as_deref())?;
        let keep = self.target.keep();

        let doomed = select_for_pruning(&previous, keep, current.as_deref());
        if doomed.is_empty() {
            debug!(
                "{} previous release(s), keeping up to {}; nothing to prune",
                previous.len(),
                keep
            );
            return Ok(Vec::new());
        }

        info!(
            "Keeping {} of {} previous releases, removing {}",
            keep,
            previous.len(),
            doomed.len()
        );

        let mut pruned = Vec::new();
        let mut failed = Vec::new();
        for release in doomed {
            info!("Removing old release {}", release.version);
            match store.delete_release(&release.version) {
                Ok(()) => pruned.push(release.version.clone()),
                Err(e) => {
                    warn!("Failed to remove release {}: {}", release.version, e);
                    failed.push(release.version.clone());
                }
            }
        }

        if failed.is_empty() {
            Ok(pruned)
        } else {
            Err(Error::Prune(failed))
        }
    }
}
