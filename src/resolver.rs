// src/resolver.rs

//! Install decision for a requested version
//!
//! The decision depends on three facts about on-disk state (is there a
//! current release, does the requested version equal it, is the requested
//! version in the release history) plus the force flag. Version strings are
//! opaque; no ordering is assumed.

use strum_macros::Display;
use tracing::info;

/// Outcome of version resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum InstallDecision {
    /// New version: unpack and link a fresh release
    Install,
    /// The version is current or already in the release history
    AlreadyCurrent,
    /// Redeploy regardless of state
    ForceInstall,
}

impl InstallDecision {
    /// True if the release should be (re)installed
    pub fn should_install(self) -> bool {
        !matches!(self, Self::AlreadyCurrent)
    }
}

/// Decide from the three boolean facts.
///
/// Total over every combination. `equals_current` without `has_current`
/// cannot arise from real state and resolves as if there were no current
/// release.
pub fn decide(force: bool, has_current: bool, equals_current: bool, in_history: bool) -> InstallDecision {
    if force {
        InstallDecision::ForceInstall
    } else if !has_current || (!equals_current && !in_history) {
        InstallDecision::Install
    } else {
        InstallDecision::AlreadyCurrent
    }
}

/// Resolve the decision for `requested` against the current pointer and the
/// (current-excluded) release history.
pub fn resolve(
    current: Option<&str>,
    history: &[String],
    requested: &str,
    force: bool,
) -> InstallDecision {
    let decision = decide(
        force,
        current.is_some(),
        current == Some(requested),
        history.iter().any(|v| v == requested),
    );

    match decision {
        InstallDecision::ForceInstall => info!("Force-installing version {}", requested),
        InstallDecision::Install => info!("Installing new version {}", requested),
        InstallDecision::AlreadyCurrent => {
            info!("Version {} has already been installed", requested)
        }
    }
    decision
}
