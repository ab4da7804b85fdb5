// src/deploy.rs

//! Deployment controller
//!
//! Drives one target through resolution, retrieval, unpacking, linking,
//! hooks and pruning. Each step is idempotent, so a run that failed halfway
//! is completed by simply running again.
//!
//! ```text
//! Idle -> Resolving -> Fetching -> (Unpacking) -> Linking -> (Hooks) -> Pruned
//!                 \______________________ any error ______________________/-> Failed
//! ```

use crate::error::Result;
use crate::hooks::HookName;
use crate::links::LinkOrchestrator;
use crate::release::ReleaseStore;
use crate::resolver::{InstallDecision, resolve};
use crate::retention::RetentionManager;
use crate::retrieve::{ArtifactFetcher, ArtifactRetriever, discard_cached};
use crate::target::DeploymentTarget;
use crate::unpack::Unpacker;
use std::path::PathBuf;
use strum_macros::Display;
use tracing::{debug, info, warn};

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DeployState {
    Idle,
    Resolving,
    Fetching,
    Unpacking,
    Linking,
    Hooks,
    Pruned,
    Failed,
}

/// What a deploy run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    pub decision: InstallDecision,
    /// The cached artifact was (re)written this run
    pub artifact_changed: bool,
    /// The release was unpacked and linked this run
    pub installed: bool,
    pub release_path: PathBuf,
    /// Version `current` named before the run
    pub previous_current: Option<String>,
    pub pruned: Vec<String>,
}

/// Runs deploy and pre-seed workflows for one target
pub struct Deployer<'a> {
    target: &'a DeploymentTarget,
    fetcher: Option<&'a dyn ArtifactFetcher>,
    state: DeployState,
}

impl<'a> Deployer<'a> {
    pub fn new(target: &'a DeploymentTarget) -> Self {
        Self {
            target,
            fetcher: None,
            state: DeployState::Idle,
        }
    }

    /// Use `fetcher` for remote artifact locations
    pub fn with_fetcher(mut self, fetcher: &'a dyn ArtifactFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn state(&self) -> DeployState {
        self.state
    }

    fn transition(&mut self, next: DeployState) {
        debug!("{}: {} -> {}", self.target.name(), self.state, next);
        self.state = next;
    }

    fn retriever(&self) -> ArtifactRetriever<'a> {
        let retriever = ArtifactRetriever::new(self.target);
        match self.fetcher {
            Some(fetcher) => retriever.with_fetcher(fetcher),
            None => retriever,
        }
    }

    /// Deploy the target's requested version
    pub fn deploy(&mut self) -> Result<DeployReport> {
        let result = self.run_deploy();
        if let Err(e) = &result {
            warn!(
                "Deploy of {} {} failed while {}: {}",
                self.target.name(),
                self.target.version(),
                self.state,
                e
            );
            self.transition(DeployState::Failed);
        }
        result
    }

    fn run_deploy(&mut self) -> Result<DeployReport> {
        let target = self.target;
        let version = target.version();
        let flags = target.flags();
        let hooks = target.hooks();
        let store = ReleaseStore::new(target);
        let links = LinkOrchestrator::new(target);

        info!(
            "Deploying {} version {} to {}",
            target.name(),
            version,
            target.deploy_to().display()
        );
        self.transition(DeployState::Resolving);

        // Snapshot before the skeleton exists, or the fresh release
        // directory would count as history
        let current = store.current_version()?;
        let history: Vec<String> = store
            .list_releases_excluding(current.as_deref())?
            .into_iter()
            .map(|release| release.version)
            .collect();

        hooks.run(HookName::BeforeDeploy)?;

        let known = current.as_deref() == Some(version) || history.iter().any(|v| v == version);
        if flags.force && flags.remove_on_force && known {
            store.purge_release_dir(version)?;
        }

        store.create_release_skeleton(version)?;
        links.ensure_shared_directories()?;

        let decision = resolve(current.as_deref(), &history, version, flags.force);

        self.transition(DeployState::Fetching);
        let artifact_changed = self.retriever().retrieve()?;
        if artifact_changed {
            info!("Artifact for {} changed", version);
            hooks.run(HookName::AfterDownload)?;
        }

        let release = store.release_path(version);
        let populated = store.is_populated(version)?;
        if !populated && !decision.should_install() {
            info!("Release {} is empty, reinstalling", release.display());
        }
        let installing = decision.should_install() || artifact_changed || !populated;

        if installing {
            self.transition(DeployState::Unpacking);
            hooks.run(HookName::BeforeExtract)?;
            if populated {
                links.detach_links(&release)?;
            }
            let cached = target.cached_artifact_path();
            if let Err(e) = Unpacker::new(target).unpack(&cached, &release) {
                // A kept cache copy would read as unchanged on the next run
                if artifact_changed && let Err(discard) = discard_cached(&cached) {
                    warn!("Failed to discard {}: {}", cached.display(), discard);
                }
                return Err(e);
            }
            hooks.run(HookName::AfterExtract)?;

            self.transition(DeployState::Linking);
            hooks.run(HookName::BeforeSymlink)?;
            links.materialize_links(&release)?;
            hooks.run(HookName::AfterSymlink)?;
        } else {
            self.transition(DeployState::Linking);
        }

        hooks.run(HookName::Configure)?;

        if installing && flags.should_migrate {
            hooks.run(HookName::BeforeMigrate)?;
            hooks.run(HookName::Migrate)?;
            hooks.run(HookName::AfterMigrate)?;
        }

        if let Some(previous) = current.as_deref()
            && previous != version
            && !installing
        {
            info!("Rolling back {} from {} to {}", target.name(), previous, version);
        }
        links.promote_current(&release)?;

        if installing {
            self.transition(DeployState::Hooks);
            hooks.run(HookName::Restart)?;
            hooks.run(HookName::AfterDeploy)?;
        }

        let pruned = RetentionManager::new(target).prune()?;
        self.transition(DeployState::Pruned);

        info!(
            "Deployed {} version {} ({})",
            target.name(),
            version,
            if installing { "installed" } else { "unchanged" }
        );
        Ok(DeployReport {
            decision,
            artifact_changed,
            installed: installing,
            release_path: release,
            previous_current: current,
            pruned,
        })
    }

    /// Create the skeleton and populate the cache without deploying.
    /// Returns true if the cached artifact changed.
    pub fn pre_seed(&mut self) -> Result<bool> {
        info!("Pre-seeding {} version {}", self.target.name(), self.target.version());

        let result = ReleaseStore::new(self.target)
            .create_release_skeleton(self.target.version())
            .and_then(|()| {
                self.transition(DeployState::Fetching);
                self.retriever().retrieve()
            });

        if let Err(e) = &result {
            warn!("Pre-seed of {} failed: {}", self.target.name(), e);
            self.transition(DeployState::Failed);
        }
        result
    }
}
