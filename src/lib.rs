// src/lib.rs

//! Artifact Deploy
//!
//! Idempotent deployment of a single artifact lineage into a release
//! directory tree, with shared storage links, lifecycle hooks and bounded
//! release history.
//!
//! # Architecture
//!
//! - Disk is the ledger: the `current` link, release directory mtimes and
//!   the `.symlinks` fallback record are the only state
//! - Content, not version strings, decides whether an artifact changed
//! - The release `current` names is never deleted by pruning
//! - Every step is idempotent; a failed run is finished by re-running it

pub mod config;
pub mod deploy;
mod error;
pub mod hash;
pub mod hooks;
pub mod links;
pub mod ownership;
pub mod release;
pub mod resolver;
pub mod retention;
pub mod retrieve;
pub mod target;
pub mod unpack;

pub use config::{DeployConfig, Settings, TargetConfig};
pub use deploy::{DeployReport, DeployState, Deployer};
pub use error::{Error, Result};
pub use hooks::{HookName, Hooks, ShellHook};
pub use links::LinkOrchestrator;
pub use release::{Release, ReleaseStore};
pub use resolver::{InstallDecision, resolve};
pub use retention::RetentionManager;
pub use retrieve::{ArtifactFetcher, ArtifactRetriever};
pub use target::{ArtifactLocation, DeployFlags, DeploymentTarget};
pub use unpack::{ArchiveFormat, Unpacker};
