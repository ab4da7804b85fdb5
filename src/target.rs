// src/target.rs

//! Deployment target: one named destination for a single artifact lineage
//!
//! A target is built once per run from validated configuration (see
//! [`crate::config`]) and is immutable afterwards. All on-disk locations
//! are derived here:
//!
//! ```text
//! <deploy_to>/current           -> releases/<version>
//! <deploy_to>/.symlinks         fallback record for `current`
//! <deploy_to>/releases/<version>/
//! <deploy_to>/shared/<name>/
//! <cache_root>/artifact_deploys/<name>/<version>/<basename>
//! ```

use crate::hooks::Hooks;
use crate::ownership::Ownership;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where the artifact comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    /// A file or directory on the local filesystem
    Local(PathBuf),
    /// A URL handed to the remote fetch collaborator
    Remote(String),
}

impl ArtifactLocation {
    /// Classify a configured location: anything with a URL scheme is remote
    pub fn parse(location: &str) -> Self {
        if location.contains("://") {
            Self::Remote(location.to_string())
        } else {
            Self::Local(PathBuf::from(location))
        }
    }

    /// The file name the artifact is cached under
    pub fn basename(&self) -> Option<String> {
        match self {
            Self::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().to_string()),
            Self::Remote(url) => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                path.rsplit('/')
                    .next()
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
            }
        }
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Behavior flags for a deployment run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployFlags {
    /// Extract the artifact (true) or copy it verbatim (false)
    pub is_tarball: bool,
    /// Always redeploy, even if the version is already installed
    pub force: bool,
    /// When forcing, delete the existing release directory first
    pub remove_on_force: bool,
    /// Flatten a single wrapping directory after extraction
    pub remove_top_level_directory: bool,
    /// Run the migrate hooks when a release is installed
    pub should_migrate: bool,
}

impl Default for DeployFlags {
    fn default() -> Self {
        Self {
            is_tarball: true,
            force: false,
            remove_on_force: false,
            remove_top_level_directory: false,
            should_migrate: false,
        }
    }
}

/// A validated deployment target
#[derive(Debug)]
pub struct DeploymentTarget {
    pub(crate) name: String,
    pub(crate) location: ArtifactLocation,
    pub(crate) artifact_basename: String,
    pub(crate) checksum: Option<String>,
    pub(crate) version: String,
    pub(crate) deploy_to: PathBuf,
    pub(crate) cache_root: PathBuf,
    pub(crate) ownership: Ownership,
    pub(crate) keep: usize,
    pub(crate) flags: DeployFlags,
    pub(crate) symlinks: BTreeMap<String, String>,
    pub(crate) shared_directories: Vec<String>,
    pub(crate) environment: BTreeMap<String, String>,
    pub(crate) hooks: Hooks,
}

impl DeploymentTarget {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &ArtifactLocation {
        &self.location
    }

    /// Expected checksum handed to the remote fetcher
    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// The requested version
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn deploy_to(&self) -> &Path {
        &self.deploy_to
    }

    pub fn ownership(&self) -> &Ownership {
        &self.ownership
    }

    /// Number of previous releases retained besides the current one
    pub fn keep(&self) -> usize {
        self.keep
    }

    pub fn flags(&self) -> DeployFlags {
        self.flags
    }

    /// Shared resource name -> path inside the release
    pub fn symlinks(&self) -> &BTreeMap<String, String> {
        &self.symlinks
    }

    pub fn shared_directories(&self) -> &[String] {
        &self.shared_directories
    }

    /// Variables exported to shell hooks
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Replace the hook set
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn releases_dir(&self) -> PathBuf {
        self.deploy_to.join("releases")
    }

    pub fn release_path(&self, version: &str) -> PathBuf {
        self.releases_dir().join(version)
    }

    pub fn current_path(&self) -> PathBuf {
        self.deploy_to.join("current")
    }

    pub fn shared_path(&self) -> PathBuf {
        self.deploy_to.join("shared")
    }

    /// Fallback record consulted when `current` is not a symlink
    pub fn metadata_path(&self) -> PathBuf {
        self.deploy_to.join(".symlinks")
    }

    /// Per-target cache directory
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_root.join("artifact_deploys").join(&self.name)
    }

    pub fn cache_version_path(&self, version: &str) -> PathBuf {
        self.cache_dir().join(version)
    }

    /// Cached artifact for the requested version
    pub fn cached_artifact_path(&self) -> PathBuf {
        self.cache_version_path(&self.version)
            .join(&self.artifact_basename)
    }
}
