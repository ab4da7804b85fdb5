// src/retrieve.rs

//! Artifact retrieval into the version-scoped cache
//!
//! The cache copy is replaced only when its content differs from the
//! source. That comparison is what lets an operator redeploy the same
//! version number by changing the artifact at its source location.
//!
//! Remote locations are handed to an [`ArtifactFetcher`]; download, retry
//! and checksum policy belong to the fetcher.

use crate::error::{Error, PathContext, Result};
use crate::hash::paths_identical;
use crate::ownership::Ownership;
use crate::target::{ArtifactLocation, DeploymentTarget};
use crate::unpack::copy_tree;
use std::fs;
use std::io;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Produces a local file from a remote location
pub trait ArtifactFetcher {
    /// Download `location` to `dest`, verifying `checksum` if given
    fn fetch(&self, location: &str, checksum: Option<&str>, dest: &Path) -> anyhow::Result<()>;
}

/// True if `cached` is absent or differs from `source`
pub fn artifact_changed(source: &Path, cached: &Path) -> Result<bool> {
    if !source.exists() {
        return Err(Error::SourceNotFound(source.to_path_buf()));
    }
    if !cached.exists() {
        return Ok(true);
    }
    Ok(!paths_identical(source, cached).with_path(cached)?)
}

/// Remove a cached artifact, file or directory. Absent is not an error.
pub fn discard_cached(cached: &Path) -> Result<()> {
    let removed = match fs::symlink_metadata(cached) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(cached),
        Ok(_) => fs::remove_file(cached),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    removed.with_path(cached)?;
    debug!("Removed cached artifact {}", cached.display());
    Ok(())
}

/// Install `staged` at `cached` unless identical; returns whether it changed
fn install_if_changed(staged: &Path, cached: &Path, ownership: &Ownership) -> Result<bool> {
    if cached.exists() && paths_identical(staged, cached).with_path(cached)? {
        debug!("{} is up to date", cached.display());
        return Ok(false);
    }

    let parent = cached.parent().unwrap_or(Path::new("."));
    if fs::metadata(staged).with_path(staged)?.is_dir() {
        let temp = tempfile::Builder::new()
            .prefix(".artifact")
            .tempdir_in(parent)
            .with_path(parent)?;
        let tree = temp.path().join("tree");
        copy_tree(staged, &tree)?;
        discard_cached(cached)?;
        fs::rename(&tree, cached).with_path(cached)?;
        ownership.apply_tree(cached)?;
    } else {
        let temp = NamedTempFile::new_in(parent).with_path(parent)?;
        fs::copy(staged, temp.path()).with_path(staged)?;
        if cached.is_dir() {
            discard_cached(cached)?;
        }
        temp.persist(cached).map_err(|e| Error::io(cached, e.error))?;
        ownership.apply(cached, None)?;
    }

    info!("Cached artifact at {}", cached.display());
    Ok(true)
}

/// Retrieves a target's artifact into its cache
pub struct ArtifactRetriever<'a> {
    target: &'a DeploymentTarget,
    fetcher: Option<&'a dyn ArtifactFetcher>,
}

impl<'a> ArtifactRetriever<'a> {
    pub fn new(target: &'a DeploymentTarget) -> Self {
        Self {
            target,
            fetcher: None,
        }
    }

    /// Use `fetcher` for remote locations
    pub fn with_fetcher(mut self, fetcher: &'a dyn ArtifactFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Copy (or fetch) the artifact into the cache. Returns true if the
    /// cached copy changed.
    pub fn retrieve(&self) -> Result<bool> {
        let cached = self.target.cached_artifact_path();
        let ownership = self.target.ownership();

        match self.target.location() {
            ArtifactLocation::Local(source) => {
                if !source.exists() {
                    return Err(Error::SourceNotFound(source.clone()));
                }
                info!("Retrieving artifact from local path {}", source.display());
                install_if_changed(source, &cached, ownership)
            }
            ArtifactLocation::Remote(url) => {
                let fetcher = self.fetcher.ok_or_else(|| {
                    Error::Config(format!("no remote fetcher configured for {}", url))
                })?;

                let parent = cached.parent().unwrap_or(Path::new("."));
                let staged = NamedTempFile::new_in(parent).with_path(parent)?;
                info!("Fetching artifact from {}", url);
                fetcher
                    .fetch(url, self.target.checksum(), staged.path())
                    .map_err(|e| Error::Fetch {
                        location: url.clone(),
                        reason: format!("{:#}", e),
                    })?;
                install_if_changed(staged.path(), &cached, ownership)
            }
        }
    }
}
