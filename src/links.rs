// src/links.rs

//! Shared storage links and the `current` pointer
//!
//! Shared resources live under `<deploy_to>/shared/` and survive across
//! releases; each release gets links into them. The `current` link is
//! replaced atomically: a temporary link is created next to it and renamed
//! over the old one, so readers never observe a missing pointer.

use crate::error::{Error, PathContext, Result};
use crate::ownership::DIRECTORY_MODE;
use crate::release::current::write_fallback;
use crate::target::DeploymentTarget;
use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::Path;
use tracing::{debug, info, warn};

/// Writes shared links and the current pointer for one target
pub struct LinkOrchestrator<'a> {
    target: &'a DeploymentTarget,
}

impl<'a> LinkOrchestrator<'a> {
    pub fn new(target: &'a DeploymentTarget) -> Self {
        Self { target }
    }

    /// Ensure `shared/<dir>` for every configured shared directory
    pub fn ensure_shared_directories(&self) -> Result<()> {
        let shared = self.target.shared_path();
        let ownership = self.target.ownership();
        for dir in self.target.shared_directories() {
            let path = shared.join(dir);
            info!("Creating {}", path.display());
            ownership.ensure_directory(&path, DIRECTORY_MODE)?;
        }
        Ok(())
    }

    /// Link every `release/<path>` to `shared/<name>`, then ensure the
    /// shared directories.
    pub fn materialize_links(&self, release: &Path) -> Result<()> {
        let shared = self.target.shared_path();
        let ownership = self.target.ownership();

        for (name, relative) in self.target.symlinks() {
            let shared_dir = shared.join(name);
            let link = release.join(relative);
            info!(
                "Creating and linking {} to {}",
                shared_dir.display(),
                link.display()
            );
            ownership.ensure_directory(&shared_dir, DIRECTORY_MODE)?;

            if let Some(parent) = link.parent()
                && !parent.is_dir()
            {
                ownership.ensure_directory(parent, DIRECTORY_MODE)?;
            }
            self.replace_link(&link, &shared_dir)?;
        }

        self.ensure_shared_directories()
    }

    /// Remove every release link that points into `shared/`, so a fresh
    /// extraction writes inside the release. Returns how many were removed;
    /// [`Self::materialize_links`] puts them back.
    pub fn detach_links(&self, release: &Path) -> Result<usize> {
        let shared = self.target.shared_path();
        let mut removed = 0;

        for relative in self.target.symlinks().values() {
            let link = release.join(relative);
            match fs::symlink_metadata(&link) {
                Ok(meta) if meta.file_type().is_symlink() => {}
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::io(&link, e)),
            }
            if fs::read_link(&link).with_path(&link)?.starts_with(&shared) {
                debug!("Detaching {} before extraction", link.display());
                fs::remove_file(&link).with_path(&link)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Point `link` at `to`, replacing whatever is there unless it is
    /// already the right link.
    fn replace_link(&self, link: &Path, to: &Path) -> Result<()> {
        match fs::symlink_metadata(link) {
            Ok(meta) if meta.file_type().is_symlink() => {
                if fs::read_link(link).with_path(link)? == to {
                    debug!("{} already links to {}", link.display(), to.display());
                    return self.target.ownership().apply_link(link);
                }
                fs::remove_file(link).with_path(link)?;
            }
            Ok(meta) if meta.is_dir() => {
                warn!("Replacing directory {} with a link to {}", link.display(), to.display());
                fs::remove_dir_all(link).with_path(link)?;
            }
            Ok(_) => {
                warn!("Replacing file {} with a link to {}", link.display(), to.display());
                fs::remove_file(link).with_path(link)?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(link, e)),
        }

        symlink(to, link).with_path(link)?;
        self.target.ownership().apply_link(link)
    }

    /// Point `current` at `release`. Runs on every deploy; ownership of the
    /// link is re-applied even when it already points at `release`.
    pub fn promote_current(&self, release: &Path) -> Result<()> {
        let deploy_to = self.target.deploy_to();
        let current = self.target.current_path();
        let ownership = self.target.ownership();
        let version = release
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| Error::Config(format!("release path {} has no version", release.display())))?;

        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                if fs::read_link(&current).with_path(&current)? == release {
                    debug!("{} already points to {}", current.display(), release.display());
                    return ownership.apply_link(&current);
                }
            }
            Ok(_) => {
                warn!(
                    "{} is not a symlink, recording {} in {}",
                    current.display(),
                    version,
                    self.target.metadata_path().display()
                );
                return write_fallback(deploy_to, &version);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(&current, e)),
        }

        let temp = deploy_to.join(format!(".current.{}.tmp", std::process::id()));
        let _ = fs::remove_file(&temp);
        match symlink(release, &temp) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Unsupported => {
                warn!(
                    "Symlinks unsupported under {}, recording {} in {}",
                    deploy_to.display(),
                    version,
                    self.target.metadata_path().display()
                );
                return write_fallback(deploy_to, &version);
            }
            Err(e) => return Err(Error::io(&temp, e)),
        }
        ownership.apply_link(&temp)?;
        fs::rename(&temp, &current).with_path(&current)?;

        info!("Linked {} to {}", current.display(), release.display());
        Ok(())
    }
}
