// src/ownership.rs

//! Owner, group and mode application
//!
//! Every directory, link and extracted file the deployer creates is handed
//! to the target's owner and group. Failures here are fatal: a target we
//! cannot chown is a misconfigured target.

use crate::error::{Error, PathContext, Result};
use nix::unistd::{Gid, Group, Uid, User};
use std::fs;
use std::os::unix::fs::{PermissionsExt, chown, lchown};
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Mode for every directory the deployer creates
pub const DIRECTORY_MODE: u32 = 0o755;

/// Owner and group names for a deployment target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    owner: String,
    group: String,
}

impl Ownership {
    pub fn new(owner: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            group: group.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Resolve owner and group names to numeric ids
    pub fn ids(&self) -> Result<(Uid, Gid)> {
        let uid = User::from_name(&self.owner)
            .map_err(|e| Error::Config(format!("failed to look up user {}: {}", self.owner, e)))?
            .ok_or_else(|| Error::UnknownUser(self.owner.clone()))?
            .uid;
        let gid = Group::from_name(&self.group)
            .map_err(|e| Error::Config(format!("failed to look up group {}: {}", self.group, e)))?
            .ok_or_else(|| Error::UnknownGroup(self.group.clone()))?
            .gid;
        Ok((uid, gid))
    }

    /// Create a directory (and parents) if needed, then apply mode and ownership.
    /// Returns true if the directory was created.
    pub fn ensure_directory(&self, path: &Path, mode: u32) -> Result<bool> {
        let created = if path.is_dir() {
            debug!("Directory '{}' already exists", path.display());
            false
        } else {
            fs::create_dir_all(path).with_path(path)?;
            info!("Created directory '{}'", path.display());
            true
        };

        self.apply(path, Some(mode))?;
        Ok(created)
    }

    /// Apply ownership, and optionally a mode, to a path (following symlinks)
    pub fn apply(&self, path: &Path, mode: Option<u32>) -> Result<()> {
        if let Some(mode) = mode {
            fs::set_permissions(path, fs::Permissions::from_mode(mode)).with_path(path)?;
        }

        let (uid, gid) = self.ids()?;
        chown(path, Some(uid.as_raw()), Some(gid.as_raw())).with_path(path)
    }

    /// Apply ownership to a symlink itself
    pub fn apply_link(&self, path: &Path) -> Result<()> {
        let (uid, gid) = self.ids()?;
        lchown(path, Some(uid.as_raw()), Some(gid.as_raw())).with_path(path)
    }

    /// Apply ownership to every entry under `root`, including `root`.
    /// Symlinks are changed themselves, never their targets.
    pub fn apply_tree(&self, root: &Path) -> Result<()> {
        let (uid, gid) = self.ids()?;
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                match e.into_io_error() {
                    Some(io) => Error::io(path, io),
                    None => Error::Archive {
                        path,
                        reason: "filesystem loop detected".to_string(),
                    },
                }
            })?;
            lchown(entry.path(), Some(uid.as_raw()), Some(gid.as_raw())).with_path(entry.path())?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Ownership for the user running the tests
    pub(crate) fn current_ownership() -> Ownership {
        let user = User::from_uid(nix::unistd::getuid()).unwrap().unwrap();
        let group = Group::from_gid(nix::unistd::getgid()).unwrap().unwrap();
        Ownership::new(user.name, group.name)
    }

    #[test]
    fn test_ensure_directory_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("a/b/c");
        let ownership = current_ownership();

        assert!(ownership.ensure_directory(&dir, DIRECTORY_MODE).unwrap());
        assert!(!ownership.ensure_directory(&dir, DIRECTORY_MODE).unwrap());

        let mode = fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_unknown_user_is_rejected() {
        let ownership = Ownership::new("no-such-user-artifact-deploy", "root");
        assert!(matches!(ownership.ids(), Err(Error::UnknownUser(_))));
    }

    #[test]
    fn test_apply_tree_handles_dangling_links() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("release");
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("bin/run"), b"#!/bin/sh\n").unwrap();
        std::os::unix::fs::symlink("/nonexistent/target", root.join("dangling")).unwrap();

        current_ownership().apply_tree(&root).unwrap();
    }
}
