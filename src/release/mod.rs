// src/release/mod.rs

//! Release directory layout and lifecycle
//!
//! The store is the only component that creates or deletes release
//! directories and their cache copies. It never deletes the release the
//! current pointer names, except for the explicit force-removal path.

pub mod current;

use crate::error::{Error, PathContext, Result};
use crate::ownership::DIRECTORY_MODE;
use crate::target::DeploymentTarget;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

/// One installed version under `releases/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub version: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// On-disk release store for one target
#[derive(Debug, Clone, Copy)]
pub struct ReleaseStore<'a> {
    target: &'a DeploymentTarget,
}

impl<'a> ReleaseStore<'a> {
    pub fn new(target: &'a DeploymentTarget) -> Self {
        Self { target }
    }

    /// `<deploy_to>/releases/<version>`
    pub fn release_path(&self, version: &str) -> PathBuf {
        self.target.release_path(version)
    }

    /// Version named by the current pointer
    pub fn current_version(&self) -> Result<Option<String>> {
        current::read_current_version(self.target.deploy_to())
    }

    /// All releases except the current one, oldest first by mtime
    pub fn list_previous_releases(&self) -> Result<Vec<Release>> {
        let current = self.current_version()?;
        self.list_releases_excluding(current.as_deref())
    }

    /// Version strings of [`Self::list_previous_releases`]
    pub fn previous_versions(&self) -> Result<Vec<String>> {
        Ok(self
            .list_previous_releases()?
            .into_iter()
            .map(|release| release.version)
            .collect())
    }

    pub(crate) fn list_releases_excluding(&self, current: Option<&str>) -> Result<Vec<Release>> {
        let releases_dir = self.target.releases_dir();
        let entries = match fs::read_dir(&releases_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(releases_dir, e)),
        };

        let mut releases = Vec::new();
        for entry in entries {
            let entry = entry.with_path(&releases_dir)?;
            let path = entry.path();
            let version = entry.file_name().to_string_lossy().to_string();

            if Some(version.as_str()) == current {
                continue;
            }

            let metadata = entry.metadata().with_path(&path)?;
            if !metadata.is_dir() {
                debug!("Ignoring non-directory entry {}", path.display());
                continue;
            }
            let modified = metadata.modified().with_path(&path)?;

            releases.push(Release {
                version,
                path,
                modified,
            });
        }

        releases.sort_by(|a, b| {
            a.modified
                .cmp(&b.modified)
                .then_with(|| a.version.cmp(&b.version))
        });
        Ok(releases)
    }

    /// True if the release directory exists and has at least one entry
    pub fn is_populated(&self, version: &str) -> Result<bool> {
        let path = self.release_path(version);
        match fs::read_dir(&path) {
            Ok(mut entries) => Ok(entries.next().is_some()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    /// Create the cache-version, release and shared directories.
    /// Pre-existing directories are not an error.
    pub fn create_release_skeleton(&self, version: &str) -> Result<()> {
        let ownership = self.target.ownership();
        for path in [
            self.target.cache_version_path(version),
            self.release_path(version),
            self.target.shared_path(),
        ] {
            info!("Creating {}", path.display());
            ownership.ensure_directory(&path, DIRECTORY_MODE)?;
        }
        Ok(())
    }

    /// Remove the cache copy and release directory for `version`.
    /// Refuses the version the current pointer names.
    pub fn delete_release(&self, version: &str) -> Result<()> {
        if self.current_version()?.as_deref() == Some(version) {
            return Err(Error::CurrentRelease(version.to_string()));
        }

        remove_dir_if_exists(&self.target.cache_version_path(version))?;
        remove_dir_if_exists(&self.release_path(version))?;
        info!("Deleted release {}", version);
        Ok(())
    }

    /// Remove only the release directory, even if it is current.
    /// Used by the opt-in remove-on-force path.
    pub fn purge_release_dir(&self, version: &str) -> Result<()> {
        let path = self.release_path(version);
        info!(
            "{} deleted because remove_on_force is set",
            path.display()
        );
        remove_dir_if_exists(&path)
    }
}

fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{Settings, TargetConfig};
    use crate::ownership::tests::current_ownership;
    use filetime::{FileTime, set_file_mtime};
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    /// A target rooted in a temp directory, owned by the test user
    pub(crate) fn test_target(root: &Path, version: &str) -> DeploymentTarget {
        let ownership = current_ownership();
        let source = root.join("artifacts").join(format!("app-{}.tar.gz", version));
        TargetConfig {
            name: Some("app".to_string()),
            artifact_location: Some(source.to_string_lossy().to_string()),
            deploy_to: Some(root.join("srv/app")),
            version: Some(version.to_string()),
            owner: Some(ownership.owner().to_string()),
            group: Some(ownership.group().to_string()),
            ..TargetConfig::default()
        }
        .into_target(&Settings {
            cache_root: root.join("cache"),
            ..Settings::default()
        })
        .unwrap()
    }

    /// Create a release directory with a fixed mtime
    pub(crate) fn make_release(target: &DeploymentTarget, version: &str, mtime: i64) {
        let path = target.release_path(version);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("VERSION"), version).unwrap();
        fs::create_dir_all(target.cache_version_path(version)).unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
    }

    pub(crate) fn point_current(target: &DeploymentTarget, version: &str) {
        let _ = fs::remove_file(target.current_path());
        symlink(target.release_path(version), target.current_path()).unwrap();
    }

    #[test]
    fn test_release_path() {
        let temp_dir = TempDir::new().unwrap();
        let target = test_target(temp_dir.path(), "1.0.0");
        let store = ReleaseStore::new(&target);
        assert_eq!(
            store.release_path("1.0.0"),
            temp_dir.path().join("srv/app/releases/1.0.0")
        );
    }

    #[test]
    fn test_list_previous_releases_empty_when_missing() {
        let temp_dir = TempDir::new().unwrap();
        let target = test_target(temp_dir.path(), "1.0.0");
        assert!(ReleaseStore::new(&target).list_previous_releases().unwrap().is_empty());
    }

    #[test]
    fn test_list_previous_releases_sorted_by_mtime_excluding_current() {
        let temp_dir = TempDir::new().unwrap();
        let target = test_target(temp_dir.path(), "1.0.3");
        // Names deliberately out of mtime order
        make_release(&target, "1.0.2", 3_000);
        make_release(&target, "1.0.0", 1_000);
        make_release(&target, "1.0.10", 2_000);
        make_release(&target, "1.0.3", 4_000);
        point_current(&target, "1.0.3");

        let versions = ReleaseStore::new(&target).previous_versions().unwrap();
        assert_eq!(versions, vec!["1.0.0", "1.0.10", "1.0.2"]);
    }

    #[test]
    fn test_create_release_skeleton_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let target = test_target(temp_dir.path(), "1.0.0");
        let store = ReleaseStore::new(&target);

        store.create_release_skeleton("1.0.0").unwrap();
        store.create_release_skeleton("1.0.0").unwrap();

        assert!(target.cache_version_path("1.0.0").is_dir());
        assert!(target.release_path("1.0.0").is_dir());
        assert!(target.shared_path().is_dir());
        assert!(!store.is_populated("1.0.0").unwrap());
    }

    #[test]
    fn test_delete_release_removes_cache_and_release() {
        let temp_dir = TempDir::new().unwrap();
        let target = test_target(temp_dir.path(), "1.0.1");
        make_release(&target, "1.0.0", 1_000);
        make_release(&target, "1.0.1", 2_000);
        point_current(&target, "1.0.1");
        let store = ReleaseStore::new(&target);

        store.delete_release("1.0.0").unwrap();
        assert!(!target.release_path("1.0.0").exists());
        assert!(!target.cache_version_path("1.0.0").exists());

        let err = store.delete_release("1.0.1").unwrap_err();
        assert!(matches!(err, Error::CurrentRelease(_)));
        assert!(target.release_path("1.0.1").exists());
    }

    #[test]
    fn test_purge_release_dir_keeps_cache() {
        let temp_dir = TempDir::new().unwrap();
        let target = test_target(temp_dir.path(), "1.0.0");
        make_release(&target, "1.0.0", 1_000);
        point_current(&target, "1.0.0");

        ReleaseStore::new(&target).purge_release_dir("1.0.0").unwrap();
        assert!(!target.release_path("1.0.0").exists());
        assert!(target.cache_version_path("1.0.0").exists());
    }
}
