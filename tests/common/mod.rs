// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use artifact_deploy::{DeployConfig, DeploymentTarget, HookName, Hooks};
use filetime::{FileTime, set_file_mtime};
use flate2::Compression;
use flate2::write::GzEncoder;
use nix::unistd::{Group, User, getgid, getuid};
use std::cell::RefCell;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

/// Names of the user and group running the tests
pub fn current_user_group() -> (String, String) {
    let user = User::from_uid(getuid()).unwrap().unwrap();
    let group = Group::from_gid(getgid()).unwrap().unwrap();
    (user.name, group.name)
}

/// Write a gzip tarball of regular files
pub fn write_tar_gz(path: &Path, entries: &[(&str, &str)]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, name, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

/// Write a zip archive of regular files
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
    for (name, content) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

/// Set a release directory's mtime to `secs` after the epoch
pub fn set_mtime(path: &Path, secs: i64) {
    set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

/// Hook set that records each invocation
pub fn recording_hooks() -> (Hooks, Rc<RefCell<Vec<HookName>>>) {
    use strum::IntoEnumIterator;

    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut hooks = Hooks::new();
    for name in HookName::iter() {
        let calls = Rc::clone(&calls);
        hooks.set(name, move || {
            calls.borrow_mut().push(name);
            Ok(())
        });
    }
    (hooks, calls)
}

/// A deploy root in a temp directory: artifacts, cache and `srv/app`
pub struct Fixture {
    temp_dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn deploy_to(&self) -> PathBuf {
        self.root().join("srv/app")
    }

    pub fn release(&self, version: &str) -> PathBuf {
        self.deploy_to().join("releases").join(version)
    }

    pub fn current(&self) -> PathBuf {
        self.deploy_to().join("current")
    }

    /// Default artifact location for `version`
    pub fn artifact(&self, version: &str) -> PathBuf {
        self.root()
            .join("artifacts")
            .join(format!("app-{}.tar.gz", version))
    }

    /// Write the default artifact for `version`: a wrapper-less tarball with
    /// a VERSION file and a start script
    pub fn build_artifact(&self, version: &str) -> PathBuf {
        let path = self.artifact(version);
        write_tar_gz(
            &path,
            &[("VERSION", version), ("bin/start", "#!/bin/sh\nexec app\n")],
        );
        path
    }

    /// Full TOML configuration for `version`; `extra` is appended to the
    /// `[target]` table and may open sub-tables or `[hooks]`.
    pub fn config_toml(&self, artifact: &Path, version: &str, extra: &str) -> String {
        let (owner, group) = current_user_group();
        format!(
            r#"
[settings]
cache_root = "{cache}"

[target]
name = "app"
artifact_location = "{artifact}"
deploy_to = "{deploy_to}"
version = "{version}"
owner = "{owner}"
group = "{group}"
{extra}
"#,
            cache = self.root().join("cache").display(),
            artifact = artifact.display(),
            deploy_to = self.deploy_to().display(),
        )
    }

    /// Target for the default artifact of `version`
    pub fn target(&self, version: &str, extra: &str) -> DeploymentTarget {
        self.target_for(&self.artifact(version), version, extra)
    }

    /// Target for an explicit artifact
    pub fn target_for(&self, artifact: &Path, version: &str, extra: &str) -> DeploymentTarget {
        DeployConfig::parse(&self.config_toml(artifact, version, extra))
            .unwrap()
            .into_target()
            .unwrap()
    }

    /// Cached copy path for the default artifact basename
    pub fn cached(&self, version: &str) -> PathBuf {
        self.root()
            .join("cache/artifact_deploys/app")
            .join(version)
            .join(format!("app-{}.tar.gz", version))
    }

    /// Version directories currently under `releases/`, sorted by name
    pub fn release_names(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.deploy_to().join("releases"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    /// The version the `current` link names
    pub fn current_version(&self) -> Option<String> {
        fs::read_link(self.current())
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
    }
}
