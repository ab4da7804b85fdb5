// src/config.rs

//! Target configuration
//!
//! A deployment is described by a TOML file. Everything is validated
//! before the first filesystem mutation; a bad file never touches disk.
//!
//! # Example target.toml
//!
//! ```toml
//! [settings]
//! cache_root = "/var/cache/artifact-deploy"
//!
//! [target]
//! name = "my-app"
//! artifact_location = "/tmp/builds/my-app-1.0.0.tar.gz"
//! deploy_to = "/srv/my-app"
//! version = "1.0.0"
//! owner = "deploy"
//! group = "deploy"
//! keep = 3
//! shared_directories = ["log", "pids"]
//!
//! [target.symlinks]
//! "config" = "etc/config"
//!
//! [target.environment]
//! RAILS_ENV = "production"
//!
//! [hooks]
//! configure = "bin/configure --env production"
//! restart = "systemctl restart my-app"
//! ```

use crate::error::{Error, Result};
use crate::hooks::{HookName, Hooks, ShellHook};
use crate::ownership::Ownership;
use crate::target::{ArtifactLocation, DeployFlags, DeploymentTarget};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default cache root (replaces a framework-wide file cache path)
pub const DEFAULT_CACHE_ROOT: &str = "/var/cache/artifact-deploy";

/// Default pattern for owner and group names
pub const DEFAULT_USER_VALID_REGEX: &str = r"^[^-+~:,\t\r\n\x0C\x00]+[^:,\t\r\n\x0C\x00]*$";

/// Default number of previous releases to keep
pub const DEFAULT_KEEP: usize = 2;

/// Run-wide settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,
    #[serde(default = "default_user_valid_regex")]
    pub user_valid_regex: String,
    #[serde(default = "default_hook_timeout_secs")]
    pub hook_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            user_valid_regex: default_user_valid_regex(),
            hook_timeout_secs: default_hook_timeout_secs(),
        }
    }
}

fn default_cache_root() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_ROOT)
}

fn default_user_valid_regex() -> String {
    DEFAULT_USER_VALID_REGEX.to_string()
}

fn default_hook_timeout_secs() -> u64 {
    crate::hooks::DEFAULT_HOOK_TIMEOUT.as_secs()
}

fn default_keep() -> usize {
    DEFAULT_KEEP
}

fn default_true() -> bool {
    true
}

fn default_shared_directories() -> Vec<String> {
    vec!["system".to_string(), "pids".to_string(), "log".to_string()]
}

/// The `[target]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub name: Option<String>,
    pub artifact_location: Option<String>,
    pub artifact_checksum: Option<String>,
    pub deploy_to: Option<PathBuf>,
    pub version: Option<String>,
    pub owner: Option<String>,
    pub group: Option<String>,
    #[serde(default = "default_keep")]
    pub keep: usize,
    #[serde(default = "default_true")]
    pub is_tarball: bool,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub remove_on_force: bool,
    #[serde(default)]
    pub remove_top_level_directory: bool,
    #[serde(default)]
    pub should_migrate: bool,
    #[serde(default)]
    pub symlinks: BTreeMap<String, String>,
    #[serde(default = "default_shared_directories")]
    pub shared_directories: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            name: None,
            artifact_location: None,
            artifact_checksum: None,
            deploy_to: None,
            version: None,
            owner: None,
            group: None,
            keep: DEFAULT_KEEP,
            is_tarball: true,
            force: false,
            remove_on_force: false,
            remove_top_level_directory: false,
            should_migrate: false,
            symlinks: BTreeMap::new(),
            shared_directories: default_shared_directories(),
            environment: BTreeMap::new(),
        }
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Config(format!("missing required field `{}`", field))),
    }
}

/// Reject values that would escape their directory when used as a path
/// segment or relative path.
fn validate_relative(value: &str, field: &str) -> Result<()> {
    let path = Path::new(value);
    if value.is_empty() || path.is_absolute() {
        return Err(Error::Config(format!(
            "{} entry '{}' must be a non-empty relative path",
            field, value
        )));
    }
    if path.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
        return Err(Error::Config(format!(
            "{} entry '{}' must not contain '..'",
            field, value
        )));
    }
    Ok(())
}

impl TargetConfig {
    /// Validate and build a target. No filesystem access happens here.
    pub fn into_target(self, settings: &Settings) -> Result<DeploymentTarget> {
        let name = required(self.name, "name")?;
        if name.chars().any(char::is_whitespace) {
            return Err(Error::Config(format!(
                "target name '{}' must not contain whitespace; it is used as a cache path segment",
                name
            )));
        }
        if name.contains('/') || name == "." || name == ".." {
            return Err(Error::Config(format!(
                "target name '{}' must be a single path segment",
                name
            )));
        }

        let version = required(self.version, "version")?;
        if version.contains('/') || version == "." || version == ".." || version == "current" {
            return Err(Error::Config(format!(
                "version '{}' must be a single path segment",
                version
            )));
        }

        let location = ArtifactLocation::parse(&required(
            self.artifact_location,
            "artifact_location",
        )?);
        let artifact_basename = location.basename().ok_or_else(|| {
            Error::Config(format!("artifact_location '{}' has no file name", location))
        })?;

        let deploy_to = self
            .deploy_to
            .ok_or_else(|| Error::Config("missing required field `deploy_to`".to_string()))?;
        if !deploy_to.is_absolute() {
            return Err(Error::Config(format!(
                "deploy_to '{}' must be an absolute path",
                deploy_to.display()
            )));
        }

        let user_regex = Regex::new(&settings.user_valid_regex).map_err(|e| {
            Error::Config(format!(
                "invalid user_valid_regex '{}': {}",
                settings.user_valid_regex, e
            ))
        })?;
        let owner = required(self.owner, "owner")?;
        let group = required(self.group, "group")?;
        for (field, value) in [("owner", &owner), ("group", &group)] {
            if !user_regex.is_match(value) {
                return Err(Error::Config(format!(
                    "{} '{}' does not match {}",
                    field, value, settings.user_valid_regex
                )));
            }
        }

        for (shared_name, release_path) in &self.symlinks {
            validate_relative(shared_name, "symlinks")?;
            validate_relative(release_path, "symlinks")?;
        }
        for dir in &self.shared_directories {
            validate_relative(dir, "shared_directories")?;
        }

        Ok(DeploymentTarget {
            name,
            location,
            artifact_basename,
            checksum: self.artifact_checksum,
            version,
            deploy_to,
            cache_root: settings.cache_root.clone(),
            ownership: Ownership::new(owner, group),
            keep: self.keep,
            flags: DeployFlags {
                is_tarball: self.is_tarball,
                force: self.force,
                remove_on_force: self.remove_on_force,
                remove_top_level_directory: self.remove_top_level_directory,
                should_migrate: self.should_migrate,
            },
            symlinks: self.symlinks,
            shared_directories: self.shared_directories,
            environment: self.environment,
            hooks: Hooks::new(),
        })
    }
}

/// A complete configuration file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    #[serde(default)]
    pub settings: Settings,
    pub target: TargetConfig,
    /// Hook name -> shell command
    #[serde(default)]
    pub hooks: BTreeMap<String, String>,
}

impl DeployConfig {
    /// Parse a configuration file from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        let config: DeployConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        for name in config.hooks.keys() {
            HookName::from_str(name)
                .map_err(|_| Error::Config(format!("unknown hook '{}'", name)))?;
        }
        Ok(config)
    }

    /// Validate the target and attach its shell hooks
    pub fn into_target(self) -> Result<DeploymentTarget> {
        let timeout = Duration::from_secs(self.settings.hook_timeout_secs);
        let target = self.target.into_target(&self.settings)?;

        let mut env = target.environment().clone();
        env.insert("ARTIFACT_NAME".to_string(), target.name().to_string());
        env.insert("ARTIFACT_VERSION".to_string(), target.version().to_string());
        env.insert(
            "ARTIFACT_DEPLOY_TO".to_string(),
            target.deploy_to().to_string_lossy().to_string(),
        );
        env.insert(
            "ARTIFACT_RELEASE_PATH".to_string(),
            target
                .release_path(target.version())
                .to_string_lossy()
                .to_string(),
        );

        let mut hooks = Hooks::new();
        for (name, command) in self.hooks {
            let hook_name = HookName::from_str(&name)
                .map_err(|_| Error::Config(format!("unknown hook '{}'", name)))?;
            let shell = ShellHook::new(hook_name, command)
                .with_env(env.clone())
                .with_timeout(timeout);
            hooks.set(hook_name, shell.into_hook());
        }

        Ok(target.with_hooks(hooks))
    }
}
