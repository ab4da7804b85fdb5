// src/release/current.rs

//! Reading and recording the current-release pointer
//!
//! The pointer is a symlink `<deploy_to>/current`. On filesystems that cannot
//! host a symlink, a flat YAML record `<deploy_to>/.symlinks` with a
//! `current` key names the live version instead.

use crate::error::{Error, PathContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Contents of the `.symlinks` fallback record
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SymlinkRecord {
    pub current: Option<String>,
    /// Keys written by other tools are preserved on rewrite
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_yaml::Value>,
}

impl SymlinkRecord {
    /// Load the record, `None` if the file does not exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(path, e)),
        };
        if content.trim().is_empty() {
            return Ok(Some(Self::default()));
        }
        serde_yaml::from_str(&content)
            .map(Some)
            .map_err(|e| Error::InvalidMetadata {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Write the record
    pub fn store(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).map_err(|e| Error::InvalidMetadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        fs::write(path, content).with_path(path)
    }
}

/// Version named by the `current` pointer under `deploy_to`, if any.
///
/// - `current` is a symlink: the basename of its target.
/// - `current` exists but is not a symlink: the `.symlinks` record, which
///   must then exist.
/// - `current` is absent: the `.symlinks` record if present, else `None`.
pub fn read_current_version(deploy_to: &Path) -> Result<Option<String>> {
    let current = deploy_to.join("current");
    let metadata = deploy_to.join(".symlinks");

    match fs::symlink_metadata(&current) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let target = fs::read_link(&current).with_path(&current)?;
            let version = target
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .ok_or_else(|| Error::InvalidMetadata {
                    path: current.clone(),
                    reason: format!("link target '{}' has no file name", target.display()),
                })?;
            debug!("{} -> {}", current.display(), version);
            Ok(Some(version))
        }
        Ok(_) => {
            let record = SymlinkRecord::load(&metadata)?.ok_or_else(|| Error::MissingMetadata {
                current: current.clone(),
                metadata: metadata.clone(),
            })?;
            let version = record.current.ok_or_else(|| Error::InvalidMetadata {
                path: metadata.clone(),
                reason: "missing key 'current'".to_string(),
            })?;
            Ok(Some(version))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Ok(SymlinkRecord::load(&metadata)?.and_then(|record| record.current))
        }
        Err(e) => Err(Error::io(current, e)),
    }
}

/// Record `version` as current in the `.symlinks` fallback
pub fn write_fallback(deploy_to: &Path, version: &str) -> Result<()> {
    let path = deploy_to.join(".symlinks");
    let mut record = SymlinkRecord::load(&path)?.unwrap_or_default();
    record.current = Some(version.to_string());
    record.store(&path)
}
