// src/error.rs

//! Error types for artifact deployment
//!
//! Every variant is fatal for the run that produced it. Nothing is rolled
//! back; the next run's idempotent steps complete or retry the work.

use crate::hooks::HookName;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Deployment errors
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing configuration, reported before any filesystem mutation
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The artifact location does not exist
    #[error(
        "cannot retrieve artifact {0}: make sure the artifact exists in the specified location"
    )]
    SourceNotFound(PathBuf),

    /// The artifact extension is not one we know how to unpack
    #[error(
        "cannot extract {0}: unsupported extension (supported: tar, tgz, tar.gz, tbz, tbz2, tar.bz2, tar.xz, zip, war, jar)"
    )]
    UnsupportedFormat(PathBuf),

    /// Malformed archive contents
    #[error("archive error in {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    /// An archive entry resolves to a location outside the release
    #[error("archive {path} writes outside of {dest}: {reason}")]
    UnsafeEntry {
        path: PathBuf,
        dest: PathBuf,
        reason: String,
    },

    /// An extraction or copy step failed on every attempt
    #[error("{operation} of {path} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        path: PathBuf,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// Filesystem error on a specific path
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Missing privilege or wrong owner/group for the target
    #[error("permission denied on {path}: {source}")]
    Permission {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Owner name does not resolve to a user on this host
    #[error("unknown user '{0}'")]
    UnknownUser(String),

    /// Group name does not resolve to a group on this host
    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    /// `current` exists, is not a symlink, and there is no fallback record
    #[error("{current} is not a symlink and fallback metadata {metadata} does not exist")]
    MissingMetadata { current: PathBuf, metadata: PathBuf },

    /// The fallback record exists but cannot be used
    #[error("malformed metadata {path}: {reason}")]
    InvalidMetadata { path: PathBuf, reason: String },

    /// A lifecycle hook returned an error
    #[error("{hook} hook failed: {source}")]
    Hook {
        hook: HookName,
        #[source]
        source: anyhow::Error,
    },

    /// The remote fetch collaborator failed or is missing
    #[error("fetching {location} failed: {reason}")]
    Fetch { location: String, reason: String },

    /// Attempt to delete the release the current pointer names
    #[error("refusing to delete current release {0}")]
    CurrentRelease(String),

    /// One or more old releases could not be deleted
    #[error("failed to prune {} release(s): {}", .0.len(), .0.join(", "))]
    Prune(Vec<String>),
}

impl Error {
    /// Attach a path to an I/O error, splitting out permission failures
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::Permission { path, source }
        } else {
            Self::Io { path, source }
        }
    }

    /// True for errors worth retrying at the extraction/copy step
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Archive { .. })
    }
}

/// Attach the offending path to `io::Result`s
pub(crate) trait PathContext<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> PathContext<T> for io::Result<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| Error::io(path.as_ref(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_is_split_out() {
        let err = Error::io(
            "/srv/app",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, Error::Permission { .. }));
        assert!(!err.is_transient());

        let err = Error::io("/srv/app", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(matches!(err, Error::Io { .. }));
        assert!(err.is_transient());

        let err = Error::UnsafeEntry {
            path: PathBuf::from("/tmp/app.tgz"),
            dest: PathBuf::from("/srv/app/releases/1.0.0"),
            reason: "trying to unpack outside of destination path".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_messages_name_the_path() {
        let err = Error::SourceNotFound(PathBuf::from("/tmp/app.tgz"));
        assert!(err.to_string().contains("/tmp/app.tgz"));

        let err = Error::Prune(vec!["1.0.0".to_string(), "1.0.1".to_string()]);
        assert_eq!(err.to_string(), "failed to prune 2 release(s): 1.0.0, 1.0.1");
    }
}
