// src/unpack.rs

//! Extraction of the cached artifact into a release directory
//!
//! The format is chosen by a case-sensitive suffix match on the artifact's
//! file name. Tarballs go through the `tar` crate with the matching
//! decompressor; zip, war and jar files through the `zip` crate. Targets
//! with `is_tarball = false` get a plain copy instead.
//!
//! Extraction and copy are retried; format detection is not, so an
//! unsupported extension fails on the first attempt.

use crate::error::{Error, PathContext, Result};
use crate::target::DeploymentTarget;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::thread;
use std::time::Duration;
use strum_macros::Display;
use tar::Archive;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use xz2::read::XzDecoder;

/// Additional attempts after a failed extraction or copy
pub const EXTRACT_RETRIES: u32 = 2;

/// Base delay between attempts, multiplied by the attempt number
const RETRY_DELAY_MS: u64 = 100;

/// Compression applied to a tar stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

/// Supported artifact formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar(Compression),
    Zip,
}

const SUFFIXES: &[(&str, ArchiveFormat)] = &[
    (".tar", ArchiveFormat::Tar(Compression::None)),
    (".tgz", ArchiveFormat::Tar(Compression::Gzip)),
    (".tar.gz", ArchiveFormat::Tar(Compression::Gzip)),
    (".tbz", ArchiveFormat::Tar(Compression::Bzip2)),
    (".tbz2", ArchiveFormat::Tar(Compression::Bzip2)),
    (".tar.bz2", ArchiveFormat::Tar(Compression::Bzip2)),
    (".tar.xz", ArchiveFormat::Tar(Compression::Xz)),
    (".zip", ArchiveFormat::Zip),
    (".war", ArchiveFormat::Zip),
    (".jar", ArchiveFormat::Zip),
];

impl ArchiveFormat {
    /// Match a file name against the known suffixes
    pub fn from_file_name(name: &str) -> Option<Self> {
        SUFFIXES
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix))
            .map(|(_, format)| *format)
    }

    /// Format of the artifact at `path`, or [`Error::UnsupportedFormat`]
    pub fn detect(path: &Path) -> Result<Self> {
        path.file_name()
            .and_then(|name| Self::from_file_name(&name.to_string_lossy()))
            .ok_or_else(|| Error::UnsupportedFormat(path.to_path_buf()))
    }
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts
fn with_retries<T>(
    operation: &'static str,
    path: &Path,
    mut op: impl FnMut() -> Result<T>,
) -> Result<T> {
    let attempts = EXTRACT_RETRIES + 1;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt >= attempts => {
                return Err(Error::RetriesExhausted {
                    operation,
                    path: path.to_path_buf(),
                    attempts: attempt,
                    source: Box::new(e),
                });
            }
            Err(e) => {
                warn!(
                    "{} attempt {} of {} failed: {}, retrying...",
                    operation,
                    attempt,
                    path.display(),
                    e
                );
                thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
            }
        }
    }
}

fn archive_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Archive {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// True if the tar crate refused an entry that resolves outside `dest`
fn escapes_destination(e: &io::Error) -> bool {
    let mut next: Option<&dyn std::error::Error> = Some(e);
    while let Some(err) = next {
        if err.to_string().contains("outside of destination") {
            return true;
        }
        next = err.source();
    }
    false
}

/// Map an error raised while unpacking, keeping permission failures and
/// path escapes distinct
fn unpack_error(artifact: &Path, dest: &Path, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::PermissionDenied {
        Error::io(dest, e)
    } else if escapes_destination(&e) {
        Error::UnsafeEntry {
            path: artifact.to_path_buf(),
            dest: dest.to_path_buf(),
            reason: e.to_string(),
        }
    } else {
        archive_error(artifact, e)
    }
}

/// Extract `artifact` into `dest`, overwriting existing files
pub fn extract(artifact: &Path, format: ArchiveFormat, dest: &Path) -> Result<()> {
    match format {
        ArchiveFormat::Tar(compression) => extract_tar(artifact, compression, dest),
        ArchiveFormat::Zip => extract_zip(artifact, dest),
    }
}

fn extract_tar(artifact: &Path, compression: Compression, dest: &Path) -> Result<()> {
    let file = File::open(artifact).with_path(artifact)?;
    let reader: Box<dyn Read> = match compression {
        Compression::None => Box::new(file),
        Compression::Gzip => Box::new(GzDecoder::new(file)),
        Compression::Bzip2 => Box::new(BzDecoder::new(file)),
        Compression::Xz => Box::new(XzDecoder::new(file)),
    };

    let mut archive = Archive::new(reader);
    archive.set_overwrite(true);
    archive.set_preserve_permissions(true);
    archive
        .unpack(dest)
        .map_err(|e| unpack_error(artifact, dest, e))?;

    debug!("Extracted {} ({} tar) into {}", artifact.display(), compression, dest.display());
    Ok(())
}

fn extract_zip(artifact: &Path, dest: &Path) -> Result<()> {
    let file = File::open(artifact).with_path(artifact)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| archive_error(artifact, e))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| archive_error(artifact, e))?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping unsafe zip entry '{}' in {}", entry.name(), artifact.display());
            continue;
        };
        let out = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out).with_path(&out)?;
        } else {
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent).with_path(parent)?;
            }
            if let Ok(meta) = fs::symlink_metadata(&out)
                && meta.file_type().is_symlink()
            {
                fs::remove_file(&out).with_path(&out)?;
            }
            let mut writer = File::create(&out).with_path(&out)?;
            io::copy(&mut entry, &mut writer).map_err(|e| unpack_error(artifact, &out, e))?;
        }

        if let Some(mode) = entry.unix_mode() {
            fs::set_permissions(&out, fs::Permissions::from_mode(mode & 0o7777))
                .with_path(&out)?;
        }
    }

    debug!("Extracted {} (zip) into {}", artifact.display(), dest.display());
    Ok(())
}

/// Copy `artifact` (a file or a directory tree) into `release`
pub fn copy_artifact(artifact: &Path, release: &Path) -> Result<()> {
    let name = artifact
        .file_name()
        .ok_or_else(|| Error::Config(format!("artifact {} has no file name", artifact.display())))?;
    let dest = release.join(name);

    let metadata = fs::metadata(artifact).with_path(artifact)?;
    if metadata.is_dir() {
        copy_tree(artifact, &dest)
    } else {
        fs::copy(artifact, &dest).with_path(&dest)?;
        Ok(())
    }
}

/// Recursively copy `src` to `dest`, recreating symlinks as links.
/// Existing files under `dest` are overwritten.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| Error::io(src, e.into()))?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let out = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&out).with_path(&out)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).with_path(entry.path())?;
            let _ = fs::remove_file(&out);
            std::os::unix::fs::symlink(&link, &out).with_path(&out)?;
        } else {
            if let Ok(meta) = fs::symlink_metadata(&out)
                && meta.file_type().is_symlink()
            {
                fs::remove_file(&out).with_path(&out)?;
            }
            fs::copy(entry.path(), &out).with_path(&out)?;
        }
    }
    Ok(())
}

/// Promote the children of a single wrapping directory into `release`.
///
/// Returns false (and leaves the tree alone) unless `release` holds exactly
/// one entry and that entry is a directory.
pub fn remove_top_level_directory(release: &Path) -> Result<bool> {
    let entries = fs::read_dir(release)
        .with_path(release)?
        .collect::<io::Result<Vec<_>>>()
        .with_path(release)?;

    let [wrapper] = entries.as_slice() else {
        debug!(
            "{} has {} top-level entries, not flattening",
            release.display(),
            entries.len()
        );
        return Ok(false);
    };
    if !wrapper.file_type().with_path(wrapper.path())?.is_dir() {
        debug!("{} is not a directory, not flattening", wrapper.path().display());
        return Ok(false);
    }

    // A child may share the wrapper's name, so move the wrapper aside first
    let staging = release.join(format!(".{}.unwrap", wrapper.file_name().to_string_lossy()));
    fs::rename(wrapper.path(), &staging).with_path(wrapper.path())?;

    for child in fs::read_dir(&staging).with_path(&staging)? {
        let child = child.with_path(&staging)?;
        let dest = release.join(child.file_name());
        fs::rename(child.path(), &dest).with_path(&dest)?;
    }
    fs::remove_dir(&staging).with_path(&staging)?;

    info!(
        "Moved contents of {} into {}",
        wrapper.file_name().to_string_lossy(),
        release.display()
    );
    Ok(true)
}

/// Installs the cached artifact into a release directory
pub struct Unpacker<'a> {
    target: &'a DeploymentTarget,
}

impl<'a> Unpacker<'a> {
    pub fn new(target: &'a DeploymentTarget) -> Self {
        Self { target }
    }

    /// Extract (or copy) `artifact` into `release`, flatten if configured,
    /// then hand the tree to the target owner.
    pub fn unpack(&self, artifact: &Path, release: &Path) -> Result<()> {
        let flags = self.target.flags();

        if flags.is_tarball {
            let format = ArchiveFormat::detect(artifact)?;
            info!("Extracting {} into {}", artifact.display(), release.display());
            with_retries("extraction", artifact, || extract(artifact, format, release))?;

            if flags.remove_top_level_directory {
                remove_top_level_directory(release)?;
            }
        } else {
            info!("Copying {} into {}", artifact.display(), release.display());
            with_retries("copy", artifact, || copy_artifact(artifact, release))?;
        }

        self.target.ownership().apply_tree(release)
    }
}
