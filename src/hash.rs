// src/hash.rs

//! SHA-256 digests for artifact comparison
//!
//! The cache copy of an artifact is trusted only if it is content-identical
//! to the source. Version strings are never used for this decision.

use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;
use walkdir::WalkDir;

/// Compute the SHA-256 of a reader as lowercase hex
pub fn sha256_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compute the SHA-256 of a file as lowercase hex
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    sha256_reader(&mut reader)
}

/// Check whether two files have identical content.
///
/// Sizes are compared first so differing artifacts are rejected without
/// hashing.
pub fn files_identical(a: &Path, b: &Path) -> io::Result<bool> {
    let (meta_a, meta_b) = (fs::metadata(a)?, fs::metadata(b)?);
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    Ok(sha256_file(a)? == sha256_file(b)?)
}

/// Check whether two files or two directory trees have identical content.
///
/// Trees match when they hold the same relative paths with the same kinds,
/// file contents and link targets. A file never matches a directory.
pub fn paths_identical(a: &Path, b: &Path) -> io::Result<bool> {
    match (fs::metadata(a)?.is_dir(), fs::metadata(b)?.is_dir()) {
        (false, false) => files_identical(a, b),
        (true, true) => trees_identical(a, b),
        _ => Ok(false),
    }
}

fn tree_entries(root: &Path) -> io::Result<Vec<walkdir::DirEntry>> {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .collect::<walkdir::Result<Vec<_>>>()
        .map_err(io::Error::from)
}

fn trees_identical(a: &Path, b: &Path) -> io::Result<bool> {
    let (left, right) = (tree_entries(a)?, tree_entries(b)?);
    if left.len() != right.len() {
        return Ok(false);
    }

    for (x, y) in left.iter().zip(&right) {
        if x.path().strip_prefix(a).ok() != y.path().strip_prefix(b).ok() {
            return Ok(false);
        }
        let (kind_x, kind_y) = (x.file_type(), y.file_type());
        if kind_x.is_dir() != kind_y.is_dir() || kind_x.is_symlink() != kind_y.is_symlink() {
            return Ok(false);
        }
        if kind_x.is_symlink() {
            if fs::read_link(x.path())? != fs::read_link(y.path())? {
                return Ok(false);
            }
        } else if !kind_x.is_dir() && !files_identical(x.path(), y.path())? {
            return Ok(false);
        }
    }
    Ok(true)
}
