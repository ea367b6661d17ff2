// src/error.rs

//! Crate-wide error type
//!
//! Each subsystem owns a `thiserror` enum describing its own failures; this
//! module folds them into a single [`Error`] so callers can propagate with `?`
//! across module boundaries.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::actions::ActionError;
use crate::compression::CompressionError;
use crate::fmri::FmriError;
use crate::hash::HashError;
use crate::manifest::ManifestError;
use crate::server::catalog::CatalogError;
use crate::server::updatelog::UpdateLogError;
use crate::signature::SignatureError;
use crate::transaction::TransactionError;

/// Top-level error
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("I/O error: {0}")]
    IoError(String),

    /// The caller lacks permission to write somewhere it needs to
    #[error("Permission denied: {}", .0.display())]
    Permissions(PathBuf),

    /// The target lives on a read-only file system
    #[error("Read-only file system: {}", .0.display())]
    ReadOnlyFileSystem(PathBuf),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Initialization error: {0}")]
    InitError(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Fmri(#[from] FmriError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    UpdateLog(#[from] UpdateLogError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify an I/O error raised while touching `path`
    ///
    /// `EACCES` and `EROFS` become [`Error::Permissions`] and
    /// [`Error::ReadOnlyFileSystem`]; anything else stays an [`Error::Io`].
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        match err.raw_os_error() {
            Some(libc::EACCES) => Self::Permissions(path.to_path_buf()),
            Some(libc::EROFS) => Self::ReadOnlyFileSystem(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    /// True for the permission and read-only categories
    pub fn is_permission_error(&self) -> bool {
        matches!(self, Self::Permissions(_) | Self::ReadOnlyFileSystem(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_maps_eacces() {
        let err = io::Error::from_raw_os_error(libc::EACCES);
        let mapped = Error::from_io(err, Path::new("/repo/catalog"));
        assert!(matches!(mapped, Error::Permissions(ref p) if p == Path::new("/repo/catalog")));
        assert!(mapped.is_permission_error());
    }

    #[test]
    fn test_from_io_maps_erofs() {
        let err = io::Error::from_raw_os_error(libc::EROFS);
        let mapped = Error::from_io(err, Path::new("/ro"));
        assert!(matches!(mapped, Error::ReadOnlyFileSystem(_)));
    }

    #[test]
    fn test_from_io_passes_through_other_errors() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let mapped = Error::from_io(err, Path::new("/x"));
        assert!(matches!(mapped, Error::Io(_)));
        assert!(!mapped.is_permission_error());
    }
}
