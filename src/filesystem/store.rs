// src/filesystem/store.rs

//! Hash-addressed payload store
//!
//! Payloads are kept compressed under the hash of their uncompressed bytes,
//! bucketed two levels deep so no directory grows unbounded:
//!
//! ```text
//! file/3f/786850/3f786850e387550fdab836ed7e6dc881de23001b
//! ```
//!
//! Two packages delivering the same content share one stored object.

use crate::compression::{self, CompressionFormat};
use crate::error::{Error, Result};
use crate::hash::{self, HashAlgorithm};
use crate::transaction::move_file_atomic;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Hash-addressed storage manager
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Root directory for stored objects (e.g. `<repo>/file`)
    root: PathBuf,
}

impl FileStore {
    /// Open a store, creating its root directory if needed
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| Error::from_io(e, &root))?;
            debug!("Created file store directory: {:?}", root);
        }

        Ok(Self { root })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk location of an object
    ///
    /// Path format: `{root}/{hash[0:2]}/{hash[2:8]}/{hash}`. Hashes too short
    /// to bucket are stored directly under the root.
    pub fn path(&self, hash: &str) -> PathBuf {
        match (hash.get(0..2), hash.get(2..8)) {
            (Some(a), Some(b)) => self.root.join(a).join(b).join(hash),
            _ => self.root.join(hash),
        }
    }

    /// Check if an object with the given hash exists
    pub fn exists(&self, hash: &str) -> bool {
        self.path(hash).is_file()
    }

    /// Whether the object under `hash` is present in the stored payload format
    pub fn holds_pkg_gzip(&self, hash: &str) -> bool {
        let mut header = [0u8; compression::GZIP_HEADER.len()];
        fs::File::open(self.path(hash))
            .and_then(|mut f| f.read_exact(&mut header))
            .is_ok_and(|()| compression::is_pkg_gzip(&header))
    }

    /// Move a staged file into the store under `hash`
    ///
    /// An object already present under that hash in the stored payload format
    /// is kept and the staged copy discarded. A raw or foreign-gzip object is
    /// replaced.
    pub fn insert(&self, hash: &str, src: &Path) -> Result<PathBuf> {
        let dst = self.path(hash);

        if self.holds_pkg_gzip(hash) {
            debug!("Object already in store: {}", hash);
            if src != dst {
                fs::remove_file(src).map_err(|e| Error::from_io(e, src))?;
            }
            return Ok(dst);
        }
        if dst.exists() {
            debug!("Replacing object {} not in the stored payload format", hash);
        }

        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::from_io(e, parent))?;
        }

        move_file_atomic(src, &dst).map_err(|e| Error::from_io(e, &dst))?;
        debug!("Stored object {} from {}", hash, src.display());
        Ok(dst)
    }

    /// Compress `data` and store it under `hash`
    pub fn insert_bytes(&self, hash: &str, data: &[u8]) -> Result<PathBuf> {
        let dst = self.path(hash);
        if self.holds_pkg_gzip(hash) {
            return Ok(dst);
        }

        let parent = dst.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent).map_err(|e| Error::from_io(e, parent))?;

        let packed = compression::compress(data)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| Error::from_io(e, parent))?;
        std::io::Write::write_all(&mut tmp, &packed)?;
        tmp.persist(&dst)
            .map_err(|e| Error::from_io(e.error, &dst))?;
        Ok(dst)
    }

    /// Open a decompressing reader over a stored object
    pub fn open(&self, hash: &str) -> Result<Box<dyn Read + Send>> {
        let path = self.path(hash);
        let raw = fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(format!("object {} not in store", hash)),
            _ => Error::from_io(e, &path),
        })?;
        let format = CompressionFormat::from_magic_bytes(&raw);
        Ok(compression::create_decoder(std::io::Cursor::new(raw), format))
    }

    /// Read and decompress an object, verifying it against its hash
    pub fn retrieve(&self, hash: &str, algorithm: HashAlgorithm) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        self.open(hash)?.read_to_end(&mut content)?;

        let computed = hash::hash_bytes(algorithm, &content).value;
        if computed != hash {
            return Err(Error::ChecksumMismatch {
                expected: hash.to_string(),
                actual: computed,
            });
        }

        debug!("Retrieved object {} ({} bytes)", hash, content.len());
        Ok(content)
    }

    /// Size in bytes of the stored (compressed) object
    pub fn stored_size(&self, hash: &str) -> Result<u64> {
        let path = self.path(hash);
        Ok(fs::metadata(&path).map_err(|e| Error::from_io(e, &path))?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const ABC_SHA1: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";

    #[test]
    fn test_path_layout() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path()).unwrap();
        assert_eq!(
            store.path(ABC_SHA1),
            temp.path().join("a9").join("993e36").join(ABC_SHA1)
        );
        assert_eq!(store.path("ab"), temp.path().join("ab"));
    }

    #[test]
    fn test_insert_and_retrieve() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path().join("file")).unwrap();

        let staged = temp.path().join(ABC_SHA1);
        let mut f = fs::File::create(&staged).unwrap();
        f.write_all(&compression::compress(b"abc").unwrap()).unwrap();
        drop(f);

        let dst = store.insert(ABC_SHA1, &staged).unwrap();
        assert!(dst.exists());
        assert!(!staged.exists());
        assert!(store.exists(ABC_SHA1));
        assert_eq!(store.retrieve(ABC_SHA1, HashAlgorithm::Sha1).unwrap(), b"abc");
    }

    #[test]
    fn test_insert_existing_keeps_original() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path().join("file")).unwrap();
        store.insert_bytes(ABC_SHA1, b"abc").unwrap();
        let before = store.stored_size(ABC_SHA1).unwrap();

        let staged = temp.path().join("staged");
        fs::write(&staged, b"something else").unwrap();
        store.insert(ABC_SHA1, &staged).unwrap();

        assert!(!staged.exists());
        assert_eq!(store.stored_size(ABC_SHA1).unwrap(), before);
    }

    #[test]
    fn test_insert_replaces_raw_object() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path().join("file")).unwrap();
        let dst = store.path(ABC_SHA1);
        fs::create_dir_all(dst.parent().unwrap()).unwrap();
        fs::write(&dst, b"abc").unwrap();
        assert!(store.exists(ABC_SHA1));
        assert!(!store.holds_pkg_gzip(ABC_SHA1));

        let staged = temp.path().join("staged");
        fs::write(&staged, compression::compress(b"abc").unwrap()).unwrap();
        store.insert(ABC_SHA1, &staged).unwrap();

        assert!(!staged.exists());
        assert!(store.holds_pkg_gzip(ABC_SHA1));
        assert_eq!(store.retrieve(ABC_SHA1, HashAlgorithm::Sha1).unwrap(), b"abc");
    }

    #[test]
    fn test_insert_bytes_rewrites_raw_object() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path()).unwrap();
        let dst = store.path(ABC_SHA1);
        fs::create_dir_all(dst.parent().unwrap()).unwrap();
        fs::write(&dst, b"abc").unwrap();

        store.insert_bytes(ABC_SHA1, b"abc").unwrap();
        assert_eq!(fs::read(&dst).unwrap(), compression::compress(b"abc").unwrap());
    }

    #[test]
    fn test_retrieve_detects_corruption() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path()).unwrap();
        let bogus = "0".repeat(40);
        store.insert_bytes(&bogus, b"abc").unwrap();
        assert!(matches!(
            store.retrieve(&bogus, HashAlgorithm::Sha1),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_object() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path()).unwrap();
        assert!(!store.exists(ABC_SHA1));
        assert!(matches!(store.open(ABC_SHA1), Err(Error::NotFound(_))));
    }
}
