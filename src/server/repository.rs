// src/server/repository.rs

//! Repository storage
//!
//! ```text
//! <root>/
//!   lock                    exclusive writer lock
//!   catalog/{attrs,catalog} package catalog
//!   updatelog/%Y%m%d%H      hourly catalog change log
//!   pkg/<name>/<version>    published manifests (both components escaped)
//!   file/ab/cdef01/<hash>   compressed payloads
//!   trans/<id>/             in-flight transactions
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use super::catalog::{Catalog, ServerCatalog};
use super::config::RepositoryConfig;
use super::lock::RepositoryLock;
use super::updatelog::UpdateLog;
use crate::digest::HashPolicy;
use crate::error::{Error, Result};
use crate::filesystem::FileStore;
use crate::fmri::Fmri;
use crate::manifest::Manifest;
use crate::transaction::Transaction;

/// A repository opened for publication
pub struct RepositoryStore {
    root: PathBuf,
    publisher: Option<String>,
    files: FileStore,
    updatelog: UpdateLog,
    policy: HashPolicy,
    _lock: RepositoryLock,
}

impl RepositoryStore {
    /// Open (creating when needed) the repository described by `config`
    ///
    /// Fails if another process has the repository open.
    pub fn open(config: &RepositoryConfig) -> Result<Self> {
        let root = config.root().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| Error::from_io(e, &root))?;

        let lock = RepositoryLock::try_acquire(root.join("lock"))?.ok_or_else(|| {
            Error::IoError(format!("repository {} is in use by another process", root.display()))
        })?;

        let publisher = config.repository.publisher.clone();
        let catalog = ServerCatalog::open(root.join("catalog"), publisher.as_deref(), false)?;
        let updatelog = UpdateLog::open(root.join("updatelog"), catalog, config.updatelog.maxfiles)?;
        let files = FileStore::new(root.join("file"))?;

        for dir in ["pkg", "trans"] {
            let path = root.join(dir);
            fs::create_dir_all(&path).map_err(|e| Error::from_io(e, &path))?;
        }

        info!("Opened repository at {}", root.display());
        Ok(Self {
            root,
            publisher,
            files,
            updatelog,
            policy: config.hash_policy(),
            _lock: lock,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Publisher applied to FMRIs that name none
    pub fn publisher(&self) -> Option<&str> {
        self.publisher.as_deref()
    }

    pub fn hash_policy(&self) -> &HashPolicy {
        &self.policy
    }

    pub fn file_store(&self) -> &FileStore {
        &self.files
    }

    pub fn catalog(&self) -> &ServerCatalog {
        self.updatelog.catalog()
    }

    pub fn updatelog(&self) -> &UpdateLog {
        &self.updatelog
    }

    /// Parent of every transaction staging directory
    pub fn trans_root(&self) -> PathBuf {
        self.root.join("trans")
    }

    pub fn pkg_root(&self) -> PathBuf {
        self.root.join("pkg")
    }

    /// Location of the published manifest for `fmri`
    pub fn manifest(&self, fmri: &Fmri) -> Result<PathBuf> {
        Ok(self.pkg_root().join(fmri.get_dir_path()?))
    }

    /// Load and parse a published manifest
    pub fn get_manifest(&self, fmri: &Fmri) -> Result<Manifest> {
        let path = self.manifest(fmri)?;
        let text = fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(format!("no manifest for {}", fmri)),
            _ => Error::from_io(e, &path),
        })?;

        let mut manifest = Manifest::new();
        manifest.fmri = Some(fmri.clone());
        manifest.set_content(&text)?;
        Ok(manifest)
    }

    /// Stored payload for `hash`, if any
    pub fn file(&self, hash: &str) -> Option<PathBuf> {
        self.files.exists(hash).then(|| self.files.path(hash))
    }

    /// Whether `fmri` may be published as a new package version
    pub fn valid_new_fmri(&self, fmri: &Fmri) -> bool {
        self.catalog().valid_new_fmri(fmri)
    }

    /// Whether `fmri` names a published version that can take appended actions
    pub fn valid_append_fmri(&self, fmri: &Fmri) -> bool {
        fmri.get_timestamp().is_some()
            && self.catalog().contains(fmri)
            && self.manifest(fmri).is_ok_and(|p| p.is_file())
    }

    /// Add a published package to the catalog and update log
    pub fn add_package(&mut self, fmri: &Fmri) -> Result<NaiveDateTime> {
        self.updatelog.add_package(fmri, false)
    }

    /// Note that a published package's manifest was replaced
    pub fn replace_package(&mut self, fmri: &Fmri) -> Result<NaiveDateTime> {
        self.updatelog.replace_package(fmri)
    }

    pub fn rename_package(&mut self, src: &Fmri, dest: &Fmri) -> Result<NaiveDateTime> {
        self.updatelog.rename_package(src, dest)
    }

    /// Reload every transaction left in the staging area
    ///
    /// Directories that cannot be reopened are logged and skipped.
    pub fn in_flight_transactions(&self) -> Result<Vec<Transaction>> {
        let trans_root = self.trans_root();
        let mut found = Vec::new();

        for entry in fs::read_dir(&trans_root).map_err(|e| Error::from_io(e, &trans_root))? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            match Transaction::reopen(self, &path) {
                Ok(t) => found.push(t),
                Err(e) => warn!("Skipping transaction {}: {}", path.display(), e),
            }
        }

        debug!("Found {} in-flight transactions", found.len());
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_layout() {
        let temp = TempDir::new().unwrap();
        let config = RepositoryConfig::with_root(temp.path().join("repo"));
        let store = RepositoryStore::open(&config).unwrap();

        for dir in ["catalog", "updatelog", "pkg", "trans", "file"] {
            assert!(store.root().join(dir).is_dir(), "{} missing", dir);
        }
        assert!(store.publisher().is_none());
        assert_eq!(store.catalog().npkgs(), 0);
    }

    #[test]
    fn test_open_is_exclusive() {
        let temp = TempDir::new().unwrap();
        let config = RepositoryConfig::with_root(temp.path());
        let store = RepositoryStore::open(&config).unwrap();
        assert!(RepositoryStore::open(&config).is_err());
        drop(store);
        assert!(RepositoryStore::open(&config).is_ok());
    }

    #[test]
    fn test_manifest_path() {
        let temp = TempDir::new().unwrap();
        let store = RepositoryStore::open(&RepositoryConfig::with_root(temp.path())).unwrap();
        let fmri = Fmri::parse("pkg://test/web/server@1.0,5.11-2:20240101T000000Z").unwrap();
        assert_eq!(
            store.manifest(&fmri).unwrap(),
            temp.path()
                .join("pkg")
                .join("web%2Fserver")
                .join("1.0%2C5.11-2%3A20240101T000000Z")
        );
        assert!(store.manifest(&Fmri::parse("pkg:/nover").unwrap()).is_err());
        assert!(matches!(store.get_manifest(&fmri), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_file_lookup() {
        let temp = TempDir::new().unwrap();
        let store = RepositoryStore::open(&RepositoryConfig::with_root(temp.path())).unwrap();
        assert!(store.file("a9993e364706816aba3e25717850c26c9cd0d89d").is_none());
        store
            .file_store()
            .insert_bytes("a9993e364706816aba3e25717850c26c9cd0d89d", b"abc")
            .unwrap();
        assert!(store.file("a9993e364706816aba3e25717850c26c9cd0d89d").is_some());
    }
}
