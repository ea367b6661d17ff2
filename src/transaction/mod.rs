// src/transaction/mod.rs

//! Publishing transactions
//!
//! A transaction accumulates one new package version in a staging directory
//! under the repository's `trans/` root and, on close, moves it into the
//! published tree.
//!
//! # Transaction Lifecycle
//!
//! ```text
//! UNOPENED -> OPEN -> add_content* / add_file* -> CLOSED
//!                                              \-> ABANDONED
//! ```
//!
//! The staging directory is named `{unix open time}_{escaped fmri}` and holds
//! a `manifest` (the actions received so far, one per line) plus every new
//! payload, compressed and named by its hash. Creating that directory is the
//! only mutual exclusion between publishers: a second open of the same
//! package at the same timestamp fails with [`TransactionError::AlreadyOpen`].
//!
//! Close is not two-phase. If moving payloads into the store fails after the
//! manifest was moved, the package is partially published and the staging
//! directory is left behind for inspection.

mod content;

pub use content::{ELF_MAGIC, ElfInfo, PackageRules, chain_certificate_count};

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use strum_macros::Display;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::actions::{Action, ActionKind, BytesPayload, PayloadSource};
use crate::digest::HashKind;
use crate::error::{Error, Result};
use crate::fmri::{Fmri, FmriError};
use crate::hash;
use crate::manifest::Manifest;
use crate::server::catalog::Catalog;
use crate::server::RepositoryStore;

const MANIFEST_FILE: &str = "manifest";
const APPEND_MARKER: &str = "append";

/// Move a file atomically, falling back to copy+sync+delete for cross-filesystem moves.
///
/// This handles the EXDEV error that occurs when source and destination are on
/// different filesystems (e.g., staging on /var and the store on /export).
pub(crate) fn move_file_atomic(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            log::debug!(
                "Cross-filesystem move detected ({} -> {}), using copy fallback",
                src.display(),
                dst.display()
            );

            fs::copy(src, dst)?;

            let file = File::open(dst)?;
            file.sync_all()?;
            drop(file);

            // Not every filesystem supports fsync on a directory
            if let Some(parent) = dst.parent()
                && let Ok(dir) = File::open(parent)
            {
                let _ = dir.sync_all();
            }

            fs::remove_file(src)?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Why a transaction operation was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationReason {
    ClientReleaseMissing,
    FmriMissing,
    BadFmri(FmriError),
    /// The FMRI lacks a version (or, when appending, a timestamp)
    VersionMissing { pfmri: String },
    /// The catalog refuses the FMRI: bad name, already published, or renamed
    InvalidNewFmri { pfmri: String },
    PublisherRequired { pfmri: String },
    /// Appending needs an already published package
    MissingFmri { pfmri: String },
    NonSignature,
    /// An obsolete package received a disallowed action
    ObsoleteContent(Option<String>),
    /// A renamed package received a disallowed action
    RenamedContent(Option<String>),
    ObsoleteAndRenamed,
    RenamedWithoutDependency,
    CertificatesPending(usize),
}

impl fmt::Display for OperationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientReleaseMissing => f.write_str("a client release must be specified"),
            Self::FmriMissing => f.write_str("a package FMRI must be specified"),
            Self::BadFmri(e) => write!(f, "{}", e),
            Self::VersionMissing { pfmri } => {
                write!(f, "The specified FMRI, '{}', has an invalid version.", pfmri)
            }
            Self::InvalidNewFmri { pfmri } => write!(
                f,
                "The specified FMRI, '{}', already exists or has been restricted.",
                pfmri
            ),
            Self::PublisherRequired { pfmri } => write!(
                f,
                "The specified FMRI, '{}', must include the publisher prefix as the \
                 repository has no default publisher.",
                pfmri
            ),
            Self::MissingFmri { pfmri } => {
                write!(f, "Need an existing instance of {} to exist to append to it", pfmri)
            }
            Self::NonSignature => f.write_str("Only a signature can be appended to an existing package"),
            Self::ObsoleteContent(None) => {
                f.write_str("An obsolete package cannot contain actions other than 'set' and 'signature'.")
            }
            Self::ObsoleteContent(Some(action)) => {
                write!(f, "This action cannot be present in an obsolete package: {}", action)
            }
            Self::RenamedContent(None) => f.write_str(
                "A renamed package cannot contain actions other than 'set', 'depend', and 'signature'.",
            ),
            Self::RenamedContent(Some(action)) => {
                write!(f, "This action cannot be present in a renamed package: {}", action)
            }
            Self::ObsoleteAndRenamed => {
                f.write_str("A package may not be marked for both obsoletion and renaming.")
            }
            Self::RenamedWithoutDependency => {
                f.write_str("A renamed package must contain at least one 'depend' action.")
            }
            Self::CertificatesPending(n) => write!(
                f,
                "{} certificate(s) have not been delivered for the signature action.",
                n
            ),
        }
    }
}

fn trans_suffix(trans_id: &Option<String>) -> String {
    trans_id
        .as_deref()
        .map(|id| format!(" (transaction {})", id))
        .unwrap_or_default()
}

/// Transaction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("{operation} failed{}: {reason}", trans_suffix(.trans_id))]
    Operation {
        operation: &'static str,
        trans_id: Option<String>,
        reason: OperationReason,
    },

    #[error("No Transaction matching ID '{0}' could be found.")]
    UnknownId(String),

    #[error("Transaction ID '{0}' is already open.")]
    AlreadyOpen(String),

    #[error("cannot {operation} a transaction that is {state}")]
    State {
        operation: &'static str,
        state: TransactionState,
    },
}

impl TransactionError {
    /// The refusal reason, for operation errors
    pub fn reason(&self) -> Option<&OperationReason> {
        match self {
            Self::Operation { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum TransactionState {
    Unopened,
    Open,
    Closed,
    Abandoned,
}

/// Catalog state reported when a transaction ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum PackageState {
    Published,
    Abandoned,
}

/// One in-flight package publication
#[derive(Debug)]
pub struct Transaction {
    state: TransactionState,
    open_time: Option<DateTime<Utc>>,
    pkg_name: String,
    client_release: String,
    fmri: Option<Fmri>,
    dir: PathBuf,
    append_trans: bool,
    remaining_payload_cnt: usize,
    rules: PackageRules,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            state: TransactionState::Unopened,
            open_time: None,
            pkg_name: String::new(),
            client_release: String::new(),
            fmri: None,
            dir: PathBuf::new(),
            append_trans: false,
            remaining_payload_cnt: 0,
            rules: PackageRules::default(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Transaction id, `{unix open time}_{escaped fmri}`
    pub fn id(&self) -> Option<String> {
        let (open_time, fmri) = (self.open_time?, self.fmri.as_ref()?);
        Some(format!(
            "{}_{}",
            open_time.timestamp(),
            urlencoding::encode(&fmri.to_string())
        ))
    }

    pub fn fmri(&self) -> Option<&Fmri> {
        self.fmri.as_ref()
    }

    pub fn open_time(&self) -> Option<DateTime<Utc>> {
        self.open_time
    }

    /// Package as named by the publisher, publisher-qualified, without timestamp
    pub fn pkg_name(&self) -> &str {
        &self.pkg_name
    }

    pub fn client_release(&self) -> &str {
        &self.client_release
    }

    /// Staging directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether this transaction appends to an already published package
    pub fn is_append(&self) -> bool {
        self.append_trans
    }

    /// Chain certificates announced but not yet delivered
    pub fn remaining_payload_cnt(&self) -> usize {
        self.remaining_payload_cnt
    }

    pub fn rules(&self) -> &PackageRules {
        &self.rules
    }

    fn op_error(&self, operation: &'static str, reason: OperationReason) -> Error {
        TransactionError::Operation {
            operation,
            trans_id: self.id(),
            reason,
        }
        .into()
    }

    fn require_state(&self, operation: &'static str, expected: TransactionState) -> Result<()> {
        if self.state != expected {
            return Err(TransactionError::State {
                operation,
                state: self.state,
            }
            .into());
        }
        Ok(())
    }

    fn staged_manifest(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// Validate the client release and FMRI, applying the default publisher
    fn resolve_fmri(
        &mut self,
        operation: &'static str,
        store: &RepositoryStore,
        client_release: Option<&str>,
        pfmri: Option<&str>,
        need_timestamp: bool,
    ) -> Result<Fmri> {
        let client_release =
            client_release.ok_or_else(|| self.op_error(operation, OperationReason::ClientReleaseMissing))?;
        let pfmri = pfmri.ok_or_else(|| self.op_error(operation, OperationReason::FmriMissing))?;

        let mut fmri = Fmri::parse_with_build(pfmri, Some(client_release))
            .map_err(|e| self.op_error(operation, OperationReason::BadFmri(e)))?;

        if fmri.version.is_none() || (need_timestamp && fmri.get_timestamp().is_none()) {
            return Err(self.op_error(
                operation,
                OperationReason::VersionMissing {
                    pfmri: pfmri.to_string(),
                },
            ));
        }

        if fmri.publisher.is_none() {
            match store.publisher() {
                Some(publisher) => fmri.publisher = Some(publisher.to_string()),
                None => {
                    return Err(self.op_error(
                        operation,
                        OperationReason::PublisherRequired {
                            pfmri: pfmri.to_string(),
                        },
                    ));
                }
            }
        }

        self.client_release = client_release.to_string();
        self.pkg_name = strip_timestamp(&fmri);
        Ok(fmri)
    }

    /// Create the staging directory for the current id
    fn create_staging_dir(&mut self, store: &RepositoryStore) -> Result<()> {
        let basename = self
            .id()
            .ok_or_else(|| Error::InitError("transaction has no id".to_string()))?;
        let dir = store.trans_root().join(&basename);

        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(TransactionError::AlreadyOpen(basename).into());
            }
            Err(e) => return Err(Error::from_io(e, &dir)),
        }

        debug!("Created staging directory {}", dir.display());
        self.dir = dir;
        Ok(())
    }

    /// Start publishing a new package version
    ///
    /// Without a timestamp in `pfmri` one is chosen that is not yet in the
    /// catalog.
    pub fn open(
        &mut self,
        store: &RepositoryStore,
        client_release: Option<&str>,
        pfmri: Option<&str>,
    ) -> Result<()> {
        self.require_state("open", TransactionState::Unopened)?;
        let mut fmri = self.resolve_fmri("open", store, client_release, pfmri, false)?;

        let open_time = match fmri.get_timestamp() {
            Some(ts) => ts,
            None => loop {
                let now = Utc::now().trunc_subsecs(0);
                fmri.set_timestamp(now)?;
                if !store.catalog().contains(&fmri) {
                    break now;
                }
                std::thread::sleep(Duration::from_millis(250));
            },
        };

        if !store.valid_new_fmri(&fmri) {
            return Err(self.op_error(
                "open",
                OperationReason::InvalidNewFmri {
                    pfmri: pfmri.unwrap_or_default().to_string(),
                },
            ));
        }

        self.open_time = Some(open_time);
        self.fmri = Some(fmri.clone());
        if let Err(e) = self.create_staging_dir(store) {
            self.open_time = None;
            self.fmri = None;
            return Err(e);
        }

        let fact = Action::from_pairs(
            ActionKind::Set,
            None,
            [("name", "pkg.fmri"), ("value", fmri.to_string().as_str())],
        )?;
        let header = format!(
            "# {}, client release {}\n{}\n",
            self.pkg_name, self.client_release, fact
        );
        let path = self.staged_manifest();
        fs::write(&path, header).map_err(|e| Error::from_io(e, &path))?;

        self.state = TransactionState::Open;
        info!("Opened transaction {}", self.id().unwrap_or_default());
        Ok(())
    }

    /// Start adding signature actions to an already published package
    ///
    /// `pfmri` must carry the published version's timestamp.
    pub fn append(
        &mut self,
        store: &RepositoryStore,
        client_release: Option<&str>,
        pfmri: Option<&str>,
    ) -> Result<()> {
        self.require_state("append", TransactionState::Unopened)?;
        let fmri = self.resolve_fmri("append", store, client_release, pfmri, true)?;

        if !store.valid_append_fmri(&fmri) {
            return Err(self.op_error(
                "append",
                OperationReason::MissingFmri {
                    pfmri: fmri.to_string(),
                },
            ));
        }

        self.open_time = fmri.get_timestamp();
        self.fmri = Some(fmri.clone());
        self.create_staging_dir(store)?;

        let marker = self.dir.join(APPEND_MARKER);
        File::create(&marker).map_err(|e| Error::from_io(e, &marker))?;

        let published = store.manifest(&fmri)?;
        let staged = self.staged_manifest();
        fs::copy(&published, &staged).map_err(|e| Error::from_io(e, &published))?;

        self.append_trans = true;
        self.state = TransactionState::Open;
        info!("Opened append transaction {}", self.id().unwrap_or_default());
        Ok(())
    }

    /// Reload a transaction from its staging directory
    pub fn reopen(store: &RepositoryStore, trans_dir: &Path) -> Result<Self> {
        let basename = trans_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let unknown = || Error::from(TransactionError::UnknownId(basename.clone()));

        let (open_secs, escaped) = basename.split_once('_').ok_or_else(unknown)?;
        let open_time = open_secs
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(unknown)?;
        let pkg_name = urlencoding::decode(escaped).map_err(|_| unknown())?.into_owned();
        let fmri = Fmri::parse(&pkg_name)?;

        let dir = store.trans_root().join(&basename);
        if !dir.is_dir() {
            return Err(unknown());
        }

        let mut trans = Self {
            state: TransactionState::Open,
            open_time: Some(open_time),
            pkg_name: strip_timestamp(&fmri),
            fmri: Some(fmri),
            dir,
            ..Self::new()
        };

        let path = trans.staged_manifest();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(trans),
            Err(e) => return Err(Error::from_io(e, &path)),
        };

        if let Some(release) = text
            .lines()
            .next()
            .and_then(|l| l.rsplit_once(", client release "))
            .map(|(_, r)| r.trim())
        {
            trans.client_release = release.to_string();
        }

        let mut manifest = Manifest::new();
        manifest.set_content(&text)?;
        trans.append_trans = trans.dir.join(APPEND_MARKER).exists();
        trans.rules = PackageRules::from_actions(
            manifest.actions(),
            manifest.get_bool("pkg.obsolete", false)?,
            manifest.get_bool("pkg.renamed", false)?,
        );

        debug!("Reopened transaction {}", basename);
        Ok(trans)
    }

    /// Add one action, storing its payload if it has one
    ///
    /// Payloads are hashed with every hash the repository emits. ELF payloads
    /// also get `elfbits`, `elfarch` and, for dynamic objects, `elfhash`.
    /// Content already in the store is not staged again; its stored form
    /// still supplies `chash` and `pkg.csize`.
    pub fn add_content(&mut self, store: &RepositoryStore, mut action: Action) -> Result<()> {
        self.require_state("add_content", TransactionState::Open)?;

        if self.append_trans && action.kind != ActionKind::Signature {
            return Err(self.op_error("add_content", OperationReason::NonSignature));
        }

        let size = action
            .attr_str("pkg.size")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        if action.has_payload() && size == 0 && action.payload().is_none() {
            // Empty files travel without a payload
            action.set_payload(Some(Arc::new(BytesPayload::new(Vec::new())) as Arc<dyn PayloadSource>));
        }

        if let Some(payload) = action.payload().cloned() {
            let mut data = Vec::new();
            payload.open()?.read_to_end(&mut data)?;
            self.stage_payload(store, &mut action, &data)?;
        }

        if action.kind == ActionKind::Signature {
            self.remaining_payload_cnt = chain_certificate_count(&action);
        }

        self.rules
            .admit(&action)
            .map_err(|reason| self.op_error("add_content", reason))?;

        let path = self.staged_manifest();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::from_io(e, &path))?;
        writeln!(file, "{}", action)?;

        debug!("Added {} to {}", action.distinguished_name(), self.id().unwrap_or_default());
        Ok(())
    }

    fn stage_payload(&self, store: &RepositoryStore, action: &mut Action, data: &[u8]) -> Result<()> {
        let policy = store.hash_policy();

        let hashes = policy.compute_hashes(&mut &data[..], HashKind::Hash)?;
        let mut fname = None;
        for (attr, value) in hashes {
            if attr == "hash" {
                fname = Some(value);
            } else {
                action.set_attr(attr, value);
            }
        }
        let fname = fname.unwrap_or_else(|| hash::sha1(data));
        action.hash = Some(fname.clone());

        if !action.has_attr("pkg.size") || action.attr_str("pkg.size") == Some("0") {
            action.set_attr("pkg.size", data.len().to_string());
        }

        if data.starts_with(ELF_MAGIC) {
            match ElfInfo::parse(data) {
                Ok(info) => info.apply(action),
                Err(e) => warn!("Unable to read ELF metadata from {}: {}", fname, e),
            }
        }

        let (csize, chashes) = self.stage_compressed(store, &fname, data, HashKind::Chash)?;
        for (attr, value) in chashes {
            action.set_attr(attr, value);
        }
        action.set_attr("pkg.csize", csize.to_string());
        Ok(())
    }

    /// Compressed size and hashes of `data`, staging it unless already stored
    fn stage_compressed(
        &self,
        store: &RepositoryStore,
        fname: &str,
        data: &[u8],
        kind: HashKind,
    ) -> Result<(usize, std::collections::BTreeMap<String, String>)> {
        let policy = store.hash_policy();

        if store.file_store().holds_pkg_gzip(fname) {
            debug!("Reusing stored object {}", fname);
            let stored = store.file_store().path(fname);
            let packed = fs::read(&stored).map_err(|e| Error::from_io(e, &stored))?;
            let chashes = policy.compute_hashes(&mut &packed[..], kind)?;
            return Ok((packed.len(), chashes));
        }
        if store.file(fname).is_some() {
            debug!("Stored object {} is not pkg gzip; staging a fresh copy", fname);
        }

        let (packed, chashes) = policy.compressed_attrs(data, kind)?;
        let staged = self.dir.join(fname);
        fs::write(&staged, &packed).map_err(|e| Error::from_io(e, &staged))?;
        Ok((packed.len(), chashes))
    }

    /// Add a bare file, such as a chain certificate for a signature
    ///
    /// Returns the file's hash.
    pub fn add_file(&mut self, store: &RepositoryStore, data: &[u8]) -> Result<String> {
        self.require_state("add_file", TransactionState::Open)?;

        let fname = store
            .hash_policy()
            .compute_hashes(&mut &data[..], HashKind::Hash)?
            .remove("hash")
            .unwrap_or_else(|| hash::sha1(data));
        self.stage_compressed(store, &fname, data, HashKind::ChainChash)?;

        self.remaining_payload_cnt = self.remaining_payload_cnt.saturating_sub(1);
        debug!("Added file {} to {}", fname, self.id().unwrap_or_default());
        Ok(fname)
    }

    /// Publish the package and discard the staging directory
    ///
    /// Returns the published FMRI and its state.
    pub fn close(&mut self, store: &mut RepositoryStore, add_to_catalog: bool) -> Result<(String, PackageState)> {
        self.require_state("close", TransactionState::Open)?;

        self.rules
            .check_complete()
            .map_err(|reason| self.op_error("close", reason))?;
        if self.append_trans && self.remaining_payload_cnt > 0 {
            return Err(self.op_error(
                "close",
                OperationReason::CertificatesPending(self.remaining_payload_cnt),
            ));
        }

        let fmri = self
            .fmri
            .clone()
            .ok_or_else(|| Error::InitError("open transaction has no FMRI".to_string()))?;

        self.publish_package(store, &fmri)?;
        if add_to_catalog {
            if self.append_trans {
                store.replace_package(&fmri)?;
            } else {
                store.add_package(&fmri)?;
            }
        }

        // The package is published either way
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            warn!("Unable to remove {}: {}", self.dir.display(), e);
        }

        self.state = TransactionState::Closed;
        info!("Published {}", fmri);
        Ok((fmri.to_string(), PackageState::Published))
    }

    /// Move the staged manifest and payloads into the repository
    fn publish_package(&self, store: &RepositoryStore, fmri: &Fmri) -> Result<()> {
        let dest = store.manifest(fmri)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::from_io(e, parent))?;
        }
        let src = self.staged_manifest();
        move_file_atomic(&src, &dest).map_err(|e| Error::from_io(e, &dest))?;

        for entry in fs::read_dir(&self.dir).map_err(|e| Error::from_io(e, &self.dir))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == APPEND_MARKER {
                continue;
            }
            store.file_store().insert(&name, &entry.path())?;
        }
        Ok(())
    }

    /// Discard the transaction
    pub fn abandon(&mut self) -> Result<PackageState> {
        self.require_state("abandon", TransactionState::Open)?;

        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::from_io(e, &self.dir)),
        }

        self.state = TransactionState::Abandoned;
        info!("Abandoned transaction {}", self.id().unwrap_or_default());
        Ok(PackageState::Abandoned)
    }
}

/// FMRI string without its `:timestamp`
fn strip_timestamp(fmri: &Fmri) -> String {
    let full = fmri.to_string();
    match (fmri.get_timestamp(), full.rsplit_once(':')) {
        (Some(_), Some((head, _))) => head.to_string(),
        _ => full,
    }
}
