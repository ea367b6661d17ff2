// src/lib.rs

//! pkgdepot: IPS package manifests and a publishing depot
//!
//! Packages are described by manifests: ordered lists of typed actions
//! (`file`, `dir`, `depend`, `set`, `signature`, ...) identified by an FMRI
//! such as `pkg://example.com/web/server@2.4,5.11-1:20240101T000000Z`.
//!
//! # Architecture
//!
//! - [`actions`]: parsing, rendering and comparing single actions
//! - [`manifest`]: manifests, their differences, duplicates and search index
//! - [`digest`]: which hash attributes are emitted and trusted
//! - [`signature`]: signing and verifying manifests
//! - [`transaction`]: publishing a package version into a repository
//! - [`server`]: repository layout, catalog and update log
//! - [`filesystem`]: the hash-addressed payload store

pub mod actions;
pub mod compression;
pub mod digest;
mod error;
pub mod filesystem;
pub mod fmri;
pub mod hash;
pub mod manifest;
pub mod server;
pub mod signature;
pub mod transaction;

pub use actions::{Action, ActionError, ActionKind, AttrValue};
pub use digest::{HashKind, HashPolicy};
pub use error::{Error, Result};
pub use fmri::{Fmri, FmriError, Version};
pub use hash::{Hash, HashAlgorithm, Hasher};
pub use manifest::{Manifest, ManifestDifference};
pub use server::{RepositoryConfig, RepositoryStore};
pub use signature::{SignatureAction, SigningKeyPair};
pub use transaction::{PackageState, Transaction, TransactionError, TransactionState};
