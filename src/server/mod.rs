// src/server/mod.rs
//! Publication depot
//!
//! The server side of a package repository:
//! - [`RepositoryStore`] owns the on-disk layout and the repository lock
//! - [`ServerCatalog`] lists every published package version
//! - [`UpdateLog`] records catalog changes hour by hour so clients can
//!   update incrementally
//! - [`RepositoryConfig`] is the TOML configuration describing all of them
//!
//! Publishing itself goes through [`crate::transaction::Transaction`].

pub mod catalog;
pub mod config;
mod lock;
mod repository;
pub mod updatelog;

pub use catalog::{Catalog, CatalogEntry, CatalogError, EntryKind, RenameRecord, ServerCatalog};
pub use config::{RepositoryConfig, RepositorySection, UpdateLogSection};
pub use lock::RepositoryLock;
pub use repository::RepositoryStore;
pub use updatelog::{CatalogUpdate, Operation, UpdateLog, UpdateLogError, UpdateRecord};
