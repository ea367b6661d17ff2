// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use pkgdepot::actions::BytesPayload;
use pkgdepot::{Action, Manifest, RepositoryConfig, RepositoryStore};
use std::sync::Arc;
use tempfile::TempDir;

/// Parse manifest text, panicking on errors.
pub fn manifest(text: &str) -> Manifest {
    text.parse().unwrap()
}

/// Open a fresh repository with default publisher `test`.
///
/// Returns (TempDir, store) - keep the TempDir alive to prevent cleanup.
pub fn setup_repository() -> (TempDir, RepositoryStore) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = RepositoryConfig::with_root(temp_dir.path().join("repo"));
    config.repository.publisher = Some("test".to_string());
    let store = RepositoryStore::open(&config).unwrap();
    (temp_dir, store)
}

/// A `file` action carrying `data` as its payload.
pub fn file_action(path: &str, data: &[u8]) -> Action {
    let mut action: Action = format!("file path={} mode=0644 owner=root group=bin", path)
        .parse()
        .unwrap();
    action.set_payload(Some(Arc::new(BytesPayload::new(data.to_vec()))));
    action
}

/// A small web server package.
pub const SERVER_1_0: &str = "\
set name=pkg.fmri value=pkg://test/web/server@1.0,5.11-1
set name=pkg.summary value=\"Example web server\"
dir path=usr mode=0755 owner=root group=sys
dir path=usr/bin mode=0755 owner=root group=bin
file 3f786850e387550fdab836ed7e6dc881de23001b path=usr/bin/httpd mode=0555 owner=root group=bin pkg.size=1024
file 89e6c98d92887913cadf06b2adb97f26cde4849b path=etc/httpd.conf mode=0644 owner=root group=bin preserve=true
license 6dcd4ce23d88e2ee9568ba546c007c63d9131c1b license=Apache-2.0
depend fmri=pkg:/library/libc@0.5.11 type=require
";
