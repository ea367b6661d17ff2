// src/filesystem/mod.rs

//! On-disk storage for package payloads
//!
//! Published file contents live in a hash-addressed store, compressed, and
//! are shared between every package that delivers them.

mod store;

pub use store::FileStore;
