// src/cli/mod.rs
//! CLI definitions for pkgdepot
//!
//! Argument parsing only; the implementations live in the `commands` module.
//!
//! Manifest tools:
//! - `diff` - What changes between two manifests
//! - `duplicates` - Actions claiming one identity with different content
//! - `search` - Look a token up in a manifest's search index
//!
//! Repository:
//! - `publish` - Publish a manifest and its payloads into a repository
//! - `log` - Catalog updates since a point in time

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pkgdepot")]
#[command(author = "pkgdepot Contributors")]
#[command(version)]
#[command(about = "IPS package manifests and publishing depot", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where the repository lives
#[derive(Args)]
pub struct RepoArgs {
    /// Repository configuration file
    #[arg(short, long, conflicts_with = "repo")]
    pub config: Option<PathBuf>,

    /// Repository root, when not using a configuration file
    #[arg(short = 's', long)]
    pub repo: Option<PathBuf>,

    /// Publisher for FMRIs that name none
    #[arg(short, long)]
    pub publisher: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show what it takes to get from one manifest to another
    Diff {
        /// Origin manifest
        old: PathBuf,

        /// Destination manifest
        new: PathBuf,

        /// Only consider actions for this variant value (name=value)
        #[arg(short = 'v', long = "variant")]
        variants: Vec<String>,
    },

    /// Report actions that share an identity but differ in content
    Duplicates {
        /// Manifest to check
        manifest: PathBuf,
    },

    /// Look up a token in a manifest's search index
    Search {
        /// Manifest to index
        manifest: PathBuf,

        /// Token to look for
        token: String,

        /// Restrict to one token type (e.g. basename, path, fmri)
        #[arg(short = 't', long)]
        token_type: Option<String>,
    },

    /// Publish a manifest into a repository
    Publish {
        #[command(flatten)]
        repo: RepoArgs,

        /// Manifest to publish
        manifest: PathBuf,

        /// Package FMRI; defaults to the manifest's pkg.fmri
        #[arg(short, long)]
        fmri: Option<String>,

        /// Directory payload paths are relative to
        #[arg(short = 'd', long, default_value = ".")]
        basedir: PathBuf,

        /// Build release of the publishing client
        #[arg(long, default_value = "5.11")]
        client_release: String,

        /// Add a hash signature over the published actions
        #[arg(long)]
        sign: bool,

        /// Publish without adding the package to the catalog
        #[arg(long)]
        no_catalog: bool,
    },

    /// Show catalog updates recorded since a timestamp
    Log {
        #[command(flatten)]
        repo: RepoArgs,

        /// Last catalog timestamp the client has (ISO 8601); omit for the full catalog
        #[arg(long)]
        since: Option<String>,

        /// Print each update record as a JSON object (requires --since)
        #[arg(long, requires = "since")]
        json: bool,
    },
}
