// src/commands/mod.rs
//! Command handlers for the pkgdepot CLI

mod depot;
mod manifest;

pub use depot::{cmd_log, cmd_publish, PublishOptions};
pub use manifest::{cmd_diff, cmd_duplicates, cmd_search};

use anyhow::{Context, Result};
use pkgdepot::RepositoryConfig;

use crate::cli::RepoArgs;

/// Resolve repository arguments into a validated configuration
pub(crate) fn repository_config(args: &RepoArgs) -> Result<RepositoryConfig> {
    let mut config = match (&args.config, &args.repo) {
        (Some(path), _) => RepositoryConfig::load(path)?,
        (None, Some(root)) => RepositoryConfig::with_root(root),
        (None, None) => RepositoryConfig::new(),
    };

    if let Some(publisher) = &args.publisher {
        config.repository.publisher = Some(publisher.clone());
    }
    config
        .validate()
        .with_context(|| format!("Invalid repository configuration for {}", config.root().display()))?;
    Ok(config)
}
