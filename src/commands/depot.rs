// src/commands/depot.rs

//! Repository commands: publishing and the update log

use anyhow::{bail, Context, Result};
use pkgdepot::actions::{ActionKind, FilePayload};
use pkgdepot::server::catalog::{isoformat, ts_to_datetime};
use pkgdepot::server::CatalogUpdate;
use pkgdepot::{Manifest, RepositoryStore, SignatureAction, Transaction};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::repository_config;
use crate::cli::RepoArgs;

/// Options for [`cmd_publish`]
pub struct PublishOptions<'a> {
    pub fmri: Option<&'a str>,
    pub basedir: &'a Path,
    pub client_release: &'a str,
    pub sign: bool,
    pub add_to_catalog: bool,
}

/// Publish `manifest_path` as one new package version
pub fn cmd_publish(repo: &RepoArgs, manifest_path: &Path, opts: &PublishOptions<'_>) -> Result<()> {
    let config = repository_config(repo)?;
    let mut store = RepositoryStore::open(&config)?;

    let text = fs::read_to_string(manifest_path)
        .with_context(|| format!("Failed to read manifest {}", manifest_path.display()))?;
    let manifest: Manifest = text
        .parse()
        .with_context(|| format!("Failed to parse manifest {}", manifest_path.display()))?;

    let pfmri = match opts.fmri {
        Some(fmri) => fmri.to_string(),
        None => match manifest.get("pkg.fmri").and_then(|v| v.first()) {
            Some(fmri) => fmri.to_string(),
            None => bail!("{} has no pkg.fmri; pass --fmri", manifest_path.display()),
        },
    };

    let mut trans = Transaction::new();
    trans.open(&store, Some(opts.client_release), Some(&pfmri))?;
    info!("Publishing {} from {}", pfmri, manifest_path.display());

    if let Err(e) = add_actions(&mut trans, &store, &manifest, opts) {
        if let Err(abandon_err) = trans.abandon() {
            warn!("Failed to abandon transaction: {}", abandon_err);
        }
        return Err(e);
    }

    let (fmri, state) = trans.close(&mut store, opts.add_to_catalog)?;
    println!("{}", state);
    println!("{}", fmri);
    Ok(())
}

fn add_actions(
    trans: &mut Transaction,
    store: &RepositoryStore,
    manifest: &Manifest,
    opts: &PublishOptions<'_>,
) -> Result<()> {
    for action in manifest.actions() {
        let is_fmri = action.kind == ActionKind::Set && action.attr_str("name") == Some("pkg.fmri");
        // Signatures are recomputed for what is actually published.
        if is_fmri || action.kind == ActionKind::Signature {
            continue;
        }

        let mut action = action.clone();
        if action.has_payload() && action.payload().is_none() {
            let source = payload_source(&mut action, opts.basedir);
            if let Some(path) = source {
                action.set_payload(Some(Arc::new(FilePayload::new(path))));
            } else if action.get_size() > 0 {
                bail!("{} has no payload source", action.distinguished_name());
            }
        }
        trans.add_content(store, action)?;
    }

    if opts.sign {
        let staged = fs::read_to_string(trans.dir().join("manifest"))?;
        let staged: Manifest = staged.parse()?;
        let mut sig = SignatureAction::create("sha256", None)?;
        sig.set_signature(staged.actions(), None, &[], store.hash_policy())?;
        trans.add_content(store, sig.into_action())?;
    }
    Ok(())
}

/// Payload file for an action: its positional hash if given, else its path
fn payload_source(action: &mut pkgdepot::Action, basedir: &Path) -> Option<PathBuf> {
    if let Some(hash) = action.hash.take() {
        return Some(basedir.join(hash));
    }
    action.attr_str("path").map(|p| basedir.join(p))
}

/// Print the catalog updates a client last updated at `since` needs
pub fn cmd_log(repo: &RepoArgs, since: Option<&str>, json: bool) -> Result<()> {
    let config = repository_config(repo)?;
    let store = RepositoryStore::open(&config)?;

    let since = since
        .map(ts_to_datetime)
        .transpose()
        .context("Invalid --since timestamp")?;

    if json {
        let Some(since) = since else {
            bail!("--json requires --since");
        };
        if !store.updatelog().enough_history(&since) {
            bail!("The update log does not reach back to {}", isoformat(&since));
        }
        for record in store.updatelog().gen_updates_as_dictionaries(&since)? {
            println!("{}", serde_json::to_string(&record)?);
        }
        return Ok(());
    }

    match store.updatelog().updates_since(since.as_ref())? {
        CatalogUpdate::UpToDate => println!("Catalog is up to date."),
        CatalogUpdate::Incremental(lines) => {
            info!("Sending {} incremental updates", lines.len());
            for line in lines {
                println!("{}", line.trim_end());
            }
        }
        CatalogUpdate::Full(lines) => {
            info!("Sending full catalog ({} lines)", lines.len());
            for line in lines {
                println!("{}", line.trim_end());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_source_prefers_hash() {
        let mut action: pkgdepot::Action = "file proto/bin/ls path=usr/bin/ls".parse().unwrap();
        assert_eq!(
            payload_source(&mut action, Path::new("/build")),
            Some(PathBuf::from("/build/proto/bin/ls"))
        );
        assert!(action.hash.is_none());

        let mut action: pkgdepot::Action = "file path=usr/bin/cat".parse().unwrap();
        assert_eq!(
            payload_source(&mut action, Path::new("/build")),
            Some(PathBuf::from("/build/usr/bin/cat"))
        );
    }
}
