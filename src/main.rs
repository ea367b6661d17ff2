// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use commands::PublishOptions;

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Diff { old, new, variants }) => commands::cmd_diff(&old, &new, &variants),
        Some(Commands::Duplicates { manifest }) => commands::cmd_duplicates(&manifest),
        Some(Commands::Search {
            manifest,
            token,
            token_type,
        }) => commands::cmd_search(&manifest, &token, token_type.as_deref()),
        Some(Commands::Publish {
            repo,
            manifest,
            fmri,
            basedir,
            client_release,
            sign,
            no_catalog,
        }) => commands::cmd_publish(
            &repo,
            &manifest,
            &PublishOptions {
                fmri: fmri.as_deref(),
                basedir: &basedir,
                client_release: &client_release,
                sign,
                add_to_catalog: !no_catalog,
            },
        ),
        Some(Commands::Log { repo, since, json }) => commands::cmd_log(&repo, since.as_deref(), json),
        None => {
            println!("pkgdepot {}", env!("CARGO_PKG_VERSION"));
            println!("Run 'pkgdepot --help' for usage information.");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_publish_args() {
        let cli = Cli::try_parse_from([
            "pkgdepot",
            "publish",
            "-s",
            "/tmp/repo",
            "--sign",
            "pkg.p5m",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Publish {
                repo,
                client_release,
                sign,
                no_catalog,
                ..
            }) => {
                assert_eq!(repo.repo.as_deref(), Some(std::path::Path::new("/tmp/repo")));
                assert_eq!(client_release, "5.11");
                assert!(sign);
                assert!(!no_catalog);
            }
            _ => panic!("expected publish"),
        }
    }
}
