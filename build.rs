// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common arguments: repository location
fn repo_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("config")
            .short('c')
            .long("config")
            .value_name("PATH")
            .help("Repository configuration file"),
    )
    .arg(
        Arg::new("repo")
            .short('s')
            .long("repo")
            .value_name("PATH")
            .help("Repository root, when not using a configuration file"),
    )
    .arg(
        Arg::new("publisher")
            .short('p')
            .long("publisher")
            .help("Publisher for FMRIs that name none"),
    )
}

fn build_cli() -> Command {
    Command::new("pkgdepot")
        .version(env!("CARGO_PKG_VERSION"))
        .author("pkgdepot Contributors")
        .about("IPS package manifests and publishing depot")
        .subcommand_required(false)
        .subcommand(
            Command::new("diff")
                .about("Show what it takes to get from one manifest to another")
                .arg(Arg::new("old").required(true).help("Origin manifest"))
                .arg(Arg::new("new").required(true).help("Destination manifest"))
                .arg(
                    Arg::new("variant")
                        .short('v')
                        .long("variant")
                        .action(ArgAction::Append)
                        .help("Only consider actions for this variant value (name=value)"),
                ),
        )
        .subcommand(
            Command::new("duplicates")
                .about("Report actions that share an identity but differ in content")
                .arg(Arg::new("manifest").required(true).help("Manifest to check")),
        )
        .subcommand(
            Command::new("search")
                .about("Look up a token in a manifest's search index")
                .arg(Arg::new("manifest").required(true).help("Manifest to index"))
                .arg(Arg::new("token").required(true).help("Token to look for"))
                .arg(
                    Arg::new("token-type")
                        .short('t')
                        .long("token-type")
                        .help("Restrict to one token type"),
                ),
        )
        .subcommand(repo_args(
            Command::new("publish")
                .about("Publish a manifest into a repository")
                .arg(Arg::new("manifest").required(true).help("Manifest to publish"))
                .arg(Arg::new("fmri").short('f').long("fmri").help("Package FMRI"))
                .arg(
                    Arg::new("basedir")
                        .short('d')
                        .long("basedir")
                        .default_value(".")
                        .help("Directory payload paths are relative to"),
                )
                .arg(
                    Arg::new("client-release")
                        .long("client-release")
                        .default_value("5.11")
                        .help("Build release of the publishing client"),
                )
                .arg(
                    Arg::new("sign")
                        .long("sign")
                        .action(ArgAction::SetTrue)
                        .help("Add a hash signature over the published actions"),
                )
                .arg(
                    Arg::new("no-catalog")
                        .long("no-catalog")
                        .action(ArgAction::SetTrue)
                        .help("Publish without adding the package to the catalog"),
                ),
        ))
        .subcommand(repo_args(
            Command::new("log")
                .about("Show catalog updates recorded since a timestamp")
                .arg(
                    Arg::new("since")
                        .long("since")
                        .help("Last catalog timestamp the client has"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .requires("since")
                        .help("Print each update record as a JSON object"),
                ),
        ))
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("pkgdepot.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
