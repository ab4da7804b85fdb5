// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: target description file
fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .required(true)
        .help("Path to the target description")
}

/// Common argument: version override
fn version_arg(help: &'static str) -> Arg {
    Arg::new("artifact_version")
        .long("artifact-version")
        .value_name("VERSION")
        .help(help)
}

fn build_cli() -> Command {
    Command::new("artifact-deploy")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Artifact Deploy Contributors")
        .about("Idempotent artifact deployment with release history and rollback")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("Increase log verbosity (-v debug, -vv trace)"),
        )
        .subcommand(
            Command::new("deploy")
                .about("Deploy the configured version")
                .arg(config_arg())
                .arg(version_arg("Deploy this version instead of the configured one"))
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Redeploy even if the version is already installed"),
                ),
        )
        .subcommand(
            Command::new("pre-seed")
                .about("Create the release skeleton and cache the artifact without deploying")
                .arg(config_arg())
                .arg(version_arg("Cache this version instead of the configured one")),
        )
        .subcommand(
            Command::new("status")
                .about("Show the current release and the retained history")
                .arg(config_arg()),
        )
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

    let man_path = man_dir.join("artifact-deploy.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
