// src/cli.rs
//! CLI definitions for artifact-deploy
//!
//! Every command reads one target description from a TOML file (see
//! `artifact_deploy::config`). The implementations live in `main.rs`.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "artifact-deploy")]
#[command(author = "Artifact Deploy Contributors")]
#[command(version)]
#[command(about = "Idempotent artifact deployment with release history and rollback", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Target file argument shared by every command
#[derive(Args)]
pub struct TargetArgs {
    /// Path to the target description
    #[arg(short, long, value_name = "FILE")]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy the configured version
    Deploy {
        #[command(flatten)]
        target: TargetArgs,

        /// Deploy this version instead of the configured one
        #[arg(long, value_name = "VERSION")]
        artifact_version: Option<String>,

        /// Redeploy even if the version is already installed
        #[arg(short, long)]
        force: bool,
    },

    /// Create the release skeleton and cache the artifact without deploying
    PreSeed {
        #[command(flatten)]
        target: TargetArgs,

        /// Cache this version instead of the configured one
        #[arg(long, value_name = "VERSION")]
        artifact_version: Option<String>,
    },

    /// Show the current release and the retained history
    Status {
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deploy() {
        let cli = Cli::parse_from([
            "artifact-deploy",
            "-v",
            "deploy",
            "-c",
            "/etc/artifact-deploy/app.toml",
            "--artifact-version",
            "1.0.3",
            "--force",
        ]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Deploy {
                target,
                artifact_version,
                force,
            } => {
                assert_eq!(target.config, PathBuf::from("/etc/artifact-deploy/app.toml"));
                assert_eq!(artifact_version.as_deref(), Some("1.0.3"));
                assert!(force);
            }
            _ => panic!("expected deploy"),
        }
    }
}
