// src/main.rs

mod cli;

use anyhow::{Context, Result};
use artifact_deploy::{DeployConfig, Deployer, DeploymentTarget, ReleaseStore};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use tracing::info;

/// Load a target file, applying command-line overrides
fn load_target(
    path: &Path,
    version: Option<String>,
    force: bool,
) -> Result<DeploymentTarget> {
    let mut config = DeployConfig::from_file(path)
        .with_context(|| format!("Failed to load target file {}", path.display()))?;
    if let Some(version) = version {
        config.target.version = Some(version);
    }
    if force {
        config.target.force = true;
    }
    config
        .into_target()
        .with_context(|| format!("Invalid target in {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Deploy {
            target,
            artifact_version,
            force,
        } => {
            let target = load_target(&target.config, artifact_version, force)?;
            let report = Deployer::new(&target)
                .deploy()
                .with_context(|| format!("Deploy of {} failed", target.name()))?;

            info!(
                "{} {}: decision={} installed={} artifact_changed={}",
                target.name(),
                target.version(),
                report.decision,
                report.installed,
                report.artifact_changed
            );
            println!(
                "{} {} deployed to {}",
                target.name(),
                target.version(),
                report.release_path.display()
            );
            if !report.pruned.is_empty() {
                println!("Pruned: {}", report.pruned.join(", "));
            }
        }
        Commands::PreSeed {
            target,
            artifact_version,
        } => {
            let target = load_target(&target.config, artifact_version, false)?;
            let changed = Deployer::new(&target)
                .pre_seed()
                .with_context(|| format!("Pre-seed of {} failed", target.name()))?;

            if changed {
                println!("Cached {} {}", target.name(), target.version());
            } else {
                println!("{} {} already cached", target.name(), target.version());
            }
        }
        Commands::Status { target } => {
            let target = load_target(&target.config, None, false)?;
            let store = ReleaseStore::new(&target);

            let current = store.current_version()?;
            println!("Target:   {}", target.name());
            println!("Deployed: {}", target.deploy_to().display());
            println!("Current:  {}", current.as_deref().unwrap_or("(none)"));

            let previous = store.previous_versions()?;
            if previous.is_empty() {
                println!("Previous: (none)");
            } else {
                println!("Previous (oldest first):");
                for version in previous {
                    println!("  {}", version);
                }
            }
        }
    }

    Ok(())
}
