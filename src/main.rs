// src/main.rs

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use instill::{ConfigTree, FileInstaller, HashAlgorithm, InstallOptions, TracingReporter};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Install {
            config,
            root,
            only,
            no_overwrite,
            checksum_method,
        } => {
            let text = std::fs::read_to_string(&config)
                .with_context(|| format!("cannot read {}", config.display()))?;
            let tree = ConfigTree::parse(&text)
                .with_context(|| format!("cannot parse {}", config.display()))?;
            let checksum_algorithm: HashAlgorithm = checksum_method
                .parse()
                .context("bad --checksum-method value")?;
            debug!("processing {}", config.display());

            let reporter = TracingReporter;
            let installer = FileInstaller::new(
                &tree,
                &reporter,
                InstallOptions {
                    root,
                    only,
                    no_overwrite,
                    checksum_algorithm,
                },
            );
            installer.process()?;
            Ok(())
        }
    }
}
