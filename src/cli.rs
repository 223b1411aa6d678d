// src/cli.rs
//! CLI definitions for the instill file installer
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations live in `main.rs`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "instill")]
#[command(author = "Instill Project")]
#[command(version)]
#[command(about = "Incremental file installation from declarative configuration", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install the targets declared in a configuration file
    Install {
        /// Path to the configuration file
        config: PathBuf,

        /// Install root for relative target names
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Install only the named target(s)
        #[arg(long)]
        only: Vec<String>,

        /// Fail if a target file already exists
        #[arg(long)]
        no_overwrite: bool,

        /// Checksum algorithm: md5, sha256 or mtime+size
        #[arg(long, default_value = "md5")]
        checksum_method: String,
    },
}
