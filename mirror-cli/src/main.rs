//! mirror: watch a folder and mirror new and changed files into another.
//!
//! # Usage
//!
//! ```text
//! mirror run [--config <path>] [--verbose]
//! mirror check [--config <path>]
//! mirror config init [--force] [--config <path>]
//! mirror config show [--config <path>]
//! mirror config path [--config <path>]
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use commands::{check::CheckArgs, config::ConfigCommand, run::RunArgs};

#[derive(Parser, Debug)]
#[command(
    name = "mirror",
    version,
    about = "Mirror new and changed files from a watched folder",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the mirror service in the foreground.
    Run(RunArgs),

    /// Validate the config and show what the service would do.
    Check(CheckArgs),

    /// Inspect or create the config file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// `--config` shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArg {
    /// Config file to use instead of ~/.mirror/config.yaml.
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl ConfigArg {
    /// Explicit `--config`, then `$MIRROR_CONFIG`, then the home default.
    pub fn path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => mirror_core::config::config_path().context("could not locate config file"),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Check(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
    }
}
