//! `mirror config init|show|path`

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use mirror_core::config;

use crate::ConfigArg;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a default config file.
    Init(InitArgs),
    /// Print the config as the service will read it.
    Show(ConfigArg),
    /// Print the config file location.
    Path(ConfigArg),
}

#[derive(Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Replace an existing file.
    #[arg(long)]
    pub force: bool,
}

pub fn run(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Init(args) => {
            let path = args.config.path()?;
            if path.exists() && !args.force {
                bail!(
                    "{} already exists; pass --force to overwrite",
                    path.display()
                );
            }
            config::write_default_to(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("wrote default config: {}", path.display());
            println!("set source_path and destination_path, then run `mirror check`");
        }
        ConfigCommand::Show(arg) => {
            let path = arg.path()?;
            let loaded = config::parse_from(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            print!("{}", config::render(&loaded).context("failed to render config")?);
            if let Err(err) = loaded.validate() {
                eprintln!("warning: {err}");
            }
        }
        ConfigCommand::Path(arg) => {
            println!("{}", arg.path()?.display());
        }
    }
    Ok(())
}
