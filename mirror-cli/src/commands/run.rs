//! `mirror run [--config <path>] [--verbose]`

use anyhow::{Context, Result};
use clap::Args;

use mirror_core::config;
use mirror_daemon::{start_blocking, ExitReason};

use crate::ConfigArg;

/// Run the mirror service in the foreground until Ctrl-C or the daily
/// restart.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Log at debug level regardless of RUST_LOG.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let path = self.config.path()?;
        let config = config::load_or_init_from(&path).with_context(|| {
            format!(
                "invalid config {}; set source_path and destination_path before starting",
                path.display()
            )
        })?;

        match start_blocking(config, self.verbose).context("mirror service exited with error")? {
            ExitReason::Shutdown => {}
            ExitReason::Restarted => eprintln!("restarted: replacement process is running"),
        }
        Ok(())
    }
}
