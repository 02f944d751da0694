//! `mirror check [--config <path>]`

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;

use mirror_core::{config, resolve_now};
use mirror_daemon::RestartSchedule;

use crate::ConfigArg;

/// Validate the config and print the effective paths and next restart.
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub config: ConfigArg,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let path = self.config.path()?;
        let config = config::load_from(&path)
            .with_context(|| format!("config check failed for {}", path.display()))?;

        let source = resolve_now(&config);
        println!("config:       {}", path.display());
        println!(
            "source:       {}{}",
            source.display(),
            if source.is_dir() { "" } else { " (will be created)" }
        );
        println!("destination:  {}", config.destination_path.display());
        println!(
            "workers:      {} (debounce {} ms, {} attempts every {} ms)",
            config.workers, config.debounce_ms, config.retry_attempts, config.retry_delay_ms
        );

        if config.restart_enabled {
            let now = Local::now().naive_local();
            let schedule = RestartSchedule::at(now, config.restart_hour);
            let secs = schedule.initial_delay.as_secs();
            println!(
                "next restart: {} (in {}h {:02}m)",
                schedule.next_fire(now).format("%Y-%m-%d %H:%M"),
                secs / 3600,
                (secs % 3600) / 60
            );
        } else {
            println!("next restart: disabled");
        }
        Ok(())
    }
}
