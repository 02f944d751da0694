//! Process entry point: tracing setup and the tokio runtime.

use std::sync::Arc;

use mirror_core::Config;

use crate::error::{io_err, DaemonError};
use crate::restart::ProcessRestarter;
use crate::service::{run, ExitReason};

/// Set to `json` for one JSON object per log line.
pub const LOG_FORMAT_ENV: &str = "MIRROR_LOG_FORMAT";

/// Start the service on a multi-thread runtime and block the current thread
/// until it exits.
pub fn start_blocking(config: Config, verbose: bool) -> Result<ExitReason, DaemonError> {
    init_tracing(verbose);
    let restarter = Arc::new(ProcessRestarter::current()?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(&config, restarter))
}

/// Install the global subscriber. `RUST_LOG` wins unless `verbose` forces
/// `debug`; the default level is `info`. A second call is a no-op.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|value| value.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        let _ = fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    }
}
