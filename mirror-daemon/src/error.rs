use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the watcher, scheduler, and service lifecycle.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("config error: {0}")]
    Config(#[from] mirror_core::ConfigError),

    #[error("source directory does not exist: {path}")]
    SourceMissing { path: PathBuf },

    #[error("source path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("restart failed: {0}")]
    Restart(String),
}

impl DaemonError {
    /// Errors caused by settings rather than by the environment at runtime.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DaemonError::Config(_)
                | DaemonError::SourceMissing { .. }
                | DaemonError::NotADirectory { .. }
        )
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
