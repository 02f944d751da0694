//! Replace-and-exit: launch a fresh copy of this binary before the current
//! process winds down.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{io_err, DaemonError};

/// Starts the process that takes over after a scheduled restart.
pub trait Restarter: Send + Sync {
    /// Spawn the replacement and return its pid. The child is detached: it
    /// outlives the current process.
    fn spawn_replacement(&self) -> Result<u32, DaemonError>;
}

/// Re-executes a program with a fixed argument list.
#[derive(Debug, Clone)]
pub struct ProcessRestarter {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessRestarter {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The running executable with the arguments it was started with.
    pub fn current() -> Result<Self, DaemonError> {
        let program = std::env::current_exe().map_err(|e| io_err("current_exe", e))?;
        let args = std::env::args_os().skip(1).collect();
        Ok(Self::new(program, args))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }
}

impl Restarter for ProcessRestarter {
    fn spawn_replacement(&self) -> Result<u32, DaemonError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| DaemonError::Restart(format!("{}: {e}", self.program.display())))?;
        let pid = child.id();
        tracing::info!(pid, program = %self.program.display(), "replacement process started");
        Ok(pid)
    }
}
