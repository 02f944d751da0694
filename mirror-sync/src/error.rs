//! Error types and retry classification for mirror-sync.

use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from a single transfer attempt.
#[derive(Debug, Error)]
pub enum CopyError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Copying into the temp file failed. Either side may be at fault: an
    /// unreadable source or an unwritable destination directory.
    #[error("copy {from} -> {to} failed: {source}")]
    Transfer {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source path has no file name to mirror under.
    #[error("not a file path: {path}")]
    InvalidPath { path: PathBuf },
}

/// Whether a failed attempt is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected to clear on its own (writer still holds the file).
    Transient,
    /// Repeating would fail the same way.
    Permanent,
}

impl CopyError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CopyError::Io { source, .. } | CopyError::Transfer { source, .. } => {
                classify(source)
            }
            CopyError::InvalidPath { .. } => ErrorClass::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Classify an I/O error for the retry loop.
///
/// Locks, sharing violations and busy resources are transient. Permission
/// problems, a full disk, a vanished source and everything unrecognised are
/// permanent.
pub fn classify(err: &std::io::Error) -> ErrorClass {
    if is_sharing_violation(err) {
        return ErrorClass::Transient;
    }
    match err.kind() {
        ErrorKind::WouldBlock
        | ErrorKind::Interrupted
        | ErrorKind::TimedOut
        | ErrorKind::ResourceBusy
        | ErrorKind::ExecutableFileBusy => ErrorClass::Transient,
        _ => ErrorClass::Permanent,
    }
}

#[cfg(windows)]
fn is_sharing_violation(err: &std::io::Error) -> bool {
    const ERROR_SHARING_VIOLATION: i32 = 32;
    const ERROR_LOCK_VIOLATION: i32 = 33;
    matches!(
        err.raw_os_error(),
        Some(ERROR_SHARING_VIOLATION) | Some(ERROR_LOCK_VIOLATION)
    )
}

#[cfg(not(windows))]
fn is_sharing_violation(_err: &std::io::Error) -> bool {
    false
}

/// Convenience constructor for [`CopyError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CopyError {
    CopyError::Io {
        path: path.into(),
        source,
    }
}
