//! All-or-nothing file transfer.
//!
//! ## `FsTransfer`: 4-step protocol
//!
//! 1. Ensure the destination directory exists.
//! 2. Copy the source to `.<name>.<pid>.mirror.tmp` beside the destination.
//!    The pid keeps two service processes (old and new across a restart)
//!    from sharing a temp file.
//! 3. Stamp the temp file with the source's modification time.
//! 4. Rename into place (atomic on POSIX). In `NoClobber` mode the
//!    destination is re-checked first and the temp file discarded if it
//!    appeared meanwhile.
//!
//! Any failure removes the temp file, so a partial copy is never visible
//! under the destination name.

use std::fs;
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::error::{io_err, CopyError};

/// Suffix of in-flight temp files. The watcher ignores files ending in it.
pub const TEMP_SUFFIX: &str = ".mirror.tmp";

/// How to treat an existing destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace whatever is there.
    Overwrite,
    /// Leave an existing destination untouched.
    NoClobber,
}

/// Outcome of one successful transfer call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// The destination now holds the source's bytes.
    Written { bytes: u64 },
    /// `NoClobber` found the destination already present; nothing changed.
    DestinationExists,
}

/// One transfer attempt. The executor owns retries; implementors must leave
/// the destination either complete or untouched.
pub trait Transfer: Send + Sync {
    fn transfer(&self, source: &Path, dest: &Path, mode: WriteMode)
        -> Result<Placement, CopyError>;
}

/// `<dir>/.<name>.<pid>.mirror.tmp` for `dest = <dir>/<name>`.
pub fn temp_path_for(dest: &Path) -> Result<PathBuf, CopyError> {
    let name = dest.file_name().ok_or_else(|| CopyError::InvalidPath {
        path: dest.to_path_buf(),
    })?;
    let tmp_name = format!(
        ".{}.{}{TEMP_SUFFIX}",
        name.to_string_lossy(),
        std::process::id()
    );
    Ok(dest.with_file_name(tmp_name))
}

/// Local-filesystem [`Transfer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FsTransfer;

impl Transfer for FsTransfer {
    fn transfer(
        &self,
        source: &Path,
        dest: &Path,
        mode: WriteMode,
    ) -> Result<Placement, CopyError> {
        let tmp = temp_path_for(dest)?;
        transfer_with_tmp(source, dest, &tmp, mode)
    }
}

fn transfer_with_tmp(
    source: &Path,
    dest: &Path,
    tmp: &Path,
    mode: WriteMode,
) -> Result<Placement, CopyError> {
    // Step 1: destination directory.
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }

    // Step 2: copy to tmp.
    let bytes = match fs::copy(source, tmp) {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = fs::remove_file(tmp);
            return Err(CopyError::Transfer {
                from: source.to_path_buf(),
                to: tmp.to_path_buf(),
                source: e,
            });
        }
    };

    // Step 3: carry the source mtime over. Best effort.
    if let Ok(meta) = fs::metadata(source) {
        let mtime = FileTime::from_last_modification_time(&meta);
        if let Err(err) = filetime::set_file_mtime(tmp, mtime) {
            tracing::debug!(path = %tmp.display(), error = %err, "could not preserve mtime");
        }
    }

    // Step 4: rename into place.
    if mode == WriteMode::NoClobber && dest.exists() {
        let _ = fs::remove_file(tmp);
        return Ok(Placement::DestinationExists);
    }
    if let Err(e) = fs::rename(tmp, dest) {
        let _ = fs::remove_file(tmp);
        return Err(io_err(dest, e));
    }

    Ok(Placement::Written { bytes })
}
