//! Event and outcome types shared by the copy executor and the daemon.
//!
//! A [`WatchEvent`] is produced by the directory watcher and consumed exactly
//! once; a [`CopyOutcome`] is produced per dispatched event and only logged.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// What the filesystem reported for a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// The file appeared (created or renamed into the source directory).
    Created,
    /// The file's contents were modified.
    Changed,
}

impl ChangeKind {
    /// Combine two kinds observed for the same path inside one debounce window.
    ///
    /// `Changed` wins: a coalesced burst must still overwrite the destination
    /// if any of its events would have.
    pub fn merge(self, other: ChangeKind) -> ChangeKind {
        match (self, other) {
            (ChangeKind::Created, ChangeKind::Created) => ChangeKind::Created,
            _ => ChangeKind::Changed,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Changed => write!(f, "changed"),
        }
    }
}

/// Result of a single copy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyResult {
    /// The file now exists at the destination.
    Copied,
    /// Destination already present and the event was not a modification.
    SkippedExists,
    /// Every attempt hit a transient error.
    FailedAfterRetries { last_error: String },
    /// A non-retryable error on the first occurrence.
    FailedPermanent { error: String },
    /// Shutdown was requested at a retry boundary.
    Cancelled,
}

impl fmt::Display for CopyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyResult::Copied => write!(f, "copied"),
            CopyResult::SkippedExists => write!(f, "skipped (exists)"),
            CopyResult::FailedAfterRetries { last_error } => {
                write!(f, "failed after retries: {last_error}")
            }
            CopyResult::FailedPermanent { error } => write!(f, "failed: {error}"),
            CopyResult::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ---------------------------------------------------------------------------
// Structs
// ---------------------------------------------------------------------------

/// A create/modify notification for one file in the source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub file_name: String,
    pub path: PathBuf,
    pub change_kind: ChangeKind,
}

impl WatchEvent {
    /// Build an event for `path`; `None` when the path has no file name
    /// (e.g. `/` or `..`).
    pub fn new(path: impl Into<PathBuf>, change_kind: ChangeKind) -> Option<Self> {
        let path = path.into();
        let file_name = path.file_name()?.to_string_lossy().into_owned();
        Some(Self {
            file_name,
            path,
            change_kind,
        })
    }

    /// Where this file lands under `destination`.
    pub fn destination_in(&self, destination: &Path) -> PathBuf {
        destination.join(&self.file_name)
    }
}

/// What happened to one [`WatchEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    pub file_name: String,
    pub result: CopyResult,
    /// Attempts made after the first one.
    pub retries: u32,
}

impl CopyOutcome {
    pub fn new(file_name: impl Into<String>, result: CopyResult, retries: u32) -> Self {
        Self {
            file_name: file_name.into(),
            result,
            retries,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.result,
            CopyResult::FailedAfterRetries { .. } | CopyResult::FailedPermanent { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_changed() {
        assert_eq!(ChangeKind::Created.merge(ChangeKind::Created), ChangeKind::Created);
        assert_eq!(ChangeKind::Created.merge(ChangeKind::Changed), ChangeKind::Changed);
        assert_eq!(ChangeKind::Changed.merge(ChangeKind::Created), ChangeKind::Changed);
    }

    #[test]
    fn watch_event_takes_file_name_from_path() {
        let event = WatchEvent::new("/in/report.pdf", ChangeKind::Created).expect("event");
        assert_eq!(event.file_name, "report.pdf");
        assert_eq!(
            event.destination_in(Path::new("/out")),
            PathBuf::from("/out/report.pdf")
        );
    }

    #[test]
    fn watch_event_without_file_name_is_rejected() {
        assert!(WatchEvent::new("/", ChangeKind::Changed).is_none());
    }

    #[test]
    fn failures_are_flagged() {
        let failed = CopyOutcome::new(
            "a.txt",
            CopyResult::FailedAfterRetries {
                last_error: "busy".into(),
            },
            4,
        );
        assert!(failed.is_failure());
        assert!(!CopyOutcome::new("a.txt", CopyResult::SkippedExists, 0).is_failure());
        assert!(!CopyOutcome::new("a.txt", CopyResult::Cancelled, 1).is_failure());
    }

    #[test]
    fn change_kind_display() {
        assert_eq!(ChangeKind::Created.to_string(), "created");
        assert_eq!(ChangeKind::Changed.to_string(), "changed");
    }
}
