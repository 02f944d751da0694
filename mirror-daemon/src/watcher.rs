//! Native directory subscription.
//!
//! The notify callback does nothing but forward into an unbounded channel, so
//! a slow copy can never stall the OS notification thread. Translation into
//! [`WatchEvent`]s happens on the receiving side.

use std::fs;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use mirror_core::{ChangeKind, WatchEvent};
use mirror_sync::TEMP_SUFFIX;

use crate::error::DaemonError;

pub type RawEvent = notify::Result<Event>;

/// An active, non-recursive subscription on one directory.
///
/// `Stopped → Active` happens in [`DirectoryWatcher::start`];
/// [`DirectoryWatcher::stop`] moves back to `Stopped` and may be called any
/// number of times.
pub struct DirectoryWatcher {
    path: PathBuf,
    watcher: Option<RecommendedWatcher>,
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("path", &self.path)
            .field("active", &self.is_active())
            .finish()
    }
}

impl DirectoryWatcher {
    /// Subscribe to `path`. Fails with a configuration error if the path does
    /// not exist or is not a directory.
    pub fn start(path: &Path) -> Result<(Self, mpsc::UnboundedReceiver<RawEvent>), DaemonError> {
        if !path.exists() {
            return Err(DaemonError::SourceMissing {
                path: path.to_path_buf(),
            });
        }
        if !path.is_dir() {
            return Err(DaemonError::NotADirectory {
                path: path.to_path_buf(),
            });
        }

        // Canonicalize so paths reported by FSEvents (e.g. /private/var/...)
        // line up with the watched root.
        let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        let (event_tx, event_rx) = mpsc::unbounded_channel::<RawEvent>();
        let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
            let _ = event_tx.send(event);
        })?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %path.display(), "watching source directory");

        Ok((
            Self {
                path,
                watcher: Some(watcher),
            },
            event_rx,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }

    /// Release the subscription. Dropping the native watcher closes the event
    /// channel, which ends the dispatcher loop.
    pub fn stop(&mut self) {
        let Some(mut watcher) = self.watcher.take() else {
            return;
        };
        if let Err(err) = watcher.unwatch(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %err, "unwatch failed");
        }
        drop(watcher);
        tracing::info!(path = %self.path.display(), "stopped watching source directory");
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Map a native event kind onto a copy-policy kind.
///
/// The subscription is scoped to names: creations and renames into the
/// directory are reported as `Created`. Content writes, metadata, access and
/// removal events are ignored, so writing a new file in place never turns
/// into an overwrite of its mirror.
pub fn change_kind_for(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => None,
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Created),
        _ => None,
    }
}

/// Turn one native event into watch events for direct children of `root`.
pub fn translate(event: &Event, root: &Path) -> Vec<WatchEvent> {
    let Some(kind) = change_kind_for(&event.kind) else {
        return Vec::new();
    };

    // A paired rename reports [from, to]; only the new name is of interest.
    let paths: &[PathBuf] = match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().map(std::slice::from_ref).unwrap_or(&[])
        }
        _ => &event.paths,
    };

    paths
        .iter()
        .filter(|path| path.parent() == Some(root))
        .filter(|path| !is_temp_file(path))
        .filter_map(|path| WatchEvent::new(path.clone(), kind))
        .collect()
}

fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.ends_with(TEMP_SUFFIX))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_sync::temp_path_for;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn kind_mapping() {
        assert_eq!(
            change_kind_for(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Created)
        );
        assert_eq!(
            change_kind_for(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            None
        );
        assert_eq!(
            change_kind_for(&EventKind::Modify(ModifyKind::Data(DataChange::Any))),
            None
        );
        assert_eq!(change_kind_for(&EventKind::Modify(ModifyKind::Any)), None);
        assert_eq!(
            change_kind_for(&EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            Some(ChangeKind::Created)
        );
        assert_eq!(
            change_kind_for(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            None
        );
        assert_eq!(
            change_kind_for(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))),
            None
        );
        assert_eq!(change_kind_for(&EventKind::Remove(RemoveKind::File)), None);
        assert_eq!(change_kind_for(&EventKind::Access(AccessKind::Any)), None);
    }

    #[test]
    fn translate_keeps_direct_children_only() {
        let root = Path::new("/in");
        let raw = event(
            EventKind::Create(CreateKind::Any),
            &["/in/a.txt", "/in/sub/b.txt", "/elsewhere/c.txt"],
        );
        let events = translate(&raw, root);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].file_name, "a.txt");
        assert_eq!(events[0].change_kind, ChangeKind::Created);
    }

    #[test]
    fn translate_uses_new_name_for_paired_rename() {
        let root = Path::new("/in");
        let raw = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/in/upload.part", "/in/upload.pdf"],
        );
        let events = translate(&raw, root);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].file_name, "upload.pdf");
    }

    #[test]
    fn translate_ignores_own_temp_files() {
        let root = Path::new("/in");
        let tmp = temp_path_for(Path::new("/in/a.txt")).unwrap();
        let raw = event(
            EventKind::Create(CreateKind::File),
            &["/in/.a.txt.mirror.tmp", tmp.to_str().unwrap()],
        );
        assert!(translate(&raw, root).is_empty());
    }

    #[test]
    fn translate_drops_content_writes() {
        let root = Path::new("/in");
        let raw = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Any)),
            &["/in/report.pdf"],
        );
        assert!(translate(&raw, root).is_empty());
    }

    #[test]
    fn start_on_missing_path_is_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        let err = DirectoryWatcher::start(&missing).unwrap_err();
        assert!(matches!(err, DaemonError::SourceMissing { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn start_on_file_is_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        let err = DirectoryWatcher::start(&file).unwrap_err();
        assert!(matches!(err, DaemonError::NotADirectory { .. }));
    }

    #[test]
    fn stop_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let (mut watcher, _rx) = DirectoryWatcher::start(tmp.path()).unwrap();
        assert!(watcher.is_active());
        watcher.stop();
        watcher.stop();
        assert!(!watcher.is_active());
    }
}
