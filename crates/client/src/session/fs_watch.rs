//! Filesystem notifications for the session directory.

use std::io;
use std::path::Path;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use thiserror::Error;
use tokio::sync::mpsc;

use super::SESSION_FILE;

/// Errors from starting a store watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The store has no location on disk.
    #[error("session store has no directory to watch")]
    Unsupported,

    /// The session directory could not be created.
    #[error("session directory unavailable: {0}")]
    Io(#[from] io::Error),

    /// The platform watcher failed to start.
    #[error("cannot watch session directory: {0}")]
    Notify(#[from] notify::Error),
}

/// Live watch on a session directory. Dropping it stops the notifications.
pub(super) struct DirWatch {
    _watcher: RecommendedWatcher,
    pub(super) events: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

/// Watch `dir` (created if missing) for changes.
///
/// The directory is watched rather than the file: saves replace the file by
/// rename, which a watch on the file itself would lose track of.
pub(super) fn watch_dir(dir: &Path) -> Result<DirWatch, WatchError> {
    std::fs::create_dir_all(dir)?;

    let (tx, events) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
        // Receiver gone means the watch task ended.
        let _ = tx.send(event);
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;

    Ok(DirWatch {
        _watcher: watcher,
        events,
    })
}

/// Whether an event may have changed the session file.
///
/// Reads are ignored, otherwise every reload would trigger another one.
pub(super) fn touches_session_file(event: &Event) -> bool {
    !matches!(event.kind, EventKind::Access(_))
        && event
            .paths
            .iter()
            .any(|path| path.file_name().is_some_and(|name| name == SESSION_FILE))
}
