//! Recursive-by-walk filesystem watching built on notify.
//!
//! The native watcher is registered per directory in non-recursive mode;
//! recursive roots are expanded by walking the tree. Directories created
//! after registration are picked up by `rescan`, which the change
//! supervisor calls whenever it sees a create event.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crossbeam_channel::{unbounded, Receiver};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use walkdir::WalkDir;

use super::limit::{acquire_watcher, release_watcher};
use crate::error::Result;

/// Filesystem watching as seen by the change supervisor.
///
/// Abstracted so tests can drive the supervisor with a fake event stream.
pub trait FsWatch: Send {
    /// Raw watch events; notify reports errors in-band as `Err` items.
    fn events(&self) -> Receiver<notify::Result<Event>>;

    /// Register a path. Recursive registration walks the tree and watches
    /// every directory; individual registration failures are logged, not
    /// fatal, since the checker's own watch still covers edits.
    fn add(&mut self, path: &Path, recursive: bool) -> Result<()>;

    /// Re-walk every recursive root and register directories created
    /// since the last walk. Idempotent.
    fn rescan(&mut self) -> Result<()>;
}

struct WatchedPath {
    path: PathBuf,
    recursive: bool,
}

/// `FsWatch` implementation over `notify::RecommendedWatcher`.
///
/// Counts against the process-wide watcher limit from creation to drop.
pub struct NotifyFsWatcher {
    watcher: RecommendedWatcher,
    events_rx: Receiver<notify::Result<Event>>,
    paths: Vec<WatchedPath>,
    watched_dirs: HashSet<PathBuf>,
}

impl NotifyFsWatcher {
    pub fn new() -> Result<Self> {
        acquire_watcher()?;

        let (tx, events_rx) = unbounded();
        let watcher = notify::recommended_watcher(move |event| {
            let _ = tx.send(event);
        })
        .map_err(|e| {
            release_watcher();
            e
        })?;

        Ok(Self {
            watcher,
            events_rx,
            paths: Vec::new(),
            watched_dirs: HashSet::new(),
        })
    }

    fn watch_dir(&mut self, dir: &Path) {
        if self.watched_dirs.contains(dir) {
            return;
        }
        match self.watcher.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                self.watched_dirs.insert(dir.to_path_buf());
            }
            Err(e) => tracing::warn!("could not watch {}: {e}", dir.display()),
        }
    }

    fn add_recursive(&mut self, root: &Path) {
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_dir() {
                self.watch_dir(entry.path());
            }
        }
    }
}

impl FsWatch for NotifyFsWatcher {
    fn events(&self) -> Receiver<notify::Result<Event>> {
        self.events_rx.clone()
    }

    fn add(&mut self, path: &Path, recursive: bool) -> Result<()> {
        self.paths.push(WatchedPath {
            path: path.to_path_buf(),
            recursive,
        });

        if recursive {
            self.add_recursive(path);
        } else {
            self.watcher.watch(path, RecursiveMode::NonRecursive)?;
            self.watched_dirs.insert(path.to_path_buf());
        }
        Ok(())
    }

    fn rescan(&mut self) -> Result<()> {
        let roots: Vec<PathBuf> = self
            .paths
            .iter()
            .filter(|watched| watched.recursive)
            .map(|watched| watched.path.clone())
            .collect();
        for root in roots {
            self.add_recursive(&root);
        }
        Ok(())
    }
}

impl Drop for NotifyFsWatcher {
    fn drop(&mut self) {
        release_watcher();
    }
}

// ============================================================================
// Tests
// ============================================================================
