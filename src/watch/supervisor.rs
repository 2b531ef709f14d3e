//! Change classification and debounced restart / project-sync triggering.
//!
//! Multiplexes filesystem and repository signals into two decisions:
//! repository activity (branch switch, commit, rebase) restarts the
//! checker; route-file set changes run the project sync command. Both
//! are debounced so editor save bursts and multi-file git operations
//! collapse into a single action.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{never, Receiver};
use notify::event::ModifyKind;
use notify::{Event, EventKind};

use super::fs::FsWatch;
use super::git::GitBranchWatcher;
use crate::debounce::Debouncer;

/// SvelteKit route files. Creating, deleting, or renaming one changes
/// the set of generated load/endpoint types, which only `svelte-kit
/// sync` regenerates. Matched on exact basename: `+page.svelte`,
/// `+pages.ts`, or `+page.d.ts` must not match.
pub const ROUTE_FILES: [&str; 10] = [
    "+page.ts",
    "+page.js",
    "+page.server.ts",
    "+page.server.js",
    "+layout.ts",
    "+layout.js",
    "+layout.server.ts",
    "+layout.server.js",
    "+server.ts",
    "+server.js",
];

/// Whether the path's basename names a SvelteKit route file.
pub fn is_route_file(path: &Path) -> bool {
    match path.file_name().and_then(|name| name.to_str()) {
        Some(name) => ROUTE_FILES.contains(&name),
        None => false,
    }
}

/// Batches an editor save burst or a git checkout's file spray while
/// staying imperceptible interactively.
const DEBOUNCE_INTERVAL: Duration = Duration::from_millis(250);

/// Directories to watch, relative to the workspace root.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub workspace: PathBuf,
    pub recursive_dirs: Vec<PathBuf>,
    pub non_recursive_dirs: Vec<PathBuf>,
}

/// Watches files and repository state, debouncing into callbacks.
pub struct ChangeSupervisor {
    config: SupervisorConfig,
    fs_watcher: Box<dyn FsWatch>,
    head_rx: Receiver<()>,
    branch_rx: Receiver<()>,
    restart_debouncer: Debouncer,
    sync_debouncer: Debouncer,
}

impl ChangeSupervisor {
    /// `git_watcher` is None when the workspace is not under version
    /// control; the supervisor then runs purely on filesystem events.
    pub fn new(
        config: SupervisorConfig,
        fs_watcher: Box<dyn FsWatch>,
        git_watcher: Option<&GitBranchWatcher>,
        on_restart: impl Fn() + Send + Sync + 'static,
        on_sync: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        let (head_rx, branch_rx) = match git_watcher {
            Some(git) => (git.head_changed(), git.branch_changed()),
            None => (never(), never()),
        };

        Self {
            config,
            fs_watcher,
            head_rx,
            branch_rx,
            restart_debouncer: Debouncer::new(DEBOUNCE_INTERVAL, on_restart),
            sync_debouncer: Debouncer::new(DEBOUNCE_INTERVAL, on_sync),
        }
    }

    /// Register watch directories, then classify events until `cancel`
    /// closes or the filesystem event stream ends.
    pub fn run(&mut self, cancel: Receiver<()>) {
        for dir in self.config.non_recursive_dirs.clone() {
            let abs = self.config.workspace.join(dir);
            if let Err(e) = self.fs_watcher.add(&abs, false) {
                tracing::warn!("could not watch {}: {e}", abs.display());
            }
        }
        for dir in self.config.recursive_dirs.clone() {
            let abs = self.config.workspace.join(dir);
            if let Err(e) = self.fs_watcher.add(&abs, true) {
                tracing::warn!("could not watch {} recursively: {e}", abs.display());
            }
        }

        let fs_rx = self.fs_watcher.events();
        let mut head_rx = self.head_rx.clone();
        let mut branch_rx = self.branch_rx.clone();

        loop {
            crossbeam_channel::select! {
                recv(cancel) -> _ => return,
                recv(head_rx) -> msg => match msg {
                    Ok(()) => {
                        tracing::info!("git HEAD changed (branch switch), restarting svelte-check");
                        self.restart_debouncer.trigger();
                    }
                    Err(_) => head_rx = never(),
                },
                recv(branch_rx) -> msg => match msg {
                    Ok(()) => {
                        tracing::info!(
                            "branch ref updated (commit/pull/merge/rebase), restarting svelte-check"
                        );
                        self.restart_debouncer.trigger();
                    }
                    Err(_) => branch_rx = never(),
                },
                recv(fs_rx) -> msg => match msg {
                    Ok(Ok(event)) => self.handle_fs_event(&event),
                    Ok(Err(e)) => tracing::warn!("watcher error: {e}"),
                    Err(_) => return,
                },
            }
        }
    }

    fn handle_fs_event(&mut self, event: &Event) {
        let created = matches!(event.kind, EventKind::Create(_));
        let removed = matches!(event.kind, EventKind::Remove(_));
        let renamed = matches!(event.kind, EventKind::Modify(ModifyKind::Name(_)));

        // Content edits to route files are the checker's business; only
        // set membership changes need a sync.
        if created || removed || renamed {
            if let Some(path) = event.paths.iter().find(|p| is_route_file(p)) {
                tracing::info!(
                    "route file changed: {}, scheduling svelte-kit sync",
                    path.display()
                );
                self.sync_debouncer.trigger();
            }
        }

        // A create may be a directory inside a watched recursive root.
        if created {
            if let Err(e) = self.fs_watcher.rescan() {
                tracing::warn!("rescan failed: {e}");
            }
        }
    }

    /// Cancel pending debounced callbacks. The filesystem watcher is
    /// released when the supervisor drops.
    pub fn close(&mut self) {
        self.restart_debouncer.stop();
        self.sync_debouncer.stop();
    }
}

// ============================================================================
// Tests
// ============================================================================
