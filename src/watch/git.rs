//! Git HEAD and branch-ref watching.
//!
//! Watches two files inside `.git`: the `HEAD` pointer (branch switches)
//! and the current branch's ref file under `refs/heads/` (commits, pulls,
//! merges, rebases). When HEAD moves to a new branch the new ref file is
//! added to the watch set; old ref watches are left in place, since they
//! are harmless and branch switches are rare.

use std::path::{Path, PathBuf};
use std::process::Command;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use super::limit::{acquire_watcher, release_watcher};
use crate::error::Result;

/// Watches repository metadata and signals branch activity.
///
/// Both output channels hold a single slot and drop sends that would
/// block: the receiving side debounces anyway, so a lost coalesced
/// event changes nothing.
pub struct GitBranchWatcher {
    git_dir: Option<PathBuf>,
    watcher: RecommendedWatcher,
    raw_rx: Receiver<notify::Result<notify::Event>>,
    head_tx: Sender<()>,
    head_rx: Receiver<()>,
    branch_tx: Sender<()>,
    branch_rx: Receiver<()>,
}

impl GitBranchWatcher {
    /// Create a watcher for the repository containing `workspace`.
    ///
    /// When the workspace is not under version control the watcher is
    /// created in a dormant state: `run` blocks on cancellation and no
    /// events are ever emitted.
    pub fn new(workspace: &Path) -> Result<Self> {
        let git_dir = find_git_root(workspace).map(|root| root.join(".git"));
        Self::with_git_dir(git_dir)
    }

    pub(crate) fn with_git_dir(git_dir: Option<PathBuf>) -> Result<Self> {
        acquire_watcher()?;

        let (tx, raw_rx) = unbounded();
        let watcher = notify::recommended_watcher(move |event| {
            let _ = tx.send(event);
        })
        .map_err(|e| {
            release_watcher();
            e
        })?;

        let (head_tx, head_rx) = bounded(1);
        let (branch_tx, branch_rx) = bounded(1);

        Ok(Self {
            git_dir,
            watcher,
            raw_rx,
            head_tx,
            head_rx,
            branch_tx,
            branch_rx,
        })
    }

    /// Fires when HEAD changes (branch switch).
    pub fn head_changed(&self) -> Receiver<()> {
        self.head_rx.clone()
    }

    /// Fires when the current branch ref changes (commit, pull, rebase).
    pub fn branch_changed(&self) -> Receiver<()> {
        self.branch_rx.clone()
    }

    /// Watch the repository until `cancel` closes.
    pub fn run(&mut self, cancel: Receiver<()>) {
        let Some(git_dir) = self.git_dir.clone() else {
            let _ = cancel.recv();
            return;
        };

        let head_path = git_dir.join("HEAD");
        match self.watcher.watch(&head_path, RecursiveMode::NonRecursive) {
            Ok(()) => tracing::info!("watching {} for branch switches", head_path.display()),
            Err(e) => tracing::warn!("could not watch {}: {e}", head_path.display()),
        }

        let mut current_ref = current_branch_ref_path(&git_dir);
        if let Some(ref ref_path) = current_ref {
            match self.watcher.watch(ref_path, RecursiveMode::NonRecursive) {
                Ok(()) => tracing::info!("watching {} for branch updates", ref_path.display()),
                Err(e) => tracing::warn!("could not watch branch ref: {e}"),
            }
        }

        let refs_heads = git_dir.join("refs").join("heads");
        let raw_rx = self.raw_rx.clone();

        loop {
            crossbeam_channel::select! {
                recv(cancel) -> _ => return,
                recv(raw_rx) -> msg => {
                    let event = match msg {
                        Ok(Ok(event)) => event,
                        Ok(Err(e)) => {
                            tracing::warn!("git watcher error: {e}");
                            continue;
                        }
                        Err(_) => return,
                    };

                    if event.paths.iter().any(|p| p == &head_path) {
                        tracing::info!("git HEAD changed (branch switch)");
                        if let Some(new_ref) = current_branch_ref_path(&git_dir) {
                            if current_ref.as_deref() != Some(new_ref.as_path())
                                && self
                                    .watcher
                                    .watch(&new_ref, RecursiveMode::NonRecursive)
                                    .is_ok()
                            {
                                tracing::info!(
                                    "now watching {} for branch updates",
                                    new_ref.display()
                                );
                                current_ref = Some(new_ref);
                            }
                        }
                        let _ = self.head_tx.try_send(());
                        continue;
                    }

                    if event.paths.iter().any(|p| p.starts_with(&refs_heads)) {
                        tracing::info!("branch ref updated (commit/pull/merge/rebase)");
                        let _ = self.branch_tx.try_send(());
                    }
                }
            }
        }
    }
}

impl Drop for GitBranchWatcher {
    fn drop(&mut self) {
        release_watcher();
    }
}

/// Locate the repository root for a directory, or None when the
/// directory is not inside a work tree.
fn find_git_root(workspace: &Path) -> Option<PathBuf> {
    let output = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(workspace)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if root.is_empty() {
        None
    } else {
        Some(PathBuf::from(root))
    }
}

/// Resolve the ref file HEAD currently points at, if any.
fn current_branch_ref_path(git_dir: &Path) -> Option<PathBuf> {
    let content = std::fs::read_to_string(git_dir.join("HEAD")).ok()?;
    let ref_path = parse_git_head_ref(&content)?;
    Some(git_dir.join(ref_path))
}

/// Parse `.git/HEAD` content into the symbolic ref path.
///
/// Returns None for detached HEAD (raw commit hash) and malformed
/// content; in both cases there is no branch ref to watch.
pub fn parse_git_head_ref(content: &str) -> Option<&str> {
    content.trim().strip_prefix("ref: ")
}

// ============================================================================
// Tests
// ============================================================================
