//! Supervision of the svelte-check watch process.
//!
//! The runner owns the checker subprocess, pipes its merged output into
//! the interpreter, and folds the resulting events into the snapshot
//! cell: a cycle start invalidates the cell, a completed cycle fills it,
//! a failure only logs. Readers of the cell therefore always see the
//! most recent *complete* cycle or block until one exists.

use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::unbounded;
use parking_lot::Mutex;

use crate::error::{DaemonError, Result};
use crate::interpreter::{interpret_output, CheckCompleted, CheckEvent};
use crate::snapshot::SnapshotCell;

/// Pause between stopping the old checker and starting the new one, so
/// the kernel can release pipe descriptors.
const RESTART_SETTLE: Duration = Duration::from_millis(100);

/// How long a terminated child gets to exit on SIGTERM before SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(10);

/// External command used to launch the checker.
///
/// Overridable so tests can substitute a shell script for the real
/// toolchain.
#[derive(Debug, Clone)]
pub struct CheckerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl CheckerCommand {
    /// `bun run svelte-check --watch --output machine-verbose [--tsconfig P]`
    pub fn watch(tsconfig: Option<&Path>) -> Self {
        let mut args: Vec<String> = ["run", "svelte-check", "--watch", "--output", "machine-verbose"]
            .map(String::from)
            .to_vec();
        if let Some(tsconfig) = tsconfig {
            args.push("--tsconfig".to_string());
            args.push(tsconfig.display().to_string());
        }
        Self {
            program: "bun".to_string(),
            args,
        }
    }

    /// `bun run svelte-check [--tsconfig P]` for the one-shot fallback.
    pub fn once(tsconfig: Option<&Path>) -> Self {
        let mut args: Vec<String> = ["run", "svelte-check"].map(String::from).to_vec();
        if let Some(tsconfig) = tsconfig {
            args.push("--tsconfig".to_string());
            args.push(tsconfig.display().to_string());
        }
        Self {
            program: "bun".to_string(),
            args,
        }
    }
}

struct ChildHandle {
    pid: u32,
    exited: Arc<AtomicBool>,
}

/// Manages a svelte-check `--watch` process.
pub struct Runner {
    workspace: PathBuf,
    command: CheckerCommand,
    child: Mutex<Option<ChildHandle>>,
    latest: Arc<SnapshotCell<CheckCompleted>>,
}

impl Runner {
    pub fn new(workspace: &Path, tsconfig: Option<&Path>) -> Self {
        Self::with_command(workspace, CheckerCommand::watch(tsconfig))
    }

    pub fn with_command(workspace: &Path, command: CheckerCommand) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            command,
            child: Mutex::new(None),
            latest: Arc::new(SnapshotCell::new()),
        }
    }

    /// Spawn the checker and begin interpreting its output.
    pub fn start(&self) -> Result<()> {
        let spawn_error = |message: String| DaemonError::Spawn {
            program: self.command.program.clone(),
            message,
        };

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .current_dir(&self.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("stdout pipe unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_error("stderr pipe unavailable".to_string()))?;

        let exited = Arc::new(AtomicBool::new(false));
        *self.child.lock() = Some(ChildHandle {
            pid: child.id(),
            exited: Arc::clone(&exited),
        });

        // Reaper: the exit status must be collected even though nobody
        // asks for it, or the dead child lingers as a zombie and forced
        // termination races its state.
        thread::spawn(move || {
            let _ = child.wait();
            exited.store(true, Ordering::SeqCst);
        });

        let (events_tx, events_rx) = unbounded();
        thread::spawn(move || {
            // stdout first, then stderr once stdout closes. Interleaving
            // line-by-line could reorder timestamp-adjacent output; some
            // checker builds emit the protocol on stderr during startup.
            let merged = BufReader::new(stdout.chain(stderr));
            if let Err(e) = interpret_output(merged, &events_tx) {
                tracing::warn!("checker output stream error: {e}");
            }
        });

        let latest = Arc::clone(&self.latest);
        thread::spawn(move || {
            for event in events_rx {
                match event {
                    CheckEvent::Started { .. } => {
                        latest.invalidate();
                        tracing::info!("svelte-check started");
                    }
                    CheckEvent::Completed(done) => {
                        tracing::info!(
                            "svelte-check completed: {} errors, {} warnings",
                            done.error_count,
                            done.warning_count
                        );
                        latest.set(done);
                    }
                    CheckEvent::Failed { message, .. } => {
                        tracing::warn!("svelte-check failure: {message}");
                    }
                }
            }
        });

        Ok(())
    }

    /// Terminate the current checker, if any. Idempotent.
    pub fn stop(&self) {
        if let Some(child) = self.child.lock().take() {
            terminate(child);
        }
    }

    /// Stop, settle, invalidate, start.
    ///
    /// The invalidation sits after the stop and before the start so a
    /// reader can never observe the dead process's final snapshot as if
    /// it were current.
    pub fn restart(&self) -> Result<()> {
        self.stop();
        thread::sleep(RESTART_SETTLE);
        self.latest.invalidate();
        self.start()
    }

    /// Whether a checker process is currently alive.
    pub fn is_running(&self) -> bool {
        self.child
            .lock()
            .as_ref()
            .map(|child| !child.exited.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Block until a check cycle has completed since the most recent
    /// invalidation, then return its outcome.
    pub fn latest_completed(&self) -> CheckCompleted {
        self.latest.get()
    }

    pub(crate) fn snapshot(&self) -> Arc<SnapshotCell<CheckCompleted>> {
        Arc::clone(&self.latest)
    }
}

/// SIGTERM now, SIGKILL after the grace period unless the reaper saw
/// the child exit first. Non-blocking.
fn terminate(child: ChildHandle) {
    let pid = child.pid as i32;
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    thread::spawn(move || {
        thread::sleep(KILL_GRACE);
        if !child.exited.load(Ordering::SeqCst) {
            unsafe {
                libc::kill(pid, libc::SIGKILL);
            }
        }
    });
}

// ============================================================================
// One-shot commands
// ============================================================================

/// Run the checker once (non-watch) and return combined output plus the
/// exit code. A checker that cannot spawn maps to exit code 1.
pub fn run_once(workspace: &Path, tsconfig: Option<&Path>) -> (String, i32) {
    run_once_with_command(workspace, &CheckerCommand::once(tsconfig))
}

pub fn run_once_with_command(workspace: &Path, command: &CheckerCommand) -> (String, i32) {
    let output = Command::new(&command.program)
        .args(&command.args)
        .current_dir(workspace)
        .output();

    match output {
        Ok(output) => {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            (combined, output.status.code().unwrap_or(1))
        }
        Err(e) => (format!("failed to run {}: {e}\n", command.program), 1),
    }
}

/// Run `bun run svelte-kit sync` to regenerate route types. Called when
/// route files are created, deleted, or renamed.
pub fn run_svelte_kit_sync(workspace: &Path) -> Result<()> {
    let output = Command::new("bun")
        .args(["run", "svelte-kit", "sync"])
        .current_dir(workspace)
        .output()
        .map_err(|e| DaemonError::Spawn {
            program: "bun".to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(DaemonError::CommandFailed {
            command: "svelte-kit sync".to_string(),
            message: combined,
        });
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
