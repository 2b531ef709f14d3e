//! svelte-check-server: a persistent svelte-check watch daemon.
//!
//! Keeps `svelte-check --watch` alive in the background, interprets its
//! machine-verbose stream into typed snapshots, and serves the latest
//! snapshot over a per-workspace Unix socket. Clients get the current
//! check state in milliseconds instead of paying a multi-second checker
//! start on every invocation.
//!
//! # Architecture
//!
//! ```text
//! svelte-check --watch ──stdout/stderr──► Interpreter ──events──► Runner
//!                                                                    │
//!                                                            SnapshotCell
//!                                                       (latest completed cycle)
//!                                                                    │
//! fs events ──► ChangeSupervisor ──restart/sync──► Runner       CheckServer
//! git HEAD  ──►       │                                          GET /check
//!                Debouncers (250ms)                              POST /stop
//! ```
//!
//! The snapshot cell is the only state shared across components:
//! readers of `GET /check` block while a check cycle is in flight and
//! all wake on the same completed value.

pub mod cli;
pub mod client;
pub mod debounce;
pub mod error;
pub mod interpreter;
pub mod runner;
pub mod server;
pub mod snapshot;
pub mod socket;
pub mod watch;

// Re-export commonly used types
pub use client::{Client, DEFAULT_TIMEOUT};
pub use error::{DaemonError, Result};
pub use interpreter::{
    format_human, interpret_output, CheckCompleted, CheckEvent, Diagnostic, DiagnosticCode,
    Position, Severity,
};
pub use runner::{run_once, run_svelte_kit_sync, CheckerCommand, Runner};
pub use server::CheckServer;
pub use snapshot::SnapshotCell;
pub use socket::{socket_exists, socket_path_for_workspace};
