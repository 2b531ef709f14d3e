//! Error types for svelte-check-server

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for svelte-check-server operations
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("failed to bind {}: {source}", path.display())]
    Bind { path: PathBuf, source: io::Error },

    #[error("too many filesystem watchers: limit exceeded")]
    TooManyWatchers,

    #[error("{command} failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("bad response from server: {message}")]
    BadResponse { message: String },

    #[error("server returned status {status}")]
    UnexpectedStatus { status: u16 },

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for svelte-check-server operations
pub type Result<T> = std::result::Result<T, DaemonError>;
