//! CLI argument definitions using clap with subcommand architecture

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Fast svelte-check with a persistent watch process
#[derive(Parser, Debug)]
#[command(name = "svelte-check-server")]
#[command(about = "Fast svelte-check results from a persistent watch process")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the daemon (runs svelte-check --watch in the background)
    Start(StartArgs),

    /// Get check results (falls back to a one-shot run when no daemon is up)
    Check(CheckArgs),

    /// Stop the daemon
    Stop(StopArgs),
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Working directory
    #[arg(short = 'w', long = "workspace", default_value = ".")]
    pub workspace: PathBuf,

    /// Path to tsconfig.json
    #[arg(long, value_name = "PATH")]
    pub tsconfig: Option<PathBuf>,

    /// Recursive watch directory, relative to the workspace (repeatable)
    #[arg(short = 'r', value_name = "DIR")]
    pub recursive: Vec<PathBuf>,

    /// Non-recursive watch directory, relative to the workspace (repeatable)
    #[arg(short = 'd', value_name = "DIR")]
    pub non_recursive: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Working directory
    #[arg(short = 'w', long = "workspace", default_value = ".")]
    pub workspace: PathBuf,

    /// Path to tsconfig.json (used by the one-shot fallback)
    #[arg(long, value_name = "PATH")]
    pub tsconfig: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,

    /// Seconds to wait for an in-flight check to complete
    #[arg(long, default_value_t = 120, value_name = "SECONDS")]
    pub timeout: u64,
}

#[derive(Args, Debug)]
pub struct StopArgs {
    /// Working directory
    #[arg(short = 'w', long = "workspace", default_value = ".")]
    pub workspace: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Human => "human",
            OutputFormat::Json => "json",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
