//! Filesystem and repository watching.
//!
//! Three layers feed the change supervisor:
//!
//! - [`fs::NotifyFsWatcher`] watches workspace directories, expanding
//!   recursive roots by walking them.
//! - [`git::GitBranchWatcher`] tracks `.git/HEAD` and the current branch
//!   ref so branch switches and history rewrites are noticed.
//! - [`supervisor::ChangeSupervisor`] classifies the combined event
//!   stream and debounces into restart / project-sync callbacks.

pub mod fs;
pub mod git;
pub mod limit;
pub mod supervisor;

pub use fs::{FsWatch, NotifyFsWatcher};
pub use git::{parse_git_head_ref, GitBranchWatcher};
pub use limit::{watcher_count, MAX_WATCHERS};
pub use supervisor::{is_route_file, ChangeSupervisor, SupervisorConfig};
