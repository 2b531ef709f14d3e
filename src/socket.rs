//! Socket path derivation for workspaces.
//!
//! Each workspace gets its own Unix socket under the system temp
//! directory, named after the workspace path so that distinct workspaces
//! can never collide: `/tmp/<slug>-svelte-check.sock`, where the slug is
//! the cleaned absolute workspace path with the leading separator
//! stripped and every remaining separator replaced by a dash.

use std::env;
use std::path::{Component, Path, PathBuf};

use crate::error::Result;

const SOCKET_SUFFIX: &str = "-svelte-check.sock";

/// Derive the socket path for a workspace directory.
///
/// Deterministic, and stable under trailing separators and `.`/`..`
/// segments, so every invocation against the same workspace agrees on
/// the path.
pub fn socket_path_for_workspace(workspace: &Path) -> Result<PathBuf> {
    let absolute = if workspace.is_absolute() {
        workspace.to_path_buf()
    } else {
        env::current_dir()?.join(workspace)
    };

    let mut slug = String::new();
    for component in lexical_clean(&absolute).components() {
        if let Component::Normal(part) = component {
            if !slug.is_empty() {
                slug.push('-');
            }
            slug.push_str(&part.to_string_lossy());
        }
    }

    Ok(env::temp_dir().join(format!("{slug}{SOCKET_SUFFIX}")))
}

/// Check whether a socket file exists at the given path.
pub fn socket_exists(socket_path: &Path) -> bool {
    socket_path.exists()
}

/// Lexically normalize a path: drop `.` segments and fold `..` into the
/// preceding component. No filesystem access, so unresolvable symlinks
/// cannot make derivation fail.
fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path_slug_format() {
        let path = socket_path_for_workspace(Path::new("/home/user/app")).unwrap();
        assert_eq!(
            path,
            env::temp_dir().join("home-user-app-svelte-check.sock")
        );
    }

    #[test]
    fn test_socket_path_is_deterministic() {
        let first = socket_path_for_workspace(Path::new("/ws/project")).unwrap();
        let second = socket_path_for_workspace(Path::new("/ws/project")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_socket_path_distinct_workspaces_differ() {
        let a = socket_path_for_workspace(Path::new("/ws/alpha")).unwrap();
        let b = socket_path_for_workspace(Path::new("/ws/beta")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_socket_path_ignores_trailing_separator() {
        let bare = socket_path_for_workspace(Path::new("/ws/project")).unwrap();
        let trailing = socket_path_for_workspace(Path::new("/ws/project/")).unwrap();
        assert_eq!(bare, trailing);
    }

    #[test]
    fn test_socket_path_cleans_dot_segments() {
        let plain = socket_path_for_workspace(Path::new("/ws/project")).unwrap();
        let dotted = socket_path_for_workspace(Path::new("/ws/./project")).unwrap();
        let parented = socket_path_for_workspace(Path::new("/ws/other/../project")).unwrap();
        assert_eq!(plain, dotted);
        assert_eq!(plain, parented);
    }

    #[test]
    fn test_socket_path_relative_workspace_is_absolutized() {
        let relative = socket_path_for_workspace(Path::new("subdir")).unwrap();
        let expected =
            socket_path_for_workspace(&env::current_dir().unwrap().join("subdir")).unwrap();
        assert_eq!(relative, expected);
    }

    #[test]
    fn test_socket_exists() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.sock");
        std::fs::write(&present, b"").unwrap();
        assert!(socket_exists(&present));
        assert!(!socket_exists(&dir.path().join("absent.sock")));
    }
}
