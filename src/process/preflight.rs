//! Checks run before anything is spawned.

use super::ProcessError;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use tracing::warn;

/// Longest accepted task id.
pub const MAX_TASK_ID_LEN: usize = 64;

/// Tool names that may be passed to the agent CLI.
pub const ALLOWED_TOOLS: &[&str] = &[
    "read", "write", "edit", "bash", "grep", "find", "webfetch", "websearch", "mcp", "glob", "ls",
];

static TASK_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid task id regex"));

static TOOL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("Invalid tool name regex"));

pub fn validate_task_id(task_id: &str) -> Result<(), ProcessError> {
    if task_id.len() <= MAX_TASK_ID_LEN && TASK_ID_RE.is_match(task_id) {
        Ok(())
    } else {
        Err(ProcessError::InvalidTaskId(task_id.to_string()))
    }
}

/// Canonical project root, checked for existence, type and depth.
pub fn validate_project_root(root: &Path, max_depth: usize) -> Result<PathBuf, ProcessError> {
    let invalid = |reason: String| ProcessError::InvalidProjectRoot {
        path: root.to_path_buf(),
        reason,
    };

    let canonical = root
        .canonicalize()
        .map_err(|e| invalid(format!("cannot be resolved: {}", e)))?;
    if !canonical.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }

    let depth = canonical
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count();
    if depth > max_depth {
        return Err(invalid(format!(
            "path depth {} exceeds the maximum of {}",
            depth, max_depth
        )));
    }
    Ok(canonical)
}

/// Resolve the agent's working directory inside `root` (already canonical).
///
/// Relative paths are taken from `root`. The path is rejected if it leaves
/// the root either lexically or through symlinks, and must exist.
pub fn resolve_working_dir(root: &Path, requested: Option<&Path>) -> Result<PathBuf, ProcessError> {
    let Some(requested) = requested else {
        return Ok(root.to_path_buf());
    };

    let joined = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };
    let escape = |path: PathBuf| ProcessError::WorkingDirEscape {
        path,
        root: root.to_path_buf(),
    };

    let lexical = normalize_lexically(&joined).ok_or_else(|| escape(joined.clone()))?;
    if !lexical.starts_with(root) {
        return Err(escape(joined));
    }
    if !lexical.is_dir() {
        return Err(ProcessError::WorkingDirMissing(lexical));
    }

    let canonical = lexical
        .canonicalize()
        .map_err(|_| ProcessError::WorkingDirMissing(lexical.clone()))?;
    if !canonical.starts_with(root) {
        return Err(escape(canonical));
    }
    Ok(canonical)
}

/// Resolve `.` and `..` without touching the file system.
///
/// Returns `None` when `..` would climb above the filesystem root.
fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

/// Keep only allow-listed, well-formed tool names, deduplicated, in order.
pub fn filter_tools<S: AsRef<str>>(requested: &[S]) -> Vec<String> {
    let mut tools: Vec<String> = Vec::new();
    for tool in requested {
        let tool = tool.as_ref();
        if !TOOL_NAME_RE.is_match(tool) || !ALLOWED_TOOLS.contains(&tool) {
            warn!(tool = tool, "dropping tool that is not on the allow-list");
            continue;
        }
        if !tools.iter().any(|t| t == tool) {
            tools.push(tool.to_string());
        }
    }
    tools
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_task_id_rejects_injection_attempts() {
        for bad in [
            "../../etc/passwd",
            "a/b",
            "a;rm -rf /",
            "has space",
            "",
            "tab\there",
            "$(whoami)",
        ] {
            assert!(
                matches!(validate_task_id(bad), Err(ProcessError::InvalidTaskId(_))),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn test_task_id_length_limit() {
        assert!(validate_task_id(&"a".repeat(64)).is_ok());
        assert!(validate_task_id(&"a".repeat(65)).is_err());
        assert!(validate_task_id("exec-1_A").is_ok());
    }

    #[test]
    fn test_project_root_must_be_an_existing_directory() {
        let temp = TempDir::new().unwrap();
        assert!(validate_project_root(temp.path(), 64).is_ok());

        let file = temp.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(validate_project_root(&file, 64).is_err());
        assert!(validate_project_root(&temp.path().join("missing"), 64).is_err());
    }

    #[test]
    fn test_project_root_depth_is_bounded() {
        let temp = TempDir::new().unwrap();
        let err = validate_project_root(temp.path(), 0).unwrap_err();
        assert!(err.to_string().contains("path depth"));
    }

    #[test]
    fn test_working_dir_defaults_to_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        assert_eq!(resolve_working_dir(&root, None).unwrap(), root);
    }

    #[test]
    fn test_working_dir_inside_root_is_accepted() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("sub")).unwrap();
        assert_eq!(
            resolve_working_dir(&root, Some(Path::new("sub"))).unwrap(),
            root.join("sub")
        );
        assert_eq!(
            resolve_working_dir(&root, Some(Path::new("./sub/../sub"))).unwrap(),
            root.join("sub")
        );
    }

    #[test]
    fn test_working_dir_escape_is_rejected() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        for escape in ["..", "../other", "/tmp"] {
            let err = resolve_working_dir(&root, Some(Path::new(escape))).unwrap_err();
            assert!(
                matches!(err, ProcessError::WorkingDirEscape { .. }),
                "{}: {}",
                escape,
                err
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_working_dir_symlink_escape_is_rejected() {
        let temp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("link")).unwrap();

        let err = resolve_working_dir(&root, Some(Path::new("link"))).unwrap_err();
        assert!(matches!(err, ProcessError::WorkingDirEscape { .. }));
    }

    #[test]
    fn test_missing_working_dir_is_rejected() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let err = resolve_working_dir(&root, Some(Path::new("nope"))).unwrap_err();
        assert!(matches!(err, ProcessError::WorkingDirMissing(_)));
    }

    #[test]
    fn test_tool_filter_drops_injected_names() {
        let tools = filter_tools(&["read", "rm -rf", "bash; evil"]);
        assert_eq!(tools, vec!["read"]);
    }

    #[test]
    fn test_tool_filter_dedups_and_rejects_unknown() {
        let tools = filter_tools(&["bash", "READ", "read", "bash", "teleport", "grep"]);
        assert_eq!(tools, vec!["bash", "read", "grep"]);
    }
}
