//! Runtime capability gate for a single execution.
//!
//! A [`ToolGroupEnforcer`] is built from a resolved role and answers "may this
//! role do X?" for each attempted operation. Denials are not errors: they are
//! recorded as [`Violation`]s and the caller decides what to do with them.
//! Checks touch nothing outside the enforcer's own counters.

use crate::role::{RestrictionType, RoleDefinition, ToolGroup};
use globset::{Glob, GlobMatcher};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

#[cfg(test)]
mod tests;

/// File operations gated by the enforcer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileOperation {
    Read,
    Write,
    Create,
    Delete,
}

impl FileOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileOperation::Read => "read",
            FileOperation::Write => "write",
            FileOperation::Create => "create",
            FileOperation::Delete => "delete",
        }
    }

    /// Whether the operation changes the file system.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, FileOperation::Read)
    }
}

impl FromStr for FileOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(FileOperation::Read),
            "write" | "modify" | "edit" => Ok(FileOperation::Write),
            "create" => Ok(FileOperation::Create),
            "delete" | "remove" => Ok(FileOperation::Delete),
            other => Err(format!("unknown file operation '{}'", other)),
        }
    }
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A denied operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The role lacks the tool group the operation needs.
    MissingToolGroup { group: ToolGroup, operation: String },
    /// The path is absolute or climbs above the project root.
    PathOutsideProject { path: String },
    /// The path is outside the role's allowed file pattern.
    FilePatternMismatch { path: String, pattern: String },
    /// A delete under `no_destructive_ops`.
    DestructiveOperation { path: String },
    /// The role's `max_file_changes` budget is spent.
    FileChangeLimit {
        operation: FileOperation,
        path: String,
        limit: u64,
    },
    /// The requested subtask depth is at or beyond the role's limit.
    TaskDepthExceeded { depth: u64, max_depth: u64 },
    /// A mutating database operation under `read_only_database`.
    ReadOnlyDatabase { operation: String },
}

impl Violation {
    pub fn to_display_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingToolGroup { group, operation } => write!(
                f,
                "Operation '{}' requires the {} tool group",
                operation, group
            ),
            Violation::PathOutsideProject { path } => {
                write!(f, "Path '{}' is outside the project", path)
            }
            Violation::DestructiveOperation { path } => write!(
                f,
                "Cannot delete '{}': destructive operations are not allowed",
                path
            ),
            Violation::FilePatternMismatch { path, pattern } => write!(
                f,
                "Path '{}' does not match the allowed file pattern '{}'",
                path, pattern
            ),
            Violation::FileChangeLimit {
                operation,
                path,
                limit,
            } => write!(
                f,
                "Maximum file changes exceeded ({}/{}): cannot {} {}",
                limit, limit, operation, path
            ),
            Violation::TaskDepthExceeded { depth, max_depth } => write!(
                f,
                "Task depth {} exceeds the maximum task depth of {}",
                depth, max_depth
            ),
            Violation::ReadOnlyDatabase { operation } => write!(
                f,
                "Database operation '{}' is not allowed: database access is read-only",
                operation
            ),
        }
    }
}

enum PathFilter {
    Glob { pattern: String, matcher: GlobMatcher },
    Regex { pattern: String, regex: Regex },
    /// A pattern that failed to compile denies every path.
    Invalid { pattern: String },
}

impl PathFilter {
    fn from_role(role: &RoleDefinition) -> Option<Self> {
        if let Some(pattern) = role.file_pattern() {
            return Some(match Glob::new(pattern) {
                Ok(glob) => PathFilter::Glob {
                    pattern: pattern.to_string(),
                    matcher: glob.compile_matcher(),
                },
                Err(_) => PathFilter::Invalid {
                    pattern: pattern.to_string(),
                },
            });
        }
        role.file_regex().map(|pattern| match Regex::new(pattern) {
            Ok(regex) => PathFilter::Regex {
                pattern: pattern.to_string(),
                regex,
            },
            Err(_) => PathFilter::Invalid {
                pattern: pattern.to_string(),
            },
        })
    }

    fn pattern(&self) -> &str {
        match self {
            PathFilter::Glob { pattern, .. }
            | PathFilter::Regex { pattern, .. }
            | PathFilter::Invalid { pattern } => pattern,
        }
    }

    fn allows(&self, path: &str) -> bool {
        match self {
            PathFilter::Glob { matcher, .. } => matcher.is_match(path),
            PathFilter::Regex { regex, .. } => regex.is_match(path),
            PathFilter::Invalid { .. } => false,
        }
    }
}

const DATABASE_MUTATIONS: &[&str] = &[
    "write", "insert", "update", "delete", "drop", "create", "alter", "truncate", "upsert",
];

/// Per-execution capability gate.
pub struct ToolGroupEnforcer {
    role: Arc<RoleDefinition>,
    path_filter: Option<PathFilter>,
    max_file_changes: Option<u64>,
    file_changes: u64,
    violations: Vec<Violation>,
}

impl ToolGroupEnforcer {
    pub fn new(role: Arc<RoleDefinition>) -> Self {
        let path_filter = PathFilter::from_role(&role);
        let max_file_changes = role.restrictions.limit(RestrictionType::MaxFileChanges);
        Self {
            role,
            path_filter,
            max_file_changes,
            file_changes: 0,
            violations: Vec::new(),
        }
    }

    pub fn role(&self) -> &RoleDefinition {
        &self.role
    }

    /// May the role perform `operation` on `path`?
    pub fn check_file_operation(&mut self, operation: FileOperation, path: &str) -> bool {
        if !operation.is_mutation() {
            return self.require(ToolGroup::Read, operation.as_str());
        }
        if !self.require(ToolGroup::Edit, operation.as_str()) {
            return false;
        }

        let Some(path) = normalize_path(path) else {
            return self.deny(Violation::PathOutsideProject {
                path: path.trim().to_string(),
            });
        };
        if operation == FileOperation::Delete
            && self.role.restrictions.is_enabled(RestrictionType::NoDestructiveOps)
        {
            return self.deny(Violation::DestructiveOperation { path });
        }
        if let Some(filter) = &self.path_filter
            && !filter.allows(&path)
        {
            let pattern = filter.pattern().to_string();
            return self.deny(Violation::FilePatternMismatch { path, pattern });
        }

        if let Some(limit) = self.max_file_changes {
            if self.file_changes >= limit {
                return self.deny(Violation::FileChangeLimit {
                    operation,
                    path,
                    limit,
                });
            }
            self.file_changes += 1;
        }
        true
    }

    /// May the role run `operation` against a database or MCP server?
    pub fn check_database_operation(&mut self, operation: &str) -> bool {
        if !self.require(ToolGroup::Mcp, operation) {
            return false;
        }
        let verb = operation.trim().to_ascii_lowercase();
        let mutates = DATABASE_MUTATIONS
            .iter()
            .any(|m| verb == *m || verb.starts_with(&format!("{} ", m)));
        if mutates && self.role.restrictions.is_enabled(RestrictionType::ReadOnlyDatabase) {
            return self.deny(Violation::ReadOnlyDatabase {
                operation: operation.trim().to_string(),
            });
        }
        true
    }

    pub fn check_command_execution(&mut self) -> bool {
        self.require(ToolGroup::Command, "execute command")
    }

    pub fn check_browser_access(&mut self) -> bool {
        self.require(ToolGroup::Browser, "browse")
    }

    /// May the role spawn a subtask at `depth`?
    pub fn check_task_coordination(&mut self, depth: u64) -> bool {
        if !self.require(ToolGroup::Coordination, "coordinate tasks") {
            return false;
        }
        match self.role.max_task_depth() {
            Some(max_depth) if depth >= max_depth => {
                self.deny(Violation::TaskDepthExceeded { depth, max_depth })
            }
            _ => true,
        }
    }

    /// Number of file mutations allowed so far.
    pub fn file_changes(&self) -> u64 {
        self.file_changes
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Violations rendered for display.
    pub fn get_violations(&self) -> Vec<String> {
        self.violations.iter().map(Violation::to_display_string).collect()
    }

    pub fn reset_violations(&mut self) {
        self.violations.clear();
    }

    fn require(&mut self, group: ToolGroup, operation: &str) -> bool {
        if self.role.has_tool_group(group) {
            true
        } else {
            self.deny(Violation::MissingToolGroup {
                group,
                operation: operation.to_string(),
            })
        }
    }

    fn deny(&mut self, violation: Violation) -> bool {
        debug!(role = %self.role.name, violation = %violation, "operation denied");
        self.violations.push(violation);
        false
    }
}

/// Project-relative form with forward slashes and `.`/`..` resolved.
///
/// `None` for absolute paths (including drive and UNC prefixes) and for
/// paths whose `..` segments climb above the root.
fn normalize_path(path: &str) -> Option<String> {
    let path = path.trim().replace('\\', "/");
    let has_drive = path.as_bytes().get(1) == Some(&b':');
    if path.starts_with('/') || has_drive {
        return None;
    }
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}
