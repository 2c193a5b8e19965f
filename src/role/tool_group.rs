//! Tool groups: the coarse capability categories a role can be granted.
//!
//! In role files a tool group is written either compactly, with optional
//! `key=value` options after a colon:
//!
//! ```yaml
//! tool_groups:
//!   - read
//!   - edit:file_pattern=*.py
//!   - spawn_tasks:max_depth=3
//! ```
//!
//! or as a single-key map when an option value is awkward to inline:
//!
//! ```yaml
//! tool_groups:
//!   - edit:
//!       file_regex: "^src/.*\\.rs$"
//! ```

use super::RoleParseError;
use super::value::ScalarValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Option restricting EDIT access to paths matching a glob.
pub const OPTION_FILE_PATTERN: &str = "file_pattern";
/// Option restricting EDIT access to paths matching a regex.
pub const OPTION_FILE_REGEX: &str = "file_regex";
/// Option bounding COORDINATION depth.
pub const OPTION_MAX_DEPTH: &str = "max_depth";

/// Closed set of capability categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolGroup {
    /// Reading files and searching the workspace.
    Read,
    /// Creating, modifying and deleting files.
    Edit,
    /// Running shell commands.
    Command,
    /// Web browsing and fetching.
    Browser,
    /// MCP servers and database access.
    Mcp,
    /// Spawning and coordinating subtasks.
    Coordination,
}

impl ToolGroup {
    pub const ALL: [ToolGroup; 6] = [
        ToolGroup::Read,
        ToolGroup::Edit,
        ToolGroup::Command,
        ToolGroup::Browser,
        ToolGroup::Mcp,
        ToolGroup::Coordination,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolGroup::Read => "read",
            ToolGroup::Edit => "edit",
            ToolGroup::Command => "command",
            ToolGroup::Browser => "browser",
            ToolGroup::Mcp => "mcp",
            ToolGroup::Coordination => "coordination",
        }
    }

    /// Agent CLI tool names this group unlocks.
    pub fn cli_tools(&self) -> &'static [&'static str] {
        match self {
            ToolGroup::Read => &["read", "grep", "find", "glob", "ls"],
            ToolGroup::Edit => &["write", "edit"],
            ToolGroup::Command => &["bash"],
            ToolGroup::Browser => &["webfetch", "websearch"],
            ToolGroup::Mcp => &["mcp"],
            ToolGroup::Coordination => &[],
        }
    }

    /// Short description used in rendered prompts.
    pub fn describe(&self) -> &'static str {
        match self {
            ToolGroup::Read => "read files and search the project",
            ToolGroup::Edit => "create, modify and delete files",
            ToolGroup::Command => "execute shell commands",
            ToolGroup::Browser => "browse and fetch web content",
            ToolGroup::Mcp => "use MCP servers and database access",
            ToolGroup::Coordination => "create and coordinate subtasks",
        }
    }
}

impl FromStr for ToolGroup {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" | "file_read" => Ok(ToolGroup::Read),
            "edit" | "write" | "file_write" => Ok(ToolGroup::Edit),
            "command" | "execute" | "shell" => Ok(ToolGroup::Command),
            "browser" | "web" => Ok(ToolGroup::Browser),
            "mcp" | "database" => Ok(ToolGroup::Mcp),
            "coordination" | "spawn_tasks" => Ok(ToolGroup::Coordination),
            _ => Err(RoleParseError::UnknownToolGroup(s.trim().to_string())),
        }
    }
}

impl fmt::Display for ToolGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A granted tool group together with its per-group options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_yaml::Value", into = "String")]
pub struct ToolGroupEntry {
    pub group: ToolGroup,
    pub options: BTreeMap<String, ScalarValue>,
}

impl ToolGroupEntry {
    pub fn new(group: ToolGroup) -> Self {
        Self {
            group,
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: ScalarValue) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn option(&self, key: &str) -> Option<&ScalarValue> {
        self.options.get(key)
    }

    /// Parse the compact `name[:key=value,...]` form.
    pub fn parse(raw: &str) -> Result<Self, RoleParseError> {
        let raw = raw.trim();
        let (name, options_raw) = match raw.split_once(':') {
            Some((name, rest)) => (name, Some(rest)),
            None => (raw, None),
        };

        let mut entry = ToolGroupEntry::new(name.parse()?);
        if let Some(options_raw) = options_raw {
            for part in split_options(options_raw) {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                let (key, value) =
                    part.split_once('=')
                        .ok_or_else(|| RoleParseError::InvalidOption {
                            entry: raw.to_string(),
                            option: part.to_string(),
                        })?;
                let key = key.trim();
                if key.is_empty() {
                    return Err(RoleParseError::InvalidOption {
                        entry: raw.to_string(),
                        option: part.to_string(),
                    });
                }
                entry
                    .options
                    .insert(key.to_string(), ScalarValue::coerce(value));
            }
        }
        Ok(entry)
    }

    /// Human-readable summary, e.g. `edit (file_pattern=*.py)`.
    pub fn summary(&self) -> String {
        if self.options.is_empty() {
            self.group.to_string()
        } else {
            format!("{} ({})", self.group, self.options_string())
        }
    }

    fn options_string(&self) -> String {
        self.options
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl TryFrom<serde_yaml::Value> for ToolGroupEntry {
    type Error = RoleParseError;

    fn try_from(value: serde_yaml::Value) -> Result<Self, Self::Error> {
        match value {
            serde_yaml::Value::String(raw) => ToolGroupEntry::parse(&raw),
            serde_yaml::Value::Mapping(map) if map.len() == 1 => {
                let (key, options) = map
                    .into_iter()
                    .next()
                    .ok_or_else(|| RoleParseError::InvalidValue("empty tool group".to_string()))?;
                let name = key
                    .as_str()
                    .ok_or_else(|| RoleParseError::InvalidValue(format!("{:?}", key)))?;
                let mut entry = ToolGroupEntry::new(name.parse()?);
                match options {
                    serde_yaml::Value::Null => {}
                    serde_yaml::Value::Mapping(options) => {
                        for (k, v) in options {
                            let k = k.as_str().ok_or_else(|| RoleParseError::InvalidOption {
                                entry: name.to_string(),
                                option: format!("{:?}", k),
                            })?;
                            entry
                                .options
                                .insert(k.to_string(), ScalarValue::from_yaml(&v)?);
                        }
                    }
                    other => {
                        return Err(RoleParseError::InvalidOption {
                            entry: name.to_string(),
                            option: format!("{:?}", other),
                        });
                    }
                }
                Ok(entry)
            }
            other => Err(RoleParseError::InvalidValue(format!(
                "tool group must be a string or single-key map, got {:?}",
                other
            ))),
        }
    }
}

impl From<ToolGroupEntry> for String {
    fn from(entry: ToolGroupEntry) -> Self {
        if entry.options.is_empty() {
            entry.group.to_string()
        } else {
            format!("{}:{}", entry.group, entry.options_string())
        }
    }
}

/// Split option lists on commas that are not nested inside `{}`, `[]` or `()`,
/// so globs like `{a,b}` and regexes like `x{1,3}` survive intact.
fn split_options(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        match c {
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => depth = (depth - 1).max(0),
            ',' if depth == 0 => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}
