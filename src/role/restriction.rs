//! Typed restrictions narrowing what a role may do.
//!
//! Role files may list restrictions in any of these shapes:
//!
//! ```yaml
//! restrictions:
//!   - "max_file_changes: 5"
//!   - require_approval: true
//! ```
//!
//! ```yaml
//! restrictions:
//!   max_file_changes: 5
//!   require_approval: true
//! ```

use super::RoleParseError;
use super::value::ScalarValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Closed set of restriction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionType {
    MaxFileChanges,
    MaxTaskDepth,
    SingleCodeblockOnly,
    NoDestructiveOps,
    ReadOnlyDatabase,
    TimeLimit,
    MaxTokens,
    RequireApproval,
}

impl RestrictionType {
    pub const ALL: [RestrictionType; 8] = [
        RestrictionType::MaxFileChanges,
        RestrictionType::MaxTaskDepth,
        RestrictionType::SingleCodeblockOnly,
        RestrictionType::NoDestructiveOps,
        RestrictionType::ReadOnlyDatabase,
        RestrictionType::TimeLimit,
        RestrictionType::MaxTokens,
        RestrictionType::RequireApproval,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RestrictionType::MaxFileChanges => "max_file_changes",
            RestrictionType::MaxTaskDepth => "max_task_depth",
            RestrictionType::SingleCodeblockOnly => "single_codeblock_only",
            RestrictionType::NoDestructiveOps => "no_destructive_ops",
            RestrictionType::ReadOnlyDatabase => "read_only_database",
            RestrictionType::TimeLimit => "time_limit",
            RestrictionType::MaxTokens => "max_tokens",
            RestrictionType::RequireApproval => "require_approval",
        }
    }

    /// Whether the restriction takes a boolean flag (as opposed to a count).
    pub fn is_flag(&self) -> bool {
        matches!(
            self,
            RestrictionType::SingleCodeblockOnly
                | RestrictionType::NoDestructiveOps
                | RestrictionType::ReadOnlyDatabase
                | RestrictionType::RequireApproval
        )
    }

    /// Check that a value has the shape this restriction expects.
    pub fn check_value(&self, value: &ScalarValue) -> Result<(), String> {
        if self.is_flag() {
            return match value.as_bool() {
                Some(_) => Ok(()),
                None => Err(format!(
                    "restriction '{}' expects a boolean, got {} '{}'",
                    self,
                    value.kind(),
                    value
                )),
            };
        }

        match (self, value.as_u64()) {
            (RestrictionType::TimeLimit | RestrictionType::MaxTokens, Some(0)) => Err(format!(
                "restriction '{}' must be greater than 0",
                self
            )),
            (_, Some(_)) => Ok(()),
            (_, None) => Err(format!(
                "restriction '{}' expects a non-negative integer, got {} '{}'",
                self,
                value.kind(),
                value
            )),
        }
    }

    /// Sentence used in rendered prompts. `None` for disabled flags.
    pub fn describe(&self, value: &ScalarValue) -> Option<String> {
        if self.is_flag() && value.as_bool() == Some(false) {
            return None;
        }
        let text = match self {
            RestrictionType::MaxFileChanges => format!("You may modify at most {} files", value),
            RestrictionType::MaxTaskDepth => {
                format!("Subtasks may not be nested {} or more levels deep", value)
            }
            RestrictionType::SingleCodeblockOnly => {
                "Respond with a single code block only".to_string()
            }
            RestrictionType::NoDestructiveOps => {
                "Do not perform destructive operations (deleting data, force pushes, dropping tables)"
                    .to_string()
            }
            RestrictionType::ReadOnlyDatabase => "Database access is read-only".to_string(),
            RestrictionType::TimeLimit => format!("Complete the task within {} seconds", value),
            RestrictionType::MaxTokens => format!("Keep the response under {} tokens", value),
            RestrictionType::RequireApproval => {
                "Commands require explicit approval before execution".to_string()
            }
        };
        Some(text)
    }
}

impl FromStr for RestrictionType {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        RestrictionType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| RoleParseError::UnknownRestriction(s.trim().to_string()))
    }
}

impl fmt::Display for RestrictionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The restriction set of a role, keyed by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_yaml::Value", into = "BTreeMap<RestrictionType, ScalarValue>")]
pub struct Restrictions(BTreeMap<RestrictionType, ScalarValue>);

impl Restrictions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: RestrictionType, value: ScalarValue) -> Self {
        self.0.insert(kind, value);
        self
    }

    pub fn insert(&mut self, kind: RestrictionType, value: ScalarValue) {
        self.0.insert(kind, value);
    }

    pub fn get(&self, kind: RestrictionType) -> Option<&ScalarValue> {
        self.0.get(&kind)
    }

    pub fn contains(&self, kind: RestrictionType) -> bool {
        self.0.contains_key(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RestrictionType, &ScalarValue)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    /// Numeric limit for a count-style restriction.
    pub fn limit(&self, kind: RestrictionType) -> Option<u64> {
        self.get(kind).and_then(ScalarValue::as_u64)
    }

    /// Whether a flag-style restriction is present and enabled.
    pub fn is_enabled(&self, kind: RestrictionType) -> bool {
        self.get(kind).and_then(ScalarValue::as_bool).unwrap_or(false)
    }

    /// Flattened, human-readable descriptions of every active restriction.
    pub fn descriptions(&self) -> Vec<String> {
        self.iter()
            .filter_map(|(kind, value)| kind.describe(value))
            .collect()
    }

    /// Parse a single `type: value` string.
    pub fn parse_entry(raw: &str) -> Result<(RestrictionType, ScalarValue), RoleParseError> {
        let (kind, value) = raw
            .split_once(':')
            .ok_or_else(|| RoleParseError::InvalidRestrictionEntry(raw.to_string()))?;
        let kind: RestrictionType = kind.parse()?;
        if value.trim().is_empty() {
            return Err(RoleParseError::InvalidRestrictionEntry(raw.to_string()));
        }
        Ok((kind, ScalarValue::coerce(value)))
    }

    fn insert_yaml_pair(
        &mut self,
        key: &serde_yaml::Value,
        value: &serde_yaml::Value,
    ) -> Result<(), RoleParseError> {
        let key = key
            .as_str()
            .ok_or_else(|| RoleParseError::InvalidRestrictionEntry(format!("{:?}", key)))?;
        let kind: RestrictionType = key.parse()?;
        self.0.insert(kind, ScalarValue::from_yaml(value)?);
        Ok(())
    }
}

impl TryFrom<serde_yaml::Value> for Restrictions {
    type Error = RoleParseError;

    fn try_from(value: serde_yaml::Value) -> Result<Self, Self::Error> {
        let mut restrictions = Restrictions::new();
        match value {
            serde_yaml::Value::Null => {}
            serde_yaml::Value::Mapping(map) => {
                for (k, v) in &map {
                    restrictions.insert_yaml_pair(k, v)?;
                }
            }
            serde_yaml::Value::Sequence(items) => {
                for item in items {
                    match item {
                        serde_yaml::Value::String(raw) => {
                            let (kind, value) = Restrictions::parse_entry(&raw)?;
                            restrictions.insert(kind, value);
                        }
                        serde_yaml::Value::Mapping(map) => {
                            for (k, v) in &map {
                                restrictions.insert_yaml_pair(k, v)?;
                            }
                        }
                        other => {
                            return Err(RoleParseError::InvalidRestrictionEntry(format!(
                                "{:?}",
                                other
                            )));
                        }
                    }
                }
            }
            other => {
                return Err(RoleParseError::InvalidRestrictionEntry(format!(
                    "{:?}",
                    other
                )));
            }
        }
        Ok(restrictions)
    }
}

impl From<Restrictions> for BTreeMap<RestrictionType, ScalarValue> {
    fn from(restrictions: Restrictions) -> Self {
        restrictions.0
    }
}
