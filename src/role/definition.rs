//! The role definition model and role-document parsing.

use super::RoleParseError;
use super::restriction::{RestrictionType, Restrictions};
use super::tool_group::{
    OPTION_FILE_PATTERN, OPTION_FILE_REGEX, OPTION_MAX_DEPTH, ToolGroup, ToolGroupEntry,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static ROLE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid role name regex"));

fn default_version() -> String {
    "1.0".to_string()
}

/// A named bundle of capabilities, restrictions and LLM preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDefinition {
    /// Unique identifier (alphanumerics, underscore, hyphen).
    pub name: String,

    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub description: String,

    /// Instructions prepended to every task this role executes.
    #[serde(default)]
    pub system_prompt: String,

    /// Preferred LLM, `provider:model` or `local:ollama:model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_llm: Option<String>,

    /// Ordered fallbacks tried when the preferred LLM is unavailable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_llms: Vec<String>,

    #[serde(default)]
    pub tool_groups: Vec<ToolGroupEntry>,

    #[serde(default, skip_serializing_if = "Restrictions::is_empty")]
    pub restrictions: Restrictions,

    /// Named context documents the role expects to receive.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_requirements: Vec<String>,

    /// Task-type tags this role is suited for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub task_types: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_rules: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_role: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inherits_from: Vec<String>,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl RoleDefinition {
    /// Create a role with only a name; everything else empty.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: String::new(),
            description: String::new(),
            system_prompt: String::new(),
            preferred_llm: None,
            fallback_llms: Vec::new(),
            tool_groups: Vec::new(),
            restrictions: Restrictions::new(),
            context_requirements: Vec::new(),
            task_types: Vec::new(),
            validation_rules: Vec::new(),
            parent_role: None,
            inherits_from: Vec::new(),
            version: default_version(),
            tags: Vec::new(),
        }
    }

    pub fn tool_group(&self, group: ToolGroup) -> Option<&ToolGroupEntry> {
        self.tool_groups.iter().find(|entry| entry.group == group)
    }

    pub fn has_tool_group(&self, group: ToolGroup) -> bool {
        self.tool_group(group).is_some()
    }

    /// Distinct tool groups in declaration order.
    pub fn granted_groups(&self) -> Vec<ToolGroup> {
        let mut groups = Vec::new();
        for entry in &self.tool_groups {
            if !groups.contains(&entry.group) {
                groups.push(entry.group);
            }
        }
        groups
    }

    /// Glob restricting which paths EDIT may touch.
    pub fn file_pattern(&self) -> Option<&str> {
        self.tool_group(ToolGroup::Edit)
            .and_then(|entry| entry.option(OPTION_FILE_PATTERN))
            .and_then(|value| value.as_str())
    }

    /// Regex restricting which paths EDIT may touch.
    pub fn file_regex(&self) -> Option<&str> {
        self.tool_group(ToolGroup::Edit)
            .and_then(|entry| entry.option(OPTION_FILE_REGEX))
            .and_then(|value| value.as_str())
    }

    /// Effective subtask depth limit: the tighter of the `max_task_depth`
    /// restriction and the coordination group's `max_depth` option.
    pub fn max_task_depth(&self) -> Option<u64> {
        let from_restriction = self.restrictions.limit(RestrictionType::MaxTaskDepth);
        let from_option = self
            .tool_group(ToolGroup::Coordination)
            .and_then(|entry| entry.option(OPTION_MAX_DEPTH))
            .and_then(|value| value.as_u64());
        match (from_restriction, from_option) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// LLM identifiers in preference order: preferred first, then fallbacks.
    pub fn llm_candidates(&self) -> Vec<&str> {
        let mut candidates: Vec<&str> = Vec::new();
        for llm in self.preferred_llm.iter().chain(self.fallback_llms.iter()) {
            let llm = llm.trim();
            if !llm.is_empty() && !candidates.contains(&llm) {
                candidates.push(llm);
            }
        }
        candidates
    }

    /// Names of all roles this role inherits from, parent first.
    pub fn parent_names(&self) -> Vec<&str> {
        let mut parents: Vec<&str> = Vec::new();
        for parent in self.parent_role.iter().chain(self.inherits_from.iter()) {
            let parent = parent.trim();
            if !parent.is_empty() && parent != self.name && !parents.contains(&parent) {
                parents.push(parent);
            }
        }
        parents
    }

    /// Title used in headers: the display name, or the identifier if unset.
    pub fn title(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }

    pub fn to_yaml(&self) -> Result<String, RoleParseError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Check that a role name is a slug (`^[a-zA-Z0-9_-]+$`).
pub fn validate_role_name(name: &str) -> Result<(), RoleParseError> {
    if ROLE_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(RoleParseError::InvalidName(name.to_string()))
    }
}

/// Parse one YAML role document.
///
/// Three document shapes are accepted:
///
/// - a single role mapping with a `name` key,
/// - `roles:` holding a sequence of role mappings,
/// - `roles:` holding a mapping of role name to role body.
///
/// The outer `Err` is for documents that cannot be read at all. Each role
/// inside a readable document gets its own `Result`, so one bad role does not
/// take its siblings down with it.
pub fn parse_role_document(
    yaml: &str,
) -> Result<Vec<Result<RoleDefinition, RoleParseError>>, RoleParseError> {
    let document: serde_yaml::Value = serde_yaml::from_str(yaml)?;

    let roles_key = serde_yaml::Value::String("roles".to_string());
    match document {
        serde_yaml::Value::Null => Ok(Vec::new()),
        serde_yaml::Value::Mapping(ref map) if map.contains_key(&roles_key) => {
            match map.get(&roles_key) {
                Some(serde_yaml::Value::Sequence(items)) => {
                    Ok(items.iter().cloned().map(parse_role_value).collect())
                }
                Some(serde_yaml::Value::Mapping(named)) => Ok(named
                    .iter()
                    .map(|(key, body)| parse_named_role(key, body.clone()))
                    .collect()),
                Some(serde_yaml::Value::Null) | None => Ok(Vec::new()),
                Some(other) => Err(RoleParseError::UnsupportedShape(format!(
                    "'roles' must be a sequence or mapping, got {}",
                    yaml_kind(other)
                ))),
            }
        }
        serde_yaml::Value::Mapping(_) => Ok(vec![parse_role_value(document)]),
        serde_yaml::Value::Sequence(items) => Ok(items.into_iter().map(parse_role_value).collect()),
        other => Err(RoleParseError::UnsupportedShape(format!(
            "expected a mapping or sequence, got {}",
            yaml_kind(&other)
        ))),
    }
}

fn parse_named_role(
    key: &serde_yaml::Value,
    mut body: serde_yaml::Value,
) -> Result<RoleDefinition, RoleParseError> {
    let name = key
        .as_str()
        .ok_or_else(|| RoleParseError::UnsupportedShape("role keys must be strings".to_string()))?;

    if let serde_yaml::Value::Mapping(ref mut map) = body {
        let name_key = serde_yaml::Value::String("name".to_string());
        if !map.contains_key(&name_key) {
            map.insert(name_key, serde_yaml::Value::String(name.to_string()));
        }
    }
    parse_role_value(body).map_err(|source| source.in_role(name))
}

fn parse_role_value(value: serde_yaml::Value) -> Result<RoleDefinition, RoleParseError> {
    let label = value
        .get("name")
        .and_then(|name| name.as_str())
        .map(str::to_string);

    let role: RoleDefinition = match serde_yaml::from_value(value) {
        Ok(role) => role,
        Err(e) => {
            let err = RoleParseError::from(e);
            return Err(match label {
                Some(name) => err.in_role(&name),
                None => err,
            });
        }
    };
    validate_role_name(&role.name)?;
    Ok(role)
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "bool",
        serde_yaml::Value::Number(_) => "number",
        serde_yaml::Value::String(_) => "string",
        serde_yaml::Value::Sequence(_) => "sequence",
        serde_yaml::Value::Mapping(_) => "mapping",
        serde_yaml::Value::Tagged(_) => "tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::ScalarValue;

    #[test]
    fn test_role_name_validation() {
        assert!(validate_role_name("bad-name_2").is_ok());
        assert!(validate_role_name("bad name!").is_err());
        assert!(validate_role_name("").is_err());
        assert!(validate_role_name("../etc").is_err());
    }

    #[test]
    fn test_parses_single_role_document() {
        let yaml = r#"
name: coder
display_name: Coder
description: Writes code
tool_groups: [read, "edit:file_pattern=*.py"]
restrictions:
  - "max_file_changes: 2"
task_types: [implementation]
"#;
        let roles = parse_role_document(yaml).unwrap();
        assert_eq!(roles.len(), 1);
        let role = roles[0].as_ref().unwrap();
        assert_eq!(role.name, "coder");
        assert_eq!(role.file_pattern(), Some("*.py"));
        assert_eq!(role.restrictions.limit(RestrictionType::MaxFileChanges), Some(2));
        assert_eq!(role.version, "1.0");
    }

    #[test]
    fn test_parses_roles_sequence_and_isolates_bad_roles() {
        let yaml = r#"
roles:
  - name: good
    tool_groups: [read]
  - name: bad
    tool_groups: [teleport]
"#;
        let roles = parse_role_document(yaml).unwrap();
        assert_eq!(roles.len(), 2);
        assert!(roles[0].is_ok());
        let err = roles[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("role 'bad'"));
        assert!(err.to_string().contains("unknown tool group 'teleport'"));
    }

    #[test]
    fn test_parses_named_role_mapping() {
        let yaml = r#"
roles:
  helper:
    description: Helps
    tool_groups: [read]
"#;
        let roles = parse_role_document(yaml).unwrap();
        let role = roles[0].as_ref().unwrap();
        assert_eq!(role.name, "helper");
    }

    #[test]
    fn test_rejects_invalid_name_in_document() {
        let yaml = "name: \"bad name!\"\n";
        let roles = parse_role_document(yaml).unwrap();
        assert!(matches!(roles[0], Err(RoleParseError::InvalidName(_))));
    }

    #[test]
    fn test_rejects_scalar_document() {
        assert!(parse_role_document("just a string").is_err());
    }

    #[test]
    fn test_malformed_yaml_is_an_outer_error() {
        assert!(parse_role_document("name: [unclosed").is_err());
    }

    #[test]
    fn test_max_task_depth_takes_the_tighter_limit() {
        let mut role = RoleDefinition::new("lead");
        role.tool_groups.push(
            ToolGroupEntry::new(ToolGroup::Coordination)
                .with_option(OPTION_MAX_DEPTH, ScalarValue::Int(4)),
        );
        assert_eq!(role.max_task_depth(), Some(4));
        role.restrictions
            .insert(RestrictionType::MaxTaskDepth, ScalarValue::Int(2));
        assert_eq!(role.max_task_depth(), Some(2));
    }

    #[test]
    fn test_llm_candidates_are_ordered_and_deduplicated() {
        let mut role = RoleDefinition::new("r");
        role.preferred_llm = Some("anthropic:claude-3-5-sonnet".to_string());
        role.fallback_llms = vec![
            "openai:gpt-4o".to_string(),
            "anthropic:claude-3-5-sonnet".to_string(),
        ];
        assert_eq!(
            role.llm_candidates(),
            vec!["anthropic:claude-3-5-sonnet", "openai:gpt-4o"]
        );
    }

    #[test]
    fn test_yaml_round_trip_preserves_capabilities() {
        let yaml = r#"
name: tester
tool_groups: [read, "edit:file_pattern={tests/**,*_test.py}"]
restrictions:
  max_file_changes: 10
  require_approval: true
"#;
        let roles = parse_role_document(yaml).unwrap();
        let role = roles.into_iter().next().unwrap().unwrap();
        let out = role.to_yaml().unwrap();
        let reparsed = parse_role_document(&out).unwrap();
        assert_eq!(reparsed[0].as_ref().unwrap(), &role);
    }
}
