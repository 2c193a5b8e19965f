//! Roles bundled with the binary.

use super::RoleParseError;
use super::definition::{RoleDefinition, parse_role_document};

/// The bundled role document.
pub const BUILTIN_ROLES_YAML: &str = include_str!("builtin_roles.yaml");

/// Names of the bundled roles, in declaration order.
pub const BUILTIN_ROLE_NAMES: [&str; 5] = ["orchestrator", "coder", "researcher", "tester", "reviewer"];

/// Parse the bundled roles.
///
/// The document ships with the binary, so any role in it failing to parse is
/// reported as an error for the whole set.
pub fn builtin_roles() -> Result<Vec<RoleDefinition>, RoleParseError> {
    parse_role_document(BUILTIN_ROLES_YAML)?
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::{RestrictionType, ToolGroup};

    #[test]
    fn test_bundled_roles_parse() {
        let roles = builtin_roles().unwrap();
        let names: Vec<&str> = roles.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, BUILTIN_ROLE_NAMES);
    }

    #[test]
    fn test_profiles_are_distinct() {
        let roles = builtin_roles().unwrap();
        let by_name = |n: &str| roles.iter().find(|r| r.name == n).unwrap();

        let coder = by_name("coder");
        assert!(coder.has_tool_group(ToolGroup::Edit));
        assert_eq!(coder.restrictions.limit(RestrictionType::MaxFileChanges), Some(20));

        let reviewer = by_name("reviewer");
        assert_eq!(reviewer.granted_groups(), vec![ToolGroup::Read]);

        let tester = by_name("tester");
        assert!(tester.file_pattern().unwrap().contains("tests/**"));

        let orchestrator = by_name("orchestrator");
        assert_eq!(orchestrator.max_task_depth(), Some(3));
    }

    #[test]
    fn test_bundled_roles_satisfy_consistency_rules() {
        for role in builtin_roles().unwrap() {
            if role.has_tool_group(ToolGroup::Edit) {
                assert!(role.restrictions.contains(RestrictionType::MaxFileChanges), "{}", role.name);
            }
            if role.has_tool_group(ToolGroup::Command) {
                assert!(role.restrictions.is_enabled(RestrictionType::RequireApproval), "{}", role.name);
            }
            if role.has_tool_group(ToolGroup::Coordination) {
                assert!(role.max_task_depth().is_some(), "{}", role.name);
            }
        }
    }
}
