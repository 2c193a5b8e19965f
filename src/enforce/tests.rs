use super::*;
use crate::role::{ScalarValue, ToolGroupEntry};
use crate::role::tool_group::{OPTION_FILE_PATTERN, OPTION_FILE_REGEX, OPTION_MAX_DEPTH};

fn enforcer(groups: Vec<ToolGroupEntry>, restrictions: &[(RestrictionType, i64)]) -> ToolGroupEnforcer {
    let mut role = RoleDefinition::new("fixture");
    role.tool_groups = groups;
    for (kind, value) in restrictions {
        role.restrictions.insert(*kind, ScalarValue::Int(*value));
    }
    ToolGroupEnforcer::new(Arc::new(role))
}

fn plain(groups: &[ToolGroup]) -> Vec<ToolGroupEntry> {
    groups.iter().map(|g| ToolGroupEntry::new(*g)).collect()
}

fn edit_with(option: &str, value: &str) -> ToolGroupEntry {
    ToolGroupEntry::new(ToolGroup::Edit).with_option(option, ScalarValue::Text(value.to_string()))
}

// ============================================================================
// File operations
// ============================================================================

#[test]
fn test_write_without_edit_is_denied_once() {
    let mut e = enforcer(plain(&[ToolGroup::Read]), &[]);
    assert!(!e.check_file_operation(FileOperation::Write, "x.py"));
    assert_eq!(e.violations().len(), 1);
    assert!(matches!(
        e.violations()[0],
        Violation::MissingToolGroup { group: ToolGroup::Edit, .. }
    ));
}

#[test]
fn test_read_requires_read_group() {
    let mut e = enforcer(plain(&[ToolGroup::Edit]), &[]);
    assert!(!e.check_file_operation(FileOperation::Read, "x.py"));

    let mut e = enforcer(plain(&[ToolGroup::Read]), &[]);
    assert!(e.check_file_operation(FileOperation::Read, "x.py"));
    assert!(e.get_violations().is_empty());
}

#[test]
fn test_max_file_changes_allows_exactly_the_limit() {
    let mut e = enforcer(plain(&[ToolGroup::Edit]), &[(RestrictionType::MaxFileChanges, 2)]);
    assert!(e.check_file_operation(FileOperation::Write, "a.py"));
    assert!(e.check_file_operation(FileOperation::Create, "b.py"));
    assert!(!e.check_file_operation(FileOperation::Write, "c.py"));
    assert!(!e.check_file_operation(FileOperation::Delete, "d.py"));

    assert_eq!(e.file_changes(), 2);
    let violations = e.get_violations();
    assert_eq!(violations.len(), 2);
    assert!(violations[0].contains("2/2"), "{}", violations[0]);
}

#[test]
fn test_glob_pattern_restricts_writes() {
    let mut e = enforcer(vec![edit_with(OPTION_FILE_PATTERN, "*.py")], &[]);
    assert!(!e.check_file_operation(FileOperation::Write, "notes.md"));
    assert!(e.check_file_operation(FileOperation::Write, "main.py"));
    assert!(e.check_file_operation(FileOperation::Write, "./pkg/util.py"));
    assert!(matches!(
        e.violations()[0],
        Violation::FilePatternMismatch { ref path, .. } if path == "notes.md"
    ));
}

#[test]
fn test_brace_glob_covers_test_locations() {
    let mut e = enforcer(
        vec![edit_with(OPTION_FILE_PATTERN, "{tests/**,**/*_test.*}")],
        &[],
    );
    assert!(e.check_file_operation(FileOperation::Write, "tests/unit/a.rs"));
    assert!(e.check_file_operation(FileOperation::Write, "src/parser_test.go"));
    assert!(!e.check_file_operation(FileOperation::Write, "src/parser.go"));
}

#[test]
fn test_regex_pattern_restricts_writes() {
    let mut e = enforcer(vec![edit_with(OPTION_FILE_REGEX, r"^src/.*\.rs$")], &[]);
    assert!(e.check_file_operation(FileOperation::Write, "src/lib.rs"));
    assert!(!e.check_file_operation(FileOperation::Write, "build.rs"));
}

#[test]
fn test_invalid_pattern_denies_all_writes() {
    let mut e = enforcer(vec![edit_with(OPTION_FILE_REGEX, "([")], &[]);
    assert!(!e.check_file_operation(FileOperation::Write, "src/lib.rs"));
}

#[test]
fn test_pattern_mismatch_does_not_consume_budget() {
    let mut e = enforcer(
        vec![edit_with(OPTION_FILE_PATTERN, "*.py")],
        &[(RestrictionType::MaxFileChanges, 1)],
    );
    assert!(!e.check_file_operation(FileOperation::Write, "notes.md"));
    assert_eq!(e.file_changes(), 0);
    assert!(e.check_file_operation(FileOperation::Write, "main.py"));
}

#[test]
fn test_traversal_cannot_escape_the_pattern() {
    let mut e = enforcer(vec![edit_with(OPTION_FILE_PATTERN, "src/**")], &[]);
    assert!(!e.check_file_operation(FileOperation::Write, "src/../../etc/passwd"));
    assert!(!e.check_file_operation(FileOperation::Write, "src/../Cargo.toml"));
    assert!(e.check_file_operation(FileOperation::Write, "src/./nested/../lib.rs"));

    assert!(matches!(
        e.violations()[0],
        Violation::PathOutsideProject { ref path } if path == "src/../../etc/passwd"
    ));
    assert!(matches!(
        e.violations()[1],
        Violation::FilePatternMismatch { ref path, .. } if path == "Cargo.toml"
    ));
}

#[test]
fn test_absolute_and_escaping_paths_are_denied() {
    let mut e = enforcer(vec![edit_with(OPTION_FILE_PATTERN, "*.py")], &[]);
    for path in ["/etc/evil.py", "../../x.py", "C:\\tmp\\evil.py", "a/../../x.py"] {
        assert!(!e.check_file_operation(FileOperation::Write, path), "{}", path);
    }
    assert_eq!(e.violations().len(), 4);
    assert!(e
        .violations()
        .iter()
        .all(|v| matches!(v, Violation::PathOutsideProject { .. })));
    assert!(e.get_violations()[0].contains("outside the project"));
}

#[test]
fn test_escaping_paths_are_denied_without_a_pattern() {
    let mut e = enforcer(plain(&[ToolGroup::Edit]), &[(RestrictionType::MaxFileChanges, 5)]);
    assert!(!e.check_file_operation(FileOperation::Create, "../sibling/new.rs"));
    assert_eq!(e.file_changes(), 0);
    assert!(e.check_file_operation(FileOperation::Create, "new.rs"));
}

#[test]
fn test_no_destructive_ops_denies_deletes_only() {
    let mut role = RoleDefinition::new("careful");
    role.tool_groups = plain(&[ToolGroup::Edit]);
    role.restrictions
        .insert(RestrictionType::NoDestructiveOps, ScalarValue::Bool(true));
    let mut e = ToolGroupEnforcer::new(Arc::new(role));

    assert!(e.check_file_operation(FileOperation::Write, "src/lib.rs"));
    assert!(!e.check_file_operation(FileOperation::Delete, "src/lib.rs"));
    assert!(matches!(
        e.violations()[0],
        Violation::DestructiveOperation { ref path } if path == "src/lib.rs"
    ));

    let mut e = enforcer(plain(&[ToolGroup::Edit]), &[]);
    assert!(e.check_file_operation(FileOperation::Delete, "src/lib.rs"));
}

// ============================================================================
// Other capabilities
// ============================================================================

#[test]
fn test_command_and_browser_need_their_groups() {
    let mut e = enforcer(plain(&[ToolGroup::Read]), &[]);
    assert!(!e.check_command_execution());
    assert!(!e.check_browser_access());
    assert_eq!(e.violations().len(), 2);

    let mut e = enforcer(plain(&[ToolGroup::Command, ToolGroup::Browser]), &[]);
    assert!(e.check_command_execution());
    assert!(e.check_browser_access());
}

#[test]
fn test_database_operations_need_mcp_and_respect_read_only() {
    let mut e = enforcer(plain(&[ToolGroup::Read]), &[]);
    assert!(!e.check_database_operation("select"));

    let mut role = RoleDefinition::new("analyst");
    role.tool_groups = plain(&[ToolGroup::Mcp]);
    role.restrictions
        .insert(RestrictionType::ReadOnlyDatabase, ScalarValue::Bool(true));
    let mut e = ToolGroupEnforcer::new(Arc::new(role));
    assert!(e.check_database_operation("select"));
    assert!(!e.check_database_operation("DELETE FROM users"));
    assert!(e.get_violations()[0].contains("read-only"));
}

#[test]
fn test_task_depth_is_denied_at_the_limit() {
    let mut e = enforcer(
        plain(&[ToolGroup::Coordination]),
        &[(RestrictionType::MaxTaskDepth, 3)],
    );
    assert!(e.check_task_coordination(2));
    assert!(!e.check_task_coordination(3));
    assert_eq!(
        e.violations(),
        &[Violation::TaskDepthExceeded {
            depth: 3,
            max_depth: 3
        }]
    );
}

#[test]
fn test_max_depth_option_also_limits_coordination() {
    let entry = ToolGroupEntry::new(ToolGroup::Coordination)
        .with_option(OPTION_MAX_DEPTH, ScalarValue::Int(1));
    let mut e = enforcer(vec![entry], &[]);
    assert!(e.check_task_coordination(0));
    assert!(!e.check_task_coordination(1));
}

#[test]
fn test_coordination_without_group_is_denied() {
    let mut e = enforcer(plain(&[ToolGroup::Read]), &[]);
    assert!(!e.check_task_coordination(0));
}

#[test]
fn test_reset_clears_violations_but_not_counters() {
    let mut e = enforcer(plain(&[ToolGroup::Edit]), &[(RestrictionType::MaxFileChanges, 1)]);
    assert!(e.check_file_operation(FileOperation::Write, "a"));
    assert!(!e.check_file_operation(FileOperation::Write, "b"));
    e.reset_violations();
    assert!(e.get_violations().is_empty());
    assert!(!e.check_file_operation(FileOperation::Write, "c"));
}

#[test]
fn test_file_operation_parses_aliases() {
    assert_eq!("WRITE".parse::<FileOperation>().unwrap(), FileOperation::Write);
    assert_eq!("remove".parse::<FileOperation>().unwrap(), FileOperation::Delete);
    assert!("chmod".parse::<FileOperation>().is_err());
}
