use super::*;
use crate::role::{RestrictionType, ScalarValue, ToolGroupEntry};
use std::fs;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), content).unwrap();
}

fn group_names(role: &RoleDefinition) -> Vec<&'static str> {
    role.tool_groups.iter().map(|e| e.group.as_str()).collect()
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_falls_back_to_builtin_roles_without_global_dir() {
    let temp = TempDir::new().unwrap();
    let manager = RoleManager::new(Some(temp.path().join("missing")), None);
    let report = manager.load();

    assert!(report.used_builtin_defaults);
    assert!(report.errors.is_empty());
    assert_eq!(
        manager.list_roles(),
        vec!["coder", "orchestrator", "researcher", "reviewer", "tester"]
    );
}

#[test]
fn test_global_dir_replaces_builtins() {
    let temp = TempDir::new().unwrap();
    let global = temp.path().join("global");
    write(&global, "solo.yaml", "name: solo\ntool_groups: [read]\n");

    let manager = RoleManager::new(Some(global), None);
    let report = manager.load();

    assert!(!report.used_builtin_defaults);
    assert_eq!(manager.list_roles(), vec!["solo"]);
}

#[test]
fn test_project_overrides_replace_by_name() {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("roles");
    write(
        &project,
        "coder.yaml",
        "name: coder\ndescription: Project coder\ntool_groups: [read]\n",
    );

    let manager = RoleManager::new(None, Some(project));
    manager.load();

    let coder = manager.get_role("coder").unwrap();
    assert_eq!(coder.description, "Project coder");
    assert_eq!(group_names(&coder), vec!["read"]);
    assert!(manager.get_role("reviewer").is_some());
}

#[test]
fn test_malformed_file_is_skipped_without_aborting() {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("roles");
    write(&project, "a_broken.yaml", "name: [unclosed\n");
    write(&project, "b_good.yaml", "name: helper\ntool_groups: [read]\n");

    let manager = RoleManager::new(None, Some(project.clone()));
    let report = manager.load();

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].path.as_deref(), Some(project.join("a_broken.yaml").as_path()));
    assert!(manager.get_role("helper").is_some());
}

#[test]
fn test_unknown_enum_value_skips_only_that_role() {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("roles");
    write(
        &project,
        "team.yaml",
        r#"
roles:
  - name: good
    tool_groups: [read]
  - name: wizard
    tool_groups: [teleport]
  - name: limited
    restrictions: ["max_coffee: 3"]
"#,
    );

    let manager = RoleManager::new(None, Some(project));
    let report = manager.load();

    assert!(manager.get_role("good").is_some());
    assert!(manager.get_role("wizard").is_none());
    assert!(manager.get_role("limited").is_none());
    assert_eq!(report.errors.len(), 2);
    assert_eq!(report.errors[0].role.as_deref(), Some("wizard"));
}

#[test]
fn test_loading_twice_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("roles");
    write(
        &project,
        "child.yaml",
        "name: child\nparent_role: coder\ntask_types: [implementation, docs]\n",
    );

    let manager = RoleManager::new(None, Some(project));
    manager.load();
    let first: Vec<RoleDefinition> = manager.all_roles().iter().map(|r| (**r).clone()).collect();
    manager.load();
    manager.resolve_inheritance();
    let second: Vec<RoleDefinition> = manager.all_roles().iter().map(|r| (**r).clone()).collect();

    assert_eq!(first, second);
    let child = manager.get_role("child").unwrap();
    assert_eq!(
        child.task_types,
        vec!["implementation", "docs", "bugfix", "refactoring"]
    );
}

// ============================================================================
// Inheritance
// ============================================================================

fn role(name: &str, groups: &[ToolGroup]) -> RoleDefinition {
    let mut role = RoleDefinition::new(name);
    role.tool_groups = groups.iter().map(|g| ToolGroupEntry::new(*g)).collect();
    role
}

#[test]
fn test_merge_copies_missing_capabilities_without_duplicates() {
    let mut parent = role("parent", &[ToolGroup::Read, ToolGroup::Edit]);
    parent.context_requirements = vec!["overview".to_string(), "standards".to_string()];
    parent.task_types = vec!["implementation".to_string()];
    parent.system_prompt = "Parent prompt".to_string();
    parent
        .restrictions
        .insert(RestrictionType::MaxFileChanges, ScalarValue::Int(5));

    let mut child = role("child", &[ToolGroup::Read]);
    child.parent_role = Some("parent".to_string());
    child.context_requirements = vec!["overview".to_string()];
    child.task_types = vec!["implementation".to_string(), "testing".to_string()];
    child.system_prompt = "Child prompt".to_string();

    let manager = RoleManager::with_roles([parent, child]);
    let child = manager.get_role("child").unwrap();

    assert_eq!(group_names(&child), vec!["read", "edit"]);
    assert_eq!(child.context_requirements, vec!["overview", "standards"]);
    assert_eq!(child.task_types, vec!["implementation", "testing"]);
    assert_eq!(child.system_prompt, "Child prompt");
    assert_eq!(child.restrictions.limit(RestrictionType::MaxFileChanges), Some(5));
}

#[test]
fn test_child_values_win_over_parent_values() {
    let mut parent = role("parent", &[ToolGroup::Edit]);
    parent
        .restrictions
        .insert(RestrictionType::MaxFileChanges, ScalarValue::Int(50));
    parent.tool_groups[0] = ToolGroupEntry::new(ToolGroup::Edit)
        .with_option("file_pattern", ScalarValue::Text("**".to_string()));

    let mut child = role("child", &[]);
    child.tool_groups.push(
        ToolGroupEntry::new(ToolGroup::Edit)
            .with_option("file_pattern", ScalarValue::Text("*.py".to_string())),
    );
    child
        .restrictions
        .insert(RestrictionType::MaxFileChanges, ScalarValue::Int(2));
    child.inherits_from = vec!["parent".to_string()];

    let manager = RoleManager::with_roles([parent, child]);
    let child = manager.get_role("child").unwrap();

    assert_eq!(child.tool_groups.len(), 1);
    assert_eq!(child.file_pattern(), Some("*.py"));
    assert_eq!(child.restrictions.limit(RestrictionType::MaxFileChanges), Some(2));
}

#[test]
fn test_grandparent_capabilities_flow_down() {
    let base = role("base", &[ToolGroup::Browser]);
    let mut middle = role("middle", &[ToolGroup::Read]);
    middle.parent_role = Some("base".to_string());
    let mut leaf = role("leaf", &[ToolGroup::Command]);
    leaf.parent_role = Some("middle".to_string());

    let manager = RoleManager::with_roles([leaf, middle, base]);
    let leaf = manager.get_role("leaf").unwrap();
    assert_eq!(group_names(&leaf), vec!["command", "read", "browser"]);
}

#[test]
fn test_circular_inheritance_resolves_without_recursion() {
    let mut a = role("a", &[ToolGroup::Read]);
    a.parent_role = Some("b".to_string());
    let mut b = role("b", &[ToolGroup::Edit]);
    b.parent_role = Some("a".to_string());

    let manager = RoleManager::with_roles([a, b]);

    let a = manager.get_role("a").unwrap();
    let b = manager.get_role("b").unwrap();
    assert!(a.has_tool_group(ToolGroup::Edit));
    assert!(b.has_tool_group(ToolGroup::Read));
}

#[test]
fn test_missing_parent_keeps_child_as_declared() {
    let mut orphan = role("orphan", &[ToolGroup::Read]);
    orphan.parent_role = Some("ghost".to_string());

    let manager = RoleManager::with_roles([orphan.clone()]);
    assert_eq!(*manager.get_role("orphan").unwrap(), orphan);
}

// ============================================================================
// Queries
// ============================================================================

fn builtin_manager() -> RoleManager {
    let manager = RoleManager::new(None, None);
    manager.load();
    manager
}

#[test]
fn test_query_by_capability_and_task_type() {
    let manager = builtin_manager();

    let editors: Vec<String> = manager
        .get_roles_by_capability(ToolGroup::Edit)
        .iter()
        .map(|r| r.name.clone())
        .collect();
    assert_eq!(editors, vec!["coder", "tester"]);

    let reviewers: Vec<String> = manager
        .get_roles_by_task_type("REVIEW")
        .iter()
        .map(|r| r.name.clone())
        .collect();
    assert_eq!(reviewers, vec!["reviewer"]);
}

#[test]
fn test_role_assignment_requires_every_capability() {
    let manager = builtin_manager();
    assert!(manager.validate_role_assignment("coder", &[ToolGroup::Read, ToolGroup::Edit]));
    assert!(!manager.validate_role_assignment("reviewer", &[ToolGroup::Edit]));
    assert!(!manager.validate_role_assignment("nobody", &[]));
    assert!(manager.validate_role_assignment("reviewer", &[]));
}

// ============================================================================
// Custom roles
// ============================================================================

#[test]
fn test_custom_role_is_saved_and_reloaded() {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("roles");
    let manager = RoleManager::new(None, Some(project.clone()));
    manager.load();

    let mut custom = role("docs-writer", &[]);
    custom.parent_role = Some("reviewer".to_string());
    custom.task_types = vec!["documentation".to_string()];
    assert!(manager.create_custom_role(custom, true));
    assert!(project.join("docs-writer.yaml").exists());

    let resolved = manager.get_role("docs-writer").unwrap();
    assert!(resolved.has_tool_group(ToolGroup::Read));

    let fresh = RoleManager::new(None, Some(project));
    fresh.load();
    assert_eq!(fresh.get_role("docs-writer").unwrap(), resolved);
}

#[test]
fn test_custom_role_with_invalid_name_is_rejected() {
    let manager = RoleManager::with_roles([]);
    assert!(!manager.create_custom_role(RoleDefinition::new("bad name!"), false));
    assert!(manager.list_roles().is_empty());
}

#[test]
fn test_custom_role_save_failure_returns_false() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("roles");
    fs::write(&blocker, "not a directory").unwrap();

    let manager = RoleManager::new(None, Some(blocker));
    assert!(!manager.create_custom_role(RoleDefinition::new("helper"), true));
    assert!(manager.get_role("helper").is_none());
}

#[test]
fn test_custom_role_without_save_needs_no_directory() {
    let manager = RoleManager::with_roles([]);
    assert!(manager.create_custom_role(RoleDefinition::new("scratch"), false));
    assert_eq!(manager.list_roles(), vec!["scratch"]);
}
