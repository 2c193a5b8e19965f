//! The role registry.
//!
//! Roles are layered: global templates (or the bundled defaults when no
//! global directory exists) are loaded first, then project overrides replace
//! roles of the same name. Inheritance is resolved after every change from the
//! declared definitions, so loading twice never merges a parent in twice.

use super::builtin::builtin_roles;
use super::definition::{RoleDefinition, parse_role_document, validate_role_name};
use super::store::{list_role_files, save_role};
use super::tool_group::ToolGroup;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

#[cfg(test)]
mod tests;

/// A role or role file that was skipped during loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleLoadError {
    pub path: Option<PathBuf>,
    pub role: Option<String>,
    pub message: String,
}

impl fmt::Display for RoleLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{}: ", path.display())?;
        }
        if let Some(role) = &self.role {
            write!(f, "role '{}': ", role)?;
        }
        f.write_str(&self.message)
    }
}

impl std::error::Error for RoleLoadError {}

/// What a call to [`RoleManager::load`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Role names in load order (later entries may replace earlier ones).
    pub loaded: Vec<String>,
    pub errors: Vec<RoleLoadError>,
    pub used_builtin_defaults: bool,
}

#[derive(Debug, Default)]
struct RoleTable {
    declared: BTreeMap<String, RoleDefinition>,
    resolved: BTreeMap<String, Arc<RoleDefinition>>,
}

/// Loads roles and answers lookups against the resolved role table.
///
/// Reads vastly outnumber writes; the table sits behind an `RwLock`.
#[derive(Debug)]
pub struct RoleManager {
    global_dir: Option<PathBuf>,
    project_dir: Option<PathBuf>,
    table: RwLock<RoleTable>,
}

impl RoleManager {
    /// Create an empty manager. Call [`load`](Self::load) to populate it.
    pub fn new(global_dir: Option<PathBuf>, project_dir: Option<PathBuf>) -> Self {
        Self {
            global_dir,
            project_dir,
            table: RwLock::new(RoleTable::default()),
        }
    }

    /// Manager pre-populated with `roles`, with no backing directories.
    pub fn with_roles(roles: impl IntoIterator<Item = RoleDefinition>) -> Self {
        let manager = Self::new(None, None);
        {
            let mut table = manager.write_table();
            for role in roles {
                table.declared.insert(role.name.clone(), role);
            }
            table.resolved = resolve_all(&table.declared);
        }
        manager
    }

    pub fn project_dir(&self) -> Option<&Path> {
        self.project_dir.as_deref()
    }

    /// (Re)load every role source and resolve inheritance.
    ///
    /// Bad files and bad roles are logged, reported and skipped.
    pub fn load(&self) -> LoadReport {
        let mut report = LoadReport::default();
        let mut declared = BTreeMap::new();

        match self.global_dir.as_deref().filter(|dir| dir.is_dir()) {
            Some(dir) => load_dir(dir, &mut declared, &mut report),
            None => {
                report.used_builtin_defaults = true;
                match builtin_roles() {
                    Ok(roles) => {
                        for role in roles {
                            report.loaded.push(role.name.clone());
                            declared.insert(role.name.clone(), role);
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "bundled roles failed to parse");
                        report.errors.push(RoleLoadError {
                            path: None,
                            role: None,
                            message: format!("bundled roles: {}", e),
                        });
                    }
                }
            }
        }

        if let Some(dir) = self.project_dir.as_deref() {
            load_dir(dir, &mut declared, &mut report);
        }

        let mut table = self.write_table();
        table.resolved = resolve_all(&declared);
        table.declared = declared;
        info!(
            roles = table.resolved.len(),
            skipped = report.errors.len(),
            builtin = report.used_builtin_defaults,
            "roles loaded"
        );
        report
    }

    /// Recompute the resolved table from the declared definitions.
    pub fn resolve_inheritance(&self) {
        let mut table = self.write_table();
        table.resolved = resolve_all(&table.declared);
    }

    pub fn get_role(&self, name: &str) -> Option<Arc<RoleDefinition>> {
        self.read_table().resolved.get(name).cloned()
    }

    /// Role names, sorted.
    pub fn list_roles(&self) -> Vec<String> {
        self.read_table().resolved.keys().cloned().collect()
    }

    /// Every resolved role, sorted by name.
    pub fn all_roles(&self) -> Vec<Arc<RoleDefinition>> {
        self.read_table().resolved.values().cloned().collect()
    }

    pub fn get_roles_by_capability(&self, capability: ToolGroup) -> Vec<Arc<RoleDefinition>> {
        self.read_table()
            .resolved
            .values()
            .filter(|role| role.has_tool_group(capability))
            .cloned()
            .collect()
    }

    /// Roles tagged with `task_type` (case-insensitive).
    pub fn get_roles_by_task_type(&self, task_type: &str) -> Vec<Arc<RoleDefinition>> {
        self.read_table()
            .resolved
            .values()
            .filter(|role| role.task_types.iter().any(|t| t.eq_ignore_ascii_case(task_type)))
            .cloned()
            .collect()
    }

    /// True only if the role exists and grants every required tool group.
    pub fn validate_role_assignment(&self, role_name: &str, required: &[ToolGroup]) -> bool {
        self.get_role(role_name)
            .is_some_and(|role| required.iter().all(|group| role.has_tool_group(*group)))
    }

    /// Register `role`, optionally persisting it to the project role directory.
    ///
    /// Returns `false` (after logging) when the name is invalid or the file
    /// cannot be written; the in-memory table is left untouched in that case.
    pub fn create_custom_role(&self, role: RoleDefinition, save_to_project: bool) -> bool {
        if let Err(e) = validate_role_name(&role.name) {
            error!(error = %e, "rejected custom role");
            return false;
        }

        if save_to_project {
            let Some(dir) = self.project_dir.as_deref() else {
                error!(role = %role.name, "no project role directory configured");
                return false;
            };
            match save_role(dir, &role) {
                Ok(path) => debug!(role = %role.name, path = %path.display(), "saved custom role"),
                Err(e) => {
                    error!(role = %role.name, error = %e, "failed to save custom role");
                    return false;
                }
            }
        }

        let mut table = self.write_table();
        table.declared.insert(role.name.clone(), role);
        table.resolved = resolve_all(&table.declared);
        true
    }

    fn read_table(&self) -> RwLockReadGuard<'_, RoleTable> {
        self.table.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, RoleTable> {
        self.table.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn load_dir(dir: &Path, declared: &mut BTreeMap<String, RoleDefinition>, report: &mut LoadReport) {
    let files = match list_role_files(dir) {
        Ok(files) => files,
        Err(e) => {
            error!(path = %dir.display(), error = %e, "cannot read role directory");
            report.errors.push(RoleLoadError {
                path: Some(dir.to_path_buf()),
                role: None,
                message: e.to_string(),
            });
            return;
        }
    };

    for path in files {
        load_file(&path, declared, report);
    }
}

fn load_file(path: &Path, declared: &mut BTreeMap<String, RoleDefinition>, report: &mut LoadReport) {
    let skip_file = |report: &mut LoadReport, message: String| {
        error!(path = %path.display(), error = %message, "skipping role file");
        report.errors.push(RoleLoadError {
            path: Some(path.to_path_buf()),
            role: None,
            message,
        });
    };

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => return skip_file(report, e.to_string()),
    };
    let roles = match parse_role_document(&content) {
        Ok(roles) => roles,
        Err(e) => return skip_file(report, e.to_string()),
    };

    for parsed in roles {
        match parsed {
            Ok(role) => {
                if declared.contains_key(&role.name) {
                    debug!(role = %role.name, path = %path.display(), "role overridden");
                }
                report.loaded.push(role.name.clone());
                declared.insert(role.name.clone(), role);
            }
            Err(e) => {
                let role = match &e {
                    super::RoleParseError::InRole { role, .. } => Some(role.clone()),
                    _ => None,
                };
                error!(path = %path.display(), error = %e, "skipping role");
                report.errors.push(RoleLoadError {
                    path: Some(path.to_path_buf()),
                    role,
                    message: e.to_string(),
                });
            }
        }
    }
}

fn resolve_all(declared: &BTreeMap<String, RoleDefinition>) -> BTreeMap<String, Arc<RoleDefinition>> {
    let mut resolved = BTreeMap::new();
    for name in declared.keys() {
        let mut visiting = Vec::new();
        resolve_one(name, declared, &mut resolved, &mut visiting);
    }
    resolved
}

fn resolve_one(
    name: &str,
    declared: &BTreeMap<String, RoleDefinition>,
    resolved: &mut BTreeMap<String, Arc<RoleDefinition>>,
    visiting: &mut Vec<String>,
) -> Option<Arc<RoleDefinition>> {
    if let Some(done) = resolved.get(name) {
        return Some(Arc::clone(done));
    }
    let role = declared.get(name)?;

    if visiting.iter().any(|v| v == name) {
        warn!(
            role = name,
            chain = %visiting.join(" -> "),
            "circular role inheritance; using the declared definition"
        );
        return Some(Arc::new(role.clone()));
    }

    visiting.push(name.to_string());
    let mut merged = role.clone();
    for parent_name in role.parent_names() {
        match resolve_one(parent_name, declared, resolved, visiting) {
            Some(parent) => merge_parent(&mut merged, &parent),
            None => warn!(role = name, parent = parent_name, "parent role not found"),
        }
    }
    visiting.pop();

    let merged = Arc::new(merged);
    resolved.insert(name.to_string(), Arc::clone(&merged));
    Some(merged)
}

/// Copy into `child` whatever `parent` has that `child` does not declare.
fn merge_parent(child: &mut RoleDefinition, parent: &RoleDefinition) {
    for entry in &parent.tool_groups {
        if !child.has_tool_group(entry.group) {
            child.tool_groups.push(entry.clone());
        }
    }
    for (kind, value) in parent.restrictions.iter() {
        if !child.restrictions.contains(kind) {
            child.restrictions.insert(kind, value.clone());
        }
    }

    union_into(&mut child.context_requirements, &parent.context_requirements);
    union_into(&mut child.task_types, &parent.task_types);
    union_into(&mut child.validation_rules, &parent.validation_rules);

    fill_if_blank(&mut child.display_name, &parent.display_name);
    fill_if_blank(&mut child.description, &parent.description);
    fill_if_blank(&mut child.system_prompt, &parent.system_prompt);
    if child.preferred_llm.is_none() {
        child.preferred_llm = parent.preferred_llm.clone();
    }
    if child.fallback_llms.is_empty() {
        child.fallback_llms = parent.fallback_llms.clone();
    }
}

fn union_into(target: &mut Vec<String>, extra: &[String]) {
    let mut seen: Vec<String> = Vec::with_capacity(target.len() + extra.len());
    for item in target.iter().chain(extra) {
        if !seen.contains(item) {
            seen.push(item.clone());
        }
    }
    *target = seen;
}

fn fill_if_blank(target: &mut String, source: &str) {
    if target.trim().is_empty() {
        *target = source.to_string();
    }
}
