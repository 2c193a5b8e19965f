//! Implementation of the `troupe roles` commands.
//!
//! This module provides:
//! - `roles list` - List roles, optionally filtered
//! - `roles show` - Print a resolved role as YAML
//! - `roles validate` - Validate roles and role files
//! - `roles context` - Preview the prompt a role receives
//! - `roles create` - Register roles from a YAML file

use super::{Workspace, read_text, unknown_role};
use crate::cli::{
    RoleNameArgs, RolesContextArgs, RolesCreateArgs, RolesListArgs, RolesValidateArgs,
};
use std::str::FromStr;
use troupe::error::{Result, TroupeError};
use troupe::role::validator::suggest_llm_alternatives;
use troupe::role::{RoleDefinition, RoleValidator, ToolGroup, parse_role_document};

/// Execute the `troupe roles list` command.
pub fn cmd_roles_list(workspace: &Workspace, args: RolesListArgs) -> Result<()> {
    let required = args
        .tool_group
        .iter()
        .map(|raw| ToolGroup::from_str(raw).map_err(|e| TroupeError::UserError(e.to_string())))
        .collect::<Result<Vec<_>>>()?;

    let (roles, report) = workspace.load_roles();
    let executor = workspace.role_executor(roles);
    let names = executor.list_suitable_roles(&required, args.task_type.as_deref());

    if names.is_empty() {
        println!("No matching roles.");
        return Ok(());
    }

    println!("Roles ({}):", names.len());
    if report.used_builtin_defaults {
        println!("(built-in defaults; set global_roles_dir to use your own)");
    }
    println!();
    for name in names {
        let Some(role) = executor.roles().get_role(&name) else {
            continue;
        };
        print_role_line(&role);
    }
    Ok(())
}

fn print_role_line(role: &RoleDefinition) {
    let groups: Vec<&str> = role.granted_groups().iter().map(|g| g.as_str()).collect();
    println!("  {}", role.name);
    if !role.description.trim().is_empty() {
        println!("    {}", role.description.trim());
    }
    println!(
        "    Tools:      {}",
        if groups.is_empty() { "none".to_string() } else { groups.join(", ") }
    );
    if !role.task_types.is_empty() {
        println!("    Task types: {}", role.task_types.join(", "));
    }
}

/// Execute the `troupe roles show` command.
pub fn cmd_roles_show(workspace: &Workspace, args: RoleNameArgs) -> Result<()> {
    let (roles, _) = workspace.load_roles();
    let role = roles
        .get_role(&args.name)
        .ok_or_else(|| unknown_role(&args.name, &roles))?;
    let yaml = role
        .to_yaml()
        .map_err(|e| TroupeError::UserError(format!("cannot render role '{}': {}", role.name, e)))?;
    print!("{}", yaml);
    Ok(())
}

/// Execute the `troupe roles validate` command.
///
/// Role files that failed to load count as invalid alongside roles that
/// fail validation.
pub async fn cmd_roles_validate(workspace: &Workspace, args: RolesValidateArgs) -> Result<()> {
    let (roles, report) = workspace.load_roles();
    let targets = match &args.name {
        Some(name) => vec![roles.get_role(name).ok_or_else(|| unknown_role(name, &roles))?],
        None => roles.all_roles(),
    };

    let validator = RoleValidator::with_ollama();
    let mut invalid = 0;
    for role in &targets {
        let result = validator.validate_role(role).await;
        if result.is_valid {
            println!("✓ {}", role.name);
        } else {
            invalid += 1;
            println!("✗ {}", role.name);
        }
        for error in &result.errors {
            println!("    error:   {}", error);
        }
        for warning in &result.warnings {
            println!("    warning: {}", warning);
        }
        if !result.is_valid {
            let suggestions = suggest_llm_alternatives(role);
            if !suggestions.is_empty() {
                println!("    try:     {}", suggestions.join(", "));
            }
        }
    }

    let load_errors = if args.name.is_none() { report.errors.len() } else { 0 };
    if invalid == 0 && load_errors == 0 {
        return Ok(());
    }
    Err(TroupeError::ValidationError(format!(
        "{} invalid role(s), {} role file error(s)",
        invalid, load_errors
    )))
}

/// Execute the `troupe roles context` command.
pub fn cmd_roles_context(workspace: &Workspace, args: RolesContextArgs) -> Result<()> {
    let (roles, _) = workspace.load_roles();
    if roles.get_role(&args.name).is_none() {
        return Err(unknown_role(&args.name, &roles));
    }
    let executor = workspace.role_executor(roles);
    let preview = executor
        .get_role_context(&args.name, args.task_type.as_deref())
        .map_err(|e| TroupeError::UserError(e.to_string()))?;
    print!("{}", preview);
    Ok(())
}

/// Execute the `troupe roles create` command.
///
/// Every role in the file is registered independently; a bad role does not
/// stop the others.
pub fn cmd_roles_create(workspace: &Workspace, args: RolesCreateArgs) -> Result<()> {
    let yaml = read_text(&args.file, "role file")?;
    let parsed = parse_role_document(&yaml)
        .map_err(|e| TroupeError::ValidationError(format!("{}: {}", args.file.display(), e)))?;
    if parsed.is_empty() {
        return Err(TroupeError::UserError(format!(
            "no roles found in '{}'",
            args.file.display()
        )));
    }

    let (roles, _) = workspace.load_roles();
    let save = !args.no_save;
    let mut failures = Vec::new();
    for entry in parsed {
        match entry {
            Ok(role) => {
                let name = role.name.clone();
                if roles.create_custom_role(role, save) {
                    if save {
                        println!(
                            "Created role '{}' in {}",
                            name,
                            workspace.config.project_roles_path(&workspace.root).display()
                        );
                    } else {
                        println!("Registered role '{}' (not saved)", name);
                    }
                } else {
                    failures.push(format!("role '{}' could not be created", name));
                }
            }
            Err(e) => failures.push(e.to_string()),
        }
    }

    if failures.is_empty() {
        return Ok(());
    }
    for failure in &failures {
        eprintln!("  - {}", failure);
    }
    Err(TroupeError::ValidationError(format!(
        "{} role(s) could not be created",
        failures.len()
    )))
}
