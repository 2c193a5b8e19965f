//! CLI argument parsing for troupe.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Troupe: run coding agents under named roles.
///
/// A role bundles tool-group grants, restrictions and LLM preferences.
/// Roles come from built-in defaults, a global directory, and
/// `.troupe/roles/` inside the project.
#[derive(Parser, Debug)]
#[command(name = "troupe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project root (defaults to the current directory).
    #[arg(long, global = true, value_name = "DIR")]
    pub project: Option<PathBuf>,

    /// Enable debug logging (overridden by TROUPE_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for troupe.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a task under a role.
    ///
    /// Renders the role and task into a prompt, runs the agent CLI with the
    /// role's tools, and reports the result.
    Run(RunArgs),

    /// Inspect, validate and create roles.
    Roles(RolesCommand),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Role to execute under.
    pub role: String,

    /// Task prompt.
    #[arg(required_unless_present = "prompt_file", conflicts_with = "prompt_file")]
    pub prompt: Option<String>,

    /// Read the task prompt from a file.
    #[arg(long, value_name = "FILE")]
    pub prompt_file: Option<PathBuf>,

    /// Reference document to include (repeatable).
    #[arg(long = "doc", value_name = "FILE")]
    pub docs: Vec<PathBuf>,

    /// File with project-level context.
    #[arg(long, value_name = "FILE")]
    pub project_context_file: Option<PathBuf>,

    /// File with context from the parent task.
    #[arg(long, value_name = "FILE")]
    pub parent_context_file: Option<PathBuf>,

    /// Task id (letters, digits, '_' and '-'); generated if omitted.
    #[arg(long)]
    pub task_id: Option<String>,

    /// Print the prompt that would be sent, without running anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct RolesCommand {
    #[command(subcommand)]
    pub action: RolesAction,
}

#[derive(Subcommand, Debug)]
pub enum RolesAction {
    /// List known roles.
    List(RolesListArgs),

    /// Print a resolved role as YAML.
    Show(RoleNameArgs),

    /// Validate one role, or all of them.
    ///
    /// Reports errors, warnings and LLM alternatives. Exits non-zero when
    /// any role or role file is invalid.
    Validate(RolesValidateArgs),

    /// Preview the prompt a role would receive.
    Context(RolesContextArgs),

    /// Register roles from a YAML file.
    Create(RolesCreateArgs),
}

#[derive(Parser, Debug)]
pub struct RolesListArgs {
    /// Only roles that declare this task type.
    #[arg(long)]
    pub task_type: Option<String>,

    /// Only roles granting these tool groups (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub tool_group: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct RoleNameArgs {
    pub name: String,
}

#[derive(Parser, Debug)]
pub struct RolesValidateArgs {
    /// Role to validate; all roles when omitted.
    pub name: Option<String>,
}

#[derive(Parser, Debug)]
pub struct RolesContextArgs {
    pub name: String,

    #[arg(long)]
    pub task_type: Option<String>,
}

#[derive(Parser, Debug)]
pub struct RolesCreateArgs {
    /// YAML file with one or more role definitions.
    pub file: PathBuf,

    /// Register for this invocation only; do not write to .troupe/roles/.
    #[arg(long)]
    pub no_save: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_minimal() {
        let cli = Cli::try_parse_from(["troupe", "run", "coder", "Add a parser"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("Expected Run command");
        };
        assert_eq!(args.role, "coder");
        assert_eq!(args.prompt.as_deref(), Some("Add a parser"));
        assert!(args.docs.is_empty());
        assert!(!args.dry_run);
        assert!(cli.project.is_none());
    }

    #[test]
    fn test_parse_run_full() {
        let cli = Cli::try_parse_from([
            "troupe",
            "run",
            "reviewer",
            "--prompt-file",
            "task.md",
            "--doc",
            "a.md",
            "--doc",
            "b.md",
            "--task-id",
            "review-7",
            "--dry-run",
            "--json",
            "--project",
            "/work",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.project, Some(PathBuf::from("/work")));
        assert!(cli.verbose);
        let Command::Run(args) = cli.command else {
            panic!("Expected Run command");
        };
        assert!(args.prompt.is_none());
        assert_eq!(args.prompt_file, Some(PathBuf::from("task.md")));
        assert_eq!(args.docs, vec![PathBuf::from("a.md"), PathBuf::from("b.md")]);
        assert_eq!(args.task_id.as_deref(), Some("review-7"));
        assert!(args.dry_run && args.json);
    }

    #[test]
    fn test_run_requires_a_prompt() {
        assert!(Cli::try_parse_from(["troupe", "run", "coder"]).is_err());
        assert!(
            Cli::try_parse_from(["troupe", "run", "coder", "x", "--prompt-file", "t.md"]).is_err()
        );
    }

    #[test]
    fn test_parse_roles_list_filters() {
        let cli = Cli::try_parse_from([
            "troupe",
            "roles",
            "list",
            "--task-type",
            "review",
            "--tool-group",
            "read,edit",
        ])
        .unwrap();
        let Command::Roles(RolesCommand {
            action: RolesAction::List(args),
        }) = cli.command
        else {
            panic!("Expected roles list");
        };
        assert_eq!(args.task_type.as_deref(), Some("review"));
        assert_eq!(args.tool_group, vec!["read", "edit"]);
    }

    #[test]
    fn test_parse_roles_validate_without_name() {
        let cli = Cli::try_parse_from(["troupe", "roles", "validate"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Roles(RolesCommand {
                action: RolesAction::Validate(RolesValidateArgs { name: None })
            })
        ));
    }

    #[test]
    fn test_parse_roles_create_no_save() {
        let cli = Cli::try_parse_from(["troupe", "roles", "create", "roles.yaml", "--no-save"])
            .unwrap();
        let Command::Roles(RolesCommand {
            action: RolesAction::Create(args),
        }) = cli.command
        else {
            panic!("Expected roles create");
        };
        assert_eq!(args.file, PathBuf::from("roles.yaml"));
        assert!(args.no_save);
    }
}
