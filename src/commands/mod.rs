//! Command implementations for troupe.
//!
//! [`dispatch`] opens the workspace (project root, config, host detection)
//! and routes each CLI command to its handler.

mod roles;
mod run;

use crate::cli::{Cli, Command, RolesAction, RolesCommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use troupe::config::{EngineConfig, HostEnvironment};
use troupe::error::{Result, TroupeError};
use troupe::execution::{ExecutorSettings, RoleExecutor};
use troupe::process::ProcessExecutor;
use troupe::role::{LoadReport, RoleManager, RoleValidator};

/// Dispatch a command to its implementation.
pub async fn dispatch(cli: Cli) -> Result<()> {
    let workspace = Workspace::open(cli.project.as_deref())?;
    match cli.command {
        Command::Run(args) => run::cmd_run(&workspace, args).await,
        Command::Roles(roles_cmd) => dispatch_roles(&workspace, roles_cmd).await,
    }
}

/// Dispatch roles subcommands.
async fn dispatch_roles(workspace: &Workspace, roles_cmd: RolesCommand) -> Result<()> {
    match roles_cmd.action {
        RolesAction::List(args) => roles::cmd_roles_list(workspace, args),
        RolesAction::Show(args) => roles::cmd_roles_show(workspace, args),
        RolesAction::Validate(args) => roles::cmd_roles_validate(workspace, args).await,
        RolesAction::Context(args) => roles::cmd_roles_context(workspace, args),
        RolesAction::Create(args) => roles::cmd_roles_create(workspace, args),
    }
}

/// The project a command operates on.
pub(crate) struct Workspace {
    pub root: PathBuf,
    pub config: EngineConfig,
    pub host: HostEnvironment,
}

impl Workspace {
    fn open(project: Option<&Path>) -> Result<Self> {
        let root = match project {
            Some(path) => path.to_path_buf(),
            None => std::env::current_dir().map_err(|e| {
                TroupeError::UserError(format!("cannot determine current directory: {}", e))
            })?,
        };
        if !root.is_dir() {
            return Err(TroupeError::UserError(format!(
                "project root '{}' is not a directory",
                root.display()
            )));
        }

        let config = EngineConfig::load_for_project(&root)?;
        Ok(Self {
            root,
            config,
            host: HostEnvironment::detect(),
        })
    }

    /// Load roles from built-ins or the global directory, then the project.
    pub fn load_roles(&self) -> (RoleManager, LoadReport) {
        let manager = RoleManager::new(
            self.config.global_roles_dir.clone(),
            Some(self.config.project_roles_path(&self.root)),
        );
        let report = manager.load();
        for error in &report.errors {
            eprintln!("Warning: skipped {}", error);
        }
        (manager, report)
    }

    pub fn role_executor(&self, roles: RoleManager) -> RoleExecutor {
        let process = ProcessExecutor::from_config(&self.config, &self.root, &self.host);
        RoleExecutor::new(
            Arc::new(roles),
            RoleValidator::with_ollama(),
            Arc::new(process),
            ExecutorSettings::from_config(&self.config, &self.host),
        )
    }
}

/// Read a UTF-8 file named on the command line.
pub(crate) fn read_text(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        TroupeError::UserError(format!("cannot read {} '{}': {}", what, path.display(), e))
    })
}

/// Error for an unknown role name, listing the known ones.
pub(crate) fn unknown_role(name: &str, manager: &RoleManager) -> TroupeError {
    TroupeError::UserError(format!(
        "role '{}' not found.\n\nKnown roles: {}\n\nUse `troupe roles list` for details.",
        name,
        manager.list_roles().join(", ")
    ))
}
