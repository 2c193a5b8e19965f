//! The execution facade: role lookup, validation, context assembly, process
//! execution and result classification behind one call.

use super::context::{ExecutionContext, LinkedDocument};
use super::result::{ExecutionResult, FailureKind};
use crate::config::{EngineConfig, FallbackPolicy, HostEnvironment};
use crate::enforce::{FileOperation, ToolGroupEnforcer};
use crate::process::{
    ActiveTask, LaunchOptions, ProcessError, ProcessExecutor, ProcessOutcome, filter_tools,
};
use crate::role::{RestrictionType, RoleDefinition, RoleManager, RoleValidator, ToolGroup};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::fmt::Write as _;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info, warn};
use uuid::Uuid;


/// Marks output produced without running the agent.
pub const SIMULATION_MARKER: &str = "[SIMULATION MODE]";

const CLI_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Facade failures that end an execution before or around the process layer.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("role '{0}' not found")]
    RoleNotFound(String),

    #[error("role '{role}' failed validation: {}", .errors.join("; "))]
    InvalidRole { role: String, errors: Vec<String> },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("execution panicked: {0}")]
    Panicked(String),
}

impl ExecutionError {
    /// Variant name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::RoleNotFound(_) => "RoleNotFound",
            ExecutionError::InvalidRole { .. } => "InvalidRole",
            ExecutionError::Process(e) => e.kind(),
            ExecutionError::Panicked(_) => "Panicked",
        }
    }

    /// Coarse class recorded on the failed result.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ExecutionError::RoleNotFound(_) => FailureKind::RoleNotFound,
            ExecutionError::InvalidRole { .. } => FailureKind::InvalidRole,
            ExecutionError::Process(e) if e.is_security_rejection() => FailureKind::Rejected,
            ExecutionError::Process(ProcessError::Timeout(_)) => FailureKind::Timeout,
            ExecutionError::Process(ProcessError::Killed(_)) => FailureKind::Killed,
            ExecutionError::Process(_) => FailureKind::Agent,
            ExecutionError::Panicked(_) => FailureKind::Panicked,
        }
    }
}

/// Facade behavior that comes from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub fallback: FallbackPolicy,
    pub treat_violations_as_fatal: bool,
    /// Character budget for the role preamble.
    pub preamble_limit: Option<usize>,
    /// Tool names requested on top of those the role's groups unlock.
    pub extra_tools: Vec<String>,
}

impl ExecutorSettings {
    pub fn from_config(config: &EngineConfig, host: &HostEnvironment) -> Self {
        Self {
            fallback: config.fallback,
            treat_violations_as_fatal: config.treat_violations_as_fatal,
            preamble_limit: Some(config.prompt_limit(host)),
            extra_tools: config.extra_tools.clone(),
        }
    }
}

/// One call to [`RoleExecutor::execute_task`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub role_name: String,
    pub task_prompt: String,
    /// Generated when absent.
    pub task_id: Option<String>,
    pub linked_documents: Vec<LinkedDocument>,
    pub project_context: Option<String>,
    pub parent_context: Option<String>,
    pub dry_run: bool,
}

impl ExecutionRequest {
    pub fn new(role_name: impl Into<String>, task_prompt: impl Into<String>) -> Self {
        Self {
            role_name: role_name.into(),
            task_prompt: task_prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_documents(mut self, documents: Vec<LinkedDocument>) -> Self {
        self.linked_documents = documents;
        self
    }

    pub fn with_project_context(mut self, context: impl Into<String>) -> Self {
        self.project_context = Some(context.into());
        self
    }

    pub fn with_parent_context(mut self, context: impl Into<String>) -> Self {
        self.parent_context = Some(context.into());
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Coarse operational status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub active_executions: usize,
    pub active_tasks: Vec<ActiveTask>,
    pub known_roles: Vec<String>,
    pub fallback: FallbackPolicy,
    pub resource_limiter: &'static str,
}

/// Runs tasks under roles.
///
/// Every call to [`execute_task`](Self::execute_task) is independent; the
/// only shared state is the role table and the process table.
pub struct RoleExecutor {
    roles: Arc<RoleManager>,
    validator: RoleValidator,
    process: Arc<ProcessExecutor>,
    settings: ExecutorSettings,
}

impl RoleExecutor {
    pub fn new(
        roles: Arc<RoleManager>,
        validator: RoleValidator,
        process: Arc<ProcessExecutor>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            roles,
            validator,
            process,
            settings,
        }
    }

    pub fn roles(&self) -> &RoleManager {
        &self.roles
    }

    pub fn process(&self) -> &ProcessExecutor {
        &self.process
    }

    /// Execute a task and always produce a result.
    ///
    /// Panics inside the execution are caught and reported as `failed`.
    pub async fn execute_task(&self, request: ExecutionRequest) -> ExecutionResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let task_id = request.task_id.clone().unwrap_or_else(new_task_id);

        let result = match AssertUnwindSafe(self.run(&request, &task_id))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let err = ExecutionError::Panicked(panic_message(payload.as_ref()));
                error!(task_id = %task_id, role = %request.role_name, error = %err, "execution panicked");
                failure(&request.role_name, &err)
            }
        };

        result
            .with_task_id(task_id)
            .with_started_at(started_at)
            .with_elapsed(clock.elapsed())
    }

    async fn run(&self, request: &ExecutionRequest, task_id: &str) -> ExecutionResult {
        let Some(role) = self.roles.get_role(&request.role_name) else {
            let err = ExecutionError::RoleNotFound(request.role_name.clone());
            warn!(task_id = task_id, error = %err, "cannot execute task");
            return failure(&request.role_name, &err);
        };

        let report = self.validator.validate_role(&role).await;
        for warning in &report.warnings {
            debug!(role = %role.name, warning = %warning, "role validation warning");
        }
        if !report.is_valid {
            let err = ExecutionError::InvalidRole {
                role: role.name.clone(),
                errors: report.errors,
            };
            warn!(task_id = task_id, error = %err, "cannot execute task");
            return failure(&role.name, &err);
        }

        let context = self.build_context(&role, request);
        if request.dry_run {
            info!(task_id = task_id, role = %role.name, "dry run; prompt rendered only");
            return ExecutionResult::completed(&role.name, context.render_prompt())
                .with_tool_groups(role.granted_groups());
        }

        let mut enforcer = ToolGroupEnforcer::new(Arc::clone(&role));
        let llm = self.validator.first_available_llm(&role).await;
        let launch = LaunchOptions {
            model: llm.as_ref().and_then(|id| id.claude_model()).map(str::to_string),
            tools: self.cli_tools(&role),
            timeout: role
                .restrictions
                .limit(RestrictionType::TimeLimit)
                .map(Duration::from_secs),
        };
        info!(
            task_id = task_id,
            role = %role.name,
            llm = ?llm,
            "executing task"
        );

        let result = match self
            .process
            .execute_task_with_claude(&context, task_id, &launch)
            .await
        {
            Ok(outcome) => classify(
                &role,
                outcome,
                &self.process.settings().project_root,
                &mut enforcer,
            ),
            Err(err) => self.handle_process_error(&role, task_id, err).await,
        };

        let result = result
            .with_llm(llm.map(|id| id.to_string()))
            .with_violations(enforcer.get_violations());
        if self.settings.treat_violations_as_fatal {
            result.restrict_if_violated()
        } else {
            result
        }
    }

    /// Preview the prompt a role would receive for a task of `task_type`.
    pub fn get_role_context(
        &self,
        role_name: &str,
        task_type: Option<&str>,
    ) -> Result<String, ExecutionError> {
        let role = self
            .roles
            .get_role(role_name)
            .ok_or_else(|| ExecutionError::RoleNotFound(role_name.to_string()))?;

        let placeholder = match task_type {
            Some(task_type) => format!("<{} task description>", task_type),
            None => "<task description>".to_string(),
        };
        let mut preview = self
            .build_context(&role, &ExecutionRequest::new(role_name, placeholder))
            .render_prompt();

        if let Some(task_type) = task_type
            && !role.task_types.is_empty()
            && !role
                .task_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(task_type))
        {
            let _ = write!(
                preview,
                "\nNote: role '{}' does not list '{}' among its task types ({}).\n",
                role.name,
                task_type,
                role.task_types.join(", ")
            );
        }
        Ok(preview)
    }

    /// Names of roles granting every group in `required`, optionally limited
    /// to those declaring `task_type`.
    pub fn list_suitable_roles(&self, required: &[ToolGroup], task_type: Option<&str>) -> Vec<String> {
        self.roles
            .all_roles()
            .into_iter()
            .filter(|role| required.iter().all(|group| role.has_tool_group(*group)))
            .filter(|role| {
                task_type.is_none_or(|wanted| {
                    role.task_types.iter().any(|t| t.eq_ignore_ascii_case(wanted))
                })
            })
            .map(|role| role.name.clone())
            .collect()
    }

    pub fn get_execution_summary(&self) -> ExecutionSummary {
        let active_tasks = self.process.get_active_tasks();
        ExecutionSummary {
            active_executions: active_tasks.len(),
            active_tasks,
            known_roles: self.roles.list_roles(),
            fallback: self.settings.fallback,
            resource_limiter: self.process.limiter().name(),
        }
    }

    /// Kill a running execution by task id.
    pub fn kill_task(&self, task_id: &str) -> bool {
        self.process.kill_task(task_id)
    }

    fn build_context(&self, role: &Arc<RoleDefinition>, request: &ExecutionRequest) -> ExecutionContext {
        let context = ExecutionContext::new(Arc::clone(role), request.task_prompt.clone())
            .with_documents(request.linked_documents.clone())
            .with_project_context(request.project_context.clone())
            .with_parent_context(request.parent_context.clone());
        match self.settings.preamble_limit {
            Some(limit) => context.with_preamble_limit(limit),
            None => context,
        }
    }

    fn cli_tools(&self, role: &RoleDefinition) -> Vec<String> {
        let requested: Vec<&str> = role
            .granted_groups()
            .iter()
            .flat_map(|group| group.cli_tools().iter().copied())
            .chain(self.settings.extra_tools.iter().map(String::as_str))
            .collect();
        filter_tools(&requested)
    }

    async fn handle_process_error(
        &self,
        role: &RoleDefinition,
        task_id: &str,
        err: ProcessError,
    ) -> ExecutionResult {
        if err.is_security_rejection() {
            warn!(task_id = task_id, role = %role.name, error = %err, "execution rejected before spawn");
            return failure(&role.name, &err.into());
        }
        match &err {
            ProcessError::Timeout(_) => {
                return ExecutionResult::timed_out(&role.name, err.to_string())
                    .with_tool_groups(role.granted_groups());
            }
            ProcessError::Killed(_) => return failure(&role.name, &err.into()),
            _ => {}
        }

        let err = ExecutionError::Process(err);
        let probe = probe_cli(&self.process.settings().binary).await;
        match self.settings.fallback {
            FallbackPolicy::Simulate => {
                error!(
                    task_id = task_id,
                    role = %role.name,
                    error_kind = err.kind(),
                    error = %err,
                    cli_probe = %probe,
                    "agent CLI unavailable; returning simulated result"
                );
                ExecutionResult::completed(&role.name, simulation_output(role, &err))
                    .with_tool_groups(role.granted_groups())
            }
            FallbackPolicy::Fail => {
                error!(
                    task_id = task_id,
                    role = %role.name,
                    error_kind = err.kind(),
                    error = %err,
                    cli_probe = %probe,
                    "agent CLI unavailable"
                );
                failure(&role.name, &err)
            }
        }
    }
}

fn failure(role_name: &str, err: &ExecutionError) -> ExecutionResult {
    ExecutionResult::failed(role_name, format!("{}: {}", err.kind(), err))
        .with_failure_kind(err.failure_kind())
}

/// Turn a finished process into a result, auditing reported file changes.
fn classify(
    role: &RoleDefinition,
    outcome: ProcessOutcome,
    project_root: &Path,
    enforcer: &mut ToolGroupEnforcer,
) -> ExecutionResult {
    let canonical_root = project_root.canonicalize().ok();
    for path in &outcome.files_modified {
        let path = relative_to_root(path, project_root, canonical_root.as_deref());
        enforcer.check_file_operation(FileOperation::Write, &path);
    }

    let result = match outcome.error_message() {
        None => ExecutionResult::completed(&role.name, outcome.output),
        Some(message) => ExecutionResult::failed(&role.name, message).with_output(outcome.output),
    };
    result
        .with_tool_groups(role.granted_groups())
        .with_files_modified(outcome.files_modified)
}

/// Absolute paths inside the project root become root-relative; anything
/// else is returned untouched for the enforcer to judge.
fn relative_to_root(path: &str, root: &Path, canonical_root: Option<&Path>) -> String {
    let candidate = Path::new(path);
    if !candidate.is_absolute() {
        return path.to_string();
    }
    std::iter::once(root)
        .chain(canonical_root)
        .find_map(|base| candidate.strip_prefix(base).ok())
        .map(|rel| rel.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

fn simulation_output(role: &RoleDefinition, err: &ExecutionError) -> String {
    let mut out = format!(
        "{} The agent CLI could not be run ({}); nothing was executed.\n",
        SIMULATION_MARKER, err
    );
    let _ = writeln!(out, "Role: {} ({})", role.title(), role.name);

    let groups: Vec<&str> = role.granted_groups().iter().map(|g| g.as_str()).collect();
    if groups.is_empty() {
        out.push_str("Tool groups: none\n");
    } else {
        let _ = writeln!(out, "Tool groups: {}", groups.join(", "));
    }

    let restrictions = role.restrictions.descriptions();
    if restrictions.is_empty() {
        out.push_str("Restrictions: none\n");
    } else {
        out.push_str("Restrictions:\n");
        for restriction in restrictions {
            let _ = writeln!(out, "- {}", restriction);
        }
    }
    out
}

/// Whether the CLI binary answers `--version`, for fallback diagnostics.
async fn probe_cli(binary: &str) -> String {
    let probe = Command::new(binary)
        .arg("--version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();
    match tokio::time::timeout(CLI_PROBE_TIMEOUT, probe).await {
        Err(_) => format!("no response within {}s", CLI_PROBE_TIMEOUT.as_secs()),
        Ok(Err(e)) => format!("not runnable: {}", e),
        Ok(Ok(output)) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout);
            format!("responds: {}", version.lines().next().unwrap_or("").trim())
        }
        Ok(Ok(output)) => match output.status.code() {
            Some(code) => format!("--version exited with code {}", code),
            None => "--version terminated by a signal".to_string(),
        },
    }
}

fn new_task_id() -> String {
    format!("exec-{}", Uuid::new_v4().simple())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
