//! Implementation of the `troupe run` command.

use super::{Workspace, read_text, unknown_role};
use crate::cli::RunArgs;
use troupe::error::{Result, TroupeError};
use troupe::execution::{
    ExecutionRequest, ExecutionResult, ExecutionStatus, FailureKind, LinkedDocument,
};

/// Execute the `troupe run` command.
///
/// Builds an execution request from the arguments, runs it under the role,
/// prints the result and maps its status to an exit code.
pub async fn cmd_run(workspace: &Workspace, args: RunArgs) -> Result<()> {
    let prompt = match (&args.prompt, &args.prompt_file) {
        (Some(prompt), _) => prompt.clone(),
        (None, Some(path)) => read_text(path, "prompt file")?,
        (None, None) => {
            return Err(TroupeError::UserError(
                "a task prompt or --prompt-file is required".to_string(),
            ));
        }
    };
    if prompt.trim().is_empty() {
        return Err(TroupeError::UserError("task prompt is empty".to_string()));
    }

    let documents = args
        .docs
        .iter()
        .map(|path| {
            LinkedDocument::from_file(path).map_err(|e| {
                TroupeError::UserError(format!("cannot read document '{}': {}", path.display(), e))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let (roles, _) = workspace.load_roles();
    if roles.get_role(&args.role).is_none() {
        return Err(unknown_role(&args.role, &roles));
    }

    let mut request = ExecutionRequest::new(&args.role, prompt)
        .with_documents(documents)
        .dry_run(args.dry_run);
    if let Some(task_id) = args.task_id {
        request = request.with_task_id(task_id);
    }
    if let Some(path) = &args.project_context_file {
        request = request.with_project_context(read_text(path, "project context file")?);
    }
    if let Some(path) = &args.parent_context_file {
        request = request.with_parent_context(read_text(path, "parent context file")?);
    }

    let executor = workspace.role_executor(roles);
    let result = executor.execute_task(request).await;

    if args.json {
        let json = serde_json::to_string_pretty(&result).map_err(|e| {
            TroupeError::ExecutionFailed(format!("cannot serialize result: {}", e))
        })?;
        println!("{}", json);
    } else if args.dry_run && result.is_success() {
        println!("{}", result.output);
    } else {
        print_result(&result);
    }

    status_error(&result).map_or(Ok(()), Err)
}

fn print_result(result: &ExecutionResult) {
    println!("Status:     {}", result.status);
    println!("Role:       {}", result.role_name);
    if let Some(task_id) = &result.task_id {
        println!("Task:       {}", task_id);
    }
    println!("Elapsed:    {:.2}s", result.execution_time);
    if let Some(llm) = &result.llm_used {
        println!("LLM:        {}", llm);
    }
    if !result.tool_groups_used.is_empty() {
        let groups: Vec<&str> = result.tool_groups_used.iter().map(|g| g.as_str()).collect();
        println!("Tools:      {}", groups.join(", "));
    }

    if !result.files_modified.is_empty() {
        println!();
        println!("Files modified:");
        for path in &result.files_modified {
            println!("  - {}", path);
        }
    }
    if !result.restrictions_violated.is_empty() {
        println!();
        println!("Restriction violations:");
        for violation in &result.restrictions_violated {
            println!("  - {}", violation);
        }
    }
    if let Some(error) = &result.error_message {
        println!();
        println!("Error: {}", error);
    }
    if !result.output.trim().is_empty() {
        println!();
        println!("{}", result.output.trim_end());
    }
}

/// The CLI error a non-successful result maps to.
fn status_error(result: &ExecutionResult) -> Option<TroupeError> {
    let message = result.error_message.clone().unwrap_or_default();
    match result.status {
        ExecutionStatus::Completed | ExecutionStatus::Pending | ExecutionStatus::Running => None,
        ExecutionStatus::Timeout => Some(TroupeError::Timeout(message)),
        ExecutionStatus::Restricted => Some(TroupeError::ExecutionFailed(format!(
            "{} restriction violation(s)",
            result.restrictions_violated.len()
        ))),
        ExecutionStatus::Failed => Some(match result.failure_kind {
            Some(FailureKind::RoleNotFound) => TroupeError::UserError(message),
            Some(FailureKind::InvalidRole | FailureKind::Rejected) => {
                TroupeError::ValidationError(message)
            }
            Some(FailureKind::Timeout) => TroupeError::Timeout(message),
            _ => TroupeError::ExecutionFailed(message),
        }),
    }
}
