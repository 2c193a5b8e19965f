//! The outcome of an execution.

use crate::role::ToolGroup;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Completed, but with violations the caller treats as fatal.
    Restricted,
    Timeout,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Restricted => "restricted",
            ExecutionStatus::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Why an execution did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RoleNotFound,
    InvalidRole,
    /// Refused before anything was spawned (bad task id, paths, duplicate id).
    Rejected,
    Timeout,
    Killed,
    /// The agent could not be run, or exited unsuccessfully.
    Agent,
    Panicked,
}

/// What an execution produced.
///
/// Built through the constructors so that `failed`/`timeout` always carry an
/// error message and `restricted` always carries violations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub output: String,
    pub role_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Wall-clock seconds, recorded on every path.
    pub execution_time: f64,
    pub tool_groups_used: Vec<ToolGroup>,
    pub restrictions_violated: Vec<String>,
    pub files_modified: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_used: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl ExecutionResult {
    fn with_status(status: ExecutionStatus, role_name: &str, output: String) -> Self {
        Self {
            status,
            output,
            role_name: role_name.to_string(),
            task_id: None,
            execution_time: 0.0,
            tool_groups_used: Vec::new(),
            restrictions_violated: Vec::new(),
            files_modified: Vec::new(),
            error_message: None,
            failure_kind: None,
            llm_used: None,
            started_at: Utc::now(),
        }
    }

    pub fn completed(role_name: &str, output: impl Into<String>) -> Self {
        Self::with_status(ExecutionStatus::Completed, role_name, output.into())
    }

    pub fn failed(role_name: &str, error: impl Into<String>) -> Self {
        let mut result = Self::with_status(ExecutionStatus::Failed, role_name, String::new());
        result.error_message = Some(error.into());
        result.failure_kind = Some(FailureKind::Agent);
        result
    }

    pub fn timed_out(role_name: &str, error: impl Into<String>) -> Self {
        let mut result = Self::with_status(ExecutionStatus::Timeout, role_name, String::new());
        result.error_message = Some(error.into());
        result.failure_kind = Some(FailureKind::Timeout);
        result
    }

    pub fn with_failure_kind(mut self, kind: FailureKind) -> Self {
        self.failure_kind = Some(kind);
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.execution_time = elapsed.as_secs_f64().max(0.0);
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_tool_groups(mut self, groups: Vec<ToolGroup>) -> Self {
        self.tool_groups_used = groups;
        self
    }

    pub fn with_files_modified(mut self, files: Vec<String>) -> Self {
        self.files_modified = files;
        self
    }

    pub fn with_llm(mut self, llm: Option<String>) -> Self {
        self.llm_used = llm;
        self
    }

    /// Attach violations. Status is left alone.
    pub fn with_violations(mut self, violations: Vec<String>) -> Self {
        self.restrictions_violated.extend(violations);
        self
    }

    /// Turn a completed result that carries violations into `restricted`.
    pub fn restrict_if_violated(mut self) -> Self {
        if self.status == ExecutionStatus::Completed && !self.restrictions_violated.is_empty() {
            self.status = ExecutionStatus::Restricted;
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}
