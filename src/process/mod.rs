//! Agent subprocess lifecycle.
//!
//! One external CLI process per execution:
//!
//! ```text
//! SPAWNING -> EXECUTING -> PROCESSING -> COMPLETED | FAILED
//!                  \
//!                   -> TIMEOUT
//! ```
//!
//! Everything the caller controls (task id, project root, working directory,
//! tool names) is validated before anything is spawned, and the command line
//! is always an argument vector. Role and task text travel over stdin only.

mod command;
mod executor;
mod limits;
mod preflight;
mod stream;

pub use command::{build_command_args, sanitize_model};
pub use executor::{ActiveTask, LaunchOptions, ProcessExecutor, ProcessOutcome, ProcessSettings};
pub use limits::{ResourceLimiter, TimeoutOnlyLimiter, limiter_for};
#[cfg(unix)]
pub use limits::RlimitLimiter;
pub use preflight::{
    ALLOWED_TOOLS, MAX_TASK_ID_LEN, filter_tools, resolve_working_dir, validate_project_root,
    validate_task_id,
};
pub use stream::{extract_modified_files, parse_stream_json};

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of the process layer.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("invalid task id '{0}': expected 1-64 letters, digits, '_' or '-'")]
    InvalidTaskId(String),

    #[error("invalid project root '{}': {reason}", .path.display())]
    InvalidProjectRoot { path: PathBuf, reason: String },

    #[error("working directory '{}' is outside the project root '{}'", .path.display(), .root.display())]
    WorkingDirEscape { path: PathBuf, root: PathBuf },

    #[error("working directory '{}' does not exist", .0.display())]
    WorkingDirMissing(PathBuf),

    #[error("task '{0}' is already running")]
    DuplicateTask(String),

    #[error("failed to spawn '{binary}': {message}")]
    SpawnFailed { binary: String, message: String },

    #[error("I/O error while exchanging data with the agent process: {0}")]
    Io(#[from] std::io::Error),

    #[error("agent process timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("agent process for task '{0}' was killed")]
    Killed(String),
}

impl ProcessError {
    /// Variant name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessError::InvalidTaskId(_) => "InvalidTaskId",
            ProcessError::InvalidProjectRoot { .. } => "InvalidProjectRoot",
            ProcessError::WorkingDirEscape { .. } => "WorkingDirEscape",
            ProcessError::WorkingDirMissing(_) => "WorkingDirMissing",
            ProcessError::DuplicateTask(_) => "DuplicateTask",
            ProcessError::SpawnFailed { .. } => "SpawnFailed",
            ProcessError::Io(_) => "Io",
            ProcessError::Timeout(_) => "Timeout",
            ProcessError::Killed(_) => "Killed",
        }
    }

    /// Input or security rejections raised before anything was spawned.
    ///
    /// These are never retried and never trigger the simulation fallback.
    pub fn is_security_rejection(&self) -> bool {
        matches!(
            self,
            ProcessError::InvalidTaskId(_)
                | ProcessError::InvalidProjectRoot { .. }
                | ProcessError::WorkingDirEscape { .. }
                | ProcessError::WorkingDirMissing(_)
                | ProcessError::DuplicateTask(_)
        )
    }
}

/// Coarse execution phase, published for operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Spawning,
    Executing,
    Processing,
    Completed,
    Failed,
    TimedOut,
}

impl fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProgressPhase::Spawning => "spawning",
            ProgressPhase::Executing => "executing",
            ProgressPhase::Processing => "processing",
            ProgressPhase::Completed => "completed",
            ProgressPhase::Failed => "failed",
            ProgressPhase::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// A phase transition of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub task_id: String,
    pub phase: ProgressPhase,
    pub at: DateTime<Utc>,
}
