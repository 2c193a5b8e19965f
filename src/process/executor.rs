//! Spawning, feeding, timing out and reaping the agent CLI.

use super::command::build_command_args;
use super::limits::{ResourceLimiter, limiter_for};
use super::preflight::{
    filter_tools, resolve_working_dir, validate_project_root, validate_task_id,
};
use super::stream::{extract_modified_files, parse_stream_json};
use super::{ProcessError, ProgressEvent, ProgressPhase};
use crate::config::{EngineConfig, HostEnvironment};
use crate::execution::ExecutionContext;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};


const PROGRESS_CAPACITY: usize = 64;

/// Where and how the agent CLI runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSettings {
    pub binary: String,
    pub project_root: PathBuf,
    /// Working directory override, relative to the project root or absolute.
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub max_path_depth: usize,
}

impl ProcessSettings {
    pub fn new(binary: impl Into<String>, project_root: impl Into<PathBuf>) -> Self {
        let defaults = EngineConfig::default();
        Self {
            binary: binary.into(),
            project_root: project_root.into(),
            working_dir: None,
            timeout: Duration::from_secs(defaults.timeout_seconds),
            max_path_depth: defaults.max_path_depth,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Per-launch choices made by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Model for `--model`.
    pub model: Option<String>,
    /// Requested tools; filtered against the allow-list before use.
    pub tools: Vec<String>,
    /// Tighter timeout for this launch; never extends the configured one.
    pub timeout: Option<Duration>,
}

/// What came back from a process that ran to exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    /// Text extracted from the event stream.
    pub output: String,
    pub stderr: String,
    pub files_modified: Vec<String>,
    pub duration: Duration,
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Why the process failed, or `None` if it succeeded.
    pub fn error_message(&self) -> Option<String> {
        if self.is_success() {
            return None;
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return Some(stderr.to_string());
        }
        Some(match self.exit_code {
            Some(code) => format!("exited with code {}", code),
            None => "terminated by a signal".to_string(),
        })
    }
}

/// A task with a live process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTask {
    pub task_id: String,
    pub role_name: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

struct ActiveProcess {
    role_name: String,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    cancel: Option<oneshot::Sender<()>>,
}

type ProcessTable = Mutex<HashMap<String, ActiveProcess>>;

/// Removes a task from the process table when dropped, whatever the outcome.
struct ActiveGuard<'a> {
    table: &'a ProcessTable,
    task_id: String,
}

impl ActiveGuard<'_> {
    fn set_pid(&self, pid: Option<u32>) {
        if let Some(entry) = lock_table(self.table).get_mut(&self.task_id) {
            entry.pid = pid;
        }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        lock_table(self.table).remove(&self.task_id);
    }
}

fn lock_table(table: &ProcessTable) -> MutexGuard<'_, HashMap<String, ActiveProcess>> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum Ending {
    Finished(io::Result<(ExitStatus, Vec<u8>, Vec<u8>)>),
    TimedOut,
    Killed,
}

/// Runs the agent CLI, one process per task, and tracks live processes.
pub struct ProcessExecutor {
    settings: ProcessSettings,
    limiter: Arc<dyn ResourceLimiter>,
    active: ProcessTable,
    progress: broadcast::Sender<ProgressEvent>,
}

impl ProcessExecutor {
    pub fn new(settings: ProcessSettings, limiter: Arc<dyn ResourceLimiter>) -> Self {
        let (progress, _) = broadcast::channel(PROGRESS_CAPACITY);
        Self {
            settings,
            limiter,
            active: Mutex::new(HashMap::new()),
            progress,
        }
    }

    /// Build from engine config, with the timeout clamped for `host` and the
    /// limiter the platform supports.
    pub fn from_config(config: &EngineConfig, project_root: &Path, host: &HostEnvironment) -> Self {
        let limiter = limiter_for(&config.resource_limits);
        let timeout = config.effective_timeout(host, limiter.enforces_os_limits());
        if timeout.as_secs() < config.timeout_seconds {
            debug!(
                configured = config.timeout_seconds,
                effective = timeout.as_secs(),
                limiter = limiter.name(),
                "timeout clamped to host ceiling"
            );
        }
        let settings = ProcessSettings {
            binary: config.cli_binary.clone(),
            project_root: project_root.to_path_buf(),
            working_dir: config.working_dir.clone(),
            timeout,
            max_path_depth: config.max_path_depth,
        };
        Self::new(settings, limiter)
    }

    pub fn settings(&self) -> &ProcessSettings {
        &self.settings
    }

    pub fn limiter(&self) -> &dyn ResourceLimiter {
        self.limiter.as_ref()
    }

    /// Phase transitions of every task run by this executor.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    /// Run the agent CLI for `context` under `task_id`.
    ///
    /// Input problems are rejected before anything is spawned. A process
    /// that exits, with any code, yields `Ok`; timeouts and kills yield `Err`
    /// only after the process is dead.
    pub async fn execute_task_with_claude(
        &self,
        context: &ExecutionContext,
        task_id: &str,
        launch: &LaunchOptions,
    ) -> Result<ProcessOutcome, ProcessError> {
        validate_task_id(task_id)?;
        let root = validate_project_root(&self.settings.project_root, self.settings.max_path_depth)?;
        let work_dir = resolve_working_dir(&root, self.settings.working_dir.as_deref())?;
        let tools = filter_tools(&launch.tools);
        let add_dir = (work_dir != root).then_some(root.as_path());
        let args = build_command_args(&self.settings.binary, launch.model.as_deref(), &tools, add_dir);

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let guard = self.register(task_id, &context.role.name, cancel_tx)?;
        let prompt = context.render_prompt();

        let timeout = launch
            .timeout
            .map_or(self.settings.timeout, |t| t.min(self.settings.timeout));
        let result = self
            .run(&guard, &args, &work_dir, &prompt, timeout, cancel_rx)
            .await;
        let phase = match &result {
            Ok(outcome) if outcome.is_success() => ProgressPhase::Completed,
            Err(ProcessError::Timeout(_)) => ProgressPhase::TimedOut,
            _ => ProgressPhase::Failed,
        };
        self.emit(task_id, phase);
        drop(guard);
        result
    }

    /// Ask a running task's process to be killed.
    ///
    /// Returns `false` if the task is unknown or already being killed.
    pub fn kill_task(&self, task_id: &str) -> bool {
        let cancel = lock_table(&self.active)
            .get_mut(task_id)
            .and_then(|entry| entry.cancel.take());
        match cancel {
            Some(cancel) => {
                info!(task_id = task_id, "kill requested");
                cancel.send(()).is_ok()
            }
            None => false,
        }
    }

    /// Tasks with a live process, sorted by task id.
    pub fn get_active_tasks(&self) -> Vec<ActiveTask> {
        let mut tasks: Vec<ActiveTask> = lock_table(&self.active)
            .iter()
            .map(|(task_id, entry)| ActiveTask {
                task_id: task_id.clone(),
                role_name: entry.role_name.clone(),
                pid: entry.pid,
                started_at: entry.started_at,
            })
            .collect();
        tasks.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        tasks
    }

    pub fn active_count(&self) -> usize {
        lock_table(&self.active).len()
    }

    fn register(
        &self,
        task_id: &str,
        role_name: &str,
        cancel: oneshot::Sender<()>,
    ) -> Result<ActiveGuard<'_>, ProcessError> {
        let mut table = lock_table(&self.active);
        if table.contains_key(task_id) {
            return Err(ProcessError::DuplicateTask(task_id.to_string()));
        }
        table.insert(
            task_id.to_string(),
            ActiveProcess {
                role_name: role_name.to_string(),
                pid: None,
                started_at: Utc::now(),
                cancel: Some(cancel),
            },
        );
        Ok(ActiveGuard {
            table: &self.active,
            task_id: task_id.to_string(),
        })
    }

    async fn run(
        &self,
        guard: &ActiveGuard<'_>,
        args: &[String],
        work_dir: &Path,
        prompt: &str,
        timeout: Duration,
        mut cancel: oneshot::Receiver<()>,
    ) -> Result<ProcessOutcome, ProcessError> {
        let task_id = guard.task_id.as_str();
        let Some((program, rest)) = args.split_first() else {
            return Err(ProcessError::SpawnFailed {
                binary: String::new(),
                message: "empty command line".to_string(),
            });
        };

        self.emit(task_id, ProgressPhase::Spawning);
        let mut cmd = Command::new(program);
        cmd.args(rest)
            .current_dir(work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        self.limiter.apply(&mut cmd);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| ProcessError::SpawnFailed {
            binary: program.clone(),
            message: e.to_string(),
        })?;
        guard.set_pid(child.id());
        info!(
            task_id = task_id,
            pid = child.id(),
            limiter = self.limiter.name(),
            "agent process spawned"
        );

        self.emit(task_id, ProgressPhase::Executing);
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let ending = tokio::select! {
            finished = tokio::time::timeout(
                timeout,
                exchange(&mut child, stdin, stdout, stderr, prompt.as_bytes()),
            ) => match finished {
                Ok(result) => Ending::Finished(result),
                Err(_) => Ending::TimedOut,
            },
            Ok(()) = &mut cancel => Ending::Killed,
        };

        match ending {
            Ending::Finished(Ok((status, stdout, stderr))) => {
                self.emit(task_id, ProgressPhase::Processing);
                let raw = String::from_utf8_lossy(&stdout);
                let output = parse_stream_json(&raw);
                let files_modified = extract_modified_files(&output);
                let outcome = ProcessOutcome {
                    exit_code: status.code(),
                    output,
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                    files_modified,
                    duration: started.elapsed(),
                };
                info!(
                    task_id = task_id,
                    exit_code = ?outcome.exit_code,
                    elapsed_ms = outcome.duration.as_millis() as u64,
                    "agent process exited"
                );
                Ok(outcome)
            }
            Ending::Finished(Err(e)) => {
                warn!(task_id = task_id, error = %e, "I/O failure talking to agent process");
                terminate(&mut child, task_id).await;
                Err(ProcessError::Io(e))
            }
            Ending::TimedOut => {
                warn!(
                    task_id = task_id,
                    timeout_secs = timeout.as_secs(),
                    "agent process timed out"
                );
                terminate(&mut child, task_id).await;
                Err(ProcessError::Timeout(timeout))
            }
            Ending::Killed => {
                terminate(&mut child, task_id).await;
                Err(ProcessError::Killed(task_id.to_string()))
            }
        }
    }

    fn emit(&self, task_id: &str, phase: ProgressPhase) {
        info!(task_id = task_id, phase = %phase, "phase");
        // No subscribers is fine.
        let _ = self.progress.send(ProgressEvent {
            task_id: task_id.to_string(),
            phase,
            at: Utc::now(),
        });
    }
}

/// Write the prompt, close stdin, drain both output pipes, then reap.
async fn exchange(
    child: &mut Child,
    stdin: Option<ChildStdin>,
    stdout: Option<impl AsyncRead + Unpin>,
    stderr: Option<impl AsyncRead + Unpin>,
    prompt: &[u8],
) -> io::Result<(ExitStatus, Vec<u8>, Vec<u8>)> {
    let write = async move {
        if let Some(mut stdin) = stdin {
            match stdin.write_all(prompt).await {
                // The agent may exit without reading its input.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(e),
                Ok(()) => {}
            }
        }
        Ok(())
    };

    let (written, out, err) = tokio::join!(write, read_all(stdout), read_all(stderr));
    written?;
    let status = child.wait().await?;
    Ok((status, out?, err?))
}

async fn read_all(reader: Option<impl AsyncRead + Unpin>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Kill and reap. Failure is logged: the OS process may outlive us.
async fn terminate(child: &mut Child, task_id: &str) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    match child.kill().await {
        Ok(()) => debug!(task_id = task_id, "agent process killed"),
        Err(e) => error!(task_id = task_id, error = %e, "failed to kill agent process"),
    }
}
