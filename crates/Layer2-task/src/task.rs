//! Task definition and types

use crate::process::{CommandSpec, ProcessHandle};
use crate::state::TaskState;
use chrono::{DateTime, Utc};
use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new random TaskId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// One supervised run of an external command
#[derive(Debug)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,

    /// Job class used for mutual exclusion
    pub category: String,

    /// What was launched
    pub command: CommandSpec,

    /// Current state
    pub state: TaskState,

    /// Combined stdout/stderr, append-only
    output: Vec<u8>,

    /// Set together with `ended_at` on the terminal transition
    pub exit_code: Option<i32>,

    pub started_at: DateTime<Utc>,

    pub ended_at: Option<DateTime<Utc>>,

    /// Wait between the graceful and the forceful signal
    pub grace_period: Duration,

    /// Kept for diagnostics after the handle is released
    pid: u32,

    /// Live process; released once reaped
    process: Option<ProcessHandle>,

    /// Mirrors `state.is_terminal()` for readers that cannot take the task lock
    finished: Arc<AtomicBool>,
}

impl Task {
    /// Create a running task around a freshly launched process
    pub fn new(
        id: TaskId,
        category: impl Into<String>,
        command: CommandSpec,
        process: ProcessHandle,
        grace_period: Duration,
    ) -> Self {
        Self {
            id,
            category: category.into(),
            command,
            state: TaskState::Running,
            output: Vec::new(),
            exit_code: None,
            started_at: Utc::now(),
            ended_at: None,
            grace_period,
            pid: process.pid(),
            process: Some(process),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Whether a process handle is still held
    pub fn has_process(&self) -> bool {
        self.process.is_some()
    }

    /// Shared flag set once the task reaches a terminal state
    pub(crate) fn finished_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.finished)
    }

    /// Pull available output into the buffer; no-op once terminal
    pub fn drain(&mut self, limit: Option<usize>) -> usize {
        if self.state.is_terminal() {
            return 0;
        }
        match self.process.as_mut() {
            Some(process) => process.output_mut().drain(&mut self.output, limit),
            None => 0,
        }
    }

    /// Non-blocking exit check. `Ok(None)` while alive.
    pub fn try_exit(&mut self) -> std::io::Result<Option<ExitStatus>> {
        match self.process.as_mut() {
            Some(process) => process.try_exit(),
            None => Err(std::io::Error::other("process handle already released")),
        }
    }

    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        match self.process.as_mut() {
            Some(process) => process.wait().await,
            None => Err(std::io::Error::other("process handle already released")),
        }
    }

    /// Signal the task's process group; `Ok(false)` if it is already gone
    pub fn signal(&self, signal: Signal) -> nix::Result<bool> {
        match self.process.as_ref() {
            Some(process) => process.signal_group(signal),
            None => Ok(false),
        }
    }

    /// Whether the leader or any descendant in its group is still around
    pub fn group_alive(&self) -> bool {
        self.process.as_ref().is_some_and(ProcessHandle::group_alive)
    }

    /// Move into a terminal state.
    ///
    /// The process must already be reaped. Flushes the remaining output,
    /// appends `marker`, stamps `exit_code`/`ended_at` and releases the
    /// handle. Returns false, changing nothing, if already terminal.
    pub fn finish(&mut self, state: TaskState, exit_code: i32, marker: Option<&str>) -> bool {
        if !self.state.can_transition_to(state) {
            return false;
        }

        self.drain(None);
        if let Some(marker) = marker {
            self.output.extend_from_slice(marker.as_bytes());
        }

        self.exit_code = Some(exit_code);
        self.ended_at = Some(Utc::now());
        self.state = state;
        self.process = None;
        self.finished.store(true, Ordering::Release);
        true
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            category: self.category.clone(),
            state: self.state,
            output: self.output_text(),
            exit_code: self.exit_code,
            exit_success: self
                .state
                .is_terminal()
                .then(|| self.state == TaskState::Completed),
            pid: self.pid,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}

/// Read-only view handed to polling callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub category: String,
    pub state: TaskState,

    /// Everything the process wrote so far, in order
    pub output: String,

    pub exit_code: Option<i32>,

    /// Present only in terminal states
    pub exit_success: Option<bool>,

    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TaskSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::launch;

    #[test]
    fn test_task_id_display_and_parse() {
        let id = TaskId::new();
        assert_eq!(id.to_string().len(), 8);

        let parsed: TaskId = id.as_uuid().to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[tokio::test]
    async fn test_finish_is_exactly_once() {
        let spec = CommandSpec::shell("echo done");
        let process = launch(&spec).unwrap();
        let mut task = Task::new(TaskId::new(), "generation", spec, process, Duration::from_secs(3));

        let finished = task.finished_flag();
        assert!(task.is_running());
        assert!(!finished.load(Ordering::Acquire));
        assert!(task.snapshot().exit_success.is_none());

        let status = task.wait().await.unwrap();
        assert!(task.finish(TaskState::Completed, status.code().unwrap_or(-1), None));
        assert!(!task.has_process());
        assert!(finished.load(Ordering::Acquire));
        assert!(!task.group_alive());
        assert_eq!(task.output_text(), "done\n");

        let ended_at = task.ended_at;
        assert!(!task.finish(TaskState::Cancelled, 137, Some("marker")));
        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(task.ended_at, ended_at);
        assert_eq!(task.output_text(), "done\n");

        let snapshot = task.snapshot();
        assert_eq!(snapshot.exit_code, Some(0));
        assert_eq!(snapshot.exit_success, Some(true));
    }

    #[tokio::test]
    async fn test_snapshot_serializes_camel_case() {
        let spec = CommandSpec::shell("exit 4");
        let process = launch(&spec).unwrap();
        let mut task = Task::new(TaskId::new(), "training", spec, process, Duration::from_secs(5));
        let status = task.wait().await.unwrap();
        task.finish(TaskState::Failed, status.code().unwrap_or(-1), None);

        let json = serde_json::to_value(task.snapshot()).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["exitCode"], 4);
        assert_eq!(json["exitSuccess"], false);
    }
}
