//! Supervisor - lifecycle controller and status reporter
//!
//! Features:
//! - One running task per category, admission atomic with registration
//! - Caller-driven exit detection: every poll drains output, then checks exit
//! - Cancellation with SIGTERM -> grace period -> SIGKILL escalation
//! - Forceful teardown of everything still running on shutdown
//!
//! There is no background reaper. A task's state only moves when someone
//! calls `poll`, `status`, `cancel` or `shutdown`.

use crate::error::{SupervisorError, SupervisorResult};
use crate::process::{exit_code_of, launch, CommandSpec};
use crate::registry::TaskRegistry;
use crate::state::TaskState;
use crate::task::{Task, TaskId, TaskSnapshot};
use nix::sys::signal::Signal;
use overseer_foundation::SupervisorConfig;
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Background task supervisor
#[derive(Clone)]
pub struct Supervisor {
    registry: Arc<TaskRegistry>,
    config: Arc<SupervisorConfig>,
}

impl Supervisor {
    /// Create a supervisor with its own registry
    pub fn new(config: SupervisorConfig) -> Self {
        let registry = Arc::new(TaskRegistry::new(config.evict_superseded));
        Self::with_registry(config, registry)
    }

    /// Create a supervisor over an existing registry
    pub fn with_registry(config: SupervisorConfig, registry: Arc<TaskRegistry>) -> Self {
        Self {
            registry,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> Arc<TaskRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    // ========== Lifecycle ==========

    /// Launch `command` as the running task of `category`.
    ///
    /// The category's current task is polled first so one that already
    /// exited does not block the new start.
    pub async fn start(&self, category: &str, command: CommandSpec) -> SupervisorResult<TaskId> {
        if let Some(previous) = self.registry.latest_id(category).await {
            // may have been cleared concurrently
            let _ = self.poll(previous).await;
        }

        let grace_period = self.config.grace_period_for(category);
        let id = self
            .registry
            .register(category, |id| {
                let process = launch(&command)?;
                info!(
                    "Started task {} in '{}' (pid {}): {}",
                    id,
                    category,
                    process.pid(),
                    command.display()
                );
                Ok(Task::new(id, category, command.clone(), process, grace_period))
            })
            .await?;

        Ok(id)
    }

    /// Launch the command configured for `category`
    pub async fn start_configured(&self, category: &str) -> SupervisorResult<TaskId> {
        let command = self
            .config
            .category(category)
            .and_then(CommandSpec::from_category)
            .ok_or_else(|| SupervisorError::UnknownCategory(category.to_string()))?;
        self.start(category, command).await
    }

    /// Drain output, detect exit, and return the current snapshot
    pub async fn poll(&self, id: TaskId) -> SupervisorResult<TaskSnapshot> {
        let entry = self.registry.get(id).await?;
        let mut task = entry.lock().await;
        self.refresh(&mut task);
        Ok(task.snapshot())
    }

    /// Status for polling callers; always polls first
    pub async fn status(&self, id: TaskId) -> SupervisorResult<TaskSnapshot> {
        self.poll(id).await
    }

    /// Cancel a running task.
    ///
    /// A task that is already terminal (including one that exited just
    /// before this call) is returned unchanged. Otherwise the process group
    /// gets SIGTERM, then SIGKILL once the category's grace period expires,
    /// and the task ends `Cancelled` with the cancel marker appended.
    pub async fn cancel(&self, id: TaskId) -> SupervisorResult<TaskSnapshot> {
        let entry = self.registry.get(id).await?;
        let mut task = entry.lock().await;

        self.refresh(&mut task);
        if task.state.is_terminal() {
            debug!("Cancel of task {} ignored: already {}", id, task.state);
            return Ok(task.snapshot());
        }

        info!(
            "Cancelling task {} (pid {}), grace period {:.1}s",
            id,
            task.pid(),
            task.grace_period.as_secs_f64()
        );

        let status = self.terminate(&mut task).await;
        self.settle_cancelled(&mut task, status);
        Ok(task.snapshot())
    }

    /// Raw output bytes from `offset` on, as of the last poll.
    ///
    /// Lets streaming callers follow the output by byte position; the
    /// snapshot's text is lossily decoded and cannot be sliced reliably.
    pub async fn output_since(&self, id: TaskId, offset: usize) -> SupervisorResult<Vec<u8>> {
        let entry = self.registry.get(id).await?;
        let task = entry.lock().await;
        Ok(task
            .output()
            .get(offset..)
            .map(<[u8]>::to_vec)
            .unwrap_or_default())
    }

    /// Snapshot of the category's running task, if any (no polling)
    pub async fn active_task_for(&self, category: &str) -> Option<TaskSnapshot> {
        let entry = self.registry.active_task_for(category).await?;
        let task = entry.lock().await;
        Some(task.snapshot())
    }

    /// Cached snapshots of every registered task (no polling)
    pub async fn list(&self) -> Vec<TaskSnapshot> {
        let mut snapshots = Vec::new();
        for entry in self.registry.entries().await {
            snapshots.push(entry.lock().await.snapshot());
        }
        snapshots.sort_by_key(|s| s.started_at);
        snapshots
    }

    /// Forget a terminal task
    pub async fn clear(&self, id: TaskId) -> SupervisorResult<()> {
        self.registry.remove(id).await?;
        debug!("Cleared task {}", id);
        Ok(())
    }

    /// Forcefully cancel every running task; returns the ids cancelled
    pub async fn shutdown(&self) -> Vec<TaskId> {
        let mut cancelled = Vec::new();

        for entry in self.registry.entries().await {
            let mut task = entry.lock().await;
            self.refresh(&mut task);
            if task.state.is_terminal() {
                continue;
            }

            self.kill_group(&task);
            let status = match task.wait().await {
                Ok(status) => Some(status),
                Err(e) => {
                    error!("Failed to reap task {}: {}", task.id, e);
                    None
                }
            };
            self.settle_cancelled(&mut task, status);
            cancelled.push(task.id);
        }

        if !cancelled.is_empty() {
            warn!("Shutdown cancelled {} running tasks", cancelled.len());
        }
        cancelled
    }

    // ========== Internals ==========

    /// One discrete, idempotent check: drain, then look for exit
    fn refresh(&self, task: &mut Task) {
        if task.state.is_terminal() {
            return;
        }

        task.drain(self.config.drain_limit());

        match task.try_exit() {
            Ok(Some(status)) => {
                let code = exit_code_of(status);
                let state = if code == 0 {
                    TaskState::Completed
                } else {
                    TaskState::Failed
                };
                task.finish(state, code, None);
                info!("Task {} {} with exit code {}", task.id, state, code);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to check task {} for exit: {}", task.id, e);
                if !task.has_process() {
                    task.finish(TaskState::Failed, -1, None);
                }
            }
        }
    }

    /// Graceful-then-forceful termination; returns the leader's reaped status.
    ///
    /// The grace period ends early only once the whole process group is
    /// gone, not just its leader. The group always gets a final SIGKILL.
    async fn terminate(&self, task: &mut Task) -> Option<ExitStatus> {
        match task.signal(Signal::SIGTERM) {
            Ok(true) => {}
            Ok(false) => debug!("Task {} process group already gone", task.id),
            Err(e) => debug!("SIGTERM to task {} failed: {}", task.id, e),
        }

        let deadline = Instant::now() + task.grace_period;
        let interval = self.config.poll_interval();
        let mut status = None;

        loop {
            task.drain(self.config.drain_limit());
            if status.is_none() {
                match task.try_exit() {
                    Ok(exited) => status = exited,
                    Err(e) => {
                        warn!("Failed to check task {} for exit: {}", task.id, e);
                        break;
                    }
                }
            }
            if status.is_some() && !task.group_alive() {
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "Task {} still alive after {:.1}s grace period, sending SIGKILL",
                    task.id,
                    task.grace_period.as_secs_f64()
                );
                break;
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
        }

        self.kill_group(task);

        if status.is_some() {
            return status;
        }
        match task.wait().await {
            Ok(status) => Some(status),
            Err(e) => {
                error!("Failed to reap task {}: {}", task.id, e);
                None
            }
        }
    }

    /// SIGKILL whatever is left of the task's process group
    fn kill_group(&self, task: &Task) {
        match task.signal(Signal::SIGKILL) {
            Ok(true) => debug!("Sent SIGKILL to process group of task {}", task.id),
            Ok(false) => {}
            Err(e) => debug!("SIGKILL to task {} failed: {}", task.id, e),
        }
    }

    fn settle_cancelled(&self, task: &mut Task, status: Option<ExitStatus>) {
        let code = status.map(exit_code_of).unwrap_or(-1);
        task.finish(TaskState::Cancelled, code, Some(&self.config.cancel_marker));
        info!("Task {} cancelled (exit code {})", task.id, code);
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(SupervisorConfig::default())
    }
}
