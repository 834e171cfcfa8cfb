//! Task Registry - task id → task, plus the latest task per category
//!
//! The only shared mutable state in the supervisor. Admission (is the
//! category free?) and insertion happen under one lock, so two concurrent
//! starts in the same category cannot both succeed.

use crate::error::{SupervisorError, SupervisorResult};
use crate::task::{Task, TaskId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Shared handle to one task; its lock serializes poll and cancel
pub type TaskEntry = Arc<Mutex<Task>>;

/// A registered task plus what admission needs without taking its lock
struct Slot {
    entry: TaskEntry,
    category: String,
    finished: Arc<AtomicBool>,
}

impl Slot {
    fn is_running(&self) -> bool {
        !self.finished.load(Ordering::Acquire)
    }
}

#[derive(Default)]
struct RegistryInner {
    tasks: HashMap<TaskId, Slot>,

    /// Most recently registered task of each category
    latest: HashMap<String, TaskId>,
}

/// In-memory task registry
pub struct TaskRegistry {
    inner: Mutex<RegistryInner>,

    /// Drop a category's previous terminal task on registration
    evict_superseded: bool,
}

impl TaskRegistry {
    pub fn new(evict_superseded: bool) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            evict_superseded,
        }
    }

    /// Admit and register a task for `category`.
    ///
    /// Fails with `Conflict` while the category's latest task is running.
    /// Otherwise `launch` is called with the new id, still under the
    /// registry lock, and its task stored. A poll or cancel holding the
    /// previous task's lock does not delay admission.
    pub async fn register<F>(&self, category: &str, launch: F) -> SupervisorResult<TaskId>
    where
        F: FnOnce(TaskId) -> SupervisorResult<Task>,
    {
        let mut inner = self.inner.lock().await;

        let previous = inner.latest.get(category).copied();
        if let Some(active) = previous {
            if inner.tasks.get(&active).is_some_and(Slot::is_running) {
                debug!("Rejecting start in '{}': task {} is active", category, active);
                return Err(SupervisorError::Conflict {
                    category: category.to_string(),
                    active,
                });
            }
        }

        let id = TaskId::new();
        let task = launch(id)?;
        let slot = Slot {
            finished: task.finished_flag(),
            category: category.to_string(),
            entry: Arc::new(Mutex::new(task)),
        };

        inner.tasks.insert(id, slot);
        inner.latest.insert(category.to_string(), id);

        if self.evict_superseded {
            if let Some(previous) = previous {
                if inner.tasks.remove(&previous).is_some() {
                    debug!("Evicted superseded task {} from '{}'", previous, category);
                }
            }
        }

        Ok(id)
    }

    pub async fn get(&self, id: TaskId) -> SupervisorResult<TaskEntry> {
        let inner = self.inner.lock().await;
        inner
            .tasks
            .get(&id)
            .map(|slot| Arc::clone(&slot.entry))
            .ok_or(SupervisorError::NotFound(id))
    }

    /// Latest task id registered for `category`, running or not
    pub async fn latest_id(&self, category: &str) -> Option<TaskId> {
        self.inner.lock().await.latest.get(category).copied()
    }

    /// The category's task if it is running as of its last poll
    pub async fn active_task_for(&self, category: &str) -> Option<TaskEntry> {
        let inner = self.inner.lock().await;
        let id = inner.latest.get(category)?;
        inner
            .tasks
            .get(id)
            .filter(|slot| slot.is_running())
            .map(|slot| Arc::clone(&slot.entry))
    }

    /// All registered tasks
    pub async fn entries(&self) -> Vec<TaskEntry> {
        let inner = self.inner.lock().await;
        inner
            .tasks
            .values()
            .map(|slot| Arc::clone(&slot.entry))
            .collect()
    }

    /// Remove a terminal task
    pub async fn remove(&self, id: TaskId) -> SupervisorResult<()> {
        let mut inner = self.inner.lock().await;
        let slot = inner.tasks.get(&id).ok_or(SupervisorError::NotFound(id))?;
        if slot.is_running() {
            return Err(SupervisorError::StillRunning(id));
        }

        let category = slot.category.clone();
        inner.tasks.remove(&id);
        if inner.latest.get(&category) == Some(&id) {
            inner.latest.remove(&category);
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(true)
    }
}
