//! Process-wide lookup of live tasks.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use super::queue::QueueFactory;
use super::task::{Task, TaskRunner};
use crate::error::Result;

pub(crate) struct RegistryInner {
    tasks: RwLock<HashMap<String, Arc<Task>>>,
}

impl RegistryInner {
    fn tasks(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Task>>> {
        self.tasks.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn remove(&self, id: &str) -> bool {
        self.tasks().remove(id).is_some()
    }
}

/// Owns every task created through it. Tasks deregister themselves when
/// their execution ends or they are cancelled.
#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<RegistryInner>,
    queues: Arc<dyn QueueFactory>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry").field("tasks", &self.len()).finish()
    }
}

impl TaskRegistry {
    pub fn new(queues: Arc<dyn QueueFactory>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                tasks: RwLock::new(HashMap::new()),
            }),
            queues,
        }
    }

    /// Register a new task with queues `task:input:<id>` and `task:output:<id>`.
    pub fn create(&self, runner: Arc<dyn TaskRunner>) -> Result<Arc<Task>> {
        let id = uuid::Uuid::new_v4().to_string();
        let input = self.queues.create(&format!("task:input:{id}"))?;
        let output = self.queues.create(&format!("task:output:{id}"))?;
        let task = Arc::new(Task::new(id.clone(), runner, input, output, Arc::downgrade(&self.inner)));
        self.inner.tasks().insert(id.clone(), Arc::clone(&task));
        info!(task_id = %id, "task created");
        Ok(task)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Task>> {
        self.inner
            .tasks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner
            .tasks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel one task, run its `on_done` if no execution will, and release
    /// its runner. Other tasks are untouched.
    pub async fn destroy(&self, id: &str) -> bool {
        let Some(task) = self.get(id) else {
            return false;
        };
        if !task.cancel() {
            task.finalize().await;
        }
        if let Err(e) = task.runner().destroy().await {
            warn!(task_id = %id, error = %e, "failed to release task runner");
        }
        info!(task_id = %id, "task destroyed");
        true
    }

    /// Destroy every registered task.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self
            .inner
            .tasks()
            .keys()
            .cloned()
            .collect();
        for id in ids {
            self.destroy(&id).await;
        }
    }
}
