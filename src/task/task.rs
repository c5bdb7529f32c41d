//! A unit of background work with its own input and output queues.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::queue::MessageQueue;
use super::registry::RegistryInner;
use crate::error::{Result, StrideError};

/// Work executed by a [`Task`].
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Run until the work is finished or paused.
    async fn invoke(&self, task: Arc<Task>) -> Result<()>;

    /// Release resources the runner holds.
    async fn destroy(&self) -> Result<()>;

    /// Called once per execution when it ends, whether it finished, failed,
    /// panicked or was cancelled.
    async fn on_done(&self, task: &Task);
}

struct Execution {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

pub struct Task {
    id: String,
    runner: Arc<dyn TaskRunner>,
    input: Arc<dyn MessageQueue>,
    output: Arc<dyn MessageQueue>,
    execution: Mutex<Option<Execution>>,
    finalized: AtomicBool,
    registry: Weak<RegistryInner>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("done", &self.done())
            .finish_non_exhaustive()
    }
}

impl Task {
    pub(crate) fn new(
        id: String,
        runner: Arc<dyn TaskRunner>,
        input: Arc<dyn MessageQueue>,
        output: Arc<dyn MessageQueue>,
        registry: Weak<RegistryInner>,
    ) -> Self {
        Self {
            id,
            runner,
            input,
            output,
            execution: Mutex::new(None),
            finalized: AtomicBool::new(false),
            registry,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn input(&self) -> &Arc<dyn MessageQueue> {
        &self.input
    }

    pub fn output(&self) -> &Arc<dyn MessageQueue> {
        &self.output
    }

    pub fn runner(&self) -> &Arc<dyn TaskRunner> {
        &self.runner
    }

    fn execution(&self) -> MutexGuard<'_, Option<Execution>> {
        self.execution.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True when nothing is executing.
    pub fn done(&self) -> bool {
        self.execution()
            .as_ref()
            .map_or(true, |execution| execution.handle.is_finished())
    }

    /// Start the runner in the background. Does nothing while an execution
    /// is still in flight; returns whether a new one started.
    pub fn invoke(self: &Arc<Self>) -> bool {
        let mut execution = self.execution();
        if execution.as_ref().is_some_and(|e| !e.handle.is_finished()) {
            return false;
        }

        self.finalized.store(false, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let run = AssertUnwindSafe(task.runner.invoke(Arc::clone(&task))).catch_unwind();
            let outcome = tokio::select! {
                _ = token.cancelled() => Err(StrideError::Cancelled),
                outcome = run => outcome.unwrap_or_else(|panic| {
                    Err(StrideError::InvalidState(format!("task panicked: {}", panic_message(&panic))))
                }),
            };

            match outcome {
                Ok(()) => info!(task_id = %task.id, "task finished"),
                Err(StrideError::Cancelled) => info!(task_id = %task.id, "task cancelled"),
                Err(e) => error!(task_id = %task.id, error = %e, "task failed"),
            }
            task.finalize().await;
            task.deregister();
        });

        *execution = Some(Execution { handle, cancel });
        info!(task_id = %self.id, "task started");
        true
    }

    /// Request cancellation and remove the task from its registry.
    ///
    /// Returns `true` when an execution was in flight. Its `on_done` runs
    /// once the runner observes cancellation.
    pub fn cancel(&self) -> bool {
        let running = {
            let execution = self.execution();
            match execution.as_ref() {
                Some(e) if !e.handle.is_finished() => {
                    e.cancel.cancel();
                    true
                }
                _ => false,
            }
        };
        if running {
            info!(task_id = %self.id, "task cancel requested");
        }
        self.deregister();
        running
    }

    /// Run `on_done` unless this execution already did.
    pub(crate) async fn finalize(&self) {
        if !self.finalized.swap(true, Ordering::SeqCst) {
            self.runner.on_done(self).await;
        }
    }

    fn deregister(&self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(&self.id) {
                info!(task_id = %self.id, "task removed from registry");
            }
        }
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
