//! Execution context handed to task bodies.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::coord::ChunkCoord;

use super::dispatcher::{Scheduler, SchedulerError, SlotGuard};
use super::entry::TaskEntry;
use super::handle::CompletionHandle;
use super::task::{Task, TaskError, TaskKey, TaskKind};

/// Per-execution context: cancellation, commit gate and sub-task
/// submission.
pub struct TaskContext {
    scheduler: Scheduler,
    entry: Arc<TaskEntry>,
    slot: Arc<SlotGuard>,
}

impl TaskContext {
    pub(crate) fn new(scheduler: Scheduler, entry: Arc<TaskEntry>, slot: Arc<SlotGuard>) -> Self {
        Self {
            scheduler,
            entry,
            slot,
        }
    }

    pub fn key(&self) -> TaskKey {
        self.entry.key()
    }

    pub fn kind(&self) -> TaskKind {
        self.entry.key().kind
    }

    pub fn coord(&self) -> ChunkCoord {
        self.entry.key().coord
    }

    /// The scheduler running this task.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Returns true once the task has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.entry.token().is_cancelled()
    }

    /// `Err(TaskError::Cancelled)` once the task has been cancelled.
    pub fn check_cancelled(&self) -> Result<(), TaskError> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// A clone of the task's cancellation token, for blocking work.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.entry.token().clone()
    }

    /// Resolves when the task is cancelled.
    pub async fn cancelled(&self) {
        self.entry.token().cancelled().await
    }

    /// Applies a side effect to shared state, unless the task has been
    /// cancelled.
    ///
    /// Once a commit succeeds the task can no longer be cancelled. `apply`
    /// must not call back into the scheduler.
    pub fn commit<R>(&self, apply: impl FnOnce() -> R) -> Result<R, TaskError> {
        self.entry.commit(apply).ok_or(TaskError::Cancelled)
    }

    /// Returns true once a commit has succeeded.
    pub fn is_committed(&self) -> bool {
        self.entry.is_committed()
    }

    /// Submits a linked sub-task.
    ///
    /// The sub-task starts immediately on this task's slot and is
    /// cancelled if this task is. The slot is not released until the
    /// sub-task has exited, even if this task returns first. Submitting a
    /// sub-task that is already tracked links and promotes the existing
    /// one.
    pub fn submit_child<T: Task>(
        &self,
        task: T,
    ) -> Result<CompletionHandle<T::Output>, SchedulerError> {
        self.scheduler.submit_child(&self.entry, &self.slot, task)
    }

    /// Submits a linked sub-task and waits for its result.
    pub async fn await_child<T: Task>(&self, task: T) -> Result<T::Output, TaskError> {
        let handle = self.submit_child(task)?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(TaskError::Cancelled),
            outcome = handle.wait() => outcome.into_result(),
        }
    }
}
