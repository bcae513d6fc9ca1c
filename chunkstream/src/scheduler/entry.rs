//! Tracked task records.
//!
//! A [`TaskEntry`] is shared between the deduplication table, the pending
//! set, the running body and its parent's cascade list. All state
//! transitions happen under the entry's own lock, so a task is started,
//! cancelled, committed or finished exactly once.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::context::TaskContext;
use super::handle::{completion_pair, Completer, CompletionHandle};
use super::task::{Task, TaskError, TaskKey, TaskOutcome, TaskStatus};

/// Result of running a body, with delivery deferred until the scheduler
/// has retired the entry.
pub(crate) struct Finished {
    pub status: TaskStatus,
    pub error: Option<TaskError>,
    pub deliver: Box<dyn FnOnce() + Send>,
}

/// A task with its output type erased.
pub(crate) trait ErasedTask: Send {
    fn run(self: Box<Self>, ctx: TaskContext) -> BoxFuture<'static, Finished>;

    /// Drops a task that never started, resolving its handles as cancelled.
    fn abandon(self: Box<Self>);
}

struct TypedTask<T: Task> {
    task: T,
    completer: Completer<T::Output>,
}

impl<T: Task> ErasedTask for TypedTask<T> {
    fn run(self: Box<Self>, ctx: TaskContext) -> BoxFuture<'static, Finished> {
        Box::pin(async move {
            let TypedTask { task, completer } = *self;
            let result = AssertUnwindSafe(task.execute(&ctx)).catch_unwind().await;

            let outcome = if ctx.is_cancelled() && !ctx.is_committed() {
                TaskOutcome::Cancelled
            } else {
                match result {
                    Ok(Ok(value)) => TaskOutcome::Completed(value),
                    Ok(Err(TaskError::Cancelled)) => TaskOutcome::Cancelled,
                    Ok(Err(error)) => TaskOutcome::Faulted(error),
                    Err(panic) => TaskOutcome::Faulted(TaskError::Faulted(panic_message(&*panic))),
                }
            };

            let error = match &outcome {
                TaskOutcome::Faulted(error) => Some(error.clone()),
                _ => None,
            };
            Finished {
                status: outcome.status(),
                error,
                deliver: Box::new(move || completer.complete(outcome)),
            }
        })
    }

    fn abandon(self: Box<Self>) {
        self.completer.complete(TaskOutcome::Cancelled);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[derive(Debug)]
struct EntryState {
    status: TaskStatus,
    committed: bool,
}

/// One tracked task.
pub(crate) struct TaskEntry {
    key: TaskKey,
    state: Mutex<EntryState>,
    token: CancellationToken,
    cascade: Mutex<Vec<Weak<TaskEntry>>>,
    body: Mutex<Option<Box<dyn ErasedTask>>>,
    handle: Box<dyn Any + Send + Sync>,
    nested: AtomicBool,
}

impl TaskEntry {
    /// Wraps `task` in a new staged entry.
    pub(crate) fn new<T: Task>(task: T) -> (Arc<Self>, CompletionHandle<T::Output>) {
        let key = task.key();
        let (completer, handle) = completion_pair(key);
        let entry = Arc::new(Self {
            key,
            state: Mutex::new(EntryState {
                status: TaskStatus::Staged,
                committed: false,
            }),
            token: CancellationToken::new(),
            cascade: Mutex::new(Vec::new()),
            body: Mutex::new(Some(Box::new(TypedTask { task, completer }))),
            handle: Box::new(handle.clone()),
            nested: AtomicBool::new(false),
        });
        (entry, handle)
    }

    pub(crate) fn key(&self) -> TaskKey {
        self.key
    }

    pub(crate) fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    pub(crate) fn is_active(&self) -> bool {
        self.status().is_active()
    }

    pub(crate) fn is_committed(&self) -> bool {
        self.state.lock().committed
    }

    pub(crate) fn is_nested(&self) -> bool {
        self.nested.load(Ordering::Acquire)
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// A new handle for this entry, if its output type is `O`.
    pub(crate) fn handle<O: Clone + Send + Sync + 'static>(&self) -> Option<CompletionHandle<O>> {
        self.handle.downcast_ref::<CompletionHandle<O>>().cloned()
    }

    /// Staged → Pending.
    pub(crate) fn mark_pending(&self) -> bool {
        let mut state = self.state.lock();
        if state.status == TaskStatus::Staged {
            state.status = TaskStatus::Pending;
            true
        } else {
            false
        }
    }

    /// Staged or Pending → Running.
    pub(crate) fn try_start(&self, nested: bool) -> bool {
        let mut state = self.state.lock();
        match state.status {
            TaskStatus::Staged | TaskStatus::Pending => {
                state.status = TaskStatus::Running;
                self.nested.store(nested, Ordering::Release);
                true
            }
            _ => false,
        }
    }

    /// Marks the entry cancelled, returning the status it had.
    ///
    /// Returns `None` when the entry is already terminal or has committed
    /// its side effects.
    pub(crate) fn mark_cancelled(&self) -> Option<TaskStatus> {
        let mut state = self.state.lock();
        if !state.status.is_active() || state.committed {
            return None;
        }
        let previous = state.status;
        state.status = TaskStatus::Cancelled;
        Some(previous)
    }

    /// Runs `apply` if the entry is still running and uncancelled.
    ///
    /// `apply` runs under the state lock: it must not call back into the
    /// scheduler.
    pub(crate) fn commit<R>(&self, apply: impl FnOnce() -> R) -> Option<R> {
        let mut state = self.state.lock();
        if state.status != TaskStatus::Running || self.token.is_cancelled() {
            return None;
        }
        state.committed = true;
        Some(apply())
    }

    /// Running → `status`. Returns `false` if the entry was no longer
    /// running (it was cancelled mid-flight).
    pub(crate) fn finish(&self, status: TaskStatus) -> bool {
        let mut state = self.state.lock();
        if state.status == TaskStatus::Running {
            state.status = status;
            true
        } else {
            false
        }
    }

    /// Links `child` so cancelling this entry cancels it too.
    ///
    /// Returns `false` when this entry is already cancelled; the caller
    /// must cancel the child itself.
    pub(crate) fn link_child(&self, child: &Arc<TaskEntry>) -> bool {
        let mut cascade = self.cascade.lock();
        if self.token.is_cancelled() {
            return false;
        }
        cascade.retain(|link| link.strong_count() > 0);
        if !cascade.iter().any(|link| link.as_ptr() == Arc::as_ptr(child)) {
            cascade.push(Arc::downgrade(child));
        }
        true
    }

    pub(crate) fn take_cascade(&self) -> Vec<Weak<TaskEntry>> {
        std::mem::take(&mut *self.cascade.lock())
    }

    pub(crate) fn take_body(&self) -> Option<Box<dyn ErasedTask>> {
        self.body.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::ChunkCoord;
    use crate::scheduler::task::{TaskFuture, TaskKind};

    struct Noop;

    impl Task for Noop {
        type Output = u8;

        fn kind(&self) -> TaskKind {
            TaskKind::Build
        }

        fn coord(&self) -> ChunkCoord {
            ChunkCoord::ORIGIN
        }

        fn execute<'a>(&'a self, _ctx: &'a TaskContext) -> TaskFuture<'a, u8> {
            Box::pin(async { Ok(1) })
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        let (entry, _handle) = TaskEntry::new(Noop);
        assert_eq!(entry.status(), TaskStatus::Staged);
        assert!(entry.mark_pending());
        assert!(!entry.mark_pending());
        assert!(entry.try_start(false));
        assert!(!entry.try_start(false));
        assert!(entry.finish(TaskStatus::Completed));
        assert_eq!(entry.status(), TaskStatus::Completed);
        assert_eq!(entry.mark_cancelled(), None);
    }

    #[test]
    fn test_cancel_blocks_start_and_commit() {
        let (entry, _handle) = TaskEntry::new(Noop);
        assert_eq!(entry.mark_cancelled(), Some(TaskStatus::Staged));
        assert!(!entry.try_start(false));
        assert!(entry.commit(|| ()).is_none());
    }

    #[test]
    fn test_commit_blocks_cancel() {
        let (entry, _handle) = TaskEntry::new(Noop);
        assert!(entry.try_start(true));
        assert!(entry.is_nested());
        assert_eq!(entry.commit(|| 5), Some(5));
        assert!(entry.is_committed());
        assert_eq!(entry.mark_cancelled(), None);
    }

    #[test]
    fn test_handle_downcast() {
        let (entry, handle) = TaskEntry::new(Noop);
        let again = entry.handle::<u8>().unwrap();
        assert!(again.same_task(&handle));
        assert!(entry.handle::<String>().is_none());
    }

    #[tokio::test]
    async fn test_abandon_resolves_cancelled() {
        let (entry, handle) = TaskEntry::new(Noop);
        entry.take_body().unwrap().abandon();
        assert_eq!(handle.wait().await, TaskOutcome::Cancelled);
        assert!(entry.take_body().is_none());
    }

    #[test]
    fn test_link_child_after_cancel() {
        let (parent, _p) = TaskEntry::new(Noop);
        let (child, _c) = TaskEntry::new(Noop);
        assert!(parent.link_child(&child));
        assert!(parent.link_child(&child));
        assert_eq!(parent.take_cascade().len(), 1);

        parent.token().cancel();
        assert!(!parent.link_child(&child));
    }
}
