//! The task scheduler service.
//!
//! # Flow
//!
//! ```text
//! submit() ──► staging inflow ──► pump() ──► pending set ──► pump() ──► running
//!   │            (mpsc)            drain    (bucket, dist)   admit       │
//!   │                                                         ≤ ceiling  │
//!   └── dedup table: (kind, coord) → tracked entry ◄──── retire ◄────────┘
//! ```
//!
//! Submission is non-blocking and may come from any thread. Each
//! [`Scheduler::pump`] drains everything staged into the ordered pending
//! set, then admits tasks in order while fewer than
//! `max_concurrent_tasks` admitted tasks are running. [`Scheduler::run`]
//! calls `pump` on a fixed tick and whenever a slot frees up.
//!
//! Sub-tasks submitted through [`TaskContext::submit_child`] do not queue:
//! they start at once on their parent's slot. This keeps a parent that is
//! waiting on a child from deadlocking the ceiling.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::SchedulerConfig;
use crate::coord::ChunkCoord;

use super::context::TaskContext;
use super::entry::TaskEntry;
use super::handle::CompletionHandle;
use super::metrics::{SchedulerMetrics, SchedulerSnapshot};
use super::queue::PendingQueue;
use super::task::{Task, TaskError, TaskKey, TaskKind, TaskStatus};

/// Errors returned by task submission.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SchedulerError {
    /// The scheduler has been shut down.
    #[error("scheduler is shut down")]
    ShuttingDown,

    /// A task with this key is tracked with a different output type.
    #[error("task {0} is already tracked with a different output type")]
    OutputMismatch(TaskKey),

    /// A sub-task was submitted from a cancelled parent.
    #[error("parent task {0} was cancelled")]
    ParentCancelled(TaskKey),
}

impl From<SchedulerError> for TaskError {
    fn from(error: SchedulerError) -> Self {
        match error {
            SchedulerError::ShuttingDown | SchedulerError::ParentCancelled(_) => {
                TaskError::Cancelled
            }
            other => TaskError::Faulted(other.to_string()),
        }
    }
}

struct Shared {
    config: SchedulerConfig,
    staged_tx: mpsc::UnboundedSender<Arc<TaskEntry>>,
    /// Also serializes concurrent `pump` calls.
    staged_rx: Mutex<mpsc::UnboundedReceiver<Arc<TaskEntry>>>,
    staged: AtomicUsize,
    pending: Mutex<PendingQueue<Arc<TaskEntry>>>,
    lookup: DashMap<TaskKey, Arc<TaskEntry>>,
    running: AtomicUsize,
    nested: AtomicUsize,
    focus: Mutex<Option<ChunkCoord>>,
    metrics: SchedulerMetrics,
    closed: AtomicBool,
    wake: Notify,
}

/// Releases a running slot exactly once, however the body ends.
///
/// A nested task's guard holds its parent's guard, so an admitted slot
/// stays taken until the parent and every sub-task it launched have exited.
pub(crate) struct SlotGuard {
    shared: Arc<Shared>,
    nested: bool,
    _parent: Option<Arc<SlotGuard>>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let counter = if self.nested {
            &self.shared.nested
        } else {
            &self.shared.running
        };
        counter.fetch_sub(1, Ordering::AcqRel);
        self.shared.wake.notify_one();
    }
}

/// Priority task scheduler with deduplication and cancellation.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (staged_tx, staged_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                config,
                staged_tx,
                staged_rx: Mutex::new(staged_rx),
                staged: AtomicUsize::new(0),
                pending: Mutex::new(PendingQueue::new()),
                lookup: DashMap::new(),
                running: AtomicUsize::new(0),
                nested: AtomicUsize::new(0),
                focus: Mutex::new(None),
                metrics: SchedulerMetrics::new(),
                closed: AtomicBool::new(false),
                wake: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.shared.metrics
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Submits a task and returns a handle to its outcome.
    ///
    /// If a task with the same kind and coordinate is still staged, pending
    /// or running, no new task is created and a handle to the existing one
    /// is returned instead.
    pub fn submit<T: Task>(&self, task: T) -> Result<CompletionHandle<T::Output>, SchedulerError> {
        let (entry, handle, created) = self.track(task)?;
        if created {
            self.stage(entry);
        }
        Ok(handle)
    }

    pub(crate) fn submit_child<T: Task>(
        &self,
        parent: &Arc<TaskEntry>,
        parent_slot: &Arc<SlotGuard>,
        task: T,
    ) -> Result<CompletionHandle<T::Output>, SchedulerError> {
        if parent.token().is_cancelled() {
            return Err(SchedulerError::ParentCancelled(parent.key()));
        }

        let (child, handle, _) = self.track(task)?;

        if !parent.link_child(&child) {
            self.cancel_entry(&child);
            return Err(SchedulerError::ParentCancelled(parent.key()));
        }

        if child.try_start(true) {
            let key = child.key();
            self.shared
                .pending
                .lock()
                .remove_if(&key, |queued| Arc::ptr_eq(queued, &child));
            self.launch(child, Some(Arc::clone(parent_slot)));
        }

        Ok(handle)
    }

    /// Finds or creates the tracked entry for `task`.
    fn track<T: Task>(
        &self,
        task: T,
    ) -> Result<(Arc<TaskEntry>, CompletionHandle<T::Output>, bool), SchedulerError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::ShuttingDown);
        }

        let key = task.key();
        self.shared.metrics.task_submitted();

        match self.shared.lookup.entry(key) {
            Entry::Occupied(occupied) if occupied.get().is_active() => {
                let existing = Arc::clone(occupied.get());
                drop(occupied);
                let handle = existing
                    .handle::<T::Output>()
                    .ok_or(SchedulerError::OutputMismatch(key))?;
                self.shared.metrics.task_deduplicated();
                trace!(
                    kind = %key.kind,
                    x = key.coord.x,
                    y = key.coord.y,
                    "Task deduplicated"
                );
                Ok((existing, handle, false))
            }
            Entry::Occupied(mut occupied) => {
                let (entry, handle) = TaskEntry::new(task);
                occupied.insert(Arc::clone(&entry));
                Ok((entry, handle, true))
            }
            Entry::Vacant(vacant) => {
                let (entry, handle) = TaskEntry::new(task);
                vacant.insert(Arc::clone(&entry));
                Ok((entry, handle, true))
            }
        }
    }

    fn stage(&self, entry: Arc<TaskEntry>) {
        self.shared.staged.fetch_add(1, Ordering::AcqRel);
        if let Err(mpsc::error::SendError(entry)) = self.shared.staged_tx.send(entry) {
            self.shared.staged.fetch_sub(1, Ordering::AcqRel);
            self.cancel_entry(&entry);
            return;
        }
        self.shared.wake.notify_one();
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Drains staged tasks into the pending set and admits as many as the
    /// ceiling allows. Returns the number of tasks started.
    pub fn pump(&self) -> usize {
        let shared = &self.shared;
        let mut staged = shared.staged_rx.lock();
        let focus = *shared.focus.lock();

        let mut drained = 0;
        {
            let mut pending = shared.pending.lock();
            while let Ok(entry) = staged.try_recv() {
                shared.staged.fetch_sub(1, Ordering::AcqRel);
                if !entry.mark_pending() {
                    continue;
                }
                let key = entry.key();
                let priority = focus.map_or(0.0, |focus| key.coord.distance(focus));
                pending.push(key, priority, entry);
                drained += 1;
            }
        }

        let mut started = 0;
        while shared.running.load(Ordering::Acquire) < shared.config.max_concurrent_tasks {
            let next = shared.pending.lock().pop();
            let Some((_, entry)) = next else {
                break;
            };
            if entry.try_start(false) {
                self.launch(entry, None);
                started += 1;
            }
        }

        if drained > 0 || started > 0 {
            trace!(drained, started, "Scheduler pumped");
        }
        started
    }

    /// Spawns the body of an entry that has just moved to Running.
    fn launch(&self, entry: Arc<TaskEntry>, parent_slot: Option<Arc<SlotGuard>>) {
        let nested = entry.is_nested();
        let counter = if nested {
            &self.shared.nested
        } else {
            &self.shared.running
        };
        counter.fetch_add(1, Ordering::AcqRel);
        let guard = Arc::new(SlotGuard {
            shared: Arc::clone(&self.shared),
            nested,
            _parent: parent_slot,
        });

        let key = entry.key();
        let Some(body) = entry.take_body() else {
            warn!(kind = %key.kind, x = key.coord.x, y = key.coord.y, "Task has no body");
            self.finish(&entry, TaskStatus::Faulted, None);
            return;
        };

        self.shared.metrics.task_started(nested);
        debug!(
            kind = %key.kind,
            x = key.coord.x,
            y = key.coord.y,
            nested,
            "Task started"
        );

        let ctx = TaskContext::new(self.clone(), Arc::clone(&entry), Arc::clone(&guard));
        let scheduler = self.clone();
        tokio::spawn(async move {
            let finished = body.run(ctx).await;
            scheduler.finish(&entry, finished.status, finished.error.as_ref());
            drop(guard);
            (finished.deliver)();
        });
    }

    /// Retires an entry after its body has returned.
    fn finish(&self, entry: &Arc<TaskEntry>, status: TaskStatus, error: Option<&TaskError>) {
        let key = entry.key();
        let transitioned = entry.finish(status);
        self.shared
            .lookup
            .remove_if(&key, |_, current| Arc::ptr_eq(current, entry));

        if !transitioned {
            // Cancelled while running; already counted.
            debug!(kind = %key.kind, x = key.coord.x, y = key.coord.y, "Cancelled task exited");
            return;
        }

        match status {
            TaskStatus::Completed => {
                self.shared.metrics.task_completed();
                debug!(kind = %key.kind, x = key.coord.x, y = key.coord.y, "Task completed");
            }
            TaskStatus::Cancelled => {
                self.shared.metrics.task_cancelled();
                debug!(kind = %key.kind, x = key.coord.x, y = key.coord.y, "Task cancelled");
            }
            _ => {
                self.shared.metrics.task_faulted();
                warn!(
                    kind = %key.kind,
                    x = key.coord.x,
                    y = key.coord.y,
                    error = %error.map(ToString::to_string).unwrap_or_default(),
                    "Task faulted"
                );
            }
        }
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// Cancels the task with `key`, if tracked. Returns true if a task was
    /// cancelled.
    ///
    /// A task that never started resolves as cancelled immediately. A
    /// running task observes its token and resolves when its body exits.
    /// Linked sub-tasks are cancelled too.
    pub fn cancel(&self, key: &TaskKey) -> bool {
        let entry = self.shared.lookup.get(key).map(|e| Arc::clone(e.value()));
        match entry {
            Some(entry) => self.cancel_entry(&entry),
            None => false,
        }
    }

    /// Cancels the task of `kind` at `coord`.
    pub fn cancel_all_of_kind_at(&self, kind: TaskKind, coord: ChunkCoord) -> bool {
        self.cancel(&TaskKey::new(kind, coord))
    }

    /// Cancels every tracked task at `coord`. Returns the number cancelled.
    pub fn cancel_all_at(&self, coord: ChunkCoord) -> usize {
        self.cancel_matching(|key| key.coord == coord)
    }

    /// Cancels every tracked task.
    pub fn cancel_all(&self) -> usize {
        self.cancel_matching(|_| true)
    }

    fn cancel_matching(&self, matches: impl Fn(&TaskKey) -> bool) -> usize {
        let entries: Vec<Arc<TaskEntry>> = self
            .shared
            .lookup
            .iter()
            .filter(|e| matches(e.key()))
            .map(|e| Arc::clone(e.value()))
            .collect();
        entries
            .iter()
            .filter(|entry| self.cancel_entry(entry))
            .count()
    }

    fn cancel_entry(&self, entry: &Arc<TaskEntry>) -> bool {
        let Some(previous) = entry.mark_cancelled() else {
            return false;
        };
        entry.token().cancel();
        self.shared.metrics.task_cancelled();

        let key = entry.key();
        debug!(
            kind = %key.kind,
            x = key.coord.x,
            y = key.coord.y,
            was = ?previous,
            "Task cancelled"
        );

        self.shared
            .lookup
            .remove_if(&key, |_, current| Arc::ptr_eq(current, entry));

        if previous != TaskStatus::Running {
            self.shared
                .pending
                .lock()
                .remove_if(&key, |queued| Arc::ptr_eq(queued, entry));
            if let Some(body) = entry.take_body() {
                body.abandon();
            }
        }

        for link in entry.take_cascade() {
            if let Some(child) = link.upgrade() {
                self.cancel_entry(&child);
            }
        }
        true
    }

    // =========================================================================
    // Focus
    // =========================================================================

    /// Moves the focus coordinate and re-sorts pending tasks whose distance
    /// changed by more than the configured threshold.
    pub fn set_focus(&self, focus: ChunkCoord) {
        {
            let mut current = self.shared.focus.lock();
            if *current == Some(focus) {
                return;
            }
            *current = Some(focus);
        }

        let moved = self.shared.pending.lock().reprioritize(
            |key, _| key.coord.distance(focus),
            self.shared.config.reprioritize_threshold,
        );
        if moved > 0 {
            debug!(x = focus.x, y = focus.y, moved, "Pending tasks reprioritized");
        }
    }

    pub fn focus(&self) -> Option<ChunkCoord> {
        *self.shared.focus.lock()
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Status of the tracked task with `key`. Terminal tasks are untracked.
    pub fn status(&self, key: &TaskKey) -> Option<TaskStatus> {
        let entry = self.shared.lookup.get(key).map(|e| Arc::clone(e.value()));
        entry.map(|entry| entry.status())
    }

    pub fn is_tracked(&self, key: &TaskKey) -> bool {
        self.shared.lookup.contains_key(key)
    }

    /// Admitted tasks currently running.
    pub fn running(&self) -> usize {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let metrics = &self.shared.metrics;
        let (pending, pending_by_kind) = {
            let queue = self.shared.pending.lock();
            (queue.len(), queue.kind_counts())
        };
        SchedulerSnapshot {
            staged: self.shared.staged.load(Ordering::Acquire),
            pending,
            pending_by_kind,
            running: self.shared.running.load(Ordering::Acquire),
            nested_running: self.shared.nested.load(Ordering::Acquire),
            tracked: self.shared.lookup.len(),
            submitted: metrics.submitted(),
            deduplicated: metrics.deduplicated(),
            started: metrics.started(),
            completed: metrics.completed(),
            cancelled: metrics.cancelled(),
            faulted: metrics.faulted(),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Rejects further submissions and cancels everything tracked.
    pub fn shutdown(&self) -> usize {
        self.shared.closed.store(true, Ordering::Release);
        let cancelled = self.cancel_all();
        info!(cancelled, "Scheduler shut down");
        cancelled
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Drives the scheduler until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let tick = self.shared.config.tick_interval.max(Duration::from_millis(1));
        info!(
            max_concurrent_tasks = self.shared.config.max_concurrent_tasks,
            tick_ms = tick.as_millis() as u64,
            "Scheduler starting"
        );

        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Scheduler shutting down");
                    break;
                }

                _ = self.shared.wake.notified() => {
                    self.pump();
                }

                _ = ticker.tick() => {
                    self.pump();
                }
            }
        }

        self.shutdown();
        info!("Scheduler stopped");
    }
}
