//! Scheduler telemetry.
//!
//! Lock-free counters recorded by the dispatcher, copied into a
//! [`SchedulerSnapshot`] for display.
//!
//! ```text
//! Dispatcher ─────► SchedulerMetrics ─────► SchedulerSnapshot ─────► CLI
//!                   (atomic counters)       (point-in-time copy)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use super::task::TaskKind;

/// Cumulative scheduler counters.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    submitted: AtomicU64,
    deduplicated: AtomicU64,
    started: AtomicU64,
    nested_started: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
    faulted: AtomicU64,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn task_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_deduplicated(&self) {
        self.deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_started(&self, nested: bool) {
        self.started.fetch_add(1, Ordering::Relaxed);
        if nested {
            self.nested_started.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn task_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_faulted(&self) {
        self.faulted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn deduplicated(&self) -> u64 {
        self.deduplicated.load(Ordering::Relaxed)
    }

    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    pub fn nested_started(&self) -> u64 {
        self.nested_started.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn faulted(&self) -> u64 {
        self.faulted.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of the scheduler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    /// Submitted but not yet drained into the pending set.
    pub staged: usize,
    /// Waiting in the pending set.
    pub pending: usize,
    /// Pending tasks per kind, indexed by [`TaskKind::bucket`].
    pub pending_by_kind: [usize; 4],
    /// Admitted tasks currently executing (bounded by the ceiling).
    pub running: usize,
    /// Sub-tasks started on their parent's slot.
    pub nested_running: usize,
    /// Entries in the deduplication table.
    pub tracked: usize,

    pub submitted: u64,
    pub deduplicated: u64,
    pub started: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub faulted: u64,
}

impl SchedulerSnapshot {
    /// Pending tasks of `kind`.
    pub fn pending_of(&self, kind: TaskKind) -> usize {
        self.pending_by_kind[kind.bucket() as usize]
    }

    /// Tasks that are staged, pending or running.
    pub fn in_flight(&self) -> usize {
        self.staged + self.pending + self.running + self.nested_running
    }

    /// Returns true when no task is waiting or executing.
    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }
}
