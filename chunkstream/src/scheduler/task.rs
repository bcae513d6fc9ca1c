//! Task trait and related types.
//!
//! A task is one asynchronous operation on one chunk coordinate. Its
//! identity for deduplication is its [`TaskKey`], the pair of
//! [`TaskKind`] and [`ChunkCoord`]: two tasks with the same key are the same
//! logical work no matter what priority they were submitted with.
//!
//! # Example
//!
//! ```ignore
//! use chunkstream::scheduler::{Task, TaskContext, TaskError, TaskFuture, TaskKind};
//!
//! struct TouchTask {
//!     coord: ChunkCoord,
//! }
//!
//! impl Task for TouchTask {
//!     type Output = ();
//!
//!     fn kind(&self) -> TaskKind { TaskKind::Build }
//!     fn coord(&self) -> ChunkCoord { self.coord }
//!
//!     fn execute<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a, ()> {
//!         Box::pin(async move {
//!             ctx.check_cancelled()?;
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::coord::ChunkCoord;
use crate::pool::PoolError;

use super::context::TaskContext;

// =============================================================================
// Task Kind
// =============================================================================

/// The closed set of operations the scheduler runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    /// Produce a chunk's data through the generator passes.
    Generate,
    /// Acquire and bind pooled views for a chunk's entities.
    Load,
    /// Build a detail representation for an already-loaded entity.
    Build,
    /// Unbind and release a chunk's pooled views.
    Unload,
}

impl TaskKind {
    /// Every kind, in scheduling-bucket order.
    pub const ALL: [TaskKind; 4] = [
        TaskKind::Unload,
        TaskKind::Generate,
        TaskKind::Load,
        TaskKind::Build,
    ];

    /// Scheduling bucket; lower buckets are admitted first.
    ///
    /// Unloads go first so their instances are back in the pools before
    /// loads ask for them. Builds only refine what is already resident and
    /// go last.
    pub fn bucket(&self) -> u8 {
        match self {
            TaskKind::Unload => 0,
            TaskKind::Generate => 1,
            TaskKind::Load => 2,
            TaskKind::Build => 3,
        }
    }

    /// Short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Generate => "generate",
            TaskKind::Load => "load",
            TaskKind::Build => "build",
            TaskKind::Unload => "unload",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deduplication identity of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub kind: TaskKind,
    pub coord: ChunkCoord,
}

impl TaskKey {
    pub const fn new(kind: TaskKind, coord: ChunkCoord) -> Self {
        Self { kind, coord }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.coord)
    }
}

// =============================================================================
// Errors and Outcomes
// =============================================================================

/// Error type for task failures.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum TaskError {
    /// The task was cancelled. Quiet and expected.
    #[error("task cancelled")]
    Cancelled,

    /// Unexpected failure inside a task body.
    #[error("task faulted: {0}")]
    Faulted(String),

    /// The result arrived after its coordinate stopped being relevant.
    #[error("stale result for chunk {0}")]
    Stale(ChunkCoord),

    /// A task needed chunk data that has not been generated.
    #[error("chunk {0} has not been generated")]
    MissingChunk(ChunkCoord),

    /// A resource pool rejected an operation.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),
}

impl TaskError {
    /// Creates a fault with the given message.
    pub fn faulted(message: impl Into<String>) -> Self {
        Self::Faulted(message.into())
    }

    /// Returns true for [`TaskError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Lifecycle state of a tracked task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Submitted, waiting in the staging inflow.
    Staged,
    /// Admitted to the ordered pending set.
    Pending,
    /// Body is executing.
    Running,
    /// Body finished successfully.
    Completed,
    /// Cancelled before or during execution.
    Cancelled,
    /// Body returned an error or panicked.
    Faulted,
}

impl TaskStatus {
    /// Returns true while the task can still run or is running.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Staged | Self::Pending | Self::Running)
    }

    /// Returns true once the task can no longer change state.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// What a completion handle resolves to.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskOutcome<T> {
    /// The body finished and produced a value.
    Completed(T),
    /// The task was cancelled; any partial work was discarded.
    Cancelled,
    /// The body failed.
    Faulted(TaskError),
}

impl<T> TaskOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, Self::Faulted(_))
    }

    /// Terminal status matching this outcome.
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Completed(_) => TaskStatus::Completed,
            Self::Cancelled => TaskStatus::Cancelled,
            Self::Faulted(_) => TaskStatus::Faulted,
        }
    }

    /// Converts the outcome into a `Result`, mapping cancellation to
    /// [`TaskError::Cancelled`].
    pub fn into_result(self) -> Result<T, TaskError> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Cancelled => Err(TaskError::Cancelled),
            Self::Faulted(error) => Err(error),
        }
    }

    /// The completed value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }
}

// =============================================================================
// Task Trait
// =============================================================================

/// Boxed future returned by [`Task::execute`].
pub type TaskFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TaskError>> + Send + 'a>>;

/// A single cancellable operation on one chunk coordinate.
///
/// # Cancellation
///
/// Bodies must check [`TaskContext::is_cancelled`] at well-defined points
/// (before each row of heavy work, before each entity) and route every
/// mutation of shared state through [`TaskContext::commit`], which refuses
/// to run once the task has been cancelled.
///
/// # Sub-tasks
///
/// A body that needs another task's result uses
/// [`TaskContext::await_child`]. The child is linked so that cancelling
/// this task also cancels it, and it starts immediately instead of queueing
/// behind the concurrency ceiling.
pub trait Task: Send + Sync + 'static {
    /// Value delivered to every completion handle of this task.
    type Output: Clone + Send + Sync + 'static;

    /// Operation kind.
    fn kind(&self) -> TaskKind;

    /// Spatial locus of the work.
    fn coord(&self) -> ChunkCoord;

    /// Deduplication identity.
    fn key(&self) -> TaskKey {
        TaskKey::new(self.kind(), self.coord())
    }

    /// Executes the task body.
    fn execute<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a, Self::Output>;
}
