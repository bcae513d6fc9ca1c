//! Priority task scheduler.
//!
//! Runs chunk work ([`TaskKind::Generate`], [`TaskKind::Load`],
//! [`TaskKind::Build`], [`TaskKind::Unload`]) with:
//!
//! - **Deduplication**: one live task per `(kind, coordinate)`; duplicate
//!   submissions share the existing task's [`CompletionHandle`].
//! - **Ordering**: unloads, then generates, then loads, then builds; nearest
//!   to the focus first within each kind.
//! - **Concurrency ceiling**: at most `max_concurrent_tasks` admitted tasks
//!   run at once. Linked sub-tasks run on their parent's slot.
//! - **Cancellation**: tokens checked by task bodies, a commit gate that
//!   refuses side effects after cancellation, and cascading to sub-tasks.
//! - **Fault isolation**: a failing or panicking body faults only its own
//!   task.
//!
//! # Example
//!
//! ```ignore
//! use chunkstream::scheduler::Scheduler;
//! use tokio_util::sync::CancellationToken;
//!
//! let scheduler = Scheduler::new(config.scheduler.clone());
//! let shutdown = CancellationToken::new();
//! tokio::spawn(scheduler.clone().run(shutdown.clone()));
//!
//! let handle = scheduler.submit(task)?;
//! let outcome = handle.wait().await;
//! ```

mod context;
mod dispatcher;
mod entry;
mod handle;
mod metrics;
mod queue;
mod task;

pub use context::TaskContext;
pub use dispatcher::{Scheduler, SchedulerError};
pub use handle::CompletionHandle;
pub use metrics::{SchedulerMetrics, SchedulerSnapshot};
pub use queue::{PendingQueue, QueueKey};
pub use task::{Task, TaskError, TaskFuture, TaskKey, TaskKind, TaskOutcome, TaskStatus};
