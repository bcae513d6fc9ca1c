//! Observer-driven chunk streaming.
//!
//! Keeps the chunks around an observer resident and shows each resident
//! terrain at a level of detail that falls off with distance.
//!
//! # Components
//!
//! - [`Observer`]: where the world is streamed around
//! - [`desired_set`] / [`plan`]: pure diffing of wanted against resident
//!   coordinates
//! - [`lod_for_distance`]: distance to level-of-detail step function
//! - [`StreamingController`]: the per-tick loop that submits loads,
//!   unloads and mesh builds to the [`Scheduler`](crate::scheduler::Scheduler)
//!
//! # Data Flow
//!
//! ```text
//! Observer ──► tick() ──► plan ──► Unload / Load tasks ──► Scheduler
//!                │                                           │
//!                └─── apply completions ◄── CompletionHandle ◄┘
//! ```

mod controller;
mod lod;
mod observer;
mod plan;

pub use controller::{StreamingController, StreamingStats};
pub use lod::lod_for_distance;
pub use observer::{Observer, SharedObserver};
pub use plan::{desired_set, plan, StreamPlan};
