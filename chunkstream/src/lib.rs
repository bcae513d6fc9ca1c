//! Chunkstream - Observer-driven chunk streaming for procedural worlds
//!
//! This library streams a procedurally generated world in square chunks
//! around a moving observer: chunks are generated on worker threads, bound
//! to recycled view instances, meshed at a level of detail that falls off
//! with distance, and released once the observer moves away.
//!
//! # Modules
//!
//! - [`scheduler`] - priority task scheduler with deduplication,
//!   cancellation and a concurrency ceiling
//! - [`tasks`] - the Generate, Load, Build and Unload chunk tasks
//! - [`streaming`] - the per-tick controller that keeps residency in step
//!   with the observer
//! - [`pool`] - recycled view instances, one pool per entity kind
//! - [`chunk`] - chunk data and the shared chunk store
//! - [`generation`] - generator passes (terrain, mountains, rivers, forest)
//! - [`app`] - wires everything together and owns the background loops

pub mod app;
pub mod chunk;
pub mod config;
pub mod coord;
pub mod generation;
pub mod logging;
pub mod pool;
pub mod scheduler;
pub mod streaming;
pub mod tasks;
