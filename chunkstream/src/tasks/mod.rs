//! Chunk task implementations for the scheduler.
//!
//! Every task runs against a shared [`World`] and targets one chunk
//! coordinate. The scheduler deduplicates them by `(kind, coordinate)`.
//!
//! # Tasks
//!
//! - [`GenerateChunkTask`] - Runs the generator passes and stores the chunk (blocking worker)
//! - [`LoadChunkTask`] - Acquires and binds one pooled view per entity
//! - [`BuildTerrainTask`] - Triangulates the heightmap at a level of detail (blocking worker)
//! - [`UnloadChunkTask`] - Unbinds and releases a chunk's views
//!
//! # Data Flow
//!
//! ```text
//! LoadChunk ──await_child──► GenerateChunk → ChunkStore
//!     └─► Vec<PooledInstance> → residency map
//! BuildTerrain → TerrainMesh → mesh cache → terrain instance
//! UnloadChunk  → instances back to their pools
//! ```
//!
//! # Side Effects
//!
//! Each body routes its mutation of shared state through
//! [`TaskContext::commit`](crate::scheduler::TaskContext::commit):
//! Generate commits the store insert, Load commits the hand-over of its
//! instances, Unload commits the release. Build mutates nothing.

mod build_terrain;
mod generate_chunk;
mod load_chunk;
mod unload_chunk;
mod world;

pub use build_terrain::BuildTerrainTask;
pub use generate_chunk::GenerateChunkTask;
pub use load_chunk::LoadChunkTask;
pub use unload_chunk::UnloadChunkTask;
pub use world::World;
