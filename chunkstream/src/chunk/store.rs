//! Sparse map of generated chunks.
//!
//! The store is written once per coordinate by the Generate task that owns
//! it and read by everything else. [`ChunkStore::insert_once`] keeps the
//! first chunk stored for a coordinate, so readers never see a chunk change
//! underneath them.
//!
//! Eviction only drops data. Cancelling the tasks still tracked at an
//! evicted coordinate is the job of whoever owns the scheduler.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use crate::coord::ChunkCoord;

use super::Chunk;

/// Concurrent coordinate → chunk map.
#[derive(Debug, Default)]
pub struct ChunkStore {
    chunks: DashMap<ChunkCoord, Arc<Chunk>>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, coord: ChunkCoord) -> Option<Arc<Chunk>> {
        self.chunks.get(&coord).map(|c| Arc::clone(c.value()))
    }

    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.chunks.contains_key(&coord)
    }

    /// Stores `chunk` unless one is already stored at its coordinate.
    ///
    /// Returns the chunk that is stored afterwards.
    pub fn insert_once(&self, chunk: Chunk) -> Arc<Chunk> {
        match self.chunks.entry(chunk.coord()) {
            Entry::Occupied(existing) => Arc::clone(existing.get()),
            Entry::Vacant(vacant) => {
                let chunk = Arc::new(chunk);
                vacant.insert(Arc::clone(&chunk));
                chunk
            }
        }
    }

    /// Removes the chunk at `coord`.
    pub fn evict(&self, coord: ChunkCoord) -> Option<Arc<Chunk>> {
        let evicted = self.chunks.remove(&coord).map(|(_, chunk)| chunk);
        if evicted.is_some() {
            trace!(x = coord.x, y = coord.y, "Chunk evicted");
        }
        evicted
    }

    /// Removes every chunk farther than `radius` from `focus`, except those
    /// `keep` accepts. Returns the evicted coordinates in ascending order.
    pub fn evict_outside(
        &self,
        focus: ChunkCoord,
        radius: f32,
        keep: impl Fn(ChunkCoord) -> bool,
    ) -> Vec<ChunkCoord> {
        let radius_sq = f64::from(radius.max(0.0)).powi(2);
        let mut doomed: Vec<ChunkCoord> = self
            .chunks
            .iter()
            .map(|c| *c.key())
            .filter(|coord| focus.distance_squared(*coord) as f64 > radius_sq)
            .filter(|coord| !keep(*coord))
            .collect();
        doomed.sort();
        doomed.retain(|coord| self.evict(*coord).is_some());
        doomed
    }

    /// Removes every chunk.
    pub fn clear(&self) {
        self.chunks.clear();
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Stored coordinates, in ascending order.
    pub fn coords(&self) -> Vec<ChunkCoord> {
        let mut coords: Vec<ChunkCoord> = self.chunks.iter().map(|c| *c.key()).collect();
        coords.sort();
        coords
    }
}
