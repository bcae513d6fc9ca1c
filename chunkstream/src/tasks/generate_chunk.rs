//! Generate chunk task.
//!
//! [`GenerateChunkTask`] runs the world's generator passes for one
//! coordinate on a blocking worker and publishes the result to the
//! [`ChunkStore`](crate::chunk::ChunkStore).
//!
//! # Output
//!
//! The stored chunk. If the store already holds a chunk for the coordinate
//! (generated by an earlier task), that chunk is returned without running
//! the passes again.

use std::sync::Arc;

use tracing::debug;

use crate::chunk::Chunk;
use crate::coord::ChunkCoord;
use crate::scheduler::{Task, TaskContext, TaskError, TaskFuture, TaskKind};

use super::World;

/// Produces the chunk at one coordinate.
pub struct GenerateChunkTask {
    world: Arc<World>,
    coord: ChunkCoord,
}

impl GenerateChunkTask {
    pub fn new(world: Arc<World>, coord: ChunkCoord) -> Self {
        Self { world, coord }
    }
}

impl Task for GenerateChunkTask {
    type Output = Arc<Chunk>;

    fn kind(&self) -> TaskKind {
        TaskKind::Generate
    }

    fn coord(&self) -> ChunkCoord {
        self.coord
    }

    fn execute<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a, Self::Output> {
        Box::pin(async move {
            if let Some(existing) = self.world.store().get(self.coord) {
                return Ok(existing);
            }
            ctx.check_cancelled()?;

            let world = Arc::clone(&self.world);
            let coord = self.coord;
            let token = ctx.cancellation_token();
            let chunk = tokio::task::spawn_blocking(move || world.generator().generate(coord, &token))
                .await
                .map_err(|e| TaskError::faulted(format!("generator worker failed: {}", e)))??;

            let entities = chunk.len();
            let stored = ctx.commit(|| self.world.store().insert_once(chunk))?;
            debug!(x = coord.x, y = coord.y, entities, "Chunk generated");
            Ok(stored)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TaskOutcome;
    use crate::tasks::test_support::{scheduler, world};

    #[tokio::test]
    async fn test_generate_stores_chunk() {
        let world = world();
        let scheduler = scheduler(4);
        let coord = ChunkCoord::new(2, -1);

        let handle = scheduler
            .submit(GenerateChunkTask::new(Arc::clone(&world), coord))
            .unwrap();
        scheduler.pump();

        let chunk = handle.wait().await.completed().unwrap();
        assert_eq!(chunk.coord(), coord);
        assert!(chunk.terrain().is_some());
        assert!(Arc::ptr_eq(&chunk, &world.store().get(coord).unwrap()));
    }

    #[tokio::test]
    async fn test_generate_reuses_stored_chunk() {
        let world = world();
        let scheduler = scheduler(4);
        let coord = ChunkCoord::ORIGIN;
        let existing = world.store().insert_once(Chunk::new(coord));

        let handle = scheduler
            .submit(GenerateChunkTask::new(Arc::clone(&world), coord))
            .unwrap();
        scheduler.pump();

        let chunk = handle.wait().await.completed().unwrap();
        assert!(Arc::ptr_eq(&chunk, &existing));
        assert!(chunk.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_generate_leaves_store_untouched() {
        let world = world();
        let scheduler = scheduler(4);
        let coord = ChunkCoord::new(5, 5);

        let handle = scheduler
            .submit(GenerateChunkTask::new(Arc::clone(&world), coord))
            .unwrap();
        assert!(scheduler.cancel(&handle.key()));
        scheduler.pump();

        assert!(matches!(handle.wait().await, TaskOutcome::Cancelled));
        assert!(!world.store().contains(coord));
    }
}
