//! Load chunk task.
//!
//! [`LoadChunkTask`] makes a chunk resident: it ensures the chunk exists,
//! then checks out one pooled view per entity and binds it.
//!
//! # Sub-task
//!
//! When the store has no chunk for the coordinate, the load awaits a
//! linked [`GenerateChunkTask`]. Cancelling the load cancels the
//! generation with it, and the generation starts immediately instead of
//! queueing behind the load that waits for it.
//!
//! # Output
//!
//! The bound instances, in entity order. They are handed to the caller
//! only once the task has committed; a load cancelled before that point
//! releases everything it acquired.

use std::sync::Arc;

use tracing::debug;

use crate::chunk::Chunk;
use crate::coord::ChunkCoord;
use crate::pool::PooledInstance;
use crate::scheduler::{Task, TaskContext, TaskError, TaskFuture, TaskKind};

use super::{GenerateChunkTask, World};

/// Acquires and binds the views for one chunk.
pub struct LoadChunkTask {
    world: Arc<World>,
    coord: ChunkCoord,
}

impl LoadChunkTask {
    pub fn new(world: Arc<World>, coord: ChunkCoord) -> Self {
        Self { world, coord }
    }

    async fn chunk(&self, ctx: &TaskContext) -> Result<Arc<Chunk>, TaskError> {
        match self.world.store().get(self.coord) {
            Some(chunk) => Ok(chunk),
            None => {
                ctx.await_child(GenerateChunkTask::new(Arc::clone(&self.world), self.coord))
                    .await
            }
        }
    }

    /// Binds a fresh instance to every entity, pushing each onto
    /// `acquired` as soon as it is checked out.
    fn bind_all(
        &self,
        ctx: &TaskContext,
        chunk: &Chunk,
        acquired: &mut Vec<Arc<PooledInstance>>,
    ) -> Result<(), TaskError> {
        for entity in chunk.entities() {
            ctx.check_cancelled()?;
            let pool = self.world.pools().pool(entity.kind())?;
            let instance = pool.acquire();
            acquired.push(Arc::clone(&instance));
            instance.bind(entity, self.world.binder())?;
        }
        Ok(())
    }
}

impl Task for LoadChunkTask {
    type Output = Vec<Arc<PooledInstance>>;

    fn kind(&self) -> TaskKind {
        TaskKind::Load
    }

    fn coord(&self) -> ChunkCoord {
        self.coord
    }

    fn execute<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a, Self::Output> {
        Box::pin(async move {
            let chunk = self.chunk(ctx).await?;
            ctx.check_cancelled()?;

            let mut acquired = Vec::with_capacity(chunk.len());
            if let Err(e) = self.bind_all(ctx, &chunk, &mut acquired) {
                self.world.release_instances(&acquired);
                return Err(e);
            }

            // Past this point the instances belong to whoever reads the
            // outcome.
            if let Err(e) = ctx.commit(|| ()) {
                self.world.release_instances(&acquired);
                return Err(e);
            }

            debug!(
                x = self.coord.x,
                y = self.coord.y,
                instances = acquired.len(),
                "Chunk loaded"
            );
            Ok(acquired)
        })
    }
}
