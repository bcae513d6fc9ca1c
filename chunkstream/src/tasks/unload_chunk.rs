//! Unload chunk task.
//!
//! [`UnloadChunkTask`] unbinds a resident chunk's instances and returns
//! them to their pools. The whole release happens inside one commit, so an
//! unload is either cancelled before touching anything or runs to the end.

use std::sync::Arc;

use tracing::debug;

use crate::coord::ChunkCoord;
use crate::pool::PooledInstance;
use crate::scheduler::{Task, TaskContext, TaskFuture, TaskKind};

use super::World;

/// Releases the views of one chunk.
pub struct UnloadChunkTask {
    world: Arc<World>,
    coord: ChunkCoord,
    instances: Vec<Arc<PooledInstance>>,
}

impl UnloadChunkTask {
    pub fn new(world: Arc<World>, coord: ChunkCoord, instances: Vec<Arc<PooledInstance>>) -> Self {
        Self {
            world,
            coord,
            instances,
        }
    }
}

impl Task for UnloadChunkTask {
    type Output = ();

    fn kind(&self) -> TaskKind {
        TaskKind::Unload
    }

    fn coord(&self) -> ChunkCoord {
        self.coord
    }

    fn execute<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a, Self::Output> {
        Box::pin(async move {
            let released = ctx.commit(|| self.world.release_instances(&self.instances))?;
            debug!(x = self.coord.x, y = self.coord.y, released, "Chunk unloaded");
            Ok(())
        })
    }
}
