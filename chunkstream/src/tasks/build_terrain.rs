//! Build terrain task.
//!
//! [`BuildTerrainTask`] triangulates a resident chunk's heightmap at one
//! level of detail. The mesh is returned, not applied: the streaming
//! controller shows it on the terrain instance only if the chunk is still
//! resident when the build completes, and caches it per level.

use std::sync::Arc;

use tracing::trace;

use crate::chunk::TerrainMesh;
use crate::coord::ChunkCoord;
use crate::scheduler::{Task, TaskContext, TaskError, TaskFuture, TaskKind};

use super::World;

/// Builds the terrain mesh of one chunk.
pub struct BuildTerrainTask {
    world: Arc<World>,
    coord: ChunkCoord,
    lod: u8,
}

impl BuildTerrainTask {
    pub fn new(world: Arc<World>, coord: ChunkCoord, lod: u8) -> Self {
        Self { world, coord, lod }
    }

    pub fn lod(&self) -> u8 {
        self.lod
    }
}

impl Task for BuildTerrainTask {
    type Output = Arc<TerrainMesh>;

    fn kind(&self) -> TaskKind {
        TaskKind::Build
    }

    fn coord(&self) -> ChunkCoord {
        self.coord
    }

    fn execute<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a, Self::Output> {
        Box::pin(async move {
            let chunk = self
                .world
                .store()
                .get(self.coord)
                .ok_or(TaskError::MissingChunk(self.coord))?;
            let heightmap = chunk
                .heightmap()
                .cloned()
                .ok_or_else(|| TaskError::faulted(format!("chunk {} has no heightmap", self.coord)))?;
            ctx.check_cancelled()?;

            let lod = self.lod;
            let resolution = self.world.world_config().resolution;
            let token = ctx.cancellation_token();
            let mesh = tokio::task::spawn_blocking(move || {
                TerrainMesh::build(&heightmap, lod, resolution, &token)
            })
            .await
            .map_err(|e| TaskError::faulted(format!("mesh worker failed: {}", e)))??;

            trace!(
                x = self.coord.x,
                y = self.coord.y,
                lod,
                triangles = mesh.triangle_count(),
                "Terrain mesh built"
            );
            Ok(Arc::new(mesh))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TaskOutcome;
    use crate::tasks::test_support::{scheduler, world};
    use crate::tasks::GenerateChunkTask;

    #[tokio::test]
    async fn test_build_requires_chunk() {
        let world = world();
        let scheduler = scheduler(2);
        let coord = ChunkCoord::new(3, 3);

        let handle = scheduler
            .submit(BuildTerrainTask::new(Arc::clone(&world), coord, 0))
            .unwrap();
        scheduler.pump();

        assert_eq!(
            handle.wait().await,
            TaskOutcome::Faulted(TaskError::MissingChunk(coord))
        );
    }

    #[tokio::test]
    async fn test_build_at_lod() {
        let world = world();
        let scheduler = scheduler(2);
        let coord = ChunkCoord::new(0, 1);

        let generated = scheduler
            .submit(GenerateChunkTask::new(Arc::clone(&world), coord))
            .unwrap();
        scheduler.pump();
        let chunk = generated.wait().await.completed().unwrap();
        let side = chunk.heightmap().unwrap().side();

        let full = scheduler
            .submit(BuildTerrainTask::new(Arc::clone(&world), coord, 0))
            .unwrap();
        scheduler.pump();
        let full = full.wait().await.completed().unwrap();
        assert_eq!(full.lod(), 0);
        assert_eq!(full.vertex_count(), side * side);

        let coarse = scheduler
            .submit(BuildTerrainTask::new(Arc::clone(&world), coord, 2))
            .unwrap();
        scheduler.pump();
        let coarse = coarse.wait().await.completed().unwrap();
        assert_eq!(coarse.lod(), 2);
        assert!(coarse.vertex_count() < full.vertex_count());
    }
}
