//! Height passes.

use std::sync::Arc;

use noise::{NoiseFn, Perlin};

use crate::chunk::{Chunk, Entity, EntityKind, Heightmap, PropertyValue, Transform, HEIGHTMAP_PROPERTY};
use crate::scheduler::TaskError;

use super::{unit_noise, GeneratorPass, PassContext};

/// Walks every heightmap sample of `chunk` row by row, adding
/// `height(world_x, world_z)` to it. Checks cancellation before each row.
fn add_heights(
    ctx: &PassContext<'_>,
    chunk: &mut Chunk,
    mut height: impl FnMut(f64, f64) -> f32,
) -> Result<(), TaskError> {
    let (origin_x, origin_z) = chunk.world_origin(ctx.chunk_size());
    let resolution = ctx.resolution().max(1) as f64;
    let Some(map) = chunk.heightmap_mut() else {
        return Ok(());
    };

    for y in 0..map.side() {
        ctx.check_cancelled()?;
        let world_z = origin_z as f64 + y as f64 / resolution;
        if let Some(row) = map.row_mut(y) {
            for (x, sample) in row.iter_mut().enumerate() {
                let world_x = origin_x as f64 + x as f64 / resolution;
                *sample += height(world_x, world_z);
            }
        }
    }
    Ok(())
}

/// Creates the terrain entity and fills its heightmap with fractal noise.
#[derive(Clone, Debug)]
pub struct TerrainPass {
    pub amplitude: f32,
    pub frequency: f64,
    pub octaves: u32,
    pub persistence: f32,
    pub lacunarity: f64,
}

impl Default for TerrainPass {
    fn default() -> Self {
        Self {
            amplitude: 5.0,
            frequency: 0.05,
            octaves: 3,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

impl TerrainPass {
    fn height(&self, perlin: &Perlin, offset: f64, x: f64, z: f64) -> f32 {
        let mut total = 0.0;
        let mut weight = 1.0;
        let mut weights = 0.0;
        let mut frequency = self.frequency;
        for _ in 0..self.octaves.max(1) {
            total += unit_noise(perlin.get([(x + offset) * frequency, (z + offset) * frequency])) * weight;
            weights += weight;
            weight *= self.persistence;
            frequency *= self.lacunarity;
        }
        total / weights * self.amplitude
    }
}

impl GeneratorPass for TerrainPass {
    fn name(&self) -> &'static str {
        "terrain"
    }

    fn produces(&self) -> &[EntityKind] {
        &[EntityKind::TERRAIN]
    }

    fn apply(&self, ctx: &PassContext<'_>, chunk: &mut Chunk) -> Result<(), TaskError> {
        let side = ctx.samples_per_edge();
        let (origin_x, origin_z) = chunk.world_origin(ctx.chunk_size());

        if chunk.terrain().is_none() {
            chunk.add_entity(
                Entity::new(EntityKind::TERRAIN).with_transform(Transform::at([origin_x, 0.0, origin_z])),
            );
        }
        if let Some(terrain) = chunk.entity_of_kind_mut(EntityKind::TERRAIN) {
            if terrain.heightmap().map(|h| h.side()) != Some(side) {
                terrain.set_property(
                    HEIGHTMAP_PROPERTY,
                    PropertyValue::Heightmap(Arc::new(Heightmap::new(side))),
                );
            }
        }

        let perlin = Perlin::new(ctx.noise_offset());
        let offset = f64::from(ctx.noise_offset());
        add_heights(ctx, chunk, |x, z| self.height(&perlin, offset, x, z))
    }
}

/// Adds ridged noise for mountain chains.
#[derive(Clone, Debug)]
pub struct MountainPass {
    pub weight: f32,
    pub frequency: f64,
    pub sharpness: f32,
}

impl Default for MountainPass {
    fn default() -> Self {
        Self {
            weight: 0.8,
            frequency: 0.005,
            sharpness: 2.0,
        }
    }
}

impl GeneratorPass for MountainPass {
    fn name(&self) -> &'static str {
        "mountain"
    }

    fn apply(&self, ctx: &PassContext<'_>, chunk: &mut Chunk) -> Result<(), TaskError> {
        let perlin = Perlin::new(ctx.noise_offset());
        let offset = f64::from(ctx.noise_offset());
        add_heights(ctx, chunk, |x, z| {
            let n = unit_noise(perlin.get([(x + offset) * self.frequency, (z + offset) * self.frequency]));
            let ridge = 1.0 - (2.0 * n - 1.0).abs();
            ridge.powf(self.sharpness) * self.weight
        })
    }
}

/// Carves river channels where the flow noise crosses its midpoint.
#[derive(Clone, Debug)]
pub struct RiverPass {
    pub frequency: f64,
    pub depth: f32,
    pub width: f32,
}

impl Default for RiverPass {
    fn default() -> Self {
        Self {
            frequency: 0.01,
            depth: 5.0,
            width: 0.1,
        }
    }
}

impl GeneratorPass for RiverPass {
    fn name(&self) -> &'static str {
        "river"
    }

    fn apply(&self, ctx: &PassContext<'_>, chunk: &mut Chunk) -> Result<(), TaskError> {
        let perlin = Perlin::new(ctx.noise_offset());
        let offset = f64::from(ctx.noise_offset());
        let width = self.width.max(f32::EPSILON);
        add_heights(ctx, chunk, |x, z| {
            let flow = unit_noise(perlin.get([(x + offset) * self.frequency, (z + offset) * self.frequency]));
            let dist = (flow - 0.5).abs();
            if dist < width {
                -(1.0 - dist / width) * self.depth
            } else {
                0.0
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::coord::ChunkCoord;
    use tokio_util::sync::CancellationToken;

    fn world() -> WorldConfig {
        WorldConfig {
            chunk_size: 4,
            resolution: 2,
            ..WorldConfig::default()
        }
    }

    #[test]
    fn test_terrain_pass_creates_heightmap() {
        let world = world();
        let token = CancellationToken::new();
        let ctx = PassContext::new(&world, 1234, &token);
        let mut chunk = Chunk::new(ChunkCoord::new(2, 3));

        TerrainPass::default().apply(&ctx, &mut chunk).unwrap();

        let terrain = chunk.terrain().unwrap();
        assert_eq!(terrain.transform.position, [8.0, 0.0, 12.0]);
        let map = chunk.heightmap().unwrap();
        assert_eq!(map.side(), 9);
        let (lo, hi) = map.range().unwrap();
        assert!(lo >= 0.0 && hi <= 5.0);
    }

    #[test]
    fn test_terrain_pass_reuses_existing_entity() {
        let world = world();
        let token = CancellationToken::new();
        let ctx = PassContext::new(&world, 7, &token);
        let mut chunk = Chunk::new(ChunkCoord::ORIGIN);

        let pass = TerrainPass::default();
        pass.apply(&ctx, &mut chunk).unwrap();
        let once = chunk.heightmap().unwrap().get(3, 3);
        pass.apply(&ctx, &mut chunk).unwrap();

        assert_eq!(chunk.entities_of_kind(EntityKind::TERRAIN).count(), 1);
        assert!((chunk.heightmap().unwrap().get(3, 3) - once * 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_neighbouring_chunks_share_border() {
        let world = world();
        let token = CancellationToken::new();
        let ctx = PassContext::new(&world, 99, &token);
        let pass = TerrainPass::default();

        let mut west = Chunk::new(ChunkCoord::new(0, 0));
        let mut east = Chunk::new(ChunkCoord::new(1, 0));
        pass.apply(&ctx, &mut west).unwrap();
        pass.apply(&ctx, &mut east).unwrap();

        let west_map = west.heightmap().unwrap();
        let east_map = east.heightmap().unwrap();
        let last = west_map.side() - 1;
        for y in 0..west_map.side() {
            assert!((west_map.get(last, y) - east_map.get(0, y)).abs() < 1e-4);
        }
    }

    #[test]
    fn test_height_passes_skip_chunks_without_terrain() {
        let world = world();
        let token = CancellationToken::new();
        let ctx = PassContext::new(&world, 5, &token);
        let mut chunk = Chunk::new(ChunkCoord::ORIGIN);
        MountainPass::default().apply(&ctx, &mut chunk).unwrap();
        RiverPass::default().apply(&ctx, &mut chunk).unwrap();
        assert!(chunk.is_empty());
    }

    #[test]
    fn test_river_only_lowers() {
        let world = world();
        let token = CancellationToken::new();
        let ctx = PassContext::new(&world, 5, &token);
        let mut chunk = Chunk::new(ChunkCoord::ORIGIN);
        TerrainPass {
            amplitude: 0.0,
            ..TerrainPass::default()
        }
        .apply(&ctx, &mut chunk)
        .unwrap();

        RiverPass {
            width: 1.0,
            ..RiverPass::default()
        }
        .apply(&ctx, &mut chunk)
        .unwrap();

        let (_, hi) = chunk.heightmap().unwrap().range().unwrap();
        assert!(hi <= 0.0);
    }

    #[test]
    fn test_cancelled_pass_stops() {
        let world = world();
        let token = CancellationToken::new();
        token.cancel();
        let ctx = PassContext::new(&world, 5, &token);
        let mut chunk = Chunk::new(ChunkCoord::ORIGIN);
        assert_eq!(
            TerrainPass::default().apply(&ctx, &mut chunk),
            Err(TaskError::Cancelled)
        );
    }
}
