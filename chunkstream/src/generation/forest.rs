//! Tree placement.

use noise::{NoiseFn, Perlin};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::chunk::{Chunk, Entity, EntityKind, Transform};
use crate::coord::ChunkCoord;
use crate::scheduler::TaskError;

use super::{unit_noise, GeneratorPass, PassContext};

/// Places trees on a jittered grid, denser in valleys and absent from
/// plains patches.
#[derive(Clone, Debug)]
pub struct ForestPass {
    pub forest_frequency: f64,
    /// Spawn probability range `(min, max)`.
    pub spawn_chance: (f32, f32),
    pub plains_frequency: f64,
    /// Plains noise above this suppresses trees.
    pub plains_threshold: f32,
    /// Heights `(low, high)`: full valley boost at or below `low`, none at
    /// or above `high`.
    pub elevation: (f32, f32),
    pub valley_boost: f32,
    /// Grid spacing in world units.
    pub tree_spacing: u32,
    /// Fraction of the spacing a tree may drift from its grid point.
    pub tree_jitter: f32,
    pub tree_scale: (f32, f32),
}

impl Default for ForestPass {
    fn default() -> Self {
        Self {
            forest_frequency: 0.01,
            spawn_chance: (0.2, 0.9),
            plains_frequency: 0.005,
            plains_threshold: 0.6,
            elevation: (10.0, 20.0),
            valley_boost: 0.5,
            tree_spacing: 4,
            tree_jitter: 0.2,
            tree_scale: (0.6, 1.4),
        }
    }
}

fn lerp((a, b): (f32, f32), t: f32) -> f32 {
    a + (b - a) * t
}

fn inverse_lerp(a: f32, b: f32, value: f32) -> f32 {
    if (b - a).abs() < f32::EPSILON {
        0.0
    } else {
        ((value - a) / (b - a)).clamp(0.0, 1.0)
    }
}

/// Per-chunk RNG seed mixing the pass offset with the coordinate.
fn chunk_seed(offset: u32, coord: ChunkCoord) -> u64 {
    let position = (u64::from(coord.x as u32) << 32) | u64::from(coord.y as u32);
    u64::from(offset).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ position
}

impl GeneratorPass for ForestPass {
    fn name(&self) -> &'static str {
        "forest"
    }

    fn produces(&self) -> &[EntityKind] {
        &[EntityKind::TREE]
    }

    fn apply(&self, ctx: &PassContext<'_>, chunk: &mut Chunk) -> Result<(), TaskError> {
        let Some(heightmap) = chunk.heightmap().cloned() else {
            return Ok(());
        };

        let resolution = ctx.resolution().max(1) as f32;
        let size = (ctx.chunk_size() * ctx.resolution().max(1)) as usize;
        let step = (self.tree_spacing.max(1) * ctx.resolution().max(1)) as usize;
        let (origin_x, origin_z) = chunk.world_origin(ctx.chunk_size());
        let offset = f64::from(ctx.noise_offset());
        let perlin = Perlin::new(ctx.noise_offset());
        let mut rng = StdRng::seed_from_u64(chunk_seed(ctx.noise_offset(), chunk.coord()));

        for y in (0..size).step_by(step) {
            ctx.check_cancelled()?;
            for x in (0..size).step_by(step) {
                let jitter_x = (rng.random::<f32>() - 0.5) * self.tree_jitter * step as f32;
                let jitter_y = (rng.random::<f32>() - 0.5) * self.tree_jitter * step as f32;
                let local_x = x as f32 + jitter_x;
                let local_y = y as f32 + jitter_y;

                let world_x = origin_x + local_x / resolution;
                let world_z = origin_z + local_y / resolution;
                let height = heightmap.sample(local_x, local_y);

                let nx = f64::from(world_x) + offset;
                let nz = f64::from(world_z) + offset;
                let forest = unit_noise(perlin.get([nx * self.forest_frequency, nz * self.forest_frequency]));
                let plains = unit_noise(perlin.get([nx * self.plains_frequency, nz * self.plains_frequency]));
                if plains > self.plains_threshold {
                    continue;
                }

                let valley = inverse_lerp(self.elevation.1, self.elevation.0, height);
                let boosted = valley.powf(1.5) * (1.0 + forest * self.valley_boost);
                let probability = lerp(self.spawn_chance, boosted.clamp(0.0, 1.0));
                if rng.random::<f32>() > probability {
                    continue;
                }

                let yaw = rng.random_range(0.0..360.0);
                let scale = lerp(self.tree_scale, rng.random::<f32>());
                chunk.add_entity(
                    Entity::new(EntityKind::TREE).with_transform(
                        Transform::at([world_x, height, world_z])
                            .with_yaw_degrees(yaw)
                            .with_uniform_scale(scale),
                    ),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::generation::TerrainPass;
    use tokio_util::sync::CancellationToken;

    fn world() -> WorldConfig {
        WorldConfig {
            chunk_size: 32,
            resolution: 1,
            ..WorldConfig::default()
        }
    }

    /// Flat terrain with every tree guaranteed to spawn.
    fn dense() -> ForestPass {
        ForestPass {
            spawn_chance: (1.0, 1.0),
            plains_threshold: 1.0,
            ..ForestPass::default()
        }
    }

    fn flat_chunk(ctx: &PassContext<'_>, coord: ChunkCoord) -> Chunk {
        let mut chunk = Chunk::new(coord);
        TerrainPass {
            amplitude: 0.0,
            ..TerrainPass::default()
        }
        .apply(ctx, &mut chunk)
        .unwrap();
        chunk
    }

    #[test]
    fn test_dense_forest_fills_grid() {
        let world = world();
        let token = CancellationToken::new();
        let ctx = PassContext::new(&world, 42, &token);
        let mut chunk = flat_chunk(&ctx, ChunkCoord::new(1, 0));

        dense().apply(&ctx, &mut chunk).unwrap();

        // 32 / 4 = 8 grid points per edge.
        assert_eq!(chunk.entities_of_kind(EntityKind::TREE).count(), 64);
        for tree in chunk.entities_of_kind(EntityKind::TREE) {
            let [x, y, z] = tree.transform.position;
            assert!((31.5..64.5).contains(&x));
            assert!((-0.5..32.5).contains(&z));
            assert_eq!(y, 0.0);
            let scale = tree.transform.scale[0];
            assert!((0.6..=1.4).contains(&scale));
        }
    }

    #[test]
    fn test_placement_is_deterministic() {
        let world = world();
        let token = CancellationToken::new();
        let ctx = PassContext::new(&world, 42, &token);
        let pass = ForestPass::default();

        let mut a = flat_chunk(&ctx, ChunkCoord::new(-3, 7));
        let mut b = flat_chunk(&ctx, ChunkCoord::new(-3, 7));
        pass.apply(&ctx, &mut a).unwrap();
        pass.apply(&ctx, &mut b).unwrap();

        let transforms = |c: &Chunk| -> Vec<Transform> {
            c.entities_of_kind(EntityKind::TREE).map(|e| e.transform).collect()
        };
        assert_eq!(transforms(&a), transforms(&b));
    }

    #[test]
    fn test_no_trees_on_plains() {
        let world = world();
        let token = CancellationToken::new();
        let ctx = PassContext::new(&world, 42, &token);
        let mut chunk = flat_chunk(&ctx, ChunkCoord::ORIGIN);

        ForestPass {
            plains_threshold: -1.0,
            ..dense()
        }
        .apply(&ctx, &mut chunk)
        .unwrap();
        assert_eq!(chunk.entities_of_kind(EntityKind::TREE).count(), 0);
    }

    #[test]
    fn test_requires_terrain() {
        let world = world();
        let token = CancellationToken::new();
        let ctx = PassContext::new(&world, 42, &token);
        let mut chunk = Chunk::new(ChunkCoord::ORIGIN);
        dense().apply(&ctx, &mut chunk).unwrap();
        assert!(chunk.is_empty());
    }

    #[test]
    fn test_chunk_seed_varies_by_coordinate() {
        assert_ne!(
            chunk_seed(1, ChunkCoord::new(0, 1)),
            chunk_seed(1, ChunkCoord::new(1, 0))
        );
        assert_ne!(
            chunk_seed(1, ChunkCoord::ORIGIN),
            chunk_seed(2, ChunkCoord::ORIGIN)
        );
    }
}
