//! Chunk generation.
//!
//! A [`Generator`] runs an ordered list of [`GeneratorPass`]es over a fresh
//! [`Chunk`]. Each pass is an opaque step: height passes add to the terrain
//! heightmap, feature passes append entities. The streaming core only
//! calls [`Generator::generate`] once per coordinate, from a Generate task.
//!
//! Every pass gets its own noise offset, derived from the world seed and the
//! pass name, so two passes never sample the same noise field.
//!
//! # Built-in passes
//!
//! | Pass            | Effect                                       |
//! |-----------------|----------------------------------------------|
//! | [`TerrainPass`] | Creates the terrain entity, fractal heights |
//! | [`MountainPass`]| Adds ridged mountain noise                  |
//! | [`RiverPass`]   | Carves river channels                       |
//! | [`ForestPass`]  | Places tree entities on a jittered grid     |

mod forest;
mod terrain;

pub use forest::ForestPass;
pub use terrain::{MountainPass, RiverPass, TerrainPass};

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::chunk::{Chunk, EntityKind};
use crate::config::{hash_seed, WorldConfig};
use crate::coord::ChunkCoord;
use crate::scheduler::TaskError;

/// Per-pass view of the world settings and the running task.
pub struct PassContext<'a> {
    world: &'a WorldConfig,
    noise_offset: u32,
    cancel: &'a CancellationToken,
}

impl<'a> PassContext<'a> {
    pub fn new(world: &'a WorldConfig, noise_offset: u32, cancel: &'a CancellationToken) -> Self {
        Self {
            world,
            noise_offset,
            cancel,
        }
    }

    pub fn world(&self) -> &WorldConfig {
        self.world
    }

    pub fn chunk_size(&self) -> u32 {
        self.world.chunk_size
    }

    pub fn resolution(&self) -> u32 {
        self.world.resolution
    }

    /// Heightmap samples per chunk edge.
    pub fn samples_per_edge(&self) -> usize {
        self.world.samples_per_edge()
    }

    /// Deterministic offset for this pass's noise, in `1..=SEED_RANGE`.
    pub fn noise_offset(&self) -> u32 {
        self.noise_offset
    }

    /// `Err(TaskError::Cancelled)` once the running task is cancelled.
    pub fn check_cancelled(&self) -> Result<(), TaskError> {
        if self.cancel.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// One step of chunk generation.
pub trait GeneratorPass: Send + Sync {
    /// Stable name; also salts the pass's noise offset.
    fn name(&self) -> &'static str;

    /// Entity kinds this pass may add. Each needs a registered pool.
    fn produces(&self) -> &[EntityKind] {
        &[]
    }

    /// Mutates `chunk`. Long passes should call
    /// [`PassContext::check_cancelled`] once per row.
    fn apply(&self, ctx: &PassContext<'_>, chunk: &mut Chunk) -> Result<(), TaskError>;
}

struct RegisteredPass {
    pass: Arc<dyn GeneratorPass>,
    noise_offset: u32,
}

/// Ordered pass pipeline for one world.
pub struct Generator {
    world: WorldConfig,
    passes: Vec<RegisteredPass>,
}

impl Generator {
    /// Creates a generator with no passes.
    pub fn new(world: WorldConfig) -> Self {
        Self {
            world,
            passes: Vec::new(),
        }
    }

    /// Terrain, mountain, river and forest passes with default settings.
    pub fn standard(world: WorldConfig) -> Self {
        Self::new(world)
            .with_pass(TerrainPass::default())
            .with_pass(MountainPass::default())
            .with_pass(RiverPass::default())
            .with_pass(ForestPass::default())
    }

    /// Appends a pass.
    pub fn with_pass(mut self, pass: impl GeneratorPass + 'static) -> Self {
        self.add_pass(Arc::new(pass));
        self
    }

    /// Appends a shared pass.
    pub fn add_pass(&mut self, pass: Arc<dyn GeneratorPass>) {
        let noise_offset = hash_seed(&format!("{}{}", self.world.seed, pass.name()));
        self.passes.push(RegisteredPass { pass, noise_offset });
    }

    pub fn world(&self) -> &WorldConfig {
        &self.world
    }

    /// Pass names, in execution order.
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.pass.name()).collect()
    }

    /// Every entity kind the passes may produce, plus terrain.
    pub fn produces(&self) -> BTreeSet<EntityKind> {
        let mut kinds: BTreeSet<EntityKind> = self
            .passes
            .iter()
            .flat_map(|p| p.pass.produces().iter().copied())
            .collect();
        kinds.insert(EntityKind::TERRAIN);
        kinds
    }

    /// Runs every pass over a new chunk at `coord`.
    ///
    /// Blocking; call it from a worker thread.
    pub fn generate(&self, coord: ChunkCoord, cancel: &CancellationToken) -> Result<Chunk, TaskError> {
        let mut chunk = Chunk::new(coord);
        for registered in &self.passes {
            if cancel.is_cancelled() {
                return Err(TaskError::Cancelled);
            }
            let ctx = PassContext::new(&self.world, registered.noise_offset, cancel);
            registered.pass.apply(&ctx, &mut chunk)?;
            trace!(
                x = coord.x,
                y = coord.y,
                pass = registered.pass.name(),
                entities = chunk.len(),
                "Generator pass applied"
            );
        }
        Ok(chunk)
    }
}

/// Maps Perlin output from `[-1, 1]` to `[0, 1]`.
pub(crate) fn unit_noise(value: f64) -> f32 {
    ((value as f32 + 1.0) * 0.5).clamp(0.0, 1.0)
}
