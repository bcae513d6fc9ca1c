//! Terrain meshes at a chosen level of detail.

use tokio_util::sync::CancellationToken;

use crate::scheduler::TaskError;

use super::heightmap::Heightmap;

/// A triangulated terrain surface in chunk-local coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct TerrainMesh {
    lod: u8,
    positions: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    indices: Vec<u32>,
}

impl TerrainMesh {
    /// Builds a mesh from `heightmap`, keeping every `2^lod`-th sample.
    ///
    /// The last row and column are always kept so neighbouring chunks meet
    /// at the border. `resolution` is heightmap samples per world unit.
    /// Cancellation is checked before each row.
    pub fn build(
        heightmap: &Heightmap,
        lod: u8,
        resolution: u32,
        cancel: &CancellationToken,
    ) -> Result<TerrainMesh, TaskError> {
        let side = heightmap.side();
        let samples = lod_samples(side, lod);
        let width = samples.len();
        let last = side.saturating_sub(1).max(1) as f32;
        let scale = 1.0 / resolution.max(1) as f32;

        let mut positions = Vec::with_capacity(width * width);
        let mut uvs = Vec::with_capacity(width * width);
        for &y in &samples {
            if cancel.is_cancelled() {
                return Err(TaskError::Cancelled);
            }
            for &x in &samples {
                positions.push([
                    x as f32 * scale,
                    heightmap.get(x, y),
                    y as f32 * scale,
                ]);
                uvs.push([x as f32 / last, y as f32 / last]);
            }
        }

        let quads = width.saturating_sub(1);
        let mut indices = Vec::with_capacity(quads * quads * 6);
        for row in 0..quads {
            for col in 0..quads {
                let i = (row * width + col) as u32;
                let w = width as u32;
                indices.extend_from_slice(&[i, i + w, i + w + 1, i, i + w + 1, i + 1]);
            }
        }

        Ok(TerrainMesh {
            lod,
            positions,
            uvs,
            indices,
        })
    }

    pub fn lod(&self) -> u8 {
        self.lod
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    pub fn uvs(&self) -> &[[f32; 2]] {
        &self.uvs
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Sample indices kept at `lod`: multiples of the stride plus the last one.
fn lod_samples(side: usize, lod: u8) -> Vec<usize> {
    if side == 0 {
        return Vec::new();
    }
    let stride = 1usize << lod.min(16);
    let mut samples: Vec<usize> = (0..side).step_by(stride).collect();
    if samples.last() != Some(&(side - 1)) {
        samples.push(side - 1);
    }
    samples
}
