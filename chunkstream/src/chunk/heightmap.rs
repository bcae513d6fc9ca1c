//! Square height grids.

/// A square grid of height samples, stored row-major (`y * side + x`).
///
/// A chunk's heightmap has `chunk_size * resolution + 1` samples per edge so
/// that neighbouring chunks share their border row.
#[derive(Clone, Debug, PartialEq)]
pub struct Heightmap {
    side: usize,
    samples: Vec<f32>,
}

impl Heightmap {
    /// Creates a flat heightmap with `side × side` samples.
    pub fn new(side: usize) -> Self {
        Self {
            side,
            samples: vec![0.0; side * side],
        }
    }

    /// Samples per edge.
    pub fn side(&self) -> usize {
        self.side
    }

    /// Height at integer sample `(x, y)`; out-of-range indices are clamped.
    pub fn get(&self, x: usize, y: usize) -> f32 {
        if self.side == 0 {
            return 0.0;
        }
        let x = x.min(self.side - 1);
        let y = y.min(self.side - 1);
        self.samples[y * self.side + x]
    }

    /// Overwrites the sample at `(x, y)`. Out-of-range writes are ignored.
    pub fn set(&mut self, x: usize, y: usize, height: f32) {
        if x < self.side && y < self.side {
            self.samples[y * self.side + x] = height;
        }
    }

    /// Adds to the sample at `(x, y)`. Out-of-range writes are ignored.
    pub fn add(&mut self, x: usize, y: usize, delta: f32) {
        if x < self.side && y < self.side {
            self.samples[y * self.side + x] += delta;
        }
    }

    /// Mutable access to one row of samples.
    pub fn row_mut(&mut self, y: usize) -> Option<&mut [f32]> {
        if y >= self.side {
            return None;
        }
        let start = y * self.side;
        Some(&mut self.samples[start..start + self.side])
    }

    /// Bilinearly interpolated height at fractional sample position.
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        if self.side == 0 {
            return 0.0;
        }
        let max = (self.side - 1) as f32;
        let x = x.clamp(0.0, max);
        let y = y.clamp(0.0, max);

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let bottom = lerp(self.get(x0, y0), self.get(x0 + 1, y0), fx);
        let top = lerp(self.get(x0, y0 + 1), self.get(x0 + 1, y0 + 1), fx);
        lerp(bottom, top, fy)
    }

    /// Lowest and highest sample, or `None` when empty.
    pub fn range(&self) -> Option<(f32, f32)> {
        self.samples.iter().fold(None, |acc, &h| match acc {
            None => Some((h, h)),
            Some((lo, hi)) => Some((lo.min(h), hi.max(h))),
        })
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_and_clamp() {
        let mut map = Heightmap::new(3);
        map.set(2, 1, 5.0);
        assert_eq!(map.get(2, 1), 5.0);
        assert_eq!(map.get(10, 1), 5.0);
        map.set(10, 10, 1.0);
        assert_eq!(map.range(), Some((0.0, 5.0)));
    }

    #[test]
    fn test_bilinear_sample() {
        let mut map = Heightmap::new(2);
        map.set(0, 0, 0.0);
        map.set(1, 0, 2.0);
        map.set(0, 1, 2.0);
        map.set(1, 1, 4.0);
        assert!((map.sample(0.5, 0.5) - 2.0).abs() < 1e-6);
        assert!((map.sample(1.0, 0.0) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_row_mut() {
        let mut map = Heightmap::new(4);
        if let Some(row) = map.row_mut(2) {
            row.iter_mut().for_each(|h| *h = 1.0);
        }
        assert_eq!(map.get(3, 2), 1.0);
        assert_eq!(map.get(3, 1), 0.0);
        assert!(map.row_mut(4).is_none());
    }

    #[test]
    fn test_empty_heightmap() {
        let map = Heightmap::new(0);
        assert_eq!(map.sample(1.0, 1.0), 0.0);
        assert_eq!(map.range(), None);
    }
}
