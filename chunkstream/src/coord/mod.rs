//! Chunk grid coordinates.
//!
//! The world is an unbounded 2D grid of square chunks. A [`ChunkCoord`]
//! names one cell of that grid; world-space positions are mapped onto it
//! by floor division by the chunk size, so negative positions land in
//! negative cells rather than collapsing onto zero.

use std::fmt;

/// Integer position of a chunk on the world grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    /// Grid column (world X axis).
    pub x: i32,
    /// Grid row (world Z axis).
    pub y: i32,
}

impl ChunkCoord {
    /// The origin chunk.
    pub const ORIGIN: ChunkCoord = ChunkCoord { x: 0, y: 0 };

    /// Creates a coordinate from its components.
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Converts a world-space horizontal position to the chunk containing it.
    ///
    /// `world_x` maps to the grid column and `world_z` to the grid row,
    /// matching a Y-up world where the ground plane is XZ.
    #[inline]
    pub fn from_world(world_x: f32, world_z: f32, chunk_size: u32) -> Self {
        let size = chunk_size.max(1) as f32;
        Self {
            x: (world_x / size).floor() as i32,
            y: (world_z / size).floor() as i32,
        }
    }

    /// Squared euclidean distance in chunk units.
    ///
    /// Computed in `i64` so that far-apart coordinates cannot overflow.
    #[inline]
    pub fn distance_squared(&self, other: ChunkCoord) -> i64 {
        let dx = self.x as i64 - other.x as i64;
        let dy = self.y as i64 - other.y as i64;
        dx * dx + dy * dy
    }

    /// Euclidean distance in chunk units.
    #[inline]
    pub fn distance(&self, other: ChunkCoord) -> f32 {
        (self.distance_squared(other) as f64).sqrt() as f32
    }

    /// World-space position of this chunk's minimum corner, as `(x, z)`.
    #[inline]
    pub fn world_origin(&self, chunk_size: u32) -> (f32, f32) {
        (
            self.x as f32 * chunk_size as f32,
            self.y as f32 * chunk_size as f32,
        )
    }

    /// Returns the coordinate offset by `(dx, dy)`.
    #[inline]
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }

    /// Iterates every coordinate whose distance to `self` is at most `radius`.
    ///
    /// The membership test is squared-distance and inclusive. Coordinates
    /// are yielded row by row (ascending `y`, then ascending `x`), which
    /// keeps callers that collect into ordered sets deterministic.
    pub fn within_radius(&self, radius: f32) -> impl Iterator<Item = ChunkCoord> {
        let center = *self;
        let radius = radius.max(0.0);
        let reach = radius.floor() as i32;
        let radius_sq = (radius as f64) * (radius as f64);

        (-reach..=reach).flat_map(move |dy| {
            (-reach..=reach).filter_map(move |dx| {
                let coord = center.offset(dx, dy);
                if (center.distance_squared(coord) as f64) <= radius_sq {
                    Some(coord)
                } else {
                    None
                }
            })
        })
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i32, i32)> for ChunkCoord {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_world_floors_negative_positions() {
        assert_eq!(ChunkCoord::from_world(0.0, 0.0, 32), ChunkCoord::new(0, 0));
        assert_eq!(ChunkCoord::from_world(31.9, 31.9, 32), ChunkCoord::new(0, 0));
        assert_eq!(ChunkCoord::from_world(32.0, 64.0, 32), ChunkCoord::new(1, 2));
        assert_eq!(ChunkCoord::from_world(-0.1, -32.0, 32), ChunkCoord::new(-1, -1));
        assert_eq!(ChunkCoord::from_world(-32.1, 5.0, 32), ChunkCoord::new(-2, 0));
    }

    #[test]
    fn test_distance() {
        let a = ChunkCoord::new(0, 0);
        let b = ChunkCoord::new(3, 4);
        assert_eq!(a.distance_squared(b), 25);
        assert!((a.distance(b) - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_distance_does_not_overflow() {
        let a = ChunkCoord::new(i32::MIN, i32::MIN);
        let b = ChunkCoord::new(i32::MAX, i32::MAX);
        assert!(a.distance_squared(b) > 0);
    }

    #[test]
    fn test_within_radius_one_is_plus_shape() {
        let coords: Vec<_> = ChunkCoord::ORIGIN.within_radius(1.0).collect();
        assert_eq!(
            coords,
            vec![
                ChunkCoord::new(0, -1),
                ChunkCoord::new(-1, 0),
                ChunkCoord::new(0, 0),
                ChunkCoord::new(1, 0),
                ChunkCoord::new(0, 1),
            ]
        );
    }

    #[test]
    fn test_within_radius_sqrt2_is_full_block() {
        let coords: Vec<_> = ChunkCoord::ORIGIN
            .within_radius(std::f32::consts::SQRT_2)
            .collect();
        assert_eq!(coords.len(), 9);
    }

    #[test]
    fn test_within_radius_zero_is_center_only() {
        let center = ChunkCoord::new(5, -7);
        let coords: Vec<_> = center.within_radius(0.0).collect();
        assert_eq!(coords, vec![center]);
    }

    #[test]
    fn test_display() {
        assert_eq!(ChunkCoord::new(-3, 4).to_string(), "(-3, 4)");
    }
}
