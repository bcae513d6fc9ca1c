//! Level-of-detail selection.

/// Level of detail for a chunk `distance` chunks from the observer.
///
/// A step function: level `n` covers distances in `[n * step, (n + 1) * step)`,
/// clamped to `max_level`. A non-positive step always selects level 0.
pub fn lod_for_distance(distance: f32, step: f32, max_level: u8) -> u8 {
    if step.is_nan() || step <= 0.0 || distance.is_nan() || distance <= 0.0 {
        return 0;
    }
    let level = (distance / step).floor();
    if level >= f32::from(max_level) {
        max_level
    } else {
        level as u8
    }
}
