//! Desired-set diffing.
//!
//! Pure functions of the observer's chunk, the load radius and the
//! controller's bookkeeping. No hidden state feeds into a plan, so the same
//! inputs always produce the same load and unload decisions.

use std::collections::{BTreeMap, BTreeSet};

use crate::coord::ChunkCoord;

/// Every coordinate within `radius` of `center`, inclusive.
pub fn desired_set(center: ChunkCoord, radius: f32) -> BTreeSet<ChunkCoord> {
    center.within_radius(radius).collect()
}

/// Work one controller tick should issue.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamPlan {
    /// Resident coordinates that left the desired set.
    pub unload: Vec<ChunkCoord>,

    /// Desired coordinates with nothing resident or in flight, nearest
    /// first.
    pub load: Vec<ChunkCoord>,

    /// In-flight loads whose coordinate left the desired set.
    pub cancel_loads: Vec<ChunkCoord>,
}

impl StreamPlan {
    /// Returns true if the plan issues no work.
    pub fn is_empty(&self) -> bool {
        self.unload.is_empty() && self.load.is_empty() && self.cancel_loads.is_empty()
    }
}

/// Diffs `desired` against the resident and in-flight coordinates.
///
/// A coordinate being unloaded is neither unloaded again nor loaded until
/// its unload finishes, so no coordinate is ever loading and unloading at
/// the same time.
pub fn plan<R, L, U>(
    center: ChunkCoord,
    desired: &BTreeSet<ChunkCoord>,
    resident: &BTreeMap<ChunkCoord, R>,
    loading: &BTreeMap<ChunkCoord, L>,
    unloading: &BTreeMap<ChunkCoord, U>,
) -> StreamPlan {
    let unload = resident
        .keys()
        .filter(|&&coord| !desired.contains(&coord) && !unloading.contains_key(&coord))
        .copied()
        .collect();

    let mut load: Vec<ChunkCoord> = desired
        .iter()
        .filter(|&&coord| {
            !resident.contains_key(&coord)
                && !loading.contains_key(&coord)
                && !unloading.contains_key(&coord)
        })
        .copied()
        .collect();
    load.sort_by_key(|coord| (center.distance_squared(*coord), *coord));

    let cancel_loads = loading
        .keys()
        .filter(|&&coord| !desired.contains(&coord))
        .copied()
        .collect();

    StreamPlan {
        unload,
        load,
        cancel_loads,
    }
}
