//! Streaming controller.
//!
//! [`StreamingController`] keeps the set of resident chunks in step with an
//! [`Observer`]. Once per tick it:
//!
//! 1. Applies the outcomes of loads, unloads and builds that finished since
//!    the last tick.
//! 2. Reads the observer position (skipping the rest of the tick without
//!    one) and moves the scheduler's focus to the observer's chunk.
//! 3. Diffs the desired set against the residency map: cancels stale
//!    loads, submits unloads, then submits loads nearest first.
//! 4. Picks a level of detail for every resident terrain and applies a
//!    cached mesh or submits a build.
//! 5. Evicts generated chunks beyond the retain radius from the store.
//!
//! The residency map is only touched from [`tick`](StreamingController::tick),
//! so task completions are serialized onto the controller.
//!
//! # Residency
//!
//! A coordinate is resident from the tick its Load outcome is applied
//! until the tick its Unload outcome is applied. A cancelled or faulted
//! unload leaves the coordinate resident; the next tick's diff retries it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::chunk::{EntityKind, TerrainMesh};
use crate::coord::ChunkCoord;
use crate::pool::PooledInstance;
use crate::scheduler::{CompletionHandle, Scheduler, SchedulerError, TaskError, TaskKind, TaskOutcome};
use crate::tasks::{BuildTerrainTask, LoadChunkTask, UnloadChunkTask, World};

use super::lod::lod_for_distance;
use super::observer::Observer;
use super::plan::{desired_set, plan};

/// Counts reported by [`StreamingController::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamingStats {
    /// Ticks run so far.
    pub ticks: u64,
    /// Observer chunk at the last tick that had an observer.
    pub center: Option<ChunkCoord>,
    pub resident: usize,
    pub loading: usize,
    pub unloading: usize,
    pub building: usize,
    /// Chunks held by the store.
    pub stored: usize,
    /// Instances bound to resident chunks.
    pub instances: usize,
}

/// A resident chunk: its bound instances and the meshes built for it.
struct Residency {
    instances: Vec<Arc<PooledInstance>>,
    meshes: BTreeMap<u8, Arc<TerrainMesh>>,
}

impl Residency {
    fn new(instances: Vec<Arc<PooledInstance>>) -> Self {
        Self {
            instances,
            meshes: BTreeMap::new(),
        }
    }

    fn terrain(&self) -> Option<&Arc<PooledInstance>> {
        self.instances
            .iter()
            .find(|instance| instance.kind() == EntityKind::TERRAIN)
    }
}

struct PendingBuild {
    lod: u8,
    handle: CompletionHandle<Arc<TerrainMesh>>,
}

/// Drives chunk residency around an observer.
pub struct StreamingController {
    world: Arc<World>,
    scheduler: Scheduler,
    observer: Arc<dyn Observer>,
    resident: BTreeMap<ChunkCoord, Residency>,
    loading: BTreeMap<ChunkCoord, CompletionHandle<Vec<Arc<PooledInstance>>>>,
    unloading: BTreeMap<ChunkCoord, CompletionHandle<()>>,
    building: BTreeMap<ChunkCoord, PendingBuild>,
    center: Option<ChunkCoord>,
    ticks: u64,
    stats_tx: watch::Sender<StreamingStats>,
}

impl StreamingController {
    pub fn new(world: Arc<World>, scheduler: Scheduler, observer: Arc<dyn Observer>) -> Self {
        let (stats_tx, _) = watch::channel(StreamingStats::default());
        Self {
            world,
            scheduler,
            observer,
            resident: BTreeMap::new(),
            loading: BTreeMap::new(),
            unloading: BTreeMap::new(),
            building: BTreeMap::new(),
            center: None,
            ticks: 0,
            stats_tx,
        }
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Receives the stats published at the end of every tick.
    pub fn subscribe(&self) -> watch::Receiver<StreamingStats> {
        self.stats_tx.subscribe()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn is_resident(&self, coord: ChunkCoord) -> bool {
        self.resident.contains_key(&coord)
    }

    /// Resident coordinates, sorted.
    pub fn resident_coords(&self) -> Vec<ChunkCoord> {
        self.resident.keys().copied().collect()
    }

    /// Instances bound for a resident coordinate.
    pub fn instances(&self, coord: ChunkCoord) -> Option<&[Arc<PooledInstance>]> {
        self.resident.get(&coord).map(|r| r.instances.as_slice())
    }

    pub fn is_loading(&self, coord: ChunkCoord) -> bool {
        self.loading.contains_key(&coord)
    }

    pub fn is_unloading(&self, coord: ChunkCoord) -> bool {
        self.unloading.contains_key(&coord)
    }

    /// Level of detail shown on a resident coordinate's terrain.
    pub fn displayed_lod(&self, coord: ChunkCoord) -> Option<u8> {
        self.resident
            .get(&coord)
            .and_then(Residency::terrain)
            .and_then(|terrain| terrain.displayed_lod())
    }

    /// Levels of detail cached for a resident coordinate.
    pub fn cached_lods(&self, coord: ChunkCoord) -> Vec<u8> {
        self.resident
            .get(&coord)
            .map(|r| r.meshes.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> StreamingStats {
        StreamingStats {
            ticks: self.ticks,
            center: self.center,
            resident: self.resident.len(),
            loading: self.loading.len(),
            unloading: self.unloading.len(),
            building: self.building.len(),
            stored: self.world.store().len(),
            instances: self.resident.values().map(|r| r.instances.len()).sum(),
        }
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Runs one streaming step.
    pub fn tick(&mut self) {
        self.ticks += 1;
        self.apply_completions();

        let Some(position) = self.observer.position() else {
            trace!("No observer position, skipping streaming tick");
            self.publish();
            return;
        };

        let world = self.world.config();
        let center = ChunkCoord::from_world(position[0], position[2], world.world.chunk_size);
        if self.center != Some(center) {
            debug!(x = center.x, y = center.y, "Observer entered chunk");
        }
        self.center = Some(center);
        self.scheduler.set_focus(center);

        let desired = desired_set(center, world.streaming.load_radius);
        let plan = plan(center, &desired, &self.resident, &self.loading, &self.unloading);

        for coord in &plan.cancel_loads {
            if self.scheduler.cancel_all_of_kind_at(TaskKind::Load, *coord) {
                debug!(x = coord.x, y = coord.y, "Stale load cancelled");
            }
        }
        for coord in plan.unload {
            self.submit_unload(coord);
        }
        for coord in plan.load {
            self.submit_load(coord);
        }

        self.update_lods(center);
        self.evict(center);
        self.publish();
    }

    fn publish(&self) {
        self.stats_tx.send_replace(self.stats());
    }

    // =========================================================================
    // Completions
    // =========================================================================

    fn apply_completions(&mut self) {
        let finished: Vec<_> = self
            .loading
            .iter()
            .filter_map(|(coord, handle)| handle.try_outcome().map(|o| (*coord, o)))
            .collect();
        for (coord, outcome) in finished {
            self.loading.remove(&coord);
            match outcome {
                TaskOutcome::Completed(instances) => {
                    debug!(x = coord.x, y = coord.y, instances = instances.len(), "Chunk resident");
                    self.resident.insert(coord, Residency::new(instances));
                }
                TaskOutcome::Cancelled => {
                    trace!(x = coord.x, y = coord.y, "Load cancelled");
                }
                TaskOutcome::Faulted(e) => {
                    debug!(x = coord.x, y = coord.y, error = %e, "Load faulted");
                }
            }
        }

        let finished: Vec<_> = self
            .unloading
            .iter()
            .filter_map(|(coord, handle)| handle.try_outcome().map(|o| (*coord, o)))
            .collect();
        for (coord, outcome) in finished {
            self.unloading.remove(&coord);
            if outcome.is_completed() {
                self.resident.remove(&coord);
                debug!(x = coord.x, y = coord.y, "Chunk no longer resident");
            } else {
                trace!(x = coord.x, y = coord.y, status = ?outcome.status(), "Unload did not complete");
            }
        }

        let finished: Vec<_> = self
            .building
            .iter()
            .filter_map(|(coord, build)| build.handle.try_outcome().map(|o| (*coord, build.lod, o)))
            .collect();
        for (coord, lod, outcome) in finished {
            self.building.remove(&coord);
            match outcome {
                TaskOutcome::Completed(mesh) => {
                    if let Err(e) = self.apply_mesh(coord, lod, mesh) {
                        debug!(x = coord.x, y = coord.y, lod, error = %e, "Build result discarded");
                    }
                }
                TaskOutcome::Cancelled => {}
                TaskOutcome::Faulted(e) => {
                    debug!(x = coord.x, y = coord.y, lod, error = %e, "Build faulted");
                }
            }
        }
    }

    /// Caches `mesh` and shows it on the coordinate's terrain.
    fn apply_mesh(&mut self, coord: ChunkCoord, lod: u8, mesh: Arc<TerrainMesh>) -> Result<(), TaskError> {
        if self.unloading.contains_key(&coord) {
            return Err(TaskError::Stale(coord));
        }
        let residency = self
            .resident
            .get_mut(&coord)
            .ok_or(TaskError::Stale(coord))?;
        let terrain = residency.terrain().cloned().ok_or(TaskError::Stale(coord))?;
        residency.meshes.insert(lod, Arc::clone(&mesh));
        terrain.show_mesh(&mesh);
        trace!(x = coord.x, y = coord.y, lod, "Terrain mesh shown");
        Ok(())
    }

    // =========================================================================
    // Submission
    // =========================================================================

    fn submit_load(&mut self, coord: ChunkCoord) {
        match self
            .scheduler
            .submit(LoadChunkTask::new(Arc::clone(&self.world), coord))
        {
            Ok(handle) => {
                self.loading.insert(coord, handle);
            }
            Err(e) => log_submit_error(TaskKind::Load, coord, &e),
        }
    }

    fn submit_unload(&mut self, coord: ChunkCoord) {
        let Some(residency) = self.resident.get(&coord) else {
            return;
        };
        if self.building.remove(&coord).is_some() {
            self.scheduler.cancel_all_of_kind_at(TaskKind::Build, coord);
        }

        let task = UnloadChunkTask::new(Arc::clone(&self.world), coord, residency.instances.clone());
        match self.scheduler.submit(task) {
            Ok(handle) => {
                self.unloading.insert(coord, handle);
            }
            Err(e) => log_submit_error(TaskKind::Unload, coord, &e),
        }
    }

    fn update_lods(&mut self, center: ChunkCoord) {
        let world = self.world.config();
        let step = world.streaming.lod_distance_step;
        let max_level = world.world.max_lod_level;

        let coords: Vec<ChunkCoord> = self
            .resident
            .keys()
            .filter(|coord| !self.unloading.contains_key(*coord))
            .copied()
            .collect();

        for coord in coords {
            let lod = lod_for_distance(center.distance(coord), step, max_level);
            let Some(residency) = self.resident.get(&coord) else {
                continue;
            };
            let Some(terrain) = residency.terrain() else {
                continue;
            };
            if terrain.displayed_lod() == Some(lod) {
                continue;
            }

            if let Some(mesh) = residency.meshes.get(&lod) {
                terrain.show_mesh(mesh);
                trace!(x = coord.x, y = coord.y, lod, "Cached terrain mesh shown");
                if self.building.remove(&coord).is_some() {
                    self.scheduler.cancel_all_of_kind_at(TaskKind::Build, coord);
                }
                continue;
            }

            match self.building.get(&coord) {
                Some(build) if build.lod == lod => continue,
                Some(_) => {
                    self.scheduler.cancel_all_of_kind_at(TaskKind::Build, coord);
                    self.building.remove(&coord);
                }
                None => {}
            }

            let task = BuildTerrainTask::new(Arc::clone(&self.world), coord, lod);
            match self.scheduler.submit(task) {
                Ok(handle) => {
                    self.building.insert(coord, PendingBuild { lod, handle });
                }
                Err(e) => log_submit_error(TaskKind::Build, coord, &e),
            }
        }
    }

    /// Drops stored chunks beyond the retain radius that nothing resident
    /// or in flight still needs, cancelling any work left at them.
    fn evict(&mut self, center: ChunkCoord) {
        let retain = self.world.config().retain_radius();
        let evicted = self.world.store().evict_outside(center, retain, |coord| {
            self.resident.contains_key(&coord)
                || self.loading.contains_key(&coord)
                || self.unloading.contains_key(&coord)
        });
        for coord in &evicted {
            let cancelled = self.scheduler.cancel_all_at(*coord);
            trace!(x = coord.x, y = coord.y, cancelled, "Chunk evicted from store");
        }
        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), "Chunk store trimmed");
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Disposes of the streamed world.
    ///
    /// Cancels every task, waits for in-flight loads and unloads to settle,
    /// returns every resident instance to its pool and clears the store.
    pub async fn teardown(&mut self) {
        let cancelled = self.scheduler.cancel_all();
        debug!(cancelled, "Streaming teardown started");

        for (coord, handle) in std::mem::take(&mut self.loading) {
            // A load that committed before the cancel still hands over its
            // instances.
            if let TaskOutcome::Completed(instances) = handle.wait().await {
                self.resident.insert(coord, Residency::new(instances));
            }
        }
        for (coord, handle) in std::mem::take(&mut self.unloading) {
            if handle.wait().await.is_completed() {
                self.resident.remove(&coord);
            }
        }
        self.building.clear();

        let mut released = 0;
        for (_, residency) in std::mem::take(&mut self.resident) {
            released += self.world.release_instances(&residency.instances);
        }
        self.world.store().clear();
        self.publish();

        info!(released, "Streaming teardown complete");
    }

    /// Ticks every `tick_interval` until `shutdown` is cancelled, then tears
    /// the world down. Returns the final stats.
    pub async fn run(mut self, shutdown: CancellationToken) -> StreamingStats {
        let interval = self
            .world
            .config()
            .streaming
            .tick_interval
            .max(Duration::from_millis(1));
        info!(
            tick_ms = interval.as_millis() as u64,
            load_radius = self.world.config().streaming.load_radius,
            "Streaming controller starting"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Streaming controller shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }

        self.teardown().await;
        let last = self.stats();
        info!(ticks = last.ticks, "Streaming controller stopped");
        last
    }
}

fn log_submit_error(kind: TaskKind, coord: ChunkCoord, error: &SchedulerError) {
    match error {
        SchedulerError::ShuttingDown => {
            trace!(kind = %kind, x = coord.x, y = coord.y, "Scheduler shutting down, task not submitted");
        }
        other => {
            warn!(kind = %kind, x = coord.x, y = coord.y, error = %other, "Task submission failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamingConfig;
    use crate::generation::Generator;
    use crate::pool::{HeadlessView, PoolRegistry};
    use crate::scheduler::{SchedulerSnapshot, TaskKey};
    use crate::streaming::SharedObserver;
    use std::collections::BTreeSet;

    const WAIT: Duration = Duration::from_secs(10);

    /// Coordinates that are both loading and unloading.
    fn overlapping(controller: &StreamingController) -> BTreeSet<ChunkCoord> {
        controller
            .loading
            .keys()
            .filter(|coord| controller.unloading.contains_key(*coord))
            .copied()
            .collect()
    }

    fn config() -> StreamingConfig {
        StreamingConfig::new()
            .with_chunk_size(8)
            .with_resolution(1)
            .with_load_radius(1.0)
            .with_retain_radius(3.0)
            .with_lod_distance_step(1.0)
            .with_max_lod_level(2)
            .with_max_concurrent_tasks(4)
            .with_seed("controller")
    }

    fn controller(config: StreamingConfig, observer: Arc<SharedObserver>) -> StreamingController {
        let pools = PoolRegistry::new()
            .with_pool(EntityKind::TERRAIN, vec![HeadlessView::prototype()], 4)
            .and_then(|r| r.with_pool(EntityKind::TREE, vec![HeadlessView::prototype()], 4))
            .unwrap();
        let generator = Generator::standard(config.world.clone());
        let scheduler = Scheduler::new(config.scheduler.clone());
        let world = Arc::new(World::new(config, pools, generator));
        StreamingController::new(world, scheduler, observer)
    }

    /// Pumps the scheduler and ticks the controller until `done` holds.
    async fn drive(controller: &mut StreamingController, done: impl Fn(&StreamingController) -> bool) {
        tokio::time::timeout(WAIT, async {
            loop {
                controller.scheduler().pump();
                controller.tick();
                assert!(overlapping(controller).is_empty());
                assert!(
                    controller.scheduler().snapshot().running
                        <= controller.scheduler().config().max_concurrent_tasks
                );
                if done(controller) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("controller did not settle");
    }

    fn settled(controller: &StreamingController) -> bool {
        let stats = controller.stats();
        let snapshot: SchedulerSnapshot = controller.scheduler().snapshot();
        stats.loading == 0 && stats.unloading == 0 && stats.building == 0 && snapshot.is_idle()
    }

    fn coords(list: &[(i32, i32)]) -> Vec<ChunkCoord> {
        list.iter().map(|&c| ChunkCoord::from(c)).collect()
    }

    #[tokio::test]
    async fn test_no_observer_skips_diff() {
        let observer = Arc::new(SharedObserver::new());
        let mut controller = controller(config(), observer);
        controller.tick();

        let stats = controller.stats();
        assert_eq!(stats.ticks, 1);
        assert_eq!(stats.center, None);
        assert_eq!(stats.loading, 0);
        assert_eq!(controller.scheduler().snapshot().tracked, 0);
    }

    #[tokio::test]
    async fn test_loads_desired_set() {
        let observer = Arc::new(SharedObserver::at([4.0, 0.0, 4.0]));
        let mut controller = controller(config(), observer);

        drive(&mut controller, settled).await;

        assert_eq!(
            controller.resident_coords(),
            coords(&[(-1, 0), (0, -1), (0, 0), (0, 1), (1, 0)])
        );
        for coord in controller.resident_coords() {
            let instances = controller.instances(coord).unwrap();
            assert_eq!(instances[0].kind(), EntityKind::TERRAIN);
            assert!(instances.iter().all(|i| i.bound_entity().is_some()));
        }
    }

    #[tokio::test]
    async fn test_move_unloads_and_releases() {
        let observer = Arc::new(SharedObserver::at([4.0, 0.0, 4.0]));
        let mut controller = controller(config(), Arc::clone(&observer));
        drive(&mut controller, settled).await;

        observer.set_position([20.0, 0.0, 4.0]);
        drive(&mut controller, settled).await;

        assert_eq!(
            controller.resident_coords(),
            coords(&[(1, 0), (2, -1), (2, 0), (2, 1), (3, 0)])
        );
        let bound: usize = controller.stats().instances;
        let active: usize = controller
            .world()
            .pools()
            .stats()
            .iter()
            .map(|(_, s)| s.active)
            .sum();
        assert_eq!(active, bound);
    }

    #[tokio::test]
    async fn test_lod_follows_distance() {
        let observer = Arc::new(SharedObserver::at([4.0, 0.0, 4.0]));
        let mut controller = controller(config(), Arc::clone(&observer));
        drive(&mut controller, |c| {
            settled(c) && c.resident_coords().iter().all(|&coord| c.displayed_lod(coord).is_some())
        })
        .await;

        assert_eq!(controller.displayed_lod(ChunkCoord::ORIGIN), Some(0));
        assert_eq!(controller.displayed_lod(ChunkCoord::new(1, 0)), Some(1));

        // Moving one chunk east swaps the levels of (0, 0) and (1, 0).
        observer.set_position([12.0, 0.0, 4.0]);
        drive(&mut controller, |c| {
            settled(c) && c.displayed_lod(ChunkCoord::new(1, 0)) == Some(0)
        })
        .await;
        assert_eq!(controller.displayed_lod(ChunkCoord::ORIGIN), Some(1));
        assert_eq!(controller.cached_lods(ChunkCoord::new(1, 0)), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_cached_mesh_is_reused() {
        let observer = Arc::new(SharedObserver::at([4.0, 0.0, 4.0]));
        let mut controller = controller(config(), Arc::clone(&observer));
        drive(&mut controller, |c| {
            settled(c) && c.displayed_lod(ChunkCoord::ORIGIN).is_some()
        })
        .await;

        observer.set_position([12.0, 0.0, 4.0]);
        drive(&mut controller, |c| {
            settled(c) && c.displayed_lod(ChunkCoord::ORIGIN) == Some(1)
        })
        .await;

        // Back to the start: both levels of (0, 0) are cached.
        observer.set_position([4.0, 0.0, 4.0]);
        controller.tick();
        assert_eq!(controller.displayed_lod(ChunkCoord::ORIGIN), Some(0));
        assert!(!controller.building.contains_key(&ChunkCoord::ORIGIN));
        assert_eq!(
            controller
                .scheduler()
                .status(&TaskKey::new(TaskKind::Build, ChunkCoord::ORIGIN)),
            None
        );
    }

    #[tokio::test]
    async fn test_evicts_store_beyond_retain_radius() {
        let observer = Arc::new(SharedObserver::at([4.0, 0.0, 4.0]));
        let mut controller = controller(config(), Arc::clone(&observer));
        drive(&mut controller, settled).await;
        assert!(controller.world().store().contains(ChunkCoord::ORIGIN));

        observer.set_position([100.0, 0.0, 4.0]);
        drive(&mut controller, settled).await;

        assert!(!controller.world().store().contains(ChunkCoord::ORIGIN));
        for coord in controller.world().store().coords() {
            assert!(coord.distance(ChunkCoord::new(12, 0)) <= 3.0);
        }
    }

    #[tokio::test]
    async fn test_teardown_returns_everything() {
        let observer = Arc::new(SharedObserver::at([4.0, 0.0, 4.0]));
        let mut controller = controller(config(), observer);
        drive(&mut controller, settled).await;

        controller.teardown().await;

        let stats = controller.stats();
        assert_eq!(stats.resident, 0);
        assert_eq!(stats.stored, 0);
        for (_, pool) in controller.world().pools().stats() {
            assert_eq!(pool.active, 0);
            assert_eq!(pool.total, pool.free);
        }
    }

    #[tokio::test]
    async fn test_stats_are_published() {
        let observer = Arc::new(SharedObserver::at([4.0, 0.0, 4.0]));
        let mut controller = controller(config(), observer);
        let rx = controller.subscribe();
        controller.tick();
        assert_eq!(rx.borrow().ticks, 1);
        assert_eq!(rx.borrow().center, Some(ChunkCoord::ORIGIN));
    }
}
