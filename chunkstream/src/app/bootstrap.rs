//! Application bootstrap implementation.
//!
//! This module contains `StreamingApp` which validates a world's wiring
//! before any loop starts, then owns the scheduler and controller loops
//! until shutdown.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::error::AppError;
use crate::config::{ConfigError, StreamingConfig};
use crate::generation::Generator;
use crate::pool::PoolRegistry;
use crate::scheduler::Scheduler;
use crate::streaming::{Observer, StreamingController, StreamingStats};
use crate::tasks::World;

/// A streaming world with its background loops running.
///
/// # Example
///
/// ```ignore
/// use chunkstream::app::StreamingApp;
///
/// let app = StreamingApp::start(config, pools, generator, observer)?;
/// println!("{:?}", app.stats());
/// app.shutdown().await?;
/// ```
pub struct StreamingApp {
    world: Arc<World>,
    scheduler: Scheduler,
    stats: watch::Receiver<StreamingStats>,

    /// Stops the controller; it tears the world down on the way out.
    controller_shutdown: CancellationToken,
    controller_task: JoinHandle<StreamingStats>,

    /// Stops the scheduler once the controller is gone.
    scheduler_shutdown: CancellationToken,
    scheduler_task: JoinHandle<()>,
}

impl StreamingApp {
    /// Validates the wiring and starts streaming around `observer`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`AppError::Config`] if the configuration is invalid or the
    ///   generator was built for different world settings
    /// - [`AppError::Pool`] if an entity kind the generator produces has no
    ///   pool
    pub fn start(
        config: StreamingConfig,
        pools: PoolRegistry,
        generator: Generator,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, AppError> {
        if generator.world() != &config.world {
            return Err(ConfigError::Invalid(
                "generator world settings differ from the streaming config".to_string(),
            )
            .into());
        }

        Self::start_world(World::new(config, pools, generator), observer)
    }

    /// Starts streaming an already assembled world, e.g. one with a custom
    /// [`Binder`](crate::pool::Binder).
    ///
    /// Runs the same checks as [`start`](Self::start).
    pub fn start_world(world: World, observer: Arc<dyn Observer>) -> Result<Self, AppError> {
        world.config().validate()?;
        world
            .pools()
            .validate(world.generator().produces().iter())?;

        let world = Arc::new(world);
        let config = world.config();
        info!(
            seed = %config.world.seed,
            chunk_size = config.world.chunk_size,
            load_radius = config.streaming.load_radius,
            max_concurrent_tasks = config.scheduler.max_concurrent_tasks,
            passes = ?world.generator().pass_names(),
            "Starting streaming app"
        );

        let scheduler = Scheduler::new(config.scheduler.clone());
        let scheduler_shutdown = CancellationToken::new();
        let scheduler_task = tokio::spawn(scheduler.clone().run(scheduler_shutdown.clone()));

        let controller = StreamingController::new(Arc::clone(&world), scheduler.clone(), observer);
        let stats = controller.subscribe();
        let controller_shutdown = CancellationToken::new();
        let controller_task = tokio::spawn(controller.run(controller_shutdown.clone()));

        info!("Streaming app started");

        Ok(Self {
            world,
            scheduler,
            stats,
            controller_shutdown,
            controller_task,
            scheduler_shutdown,
            scheduler_task,
        })
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Stats published by the last controller tick.
    pub fn stats(&self) -> StreamingStats {
        *self.stats.borrow()
    }

    /// Receives the stats published at the end of every tick.
    pub fn subscribe(&self) -> watch::Receiver<StreamingStats> {
        self.stats.clone()
    }

    /// Tears the world down and stops both loops.
    ///
    /// Returns the controller's final stats.
    pub async fn shutdown(self) -> Result<StreamingStats, AppError> {
        info!("Shutting down streaming app");

        self.controller_shutdown.cancel();
        let stats = self.controller_task.await.map_err(|e| AppError::Join {
            name: "streaming controller",
            reason: e.to_string(),
        });

        // Stop the scheduler even if the controller failed.
        self.scheduler_shutdown.cancel();
        let stopped = self.scheduler_task.await.map_err(|e| AppError::Join {
            name: "scheduler",
            reason: e.to_string(),
        });

        let dropped = self.world.pools().teardown();
        info!(dropped, "Streaming app shutdown complete");

        let stats = stats?;
        stopped?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::EntityKind;
    use crate::pool::HeadlessView;
    use crate::streaming::SharedObserver;
    use std::time::Duration;

    fn config() -> StreamingConfig {
        StreamingConfig::new()
            .with_chunk_size(8)
            .with_resolution(1)
            .with_seed("app")
            .with_load_radius(1.0)
            .with_streaming_tick(Duration::from_millis(5))
            .with_scheduler_tick(Duration::from_millis(1))
            .with_max_concurrent_tasks(4)
    }

    fn pools() -> PoolRegistry {
        PoolRegistry::new()
            .with_pool(EntityKind::TERRAIN, vec![HeadlessView::prototype()], 2)
            .and_then(|r| r.with_pool(EntityKind::TREE, vec![HeadlessView::prototype()], 2))
            .unwrap()
    }

    #[tokio::test]
    async fn test_app_start_and_shutdown() {
        let config = config();
        let generator = Generator::standard(config.world.clone());
        let observer = Arc::new(SharedObserver::at([4.0, 0.0, 4.0]));

        let app = StreamingApp::start(config, pools(), generator, observer).unwrap();

        let mut stats = app.subscribe();
        tokio::time::timeout(
            Duration::from_secs(10),
            stats.wait_for(|s| s.resident == 5 && s.loading == 0),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(app.world().store().len(), 5);

        let world = Arc::clone(app.world());
        let last = app.shutdown().await.unwrap();

        assert_eq!(last.resident, 0);
        assert_eq!(last.instances, 0);
        assert!(world.store().is_empty());
        for (_, stats) in world.pools().stats() {
            assert_eq!(stats.active, 0);
            assert_eq!(stats.total, 0);
        }
    }

    #[tokio::test]
    async fn test_start_rejects_missing_pool() {
        let config = config();
        let generator = Generator::standard(config.world.clone());
        let pools = PoolRegistry::new()
            .with_pool(EntityKind::TERRAIN, vec![HeadlessView::prototype()], 1)
            .unwrap();

        let result = StreamingApp::start(config, pools, generator, Arc::new(SharedObserver::new()));

        assert!(matches!(
            result,
            Err(AppError::Pool(crate::pool::PoolError::Unregistered(EntityKind::TREE)))
        ));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let config = config().with_max_concurrent_tasks(0);
        let generator = Generator::standard(config.world.clone());

        let result = StreamingApp::start(config, pools(), generator, Arc::new(SharedObserver::new()));

        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_start_rejects_mismatched_generator() {
        let config = config();
        let generator = Generator::standard(config.clone().with_seed("other").world);

        let result = StreamingApp::start(config, pools(), generator, Arc::new(SharedObserver::new()));

        assert!(matches!(result, Err(AppError::Config(ConfigError::Invalid(_)))));
    }

    #[tokio::test]
    async fn test_shutdown_without_observer() {
        let config = config();
        let generator = Generator::standard(config.world.clone());
        let app = StreamingApp::start(config, pools(), generator, Arc::new(SharedObserver::new())).unwrap();

        let mut stats = app.subscribe();
        tokio::time::timeout(Duration::from_secs(10), stats.wait_for(|s| s.ticks >= 2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(app.stats().resident, 0);
        assert_eq!(app.stats().center, None);

        let scheduler = app.scheduler().clone();
        let last = app.shutdown().await.unwrap();
        assert_eq!(last.resident, 0);
        assert!(scheduler.is_shut_down());
    }
}
