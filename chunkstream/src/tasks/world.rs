//! Shared state the chunk tasks run against.

use std::sync::Arc;

use tracing::warn;

use crate::chunk::ChunkStore;
use crate::config::{StreamingConfig, WorldConfig};
use crate::generation::Generator;
use crate::pool::{Binder, DirectBinder, PoolRegistry, PooledInstance};

/// Everything a chunk task needs: the store, the pools, the binder and
/// the generator.
///
/// Constructed once per streamed world and shared as `Arc<World>` by the
/// controller and every task it submits.
pub struct World {
    config: StreamingConfig,
    store: ChunkStore,
    pools: PoolRegistry,
    binder: Arc<dyn Binder>,
    generator: Generator,
}

impl World {
    /// Creates a world with an empty store and the [`DirectBinder`].
    pub fn new(config: StreamingConfig, pools: PoolRegistry, generator: Generator) -> Self {
        Self {
            config,
            store: ChunkStore::new(),
            pools,
            binder: Arc::new(DirectBinder),
            generator,
        }
    }

    /// Set the binder used to wire entities to views.
    pub fn with_binder(mut self, binder: Arc<dyn Binder>) -> Self {
        self.binder = binder;
        self
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn world_config(&self) -> &WorldConfig {
        &self.config.world
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    pub fn binder(&self) -> &dyn Binder {
        self.binder.as_ref()
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    /// Unbinds each instance and hands it back to its pool.
    ///
    /// Returns the number of instances released. Failures are logged and
    /// skipped so one bad instance never strands the rest.
    pub fn release_instances(&self, instances: &[Arc<PooledInstance>]) -> usize {
        let mut released = 0;
        for instance in instances {
            instance.unbind(self.binder());
            let result = self
                .pools
                .pool(instance.kind())
                .and_then(|pool| pool.release(instance));
            match result {
                Ok(()) => released += 1,
                Err(e) => warn!(
                    instance = %instance.id(),
                    kind = %instance.kind(),
                    error = %e,
                    "Failed to release pooled instance"
                ),
            }
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Entity, EntityKind};
    use crate::pool::HeadlessView;

    fn world() -> World {
        let pools = PoolRegistry::new()
            .with_pool(EntityKind::TREE, vec![HeadlessView::prototype()], 1)
            .unwrap();
        let config = StreamingConfig::default();
        let generator = Generator::standard(config.world.clone());
        World::new(config, pools, generator)
    }

    #[test]
    fn test_release_instances_unbinds_first() {
        let world = world();
        let pool = world.pools().pool(EntityKind::TREE).unwrap();
        let instance = pool.acquire();
        instance
            .bind(&Entity::new(EntityKind::TREE), world.binder())
            .unwrap();

        assert_eq!(world.release_instances(&[Arc::clone(&instance)]), 1);
        assert!(instance.bound_entity().is_none());
        assert!(!instance.is_active());
        assert_eq!(pool.stats().active, 0);
    }

    #[test]
    fn test_release_instances_skips_failures() {
        let world = world();
        let pool = world.pools().pool(EntityKind::TREE).unwrap();
        let first = pool.acquire();
        let second = pool.acquire();
        pool.release(&first).unwrap();

        // `first` is already free; only `second` counts.
        assert_eq!(world.release_instances(&[first, second]), 1);
        assert_eq!(pool.stats().active, 0);
    }
}
