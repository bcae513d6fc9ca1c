//! Pools keyed by entity kind.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::chunk::EntityKind;

use super::resource::{PoolStats, ResourcePool};
use super::view::Prototype;
use super::PoolError;

/// The single source of view instances, one pool per [`EntityKind`].
#[derive(Default)]
pub struct PoolRegistry {
    pools: HashMap<EntityKind, Arc<ResourcePool>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pool for `kind`.
    pub fn register(
        &mut self,
        kind: EntityKind,
        prototypes: Vec<Arc<dyn Prototype>>,
        prewarm: usize,
    ) -> Result<Arc<ResourcePool>, PoolError> {
        if self.pools.contains_key(&kind) {
            return Err(PoolError::DuplicateKind(kind));
        }
        let pool = Arc::new(ResourcePool::new(kind, prototypes, prewarm)?);
        self.pools.insert(kind, Arc::clone(&pool));
        Ok(pool)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_pool(
        mut self,
        kind: EntityKind,
        prototypes: Vec<Arc<dyn Prototype>>,
        prewarm: usize,
    ) -> Result<Self, PoolError> {
        self.register(kind, prototypes, prewarm)?;
        Ok(self)
    }

    /// The pool for `kind`.
    pub fn pool(&self, kind: EntityKind) -> Result<&Arc<ResourcePool>, PoolError> {
        self.pools.get(&kind).ok_or(PoolError::Unregistered(kind))
    }

    pub fn contains(&self, kind: EntityKind) -> bool {
        self.pools.contains_key(&kind)
    }

    /// Checks that every kind in `kinds` has a pool.
    ///
    /// Called once at startup; a missing pool is a configuration error.
    pub fn validate<'a>(&self, kinds: impl IntoIterator<Item = &'a EntityKind>) -> Result<(), PoolError> {
        for kind in kinds {
            self.pool(*kind)?;
        }
        info!(pools = self.pools.len(), "Pool registry validated");
        Ok(())
    }

    /// Registered kinds, sorted by name.
    pub fn kinds(&self) -> Vec<EntityKind> {
        let mut kinds: Vec<EntityKind> = self.pools.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Stats of every pool, sorted by kind.
    pub fn stats(&self) -> Vec<(EntityKind, PoolStats)> {
        self.kinds()
            .into_iter()
            .filter_map(|kind| self.pools.get(&kind).map(|pool| (kind, pool.stats())))
            .collect()
    }

    /// Tears down every pool.
    pub fn teardown(&self) -> usize {
        self.pools.values().map(|pool| pool.teardown()).sum()
    }
}
