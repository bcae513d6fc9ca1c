//! Recycling pool of view instances for one entity kind.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::chunk::EntityKind;

use super::instance::PooledInstance;
use super::view::Prototype;
use super::PoolError;

static POOL_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Instance counts of a pool.
///
/// `total == free + active` always holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub free: usize,
    pub active: usize,
}

#[derive(Default)]
struct PoolInner {
    free: VecDeque<Arc<PooledInstance>>,
    total: usize,
    active: usize,
}

/// Pool of interchangeable views for one [`EntityKind`].
///
/// Growth is unbounded but monotonic: instances are created on demand when
/// the free list is empty and are only dropped by [`ResourcePool::teardown`].
pub struct ResourcePool {
    id: u64,
    kind: EntityKind,
    prototypes: Vec<Arc<dyn Prototype>>,
    inner: Mutex<PoolInner>,
}

impl ResourcePool {
    /// Creates a pool and pre-warms `prewarm` instances, cycling through the
    /// prototypes.
    pub fn new(
        kind: EntityKind,
        prototypes: Vec<Arc<dyn Prototype>>,
        prewarm: usize,
    ) -> Result<Self, PoolError> {
        if prototypes.is_empty() {
            return Err(PoolError::NoPrototypes(kind));
        }

        let pool = Self {
            id: POOL_COUNTER.fetch_add(1, Ordering::Relaxed),
            kind,
            prototypes,
            inner: Mutex::new(PoolInner::default()),
        };

        {
            let mut inner = pool.inner.lock();
            for i in 0..prewarm {
                let prototype = &pool.prototypes[i % pool.prototypes.len()];
                inner.free.push_back(Arc::new(pool.instantiate(prototype.as_ref())));
            }
            inner.total = prewarm;
        }

        debug!(kind = %kind, prewarm, "Resource pool created");
        Ok(pool)
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    fn instantiate(&self, prototype: &dyn Prototype) -> PooledInstance {
        PooledInstance::new(self.kind, self.id, prototype.instantiate())
    }

    /// Checks out a free instance, creating one from a random prototype if
    /// none is free.
    pub fn acquire(&self) -> Arc<PooledInstance> {
        let mut inner = self.inner.lock();
        let instance = match inner.free.pop_front() {
            Some(instance) => instance,
            None => {
                let index = rand::random_range(0..self.prototypes.len());
                let created = Arc::new(self.instantiate(self.prototypes[index].as_ref()));
                inner.total += 1;
                trace!(kind = %self.kind, total = inner.total, "Resource pool grew");
                created
            }
        };
        instance.activate();
        inner.active += 1;
        instance
    }

    /// Returns an instance to the free list.
    ///
    /// The instance must belong to this pool, be checked out, and be fully
    /// unbound.
    pub fn release(&self, instance: &Arc<PooledInstance>) -> Result<(), PoolError> {
        if instance.pool() != self.id {
            return Err(PoolError::ForeignInstance {
                instance: instance.id(),
                pool: self.kind,
            });
        }

        let mut inner = self.inner.lock();
        instance.deactivate()?;
        inner.active -= 1;
        inner.free.push_back(Arc::clone(instance));
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            total: inner.total,
            free: inner.free.len(),
            active: inner.active,
        }
    }

    /// Drops every free instance. Checked-out instances stay counted until
    /// they are released.
    pub fn teardown(&self) -> usize {
        let mut inner = self.inner.lock();
        let dropped = inner.free.len();
        inner.free.clear();
        inner.total -= dropped;
        debug!(kind = %self.kind, dropped, "Resource pool torn down");
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Entity;
    use crate::pool::view::{DirectBinder, HeadlessView, View};
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;

    fn pool(prewarm: usize) -> ResourcePool {
        ResourcePool::new(EntityKind::TREE, vec![HeadlessView::prototype()], prewarm).unwrap()
    }

    #[test]
    fn test_requires_prototype() {
        assert!(matches!(
            ResourcePool::new(EntityKind::TREE, Vec::new(), 1),
            Err(PoolError::NoPrototypes(EntityKind::TREE))
        ));
    }

    #[test]
    fn test_prewarm_cycles_prototypes() {
        let made = Arc::new([AtomicUsize::new(0), AtomicUsize::new(0)]);
        let prototypes: Vec<Arc<dyn Prototype>> = (0..2)
            .map(|i| {
                let made = Arc::clone(&made);
                Arc::new(move || {
                    made[i].fetch_add(1, Ordering::SeqCst);
                    Box::new(HeadlessView::new()) as Box<dyn View>
                }) as Arc<dyn Prototype>
            })
            .collect();

        let pool = ResourcePool::new(EntityKind::TREE, prototypes, 5).unwrap();
        assert_eq!(made[0].load(Ordering::SeqCst), 3);
        assert_eq!(made[1].load(Ordering::SeqCst), 2);
        assert_eq!(
            pool.stats(),
            PoolStats {
                total: 5,
                free: 5,
                active: 0
            }
        );
    }

    #[test]
    fn test_acquire_reuses_then_grows() {
        let pool = pool(1);
        let first = pool.acquire();
        let second = pool.acquire();
        assert_ne!(first.id(), second.id());
        assert_eq!(pool.stats().total, 2);

        pool.release(&first).unwrap();
        let third = pool.acquire();
        assert_eq!(third.id(), first.id());
        assert_eq!(pool.stats().total, 2);
    }

    #[test]
    fn test_release_rejects_bound_instance() {
        let pool = pool(0);
        let instance = pool.acquire();
        let entity = Entity::new(EntityKind::TREE);
        instance.bind(&entity, &DirectBinder).unwrap();

        assert!(matches!(
            pool.release(&instance),
            Err(PoolError::StillBound { .. })
        ));
        assert_eq!(pool.stats().active, 1);

        instance.unbind(&DirectBinder);
        pool.release(&instance).unwrap();
        assert_eq!(
            pool.release(&instance),
            Err(PoolError::NotActive(instance.id()))
        );
    }

    #[test]
    fn test_release_rejects_foreign_instance() {
        let ours = pool(0);
        let theirs = pool(0);
        let instance = theirs.acquire();
        assert!(matches!(
            ours.release(&instance),
            Err(PoolError::ForeignInstance { .. })
        ));
    }

    #[test]
    fn test_teardown_drops_free_instances() {
        let pool = pool(4);
        let held = pool.acquire();
        assert_eq!(pool.teardown(), 3);
        assert_eq!(
            pool.stats(),
            PoolStats {
                total: 1,
                free: 0,
                active: 1
            }
        );
        pool.release(&held).unwrap();
        assert_eq!(pool.stats().free, 1);
    }

    proptest! {
        #[test]
        fn prop_total_is_free_plus_active(ops in prop::collection::vec(any::<bool>(), 0..200)) {
            let pool = pool(3);
            let mut held: Vec<Arc<PooledInstance>> = Vec::new();
            let mut high_water = pool.stats().total;

            for acquire in ops {
                if acquire || held.is_empty() {
                    held.push(pool.acquire());
                } else if let Some(instance) = held.pop() {
                    pool.release(&instance).unwrap();
                }

                let stats = pool.stats();
                prop_assert_eq!(stats.total, stats.free + stats.active);
                prop_assert_eq!(stats.active, held.len());
                prop_assert!(stats.total >= high_water);
                high_water = stats.total;
            }
        }
    }
}
