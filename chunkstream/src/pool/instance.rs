//! Pooled view instances.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::chunk::{Entity, EntityId, EntityKind, TerrainMesh};

use super::view::{Binder, View};
use super::PoolError;

static INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity of a pooled instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        Self(INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(Debug, Default)]
struct InstanceState {
    active: bool,
    bound: Option<EntityId>,
    lod: Option<u8>,
}

/// A view owned by a [`ResourcePool`](super::ResourcePool).
///
/// Shared as `Arc<PooledInstance>` between the pool's free list and the
/// residency map. Bound to at most one entity at a time.
pub struct PooledInstance {
    id: InstanceId,
    kind: EntityKind,
    pool: u64,
    state: Mutex<InstanceState>,
    view: Mutex<Box<dyn View>>,
}

impl fmt::Debug for PooledInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PooledInstance")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("active", &state.active)
            .field("bound", &state.bound)
            .finish()
    }
}

impl PooledInstance {
    pub(super) fn new(kind: EntityKind, pool: u64, mut view: Box<dyn View>) -> Self {
        view.set_active(false);
        Self {
            id: InstanceId::next(),
            kind,
            pool,
            state: Mutex::new(InstanceState::default()),
            view: Mutex::new(view),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub(super) fn pool(&self) -> u64 {
        self.pool
    }

    /// Returns true while the instance is checked out of its pool.
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Entity the instance currently presents.
    pub fn bound_entity(&self) -> Option<EntityId> {
        self.state.lock().bound
    }

    /// Level of detail of the last mesh shown since binding.
    pub fn displayed_lod(&self) -> Option<u8> {
        self.state.lock().lod
    }

    /// Binds the instance to `entity`.
    pub fn bind(&self, entity: &Entity, binder: &dyn Binder) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        if !state.active {
            return Err(PoolError::NotActive(self.id));
        }
        if let Some(existing) = state.bound {
            return Err(PoolError::AlreadyBound(self.id, existing));
        }
        binder.bind(&mut **self.view.lock(), entity);
        state.bound = Some(entity.id());
        Ok(())
    }

    /// Detaches the instance from its entity. Returns the entity it was
    /// bound to, if any.
    pub fn unbind(&self, binder: &dyn Binder) -> Option<EntityId> {
        let mut state = self.state.lock();
        let previous = state.bound.take()?;
        binder.unbind(&mut **self.view.lock());
        state.lod = None;
        Some(previous)
    }

    /// Shows `mesh` on the view.
    pub fn show_mesh(&self, mesh: &Arc<TerrainMesh>) {
        let mut state = self.state.lock();
        self.view.lock().show_mesh(mesh);
        state.lod = Some(mesh.lod());
    }

    /// Runs `f` with exclusive access to the view.
    pub fn with_view<R>(&self, f: impl FnOnce(&mut dyn View) -> R) -> R {
        f(&mut **self.view.lock())
    }

    /// Marks the instance checked out. Returns false if it already was.
    pub(super) fn activate(&self) -> bool {
        let mut state = self.state.lock();
        if state.active {
            return false;
        }
        state.active = true;
        self.view.lock().set_active(true);
        true
    }

    /// Marks the instance free. Fails if it is still bound or not active.
    pub(super) fn deactivate(&self) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        if let Some(entity) = state.bound {
            return Err(PoolError::StillBound {
                instance: self.id,
                entity,
            });
        }
        if !state.active {
            return Err(PoolError::NotActive(self.id));
        }
        state.active = false;
        self.view.lock().set_active(false);
        Ok(())
    }
}
