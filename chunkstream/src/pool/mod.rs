//! Resource pools of view instances.
//!
//! Every entity kind a generator pass can produce has one
//! [`ResourcePool`] in the [`PoolRegistry`]. Load tasks acquire an instance
//! per entity and bind it; Unload tasks unbind and release. Instances are
//! recycled, never destroyed, while the world runs.
//!
//! ```text
//! Prototype ──instantiate──► PooledInstance ◄──acquire/release──► ResourcePool
//!                                 │
//!                     Binder::bind / unbind
//!                                 │
//!                               Entity
//! ```

mod instance;
mod registry;
mod resource;
mod view;

pub use instance::{InstanceId, PooledInstance};
pub use registry::PoolRegistry;
pub use resource::{PoolStats, ResourcePool};
pub use view::{Binder, DirectBinder, HeadlessView, Prototype, View};

use thiserror::Error;

use crate::chunk::{EntityId, EntityKind};

/// Errors raised by pools and pooled instances.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PoolError {
    /// A pool needs at least one prototype.
    #[error("No prototypes for pool '{0}'")]
    NoPrototypes(EntityKind),

    /// No pool is registered for the kind.
    #[error("No pool registered for entity kind '{0}'")]
    Unregistered(EntityKind),

    /// A pool for the kind is already registered.
    #[error("Pool for entity kind '{0}' is already registered")]
    DuplicateKind(EntityKind),

    /// Released while still bound to an entity.
    #[error("Instance {instance} is still bound to entity {entity}")]
    StillBound { instance: InstanceId, entity: EntityId },

    /// Bound while already bound to an entity.
    #[error("Instance {0} is already bound to entity {1}")]
    AlreadyBound(InstanceId, EntityId),

    /// Bound or released while not checked out.
    #[error("Instance {0} is not active")]
    NotActive(InstanceId),

    /// Released to a pool that did not create it.
    #[error("Instance {instance} does not belong to pool '{pool}'")]
    ForeignInstance { instance: InstanceId, pool: EntityKind },
}
