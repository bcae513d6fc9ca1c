//! View-side collaborator traits.
//!
//! The streaming core never renders anything. It hands entities to opaque
//! [`View`] objects through a [`Binder`] and creates new views from
//! [`Prototype`]s when a pool runs dry.

use std::sync::Arc;

use crate::chunk::{Entity, EntityId, TerrainMesh};

/// A pooled presentation object.
///
/// Every method has a no-op default so headless views only implement what
/// they need.
pub trait View: Send + 'static {
    /// Called when the instance leaves or re-enters the free list.
    fn set_active(&mut self, active: bool) {
        let _ = active;
    }

    /// Starts presenting `entity`.
    fn attach(&mut self, entity: &Entity) {
        let _ = entity;
    }

    /// Stops presenting the attached entity.
    fn detach(&mut self) {}

    /// Replaces the displayed terrain mesh.
    fn show_mesh(&mut self, mesh: &Arc<TerrainMesh>) {
        let _ = mesh;
    }
}

/// Creates new views for a pool.
pub trait Prototype: Send + Sync {
    fn instantiate(&self) -> Box<dyn View>;
}

impl<F> Prototype for F
where
    F: Fn() -> Box<dyn View> + Send + Sync,
{
    fn instantiate(&self) -> Box<dyn View> {
        self()
    }
}

/// Wires entity data to a view and back.
///
/// Implementations may set up arbitrary data synchronization; the core
/// only guarantees `bind` and `unbind` are called in pairs.
pub trait Binder: Send + Sync {
    fn bind(&self, view: &mut dyn View, entity: &Entity);

    fn unbind(&self, view: &mut dyn View);
}

/// Binder that forwards straight to [`View::attach`] and [`View::detach`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectBinder;

impl Binder for DirectBinder {
    fn bind(&self, view: &mut dyn View, entity: &Entity) {
        view.attach(entity);
    }

    fn unbind(&self, view: &mut dyn View) {
        view.detach();
    }
}

/// A view with no presentation, used by the CLI and tests.
#[derive(Clone, Debug, Default)]
pub struct HeadlessView {
    active: bool,
    attached: Option<EntityId>,
    meshes_shown: usize,
}

impl HeadlessView {
    pub fn new() -> Self {
        Self::default()
    }

    /// A prototype producing headless views.
    pub fn prototype() -> Arc<dyn Prototype> {
        Arc::new(|| Box::new(HeadlessView::new()) as Box<dyn View>)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn attached(&self) -> Option<EntityId> {
        self.attached
    }

    pub fn meshes_shown(&self) -> usize {
        self.meshes_shown
    }
}

impl View for HeadlessView {
    fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn attach(&mut self, entity: &Entity) {
        self.attached = Some(entity.id());
    }

    fn detach(&mut self) {
        self.attached = None;
    }

    fn show_mesh(&mut self, _mesh: &Arc<TerrainMesh>) {
        self.meshes_shown += 1;
    }
}
