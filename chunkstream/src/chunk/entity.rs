//! Entities: typed property bags placed in a chunk.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::coord::ChunkCoord;

use super::heightmap::Heightmap;

/// Name of the heightmap property carried by terrain entities.
pub const HEIGHTMAP_PROPERTY: &str = "heightmap";

/// Global counter for entity identities.
static ENTITY_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identity of an entity for the lifetime of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    fn next() -> Self {
        Self(ENTITY_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw identifier value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Logical type of an entity.
///
/// The resource pool registry is keyed by this value: every kind a generator
/// pass can produce needs a registered pool of views.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKind(&'static str);

impl EntityKind {
    /// Ground surface holding the chunk's heightmap.
    pub const TERRAIN: EntityKind = EntityKind("terrain");

    /// Vegetation placed by the forest pass.
    pub const TREE: EntityKind = EntityKind("tree");

    /// Declares a custom kind.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Kind name, as used in logs and configuration.
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Spatial placement of an entity in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: [f32; 3],
    /// Unit quaternion `[x, y, z, w]`.
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
        }
    }
}

impl Transform {
    /// Transform at `position` with identity rotation and unit scale.
    pub fn at(position: [f32; 3]) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Set rotation to a rotation of `degrees` around the vertical axis.
    pub fn with_yaw_degrees(mut self, degrees: f32) -> Self {
        let half = degrees.to_radians() * 0.5;
        self.rotation = [0.0, half.sin(), 0.0, half.cos()];
        self
    }

    /// Set a uniform scale.
    pub fn with_uniform_scale(mut self, scale: f32) -> Self {
        self.scale = [scale; 3];
        self
    }
}

/// A value stored in an entity property.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Float(f32),
    Int(i64),
    Bool(bool),
    Text(String),
    Heightmap(Arc<Heightmap>),
}

/// A typed bag of named properties with a transform.
///
/// An entity belongs to exactly one chunk; [`Chunk::add_entity`] stamps the
/// owning coordinate when the entity is added.
///
/// [`Chunk::add_entity`]: super::Chunk::add_entity
#[derive(Clone, Debug)]
pub struct Entity {
    id: EntityId,
    kind: EntityKind,
    pub(super) chunk: ChunkCoord,
    pub transform: Transform,
    properties: HashMap<String, PropertyValue>,
}

impl Entity {
    /// Creates an entity of the given kind with no properties.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            id: EntityId::next(),
            kind,
            chunk: ChunkCoord::ORIGIN,
            transform: Transform::default(),
            properties: HashMap::new(),
        }
    }

    /// Set the transform.
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Coordinate of the chunk that owns this entity.
    pub fn chunk(&self) -> ChunkCoord {
        self.chunk
    }

    /// Sets or replaces a property.
    pub fn set_property(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.properties.insert(name.into(), value);
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut PropertyValue> {
        self.properties.get_mut(name)
    }

    /// Iterates property names and values in arbitrary order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        match self.properties.get(name) {
            Some(PropertyValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    /// The heightmap property, if this entity carries one.
    pub fn heightmap(&self) -> Option<&Arc<Heightmap>> {
        match self.properties.get(HEIGHTMAP_PROPERTY) {
            Some(PropertyValue::Heightmap(map)) => Some(map),
            _ => None,
        }
    }

    /// Mutable access to the heightmap property, cloning it first if it is
    /// shared.
    pub fn heightmap_mut(&mut self) -> Option<&mut Heightmap> {
        match self.properties.get_mut(HEIGHTMAP_PROPERTY) {
            Some(PropertyValue::Heightmap(map)) => Some(Arc::make_mut(map)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ids_are_unique() {
        let a = Entity::new(EntityKind::TREE);
        let b = Entity::new(EntityKind::TREE);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_properties() {
        let mut entity = Entity::new(EntityKind::TREE);
        entity.set_property("height", PropertyValue::Float(4.5));
        entity.set_property("burning", PropertyValue::Bool(false));

        assert_eq!(entity.float("height"), Some(4.5));
        assert_eq!(entity.float("burning"), None);
        assert_eq!(entity.property("missing"), None);
        assert_eq!(entity.properties().count(), 2);
    }

    #[test]
    fn test_heightmap_property() {
        let mut entity = Entity::new(EntityKind::TERRAIN);
        assert!(entity.heightmap().is_none());
        entity.set_property(
            HEIGHTMAP_PROPERTY,
            PropertyValue::Heightmap(Arc::new(Heightmap::new(3))),
        );
        assert_eq!(entity.heightmap().map(|h| h.side()), Some(3));

        let shared = Arc::clone(entity.heightmap().unwrap());
        entity.heightmap_mut().unwrap().set(1, 1, 2.0);
        assert_eq!(entity.heightmap().unwrap().get(1, 1), 2.0);
        assert_eq!(shared.get(1, 1), 0.0);
    }

    #[test]
    fn test_yaw_rotation_is_unit_quaternion() {
        let t = Transform::default().with_yaw_degrees(90.0);
        let norm: f32 = t.rotation.iter().map(|c| c * c).sum();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(t.rotation[1] > 0.0);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(EntityKind::TERRAIN.to_string(), "terrain");
        assert_eq!(EntityKind::new("rock").name(), "rock");
    }
}
