//! Chunk data model.
//!
//! A [`Chunk`] is one cell of the world grid: its coordinate plus an
//! ordered list of [`Entity`] values. Every generated chunk has exactly one
//! terrain entity carrying the [`Heightmap`]; feature passes add more
//! entities (trees, rocks, ...) after it.
//!
//! Chunks are produced once by a Generate task and shared read-only through
//! the [`ChunkStore`] afterwards.

mod entity;
mod heightmap;
mod mesh;
mod store;

pub use entity::{Entity, EntityId, EntityKind, PropertyValue, Transform, HEIGHTMAP_PROPERTY};
pub use heightmap::Heightmap;
pub use mesh::TerrainMesh;
pub use store::ChunkStore;

use std::sync::Arc;

use crate::coord::ChunkCoord;

/// Generated content of one grid cell.
#[derive(Clone, Debug)]
pub struct Chunk {
    coord: ChunkCoord,
    entities: Vec<Entity>,
}

impl Chunk {
    /// Creates an empty chunk.
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            coord,
            entities: Vec::new(),
        }
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// World-space position of the chunk's minimum corner.
    pub fn world_origin(&self, chunk_size: u32) -> (f32, f32) {
        self.coord.world_origin(chunk_size)
    }

    /// Adds an entity, making this chunk its owner.
    pub fn add_entity(&mut self, mut entity: Entity) -> &mut Entity {
        entity.chunk = self.coord;
        self.entities.push(entity);
        let last = self.entities.len() - 1;
        &mut self.entities[last]
    }

    /// All entities, in insertion order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities_of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(move |e| e.kind() == kind)
    }

    /// First entity of `kind`.
    pub fn entity_of_kind(&self, kind: EntityKind) -> Option<&Entity> {
        self.entities.iter().find(|e| e.kind() == kind)
    }

    pub fn entity_of_kind_mut(&mut self, kind: EntityKind) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.kind() == kind)
    }

    /// The terrain entity.
    pub fn terrain(&self) -> Option<&Entity> {
        self.entity_of_kind(EntityKind::TERRAIN)
    }

    /// The terrain heightmap.
    pub fn heightmap(&self) -> Option<&Arc<Heightmap>> {
        self.terrain().and_then(Entity::heightmap)
    }

    /// Mutable terrain heightmap.
    pub fn heightmap_mut(&mut self) -> Option<&mut Heightmap> {
        self.entity_of_kind_mut(EntityKind::TERRAIN)
            .and_then(Entity::heightmap_mut)
    }

    /// Removes every entity.
    pub fn clear(&mut self) {
        self.entities.clear();
    }
}
