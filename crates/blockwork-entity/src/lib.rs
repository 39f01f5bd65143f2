//! Entity components for the Blockwork voxel core.
//!
//! Uses hecs as the ECS backend. The world only needs a handful of components
//! to move entities and keep them attached to chunks; everything else an
//! application spawns is opaque to it.
//!
//! [`EntitySnapshot`] is the blob written into column files for every entity
//! attached to a chunk.

use bincode::Options;
use blockwork_core::{Aabb, ChunkPos, Error, Result, WorldPos};
use glam::{Quat, Vec3};
pub use hecs::{Entity, World};
use serde::{Deserialize, Serialize};

/// Transform component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Transform at `position` with no rotation or scale.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Block containing the entity's position.
    pub fn block_pos(&self) -> WorldPos {
        WorldPos::from_vec3(self.position)
    }

    /// Chunk the entity belongs to.
    pub fn chunk_pos(&self) -> ChunkPos {
        self.block_pos().chunk_pos()
    }
}

/// Linear velocity in blocks per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity(pub Vec3);

/// Axis-aligned collision box relative to the entity position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxCollider {
    /// Minimum corner relative to the position
    pub offset: Vec3,
    pub size: Vec3,
}

impl BoxCollider {
    /// Box of `size` centred horizontally on the position, feet at the position.
    pub fn standing(size: Vec3) -> Self {
        Self {
            offset: Vec3::new(-size.x * 0.5, -size.y * 0.5, 0.0),
            size,
        }
    }

    /// World-space box for an entity at `position`.
    pub fn aabb_at(&self, position: Vec3) -> Aabb {
        Aabb::from_offset_size(position + self.offset, self.size)
    }
}

/// Marks an entity as moved by the kinematic step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KinematicBody {
    /// Set when the last step ended standing on a block
    pub grounded: bool,
    /// Multiplier applied to world gravity
    pub gravity_scale: f32,
}

impl Default for KinematicBody {
    fn default() -> Self {
        Self {
            grounded: false,
            gravity_scale: 1.0,
        }
    }
}

/// Serializable copy of the components the world knows about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub transform: Option<Transform>,
    pub velocity: Option<Velocity>,
    pub collider: Option<BoxCollider>,
    pub body: Option<KinematicBody>,
}

fn blob_options() -> impl Options {
    bincode::DefaultOptions::new()
}

impl EntitySnapshot {
    /// Copy the known components of `entity`.
    pub fn capture(world: &World, entity: Entity) -> Result<Self> {
        if !world.contains(entity) {
            return Err(Error::NotFound(format!("entity {entity:?}")));
        }
        Ok(Self {
            transform: world.get::<&Transform>(entity).ok().map(|c| *c),
            velocity: world.get::<&Velocity>(entity).ok().map(|c| *c),
            collider: world.get::<&BoxCollider>(entity).ok().map(|c| *c),
            body: world.get::<&KinematicBody>(entity).ok().map(|c| *c),
        })
    }

    /// Spawn a new entity carrying the snapshot's components.
    pub fn spawn(&self, world: &mut World) -> Entity {
        let mut builder = hecs::EntityBuilder::new();
        if let Some(transform) = self.transform {
            builder.add(transform);
        }
        if let Some(velocity) = self.velocity {
            builder.add(velocity);
        }
        if let Some(collider) = self.collider {
            builder.add(collider);
        }
        if let Some(body) = self.body {
            builder.add(body);
        }
        world.spawn(builder.build())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        blob_options()
            .serialize(self)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        blob_options()
            .deserialize(bytes)
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn transform_chunk_follows_floor() {
        let t = Transform::from_position(Vec3::new(-0.5, 15.9, 16.0));
        assert_eq!(t.block_pos(), WorldPos::new(-1, 15, 16));
        assert_eq!(t.chunk_pos(), ChunkPos::new(-1, 0, 1));
    }

    #[test]
    fn standing_collider_is_centred() {
        let collider = BoxCollider::standing(Vec3::new(0.6, 0.6, 1.8));
        let aabb = collider.aabb_at(Vec3::new(1.0, 1.0, 5.0));
        assert_relative_eq!(aabb.min.x, 0.7);
        assert_relative_eq!(aabb.max.y, 1.3);
        assert_relative_eq!(aabb.min.z, 5.0);
        assert_relative_eq!(aabb.max.z, 6.8);
    }

    #[test]
    fn snapshot_roundtrip_respawns_components() {
        let mut world = World::new();
        let entity = world.spawn((
            Transform::from_position(Vec3::new(3.0, 4.0, 70.0)),
            Velocity(Vec3::new(0.0, 0.0, -2.0)),
            BoxCollider::standing(Vec3::splat(0.5)),
        ));

        let snapshot = EntitySnapshot::capture(&world, entity).unwrap();
        assert!(snapshot.body.is_none());
        let bytes = snapshot.to_bytes().unwrap();

        let mut restored_world = World::new();
        let restored = EntitySnapshot::from_bytes(&bytes)
            .unwrap()
            .spawn(&mut restored_world);
        let again = EntitySnapshot::capture(&restored_world, restored).unwrap();
        assert_eq!(again, snapshot);
        assert_eq!(again.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn capture_of_despawned_entity_fails() {
        let mut world = World::new();
        let entity = world.spawn((Transform::default(),));
        world.despawn(entity).unwrap();
        assert!(matches!(
            EntitySnapshot::capture(&world, entity),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn garbage_blob_is_rejected() {
        assert!(matches!(
            EntitySnapshot::from_bytes(&[7, 7, 7]),
            Err(Error::Serialization(_))
        ));
    }
}
