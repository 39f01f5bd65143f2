//! The world: loaded chunks, their entities, and the observers watching them.

use std::sync::Arc;

use blockwork_core::{
    cast_ray, Aabb, BlockRegistry, BlockSide, BlockType, BlockTypeId, ChunkPos, Error, Ray,
    Result, WorldPos,
};
use blockwork_entity::{Entity, Transform, World as EntityWorld};
use glam::Vec3;
use hashbrown::HashMap;
use tracing::{debug, info};

use crate::chunk::Chunk;
use crate::lighting::LightSolver;
use crate::provider::ChunkProvider;
use crate::store::{BlockChange, ChunkStore};

/// Notified about chunk lifecycle and edits, typically by a mesher.
pub trait WorldObserver {
    fn chunk_loaded(&mut self, chunk: &Chunk);
    fn chunk_changed(&mut self, chunk: &Chunk, static_blocks_affected: bool);
    fn chunk_unloaded(&mut self, chunk: &Chunk);
}

/// First block hit by [`World::cast_ray`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub block: WorldPos,
    pub side: BlockSide,
    pub distance: f32,
    pub block_type: BlockTypeId,
}

/// Set of loaded chunks drawn from a [`ChunkProvider`].
pub struct World<P: ChunkProvider> {
    provider: P,
    registry: Arc<BlockRegistry>,
    loaded: HashMap<u64, ChunkPos>,
    observers: Vec<Box<dyn WorldObserver>>,
    light: LightSolver,
    /// Entity store; chunks hold the handles of their attached entities
    pub entities: EntityWorld,
}

impl<P: ChunkProvider> World<P> {
    pub fn new(provider: P) -> Self {
        let registry = Arc::clone(provider.store().registry());
        Self {
            provider,
            registry,
            loaded: HashMap::new(),
            observers: Vec::new(),
            light: LightSolver::new(),
            entities: EntityWorld::new(),
        }
    }

    pub const fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub const fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &ChunkStore {
        self.provider.store()
    }

    pub fn add_observer(&mut self, observer: Box<dyn WorldObserver>) {
        self.observers.push(observer);
    }

    /// Borrow a chunk from the provider and make it part of the world.
    pub fn load_chunk(&mut self, pos: ChunkPos) -> Result<()> {
        if self.loaded.contains_key(&pos.key()) {
            return Ok(());
        }

        let changes = self.provider.borrow_chunk(pos, &mut self.entities)?;
        let chunk = self
            .provider
            .store_mut()
            .chunk_mut(pos)
            .ok_or_else(|| Error::NotFound(format!("chunk {pos:?}")))?;
        chunk.set_loaded(true);
        self.loaded.insert(pos.key(), pos);
        self.relight(pos);

        if let Some(chunk) = self.provider.store().chunk(pos) {
            for observer in &mut self.observers {
                observer.chunk_loaded(chunk);
            }
        }
        debug!(x = pos.x, y = pos.y, z = pos.z, "chunk loaded");

        // Population may have written into chunks that were already loaded
        self.apply_changes(&changes);
        Ok(())
    }

    /// Drop a chunk from the world and hand it back to the provider.
    /// Returns false if it was not loaded.
    pub fn unload_chunk(&mut self, pos: ChunkPos) -> Result<bool> {
        if !self.loaded.contains_key(&pos.key()) {
            return Ok(false);
        }

        if let Some(chunk) = self.provider.store().chunk(pos) {
            for observer in &mut self.observers {
                observer.chunk_unloaded(chunk);
            }
        }
        if let Some(chunk) = self.provider.store_mut().chunk_mut(pos) {
            chunk.set_loaded(false);
        }
        self.loaded.remove(&pos.key());
        self.provider.return_chunk(pos, &mut self.entities)?;
        debug!(x = pos.x, y = pos.y, z = pos.z, "chunk unloaded");
        Ok(true)
    }

    /// Unload every chunk.
    pub fn unload_all(&mut self) -> Result<()> {
        let chunks: Vec<ChunkPos> = self.loaded.values().copied().collect();
        let count = chunks.len();
        for pos in chunks {
            self.unload_chunk(pos)?;
        }
        info!(count, "unloaded all chunks");
        Ok(())
    }

    pub fn is_loaded(&self, pos: ChunkPos) -> bool {
        self.loaded.contains_key(&pos.key())
    }

    pub fn loaded_chunks(&self) -> impl Iterator<Item = ChunkPos> + '_ {
        self.loaded.values().copied()
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    /// A loaded chunk.
    pub fn chunk(&self, pos: ChunkPos) -> Option<&Chunk> {
        if !self.is_loaded(pos) {
            return None;
        }
        self.provider.store().chunk(pos)
    }

    /// Block at a position inside a loaded chunk.
    pub fn block(&self, pos: WorldPos) -> Option<BlockTypeId> {
        self.chunk(pos.chunk_pos()).map(|chunk| chunk.get_block(pos.local_pos()))
    }

    pub fn block_type(&self, pos: WorldPos) -> Option<&BlockType> {
        self.block(pos).map(|id| self.registry.get(id))
    }

    /// Write a block into a loaded chunk. Returns the previous block.
    pub fn set_block(&mut self, pos: WorldPos, id: BlockTypeId) -> Result<BlockTypeId> {
        let chunk_pos = pos.chunk_pos();
        if !self.is_loaded(chunk_pos) {
            return Err(Error::NotFound(format!("loaded chunk {chunk_pos:?}")));
        }

        let change = self.provider.store_mut().set_block(pos, id)?;
        if change.old != change.new {
            self.apply_changes(&[change]);
        }
        Ok(change.old)
    }

    /// Relight the loaded chunks holding `changes` and notify observers once
    /// per chunk. Loaded neighbours across a touched face are notified too,
    /// since their occlusion bits changed.
    fn apply_changes(&mut self, changes: &[BlockChange]) {
        // (chunk, static blocks affected, holds an edit)
        let mut touched: Vec<(ChunkPos, bool, bool)> = Vec::new();
        for change in changes {
            if !self.is_loaded(change.chunk) {
                continue;
            }
            match touched.iter_mut().find(|entry| entry.0 == change.chunk) {
                Some(entry) => {
                    entry.1 |= change.static_blocks_affected;
                    entry.2 = true;
                }
                None => touched.push((change.chunk, change.static_blocks_affected, true)),
            }

            let local = change.pos.local_pos();
            for side in BlockSide::ALL {
                let neighbor = change.chunk.neighbor(side);
                if !local.is_on_face(side)
                    || !self.is_loaded(neighbor)
                    || touched.iter().any(|entry| entry.0 == neighbor)
                {
                    continue;
                }
                touched.push((neighbor, false, false));
            }
        }

        for &(pos, _, edited) in &touched {
            if edited {
                self.relight(pos);
            }
        }
        let store = self.provider.store();
        for (pos, static_blocks_affected, _) in touched {
            if let Some(chunk) = store.chunk(pos) {
                for observer in &mut self.observers {
                    observer.chunk_changed(chunk, static_blocks_affected);
                }
            }
        }
    }

    /// Recompute light around a chunk. Returns the number of cells processed.
    pub fn relight(&mut self, pos: ChunkPos) -> usize {
        self.light.solve(self.provider.store_mut(), pos)
    }

    /// Provider housekeeping, such as retrying failed saves.
    pub fn tick(&mut self, delta: f32) -> Result<()> {
        self.provider.tick(delta, &mut self.entities)
    }

    /// First block with a hitbox along the ray, among loaded chunks.
    pub fn cast_ray(&self, ray: &Ray, max_distance: f32) -> Option<RayHit> {
        let mut hit = None;
        cast_ray(ray.origin, ray.direction, max_distance, |cell, _, _| {
            let pos = WorldPos::from(cell);
            let Some(id) = self.block(pos) else {
                return false;
            };
            if id.is_air() {
                return false;
            }
            let Some(hitbox) = self.registry.get(id).hitbox() else {
                return false;
            };
            let Some(intersection) = hitbox.translated(pos.to_vec3()).intersects_ray(
                ray.origin,
                ray.direction,
                max_distance,
            ) else {
                return false;
            };
            hit = Some(RayHit {
                block: pos,
                side: intersection.side,
                distance: intersection.t,
                block_type: id,
            });
            true
        });
        hit
    }

    /// Attach an entity to the loaded chunk containing its transform.
    pub fn attach_entity(&mut self, entity: Entity) -> Option<ChunkPos> {
        let pos = self.entities.get::<&Transform>(entity).ok()?.chunk_pos();
        if !self.is_loaded(pos) {
            return None;
        }
        self.provider.store_mut().chunk_mut(pos)?.add_entity(entity);
        Some(pos)
    }

    /// Detach an entity from whichever loaded chunk holds it.
    pub fn detach_entity(&mut self, entity: Entity) -> Option<ChunkPos> {
        let hint = self
            .entities
            .get::<&Transform>(entity)
            .ok()
            .map(|t| t.chunk_pos());
        let holder = hint
            .filter(|pos| {
                self.chunk(*pos)
                    .is_some_and(|chunk| chunk.entities().contains(&entity))
            })
            .or_else(|| {
                self.loaded_chunks().find(|pos| {
                    self.chunk(*pos)
                        .is_some_and(|chunk| chunk.entities().contains(&entity))
                })
            })?;
        self.provider.store_mut().chunk_mut(holder)?.remove_entity(entity);
        Some(holder)
    }

    /// Move an entity from the chunk holding it to another loaded chunk.
    /// Nothing happens if the destination is not loaded or `from` does not
    /// hold the entity.
    pub fn move_entity(&mut self, entity: Entity, from: ChunkPos, to: ChunkPos) -> bool {
        if from == to || !self.is_loaded(to) {
            return false;
        }
        let store = self.provider.store_mut();
        let removed = store
            .chunk_mut(from)
            .is_some_and(|chunk| chunk.remove_entity(entity));
        if !removed {
            return false;
        }
        store
            .chunk_mut(to)
            .is_some_and(|chunk| chunk.add_entity(entity))
    }

    /// Entities attached to loaded chunks whose position lies in the box.
    pub fn entities_in_region(&self, min: Vec3, max: Vec3) -> Vec<Entity> {
        let region = Aabb::new(min, max);
        let lo = WorldPos::from_vec3(min).chunk_pos();
        let hi = WorldPos::from_vec3(max).chunk_pos();

        let mut found = Vec::new();
        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    let Some(chunk) = self.chunk(ChunkPos::new(x, y, z)) else {
                        continue;
                    };
                    for &entity in chunk.entities() {
                        let inside = self
                            .entities
                            .get::<&Transform>(entity)
                            .is_ok_and(|t| region.contains_point(t.position));
                        if inside {
                            found.push(entity);
                        }
                    }
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use approx::assert_relative_eq;
    use blockwork_core::constants::MAX_LIGHT;
    use blockwork_core::ColumnPos;

    use super::*;
    use crate::generation::{ColumnWriter, FlatGenerator, Populator};
    use crate::persistence::MemoryColumns;
    use crate::provider::ColumnProvider;

    const STONE: BlockTypeId = BlockTypeId(1);
    const GLASS: BlockTypeId = BlockTypeId(8);

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Loaded(ChunkPos),
        Changed(ChunkPos, bool),
        Unloaded(ChunkPos),
    }

    struct Recorder(Rc<RefCell<Vec<Event>>>);

    impl WorldObserver for Recorder {
        fn chunk_loaded(&mut self, chunk: &Chunk) {
            self.0.borrow_mut().push(Event::Loaded(chunk.pos()));
        }

        fn chunk_changed(&mut self, chunk: &Chunk, static_blocks_affected: bool) {
            self.0
                .borrow_mut()
                .push(Event::Changed(chunk.pos(), static_blocks_affected));
        }

        fn chunk_unloaded(&mut self, chunk: &Chunk) {
            self.0.borrow_mut().push(Event::Unloaded(chunk.pos()));
        }
    }

    fn flat_world() -> (World<ColumnProvider<MemoryColumns>>, Rc<RefCell<Vec<Event>>>) {
        let store = ChunkStore::new(Arc::new(BlockRegistry::standard()));
        let generator = FlatGenerator::new(vec![(STONE, 8)]);
        let provider = ColumnProvider::new(store, Box::new(generator), MemoryColumns::new());
        let mut world = World::new(provider);
        let events = Rc::new(RefCell::new(Vec::new()));
        world.add_observer(Box::new(Recorder(Rc::clone(&events))));
        (world, events)
    }

    #[test]
    fn load_and_unload_notify_observers() {
        let (mut world, events) = flat_world();
        let pos = ChunkPos::new(0, 0, 0);

        world.load_chunk(pos).unwrap();
        world.load_chunk(pos).unwrap();
        assert!(world.is_loaded(pos));
        assert!(world.chunk(pos).unwrap().is_loaded());
        assert_eq!(world.loaded_count(), 1);

        assert!(world.unload_chunk(pos).unwrap());
        assert!(!world.unload_chunk(pos).unwrap());
        assert!(!world.is_loaded(pos));
        assert_eq!(*events.borrow(), vec![Event::Loaded(pos), Event::Unloaded(pos)]);

        // Column was saved and evicted on return
        assert!(!world.store().contains_column(ColumnPos::new(0, 0)));
        assert!(world.provider().storage().contains(ColumnPos::new(0, 0)));
    }

    #[test]
    fn loading_lights_the_chunk() {
        let (mut world, _) = flat_world();
        let pos = ChunkPos::new(0, 0, 0);
        world.load_chunk(pos).unwrap();

        let chunk = world.chunk(pos).unwrap();
        assert_eq!(chunk.light(WorldPos::new(3, 3, 8).local_pos()), MAX_LIGHT);
        assert_eq!(chunk.light(WorldPos::new(3, 3, 7).local_pos()), 0);
    }

    #[test]
    fn set_block_requires_a_loaded_chunk() {
        let (mut world, _) = flat_world();
        let err = world.set_block(WorldPos::new(0, 0, 0), GLASS).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn set_block_notifies_chunk_and_touched_neighbours() {
        let (mut world, events) = flat_world();
        world.load_chunk(ChunkPos::new(0, 0, 0)).unwrap();
        world.load_chunk(ChunkPos::new(-1, 0, 0)).unwrap();
        events.borrow_mut().clear();

        let old = world.set_block(WorldPos::new(0, 5, 12), GLASS).unwrap();
        assert_eq!(old, BlockTypeId::AIR);
        assert_eq!(world.block(WorldPos::new(0, 5, 12)), Some(GLASS));
        assert_eq!(
            *events.borrow(),
            vec![
                Event::Changed(ChunkPos::new(0, 0, 0), true),
                Event::Changed(ChunkPos::new(-1, 0, 0), false),
            ]
        );

        // Writing the same block again changes nothing
        events.borrow_mut().clear();
        world.set_block(WorldPos::new(0, 5, 12), GLASS).unwrap();
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn digging_relights() {
        let (mut world, _) = flat_world();
        world.load_chunk(ChunkPos::new(0, 0, 0)).unwrap();
        let below = WorldPos::new(4, 4, 6);
        assert_eq!(world.chunk(below.chunk_pos()).unwrap().light(below.local_pos()), 0);

        world.set_block(WorldPos::new(4, 4, 7), BlockTypeId::AIR).unwrap();
        world.set_block(below, BlockTypeId::AIR).unwrap();
        assert_eq!(
            world.chunk(below.chunk_pos()).unwrap().light(below.local_pos()),
            MAX_LIGHT
        );
    }

    #[test]
    fn ray_hits_the_floor_from_above() {
        let (mut world, _) = flat_world();
        world.load_chunk(ChunkPos::new(0, 0, 0)).unwrap();

        let ray = Ray::new(Vec3::new(4.5, 4.5, 12.5), Vec3::NEG_Z);
        let hit = world.cast_ray(&ray, 20.0).unwrap();
        assert_eq!(hit.block, WorldPos::new(4, 4, 7));
        assert_eq!(hit.side, BlockSide::Top);
        assert_eq!(hit.block_type, STONE);
        assert_relative_eq!(hit.distance, 4.5, epsilon = 1e-4);

        assert!(world.cast_ray(&ray, 3.0).is_none());
        let up = Ray::new(Vec3::new(4.5, 4.5, 12.5), Vec3::Z);
        assert!(world.cast_ray(&up, 50.0).is_none());
    }

    #[test]
    fn rays_ignore_unloaded_chunks() {
        let (mut world, _) = flat_world();
        world.load_chunk(ChunkPos::new(0, 0, 0)).unwrap();
        let ray = Ray::new(Vec3::new(20.5, 4.5, 12.5), Vec3::NEG_Z);
        assert!(world.cast_ray(&ray, 20.0).is_none());
    }

    #[test]
    fn entities_follow_their_chunks() {
        let (mut world, _) = flat_world();
        let home = ChunkPos::new(0, 0, 0);
        let next = ChunkPos::new(1, 0, 0);
        world.load_chunk(home).unwrap();

        let entity = world
            .entities
            .spawn((Transform::from_position(Vec3::new(2.0, 2.0, 9.0)),));
        assert_eq!(world.attach_entity(entity), Some(home));
        assert_eq!(
            world.entities_in_region(Vec3::ZERO, Vec3::splat(10.0)),
            vec![entity]
        );
        assert!(world
            .entities_in_region(Vec3::new(5.0, 0.0, 0.0), Vec3::splat(10.0))
            .is_empty());

        assert!(!world.move_entity(entity, home, next));
        world.load_chunk(next).unwrap();
        assert!(world.move_entity(entity, home, next));
        assert!(world.chunk(next).unwrap().entities().contains(&entity));
        assert!(!world.chunk(home).unwrap().entities().contains(&entity));

        assert_eq!(world.detach_entity(entity), Some(next));
        assert_eq!(world.detach_entity(entity), None);
    }

    /// Drops a glass block just west of the column origin.
    struct WestGlass;

    impl Populator for WestGlass {
        fn populate_column(&self, column: &mut ColumnWriter<'_>) -> Result<()> {
            let (ox, oy) = column.pos().origin();
            column.set_block(WorldPos::new(ox - 1, oy, 20), GLASS)
        }
    }

    #[test]
    fn population_into_a_loaded_chunk_notifies_it() {
        let store = ChunkStore::new(Arc::new(BlockRegistry::standard()));
        let generator = FlatGenerator::new(vec![(STONE, 8)]);
        let provider = ColumnProvider::new(store, Box::new(generator), MemoryColumns::new())
            .with_populator(Box::new(WestGlass));
        let mut world = World::new(provider);
        let events = Rc::new(RefCell::new(Vec::new()));
        world.add_observer(Box::new(Recorder(Rc::clone(&events))));

        let west = ChunkPos::new(-1, 0, 1);
        let home = ChunkPos::new(0, 0, 1);
        world.load_chunk(west).unwrap();
        events.borrow_mut().clear();

        world.load_chunk(home).unwrap();
        assert_eq!(world.block(WorldPos::new(-1, 0, 20)), Some(GLASS));
        assert_eq!(
            *events.borrow(),
            vec![
                Event::Loaded(home),
                Event::Changed(west, true),
                Event::Changed(home, false),
            ]
        );
    }

    #[test]
    fn population_into_unloaded_chunks_is_silent() {
        let store = ChunkStore::new(Arc::new(BlockRegistry::standard()));
        let generator = FlatGenerator::new(vec![(STONE, 8)]);
        let provider = ColumnProvider::new(store, Box::new(generator), MemoryColumns::new())
            .with_populator(Box::new(WestGlass));
        let mut world = World::new(provider);
        let events = Rc::new(RefCell::new(Vec::new()));
        world.add_observer(Box::new(Recorder(Rc::clone(&events))));

        world.load_chunk(ChunkPos::new(0, 0, 1)).unwrap();
        assert_eq!(*events.borrow(), vec![Event::Loaded(ChunkPos::new(0, 0, 1))]);
        assert_eq!(world.block(WorldPos::new(-1, 0, 20)), None);
    }

    #[test]
    fn unloading_after_a_despawn_still_saves() {
        let (mut world, _) = flat_world();
        let pos = ChunkPos::new(0, 0, 0);
        world.load_chunk(pos).unwrap();

        let entity = world
            .entities
            .spawn((Transform::from_position(Vec3::new(2.0, 2.0, 9.0)),));
        world.attach_entity(entity);
        world.entities.despawn(entity).unwrap();

        assert!(world.unload_chunk(pos).unwrap());
        assert!(!world.store().contains_column(ColumnPos::new(0, 0)));
        assert!(world.provider().storage().contains(ColumnPos::new(0, 0)));

        world.load_chunk(pos).unwrap();
        assert!(world.chunk(pos).unwrap().entities().is_empty());
        assert_eq!(world.entities.len(), 0);
    }

    #[test]
    fn entity_outside_loaded_chunks_is_not_attached() {
        let (mut world, _) = flat_world();
        let entity = world
            .entities
            .spawn((Transform::from_position(Vec3::new(2.0, 2.0, 9.0)),));
        assert_eq!(world.attach_entity(entity), None);
    }
}
