//! Chunk providers: where a world gets its chunks from and gives them back to.

use blockwork_core::{ChunkPos, ColumnPos, Error, Result};
use blockwork_entity::World as EntityWorld;
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::generation::{ColumnWriter, Generator, NeighborSource, Populator};
use crate::persistence::{decode_column, encode_column, ColumnStorage};
use crate::store::{BlockChange, ChunkStore};

/// Supplies chunks to a [`World`](crate::World).
///
/// A borrowed chunk stays in the provider's store; the world only tracks which
/// chunks it holds. Entities attached to chunks live in the world's ECS and
/// are passed in whenever a provider may spawn or despawn them.
pub trait ChunkProvider {
    /// Make the chunk available, generating or loading its column as needed.
    ///
    /// Returns the blocks changed in other columns while doing so, such as
    /// population reaching into a neighbour.
    fn borrow_chunk(
        &mut self,
        pos: ChunkPos,
        entities: &mut EntityWorld,
    ) -> Result<Vec<BlockChange>>;

    /// Hand a chunk back. The provider may save and evict its column.
    fn return_chunk(&mut self, pos: ChunkPos, entities: &mut EntityWorld) -> Result<()>;

    /// Periodic housekeeping.
    fn tick(&mut self, delta: f32, entities: &mut EntityWorld) -> Result<()>;

    fn store(&self) -> &ChunkStore;

    fn store_mut(&mut self) -> &mut ChunkStore;
}

/// Column provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Seconds between attempts to write columns whose save failed.
    pub save_retry_interval: f32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            save_retry_interval: 5.0,
        }
    }
}

/// Bring a column into `store`: from storage when a valid copy exists,
/// otherwise from the generator. Never populates.
pub(crate) fn load_or_generate(
    store: &mut ChunkStore,
    generator: &dyn Generator,
    storage: &mut dyn ColumnStorage,
    entities: &mut EntityWorld,
    pos: ColumnPos,
) -> Result<()> {
    if store.contains_column(pos) {
        return Ok(());
    }

    if let Some(bytes) = storage.read(pos) {
        match decode_column(pos, &bytes, store.registry(), entities) {
            Ok(column) => {
                store.insert_column(column);
                debug!(x = pos.x, y = pos.y, "column loaded");
                return Ok(());
            }
            Err(e) => warn!(x = pos.x, y = pos.y, error = %e, "discarding stored column"),
        }
    }

    let _span = tracing::trace_span!("generate_column", x = pos.x, y = pos.y).entered();
    store.insert_empty_column(pos);
    let result = generator.generate_column(&mut ColumnWriter::for_generation(store, pos));
    if result.is_err() {
        store.remove_column(pos);
    }
    result
}

/// Provider backed by a generator, a populator chain and column storage.
pub struct ColumnProvider<S: ColumnStorage> {
    store: ChunkStore,
    generator: Box<dyn Generator>,
    populators: Vec<Box<dyn Populator>>,
    storage: S,
    config: ProviderConfig,
    pending_saves: HashSet<ColumnPos>,
    retry_timer: f32,
}

impl<S: ColumnStorage> ColumnProvider<S> {
    pub fn new(store: ChunkStore, generator: Box<dyn Generator>, storage: S) -> Self {
        Self {
            store,
            generator,
            populators: Vec::new(),
            storage,
            config: ProviderConfig::default(),
            pending_saves: HashSet::new(),
            retry_timer: 0.0,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ProviderConfig) -> Self {
        self.config = config;
        self
    }

    /// Append a populator. Populators run in insertion order.
    #[must_use]
    pub fn with_populator(mut self, populator: Box<dyn Populator>) -> Self {
        self.populators.push(populator);
        self
    }

    pub const fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub const fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Columns whose last save attempt failed.
    pub fn pending_saves(&self) -> impl Iterator<Item = ColumnPos> + '_ {
        self.pending_saves.iter().copied()
    }

    fn populate(
        &mut self,
        pos: ColumnPos,
        entities: &mut EntityWorld,
    ) -> Result<Vec<BlockChange>> {
        let Some(column) = self.store.column_mut(pos) else {
            return Err(Error::NotFound(format!("column {pos:?}")));
        };
        if column.is_populated() {
            return Ok(Vec::new());
        }
        column.mark_populated();

        let mut changes = Vec::new();

        let _span = tracing::trace_span!("populate_column", x = pos.x, y = pos.y).entered();
        for populator in &self.populators {
            let neighbors = NeighborSource {
                generator: self.generator.as_ref(),
                storage: &mut self.storage,
                entities: &mut *entities,
            };
            let mut writer = ColumnWriter::for_population(&mut self.store, pos, neighbors);
            populator.populate_column(&mut writer)?;
            changes.extend(writer.into_changes());
        }

        if let Some(column) = self.store.column_mut(pos) {
            column.mark_ready();
        }
        Ok(changes)
    }

    /// Encode and write a column, then evict it and despawn its entities.
    /// On failure the column stays in memory and is queued for retry.
    fn save_column(&mut self, pos: ColumnPos, entities: &mut EntityWorld) -> Result<bool> {
        let Some(column) = self.store.column(pos) else {
            self.pending_saves.remove(&pos);
            return Ok(false);
        };
        if !column.can_be_saved() {
            self.pending_saves.remove(&pos);
            return Ok(false);
        }

        let bytes = encode_column(column, entities)?;
        if !self.storage.write(pos, &bytes) {
            warn!(x = pos.x, y = pos.y, "column save failed, will retry");
            self.pending_saves.insert(pos);
            return Ok(false);
        }

        self.pending_saves.remove(&pos);
        if let Some(column) = self.store.remove_column(pos) {
            for chunk in column.chunks() {
                for &entity in chunk.entities() {
                    // Already gone if the application despawned it directly
                    let _ = entities.despawn(entity);
                }
            }
        }
        debug!(x = pos.x, y = pos.y, bytes = bytes.len(), "column saved");
        Ok(true)
    }

    /// Save every column that can be saved. Returns how many were written.
    pub fn save_all(&mut self, entities: &mut EntityWorld) -> Result<usize> {
        let mut saved = 0;
        for pos in self.store.column_positions() {
            if self.save_column(pos, entities)? {
                saved += 1;
            }
        }
        if saved > 0 {
            info!(saved, "saved columns");
        }
        Ok(saved)
    }
}

impl<S: ColumnStorage> ChunkProvider for ColumnProvider<S> {
    fn borrow_chunk(
        &mut self,
        pos: ChunkPos,
        entities: &mut EntityWorld,
    ) -> Result<Vec<BlockChange>> {
        if pos.layer().is_none() {
            return Err(Error::OutOfBounds(format!("chunk layer {} of {pos:?}", pos.z)));
        }
        let column = pos.column();
        load_or_generate(
            &mut self.store,
            self.generator.as_ref(),
            &mut self.storage,
            entities,
            column,
        )?;
        let changes = self.populate(column, entities)?;
        self.store.borrow_chunk(pos)?;
        self.pending_saves.remove(&column);
        Ok(changes)
    }

    fn return_chunk(&mut self, pos: ChunkPos, entities: &mut EntityWorld) -> Result<()> {
        if self.store.return_chunk(pos)? {
            self.save_column(pos.column(), entities)?;
        }
        Ok(())
    }

    fn tick(&mut self, delta: f32, entities: &mut EntityWorld) -> Result<()> {
        if self.pending_saves.is_empty() {
            self.retry_timer = 0.0;
            return Ok(());
        }
        self.retry_timer += delta;
        if self.retry_timer < self.config.save_retry_interval {
            return Ok(());
        }
        self.retry_timer = 0.0;

        let pending: Vec<ColumnPos> = self.pending_saves.iter().copied().collect();
        for pos in pending {
            self.save_column(pos, entities)?;
        }
        Ok(())
    }

    fn store(&self) -> &ChunkStore {
        &self.store
    }

    fn store_mut(&mut self) -> &mut ChunkStore {
        &mut self.store
    }
}
