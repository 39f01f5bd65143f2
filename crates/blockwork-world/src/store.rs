//! In-memory chunk storage with cross-chunk occlusion maintenance.
//!
//! The store owns every column that is in memory, whether or not its chunks
//! are loaded into a [`World`](crate::World). All block writes go through
//! [`ChunkStore::set_block`] so that the occlusion masks of the written cell
//! and its six neighbours stay consistent, including across chunk and column
//! boundaries.

use std::sync::Arc;

use blockwork_core::constants::CHUNK_SIZE;
use blockwork_core::{
    BlockRegistry, BlockSide, BlockType, BlockTypeId, ChunkPos, ColumnPos, Error, LocalPos,
    Result, WorldPos,
};
use hashbrown::HashMap;
use tracing::trace;

use crate::chunk::{Chunk, OcclusionMask};
use crate::column::ChunkColumn;

/// Outcome of a block write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockChange {
    pub pos: WorldPos,
    pub chunk: ChunkPos,
    pub old: BlockTypeId,
    pub new: BlockTypeId,
    /// Static block iteration of the chunk may have changed
    pub static_blocks_affected: bool,
}

/// Owns all in-memory columns, keyed by column position.
pub struct ChunkStore {
    registry: Arc<BlockRegistry>,
    columns: HashMap<ColumnPos, ChunkColumn>,
}

impl ChunkStore {
    pub fn new(registry: Arc<BlockRegistry>) -> Self {
        Self {
            registry,
            columns: HashMap::new(),
        }
    }

    pub const fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    /// Check if a column is in memory.
    pub fn contains_column(&self, pos: ColumnPos) -> bool {
        self.columns.contains_key(&pos)
    }

    pub fn column(&self, pos: ColumnPos) -> Option<&ChunkColumn> {
        self.columns.get(&pos)
    }

    pub fn column_mut(&mut self, pos: ColumnPos) -> Option<&mut ChunkColumn> {
        self.columns.get_mut(&pos)
    }

    /// Positions of all in-memory columns.
    pub fn column_positions(&self) -> Vec<ColumnPos> {
        self.columns.keys().copied().collect()
    }

    /// Get the number of columns in memory.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if no columns are in memory.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Add a fully built column (decoded from storage) and derive the occlusion
    /// of its chunks and of the neighbouring faces.
    pub fn insert_column(&mut self, column: ChunkColumn) {
        let pos = column.pos();
        let layers: Vec<ChunkPos> = column.chunks().map(Chunk::pos).collect();
        self.columns.insert(pos, column);
        for chunk in layers {
            self.refresh_chunk(chunk);
        }
        trace!(x = pos.x, y = pos.y, "column inserted");
    }

    /// Insert a fresh column with no chunks. Nothing to derive.
    pub(crate) fn insert_empty_column(&mut self, pos: ColumnPos) {
        self.columns.insert(pos, ChunkColumn::new(pos));
    }

    /// Remove a column; neighbouring chunks stop seeing its blocks.
    pub fn remove_column(&mut self, pos: ColumnPos) -> Option<ChunkColumn> {
        let column = self.columns.remove(&pos)?;
        for chunk in column.chunks() {
            for side in [BlockSide::West, BlockSide::East, BlockSide::South, BlockSide::North] {
                self.refresh_face(chunk.pos().neighbor(side), side.opposite());
            }
        }
        trace!(x = pos.x, y = pos.y, "column removed");
        Some(column)
    }

    pub fn chunk(&self, pos: ChunkPos) -> Option<&Chunk> {
        self.columns.get(&pos.column())?.chunk(pos.layer()?)
    }

    pub fn chunk_mut(&mut self, pos: ChunkPos) -> Option<&mut Chunk> {
        let layer = pos.layer()?;
        self.columns.get_mut(&pos.column())?.chunk_mut(layer)
    }

    /// Block at a world position.
    ///
    /// `None` if the column is not in memory or the position is outside the
    /// layer range. Unallocated layers of an in-memory column read as air.
    pub fn block(&self, pos: WorldPos) -> Option<BlockTypeId> {
        let (chunk_pos, local) = pos.split();
        let layer = chunk_pos.layer()?;
        let column = self.columns.get(&chunk_pos.column())?;
        Some(column.chunk(layer).map_or(BlockTypeId::AIR, |c| c.get_block(local)))
    }

    /// Block type at a world position.
    pub fn block_type(&self, pos: WorldPos) -> Option<&BlockType> {
        self.block(pos).map(|id| self.registry.get(id))
    }

    /// Missing columns and positions outside the world count as transparent.
    pub fn is_transparent_at(&self, pos: WorldPos) -> bool {
        self.block_type(pos).map_or(true, BlockType::is_transparent)
    }

    /// Chunk at `pos`, allocating an all-air chunk if the layer is empty.
    pub fn ensure_chunk(&mut self, pos: ChunkPos) -> Result<&mut Chunk> {
        let layer = pos
            .layer()
            .ok_or_else(|| Error::OutOfBounds(format!("chunk layer {} of {pos:?}", pos.z)))?;
        let column = self
            .columns
            .get_mut(&pos.column())
            .ok_or_else(|| Error::NotFound(format!("column {:?}", pos.column())))?;

        if column.chunk(layer).is_none() {
            column.insert_chunk(Chunk::new(pos));
            for side in BlockSide::ALL {
                self.refresh_face(pos, side);
            }
        }

        self.chunk_mut(pos)
            .ok_or_else(|| Error::NotFound(format!("chunk {pos:?}")))
    }

    /// Allocate the chunk if needed and set its borrow bit.
    pub fn borrow_chunk(&mut self, pos: ChunkPos) -> Result<&mut Chunk> {
        self.ensure_chunk(pos)?;
        let layer = pos
            .layer()
            .ok_or_else(|| Error::OutOfBounds(format!("chunk layer {} of {pos:?}", pos.z)))?;
        let column = self
            .columns
            .get_mut(&pos.column())
            .ok_or_else(|| Error::NotFound(format!("column {:?}", pos.column())))?;
        column.mark_borrowed(layer);
        column
            .chunk_mut(layer)
            .ok_or_else(|| Error::NotFound(format!("chunk {pos:?}")))
    }

    /// Clear the borrow bit. Returns whether the column may now be saved.
    pub fn return_chunk(&mut self, pos: ChunkPos) -> Result<bool> {
        let layer = pos
            .layer()
            .ok_or_else(|| Error::OutOfBounds(format!("chunk layer {} of {pos:?}", pos.z)))?;
        let column = self
            .columns
            .get_mut(&pos.column())
            .ok_or_else(|| Error::NotFound(format!("column {:?}", pos.column())))?;
        column.return_chunk(layer);
        Ok(column.can_be_saved())
    }

    /// Write a block and keep occlusion consistent around it.
    ///
    /// The chunk is allocated if its layer is empty. The column must already be
    /// in memory.
    pub fn set_block(&mut self, pos: WorldPos, id: BlockTypeId) -> Result<BlockChange> {
        let registry = Arc::clone(&self.registry);
        let block = registry.lookup_by_id(id)?;
        let (chunk_pos, local) = pos.split();

        let mask = self.cell_mask(pos);
        let chunk = self.ensure_chunk(chunk_pos)?;
        let old = chunk.set_block(local, block);
        chunk.set_occlusion(local, mask);

        let occludes = !block.is_transparent();
        for side in BlockSide::ALL {
            let neighbor = pos.offset(side);
            if let Some(chunk) = self.chunk_mut(neighbor.chunk_pos()) {
                chunk.set_occluded(neighbor.local_pos(), side.opposite(), occludes);
            }
        }

        let was_dynamic = registry.get(old).is_dynamic();
        Ok(BlockChange {
            pos,
            chunk: chunk_pos,
            old,
            new: id,
            static_blocks_affected: was_dynamic != block.is_dynamic() || !block.is_dynamic(),
        })
    }

    /// Occlusion mask of a cell from the current state of its neighbours.
    fn cell_mask(&self, pos: WorldPos) -> OcclusionMask {
        BlockSide::ALL
            .into_iter()
            .filter(|&side| !self.is_transparent_at(pos.offset(side)))
            .fold(0, |mask, side| mask | side.bit())
    }

    /// Recompute the masks of the cells on one face of a chunk.
    fn refresh_face(&mut self, chunk_pos: ChunkPos, side: BlockSide) {
        if self.chunk(chunk_pos).is_none() {
            return;
        }
        let last = (CHUNK_SIZE - 1) as u8;
        let fixed = if side.is_positive() { last } else { 0 };
        let mut masks = Vec::with_capacity(CHUNK_SIZE * CHUNK_SIZE);
        for a in 0..CHUNK_SIZE as u8 {
            for b in 0..CHUNK_SIZE as u8 {
                let local = match side.axis() {
                    0 => LocalPos::new(fixed, a, b),
                    1 => LocalPos::new(a, fixed, b),
                    _ => LocalPos::new(a, b, fixed),
                };
                let world = WorldPos::from_chunk_local(chunk_pos, local);
                masks.push((local, self.cell_mask(world)));
            }
        }
        if let Some(chunk) = self.chunk_mut(chunk_pos) {
            for (local, mask) in masks {
                chunk.set_occlusion(local, mask);
            }
        }
    }

    /// Recompute every mask of a chunk and the facing cells of its neighbours.
    fn refresh_chunk(&mut self, chunk_pos: ChunkPos) {
        let Some(chunk) = self.chunk(chunk_pos) else {
            return;
        };
        let masks: Vec<OcclusionMask> = (0..chunk.blocks().len())
            .map(|index| {
                let world = WorldPos::from_chunk_local(chunk_pos, LocalPos::from_index(index));
                self.cell_mask(world)
            })
            .collect();
        if let Some(chunk) = self.chunk_mut(chunk_pos) {
            for (index, mask) in masks.into_iter().enumerate() {
                chunk.set_occlusion(LocalPos::from_index(index), mask);
            }
        }
        for side in BlockSide::ALL {
            self.refresh_face(chunk_pos.neighbor(side), side.opposite());
        }
    }
}
