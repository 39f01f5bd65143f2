//! Chunk data structure for voxel world storage.
//!
//! A chunk is a 16³ grid of block type ids with a parallel occlusion mask and
//! light level per cell. Occlusion and light are maintained by the
//! [`ChunkStore`](crate::store::ChunkStore) and the light solver, which can see
//! neighbouring chunks; the chunk itself only tracks its own cells.

use std::ops::Range;

use blockwork_core::constants::CHUNK_SIZE_CUBED;
use blockwork_core::{BlockRegistry, BlockSide, BlockType, BlockTypeId, ChunkPos, LocalPos};
use blockwork_entity::Entity;
use hashbrown::HashSet;

/// Six face bits, one per [`BlockSide`]; a set bit means the neighbour across
/// that face is not transparent.
pub type OcclusionMask = u8;

/// Index range that contains every non-air block of one kind.
///
/// Hints only grow on edits and are tightened after a complete scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationHint {
    start: usize,
    end: usize,
}

impl IterationHint {
    pub const EMPTY: Self = Self {
        start: CHUNK_SIZE_CUBED,
        end: 0,
    };

    pub const fn is_empty(self) -> bool {
        self.start >= self.end
    }

    /// Indices covered by the hint.
    pub fn range(self) -> Range<usize> {
        self.start..self.end.max(self.start)
    }

    fn include(&mut self, index: usize) {
        self.start = self.start.min(index);
        self.end = self.end.max(index + 1);
    }
}

/// A single chunk of block data (16x16x16 blocks).
#[derive(Debug, Clone)]
pub struct Chunk {
    pos: ChunkPos,
    blocks: Box<[BlockTypeId]>,
    occlusion: Box<[OcclusionMask]>,
    light: Box<[u8]>,
    static_hint: IterationHint,
    dynamic_hint: IterationHint,
    entities: HashSet<Entity>,
    loaded: bool,
}

impl Chunk {
    /// Create a new all-air chunk at the given position.
    pub fn new(pos: ChunkPos) -> Self {
        Self {
            pos,
            blocks: vec![BlockTypeId::AIR; CHUNK_SIZE_CUBED].into_boxed_slice(),
            occlusion: vec![0; CHUNK_SIZE_CUBED].into_boxed_slice(),
            light: vec![0; CHUNK_SIZE_CUBED].into_boxed_slice(),
            static_hint: IterationHint::EMPTY,
            dynamic_hint: IterationHint::EMPTY,
            entities: HashSet::new(),
            loaded: false,
        }
    }

    /// Position in chunk coordinates.
    pub const fn pos(&self) -> ChunkPos {
        self.pos
    }

    #[inline]
    pub fn get_block(&self, local: LocalPos) -> BlockTypeId {
        self.blocks[local.to_index()]
    }

    /// Block id at a linear index.
    #[inline]
    pub fn block_at_index(&self, index: usize) -> BlockTypeId {
        self.blocks[index]
    }

    /// Replace a block and grow the matching iteration hint. Returns the old id.
    ///
    /// Occlusion of this cell and its neighbours is left to the caller, which
    /// can see across chunk boundaries.
    pub fn set_block(&mut self, local: LocalPos, block: &BlockType) -> BlockTypeId {
        let index = local.to_index();
        let old = std::mem::replace(&mut self.blocks[index], block.id());
        if !block.is_air() {
            if block.is_dynamic() {
                self.dynamic_hint.include(index);
            } else {
                self.static_hint.include(index);
            }
        }
        old
    }

    /// True if every cell is air.
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|id| id.is_air())
    }

    /// All block ids in index order.
    pub fn blocks(&self) -> &[BlockTypeId] {
        &self.blocks
    }

    #[inline]
    pub fn occlusion(&self, local: LocalPos) -> OcclusionMask {
        self.occlusion[local.to_index()]
    }

    #[inline]
    pub fn set_occlusion(&mut self, local: LocalPos, mask: OcclusionMask) {
        self.occlusion[local.to_index()] = mask;
    }

    /// Set or clear the bit of one face.
    #[inline]
    pub fn set_occluded(&mut self, local: LocalPos, side: BlockSide, occluded: bool) {
        let mask = &mut self.occlusion[local.to_index()];
        if occluded {
            *mask |= side.bit();
        } else {
            *mask &= !side.bit();
        }
    }

    #[inline]
    pub fn light(&self, local: LocalPos) -> u8 {
        self.light[local.to_index()]
    }

    #[inline]
    pub fn set_light(&mut self, local: LocalPos, level: u8) {
        self.light[local.to_index()] = level;
    }

    pub const fn static_hint(&self) -> IterationHint {
        self.static_hint
    }

    pub const fn dynamic_hint(&self) -> IterationHint {
        self.dynamic_hint
    }

    /// Non-air blocks that are not dynamic.
    ///
    /// Finishing the iteration re-tightens the static hint.
    pub fn static_non_air_blocks<'a>(&'a mut self, registry: &'a BlockRegistry) -> NonAirBlocks<'a> {
        NonAirBlocks::new(self, registry, false)
    }

    /// Non-air dynamic blocks.
    ///
    /// Finishing the iteration re-tightens the dynamic hint.
    pub fn dynamic_non_air_blocks<'a>(
        &'a mut self,
        registry: &'a BlockRegistry,
    ) -> NonAirBlocks<'a> {
        NonAirBlocks::new(self, registry, true)
    }

    /// Entities positioned inside this chunk.
    pub const fn entities(&self) -> &HashSet<Entity> {
        &self.entities
    }

    pub fn add_entity(&mut self, entity: Entity) -> bool {
        self.entities.insert(entity)
    }

    pub fn remove_entity(&mut self, entity: Entity) -> bool {
        self.entities.remove(&entity)
    }

    /// Whether the chunk is currently loaded in a world.
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub(crate) fn set_loaded(&mut self, loaded: bool) {
        self.loaded = loaded;
    }
}

/// One cell yielded by [`NonAirBlocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockVisit {
    pub pos: LocalPos,
    pub block: BlockTypeId,
    pub occlusion: OcclusionMask,
}

/// Lazy scan over the non-air cells of one kind inside a chunk's hint range.
pub struct NonAirBlocks<'a> {
    chunk: &'a mut Chunk,
    registry: &'a BlockRegistry,
    dynamic: bool,
    cursor: usize,
    end: usize,
    first: Option<usize>,
    last: usize,
    finished: bool,
}

impl<'a> NonAirBlocks<'a> {
    fn new(chunk: &'a mut Chunk, registry: &'a BlockRegistry, dynamic: bool) -> Self {
        let range = if dynamic {
            chunk.dynamic_hint.range()
        } else {
            chunk.static_hint.range()
        };
        Self {
            chunk,
            registry,
            dynamic,
            cursor: range.start,
            end: range.end,
            first: None,
            last: 0,
            finished: false,
        }
    }

    fn tighten(&mut self) {
        let hint = self.first.map_or(IterationHint::EMPTY, |start| IterationHint {
            start,
            end: self.last + 1,
        });
        if self.dynamic {
            self.chunk.dynamic_hint = hint;
        } else {
            self.chunk.static_hint = hint;
        }
    }
}

impl Iterator for NonAirBlocks<'_> {
    type Item = BlockVisit;

    fn next(&mut self) -> Option<BlockVisit> {
        while self.cursor < self.end {
            let index = self.cursor;
            self.cursor += 1;

            let block = self.chunk.blocks[index];
            if block.is_air() || self.registry.get(block).is_dynamic() != self.dynamic {
                continue;
            }

            self.first.get_or_insert(index);
            self.last = index;
            return Some(BlockVisit {
                pos: LocalPos::from_index(index),
                block,
                occlusion: self.chunk.occlusion[index],
            });
        }

        if !self.finished {
            self.finished = true;
            self.tighten();
        }
        None
    }
}
