//! Chunk columns: the unit of generation, population and persistence.

use blockwork_core::constants::CHUNK_LAYERS;
use blockwork_core::ColumnPos;

use crate::chunk::Chunk;

/// Lifecycle of a column that exists in memory.
///
/// A column that has never been generated simply has no entry in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColumnState {
    /// Generator has run; populators have not.
    Generated,
    /// Population has started; the column may now write into its neighbours.
    Populated,
    /// Populated (or loaded from storage) and ready for play.
    Ready,
}

/// Vertical stack of [`CHUNK_LAYERS`] chunk slots sharing one (x, y).
#[derive(Debug)]
pub struct ChunkColumn {
    pos: ColumnPos,
    layers: [Option<Box<Chunk>>; CHUNK_LAYERS],
    borrowed: u32,
    state: ColumnState,
}

impl ChunkColumn {
    /// New, empty, freshly generated column.
    pub fn new(pos: ColumnPos) -> Self {
        Self {
            pos,
            layers: std::array::from_fn(|_| None),
            borrowed: 0,
            state: ColumnState::Generated,
        }
    }

    pub const fn pos(&self) -> ColumnPos {
        self.pos
    }

    pub const fn state(&self) -> ColumnState {
        self.state
    }

    pub fn is_populated(&self) -> bool {
        self.state >= ColumnState::Populated
    }

    pub fn is_ready(&self) -> bool {
        self.state == ColumnState::Ready
    }

    /// Population is about to run.
    pub fn mark_populated(&mut self) {
        self.state = self.state.max(ColumnState::Populated);
    }

    /// Population finished or the column was restored from storage.
    pub fn mark_ready(&mut self) {
        self.state = ColumnState::Ready;
    }

    pub fn chunk(&self, layer: usize) -> Option<&Chunk> {
        self.layers.get(layer)?.as_deref()
    }

    pub fn chunk_mut(&mut self, layer: usize) -> Option<&mut Chunk> {
        self.layers.get_mut(layer)?.as_deref_mut()
    }

    /// Place a chunk into its layer slot, replacing any previous one.
    pub fn insert_chunk(&mut self, chunk: Chunk) {
        if let Some(layer) = chunk.pos().layer() {
            self.layers[layer] = Some(Box::new(chunk));
        }
    }

    /// Allocated chunks, bottom to top.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.layers.iter().filter_map(|slot| slot.as_deref())
    }

    pub fn chunks_mut(&mut self) -> impl Iterator<Item = &mut Chunk> {
        self.layers.iter_mut().filter_map(|slot| slot.as_deref_mut())
    }

    /// Set the borrow bit of a layer.
    pub fn mark_borrowed(&mut self, layer: usize) {
        debug_assert!(layer < CHUNK_LAYERS);
        self.borrowed |= 1 << layer;
    }

    /// Clear the borrow bit of a layer. The chunk stays allocated.
    pub fn return_chunk(&mut self, layer: usize) {
        debug_assert!(layer < CHUNK_LAYERS);
        self.borrowed &= !(1 << layer);
    }

    pub const fn is_borrowed(&self, layer: usize) -> bool {
        self.borrowed & (1 << layer) != 0
    }

    pub const fn any_borrowed(&self) -> bool {
        self.borrowed != 0
    }

    /// Populated and nothing borrowed.
    pub fn can_be_saved(&self) -> bool {
        self.is_populated() && !self.any_borrowed()
    }
}
