//! Sky light propagation over a 3×3×3 window of chunks.
//!
//! Light enters from above the world at [`MAX_LIGHT`], travels straight down
//! without loss and loses one level per step in any other direction. Opaque
//! cells hold no light.

use std::collections::VecDeque;

use blockwork_core::constants::{CHUNK_LAYERS, CHUNK_SIZE, CHUNK_SIZE_CUBED, MAX_LIGHT};
use blockwork_core::{ChunkPos, LocalPos, WorldPos};
use glam::IVec3;

use crate::store::ChunkStore;

const WINDOW: usize = CHUNK_SIZE * 3;
const WINDOW_CELLS: usize = WINDOW * WINDOW * WINDOW;

/// How the cells of one window slot take part in a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Not solved; neighbours read this level.
    Fixed(u8),
    /// Unallocated layer of an in-memory column: solved as air, never stored.
    Virtual,
    /// Allocated chunk: solved and written back.
    Stored,
}

/// Reusable flood-fill state. One solver can relight any number of windows.
#[derive(Debug)]
pub struct LightSolver {
    queue: VecDeque<usize>,
    queued: Vec<bool>,
    light: Vec<u8>,
    opaque: Vec<bool>,
    slots: [Slot; 27],
}

impl Default for LightSolver {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
const fn window_index(x: usize, y: usize, z: usize) -> usize {
    x + y * WINDOW + z * WINDOW * WINDOW
}

#[inline]
const fn window_coords(index: usize) -> (usize, usize, usize) {
    (index % WINDOW, (index / WINDOW) % WINDOW, index / (WINDOW * WINDOW))
}

#[inline]
const fn slot_index(x: usize, y: usize, z: usize) -> usize {
    (x / CHUNK_SIZE) + (y / CHUNK_SIZE) * 3 + (z / CHUNK_SIZE) * 9
}

impl LightSolver {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            queued: vec![false; WINDOW_CELLS],
            light: vec![0; WINDOW_CELLS],
            opaque: vec![false; WINDOW_CELLS],
            slots: [Slot::Fixed(0); 27],
        }
    }

    /// Recompute light for the window around `center` and store it into the
    /// window's allocated chunks. Returns the number of cells processed.
    pub fn solve(&mut self, store: &mut ChunkStore, center: ChunkPos) -> usize {
        let _span =
            tracing::trace_span!("light_solve", x = center.x, y = center.y, z = center.z).entered();

        let origin = (center.to_ivec3() - 1) * CHUNK_SIZE as i32;
        self.load_window(store, center);
        self.seed();

        let mut pops = 0;
        while let Some(index) = self.queue.pop_front() {
            pops += 1;
            self.queued[index] = false;

            let (x, y, z) = window_coords(index);
            let level = if self.opaque[index] {
                0
            } else {
                let cell = IVec3::new(x as i32, y as i32, z as i32);
                let up = self.neighbor_light(store, origin, cell + IVec3::Z);
                let around = [IVec3::NEG_X, IVec3::X, IVec3::NEG_Y, IVec3::Y, IVec3::NEG_Z]
                    .into_iter()
                    .map(|step| self.neighbor_light(store, origin, cell + step))
                    .max()
                    .unwrap_or(0);
                up.max(around.saturating_sub(1))
            };

            if level != self.light[index] {
                self.light[index] = level;
                self.push_neighbors(x, y, z);
            }
        }

        self.write_back(store, center);
        tracing::trace!(pops, "light solved");
        pops
    }

    fn load_window(&mut self, store: &ChunkStore, center: ChunkPos) {
        let registry = store.registry();
        for sz in 0..3 {
            for sy in 0..3 {
                for sx in 0..3 {
                    let pos = ChunkPos::new(
                        center.x + sx as i32 - 1,
                        center.y + sy as i32 - 1,
                        center.z + sz as i32 - 1,
                    );
                    let slot = if !store.contains_column(pos.column()) || pos.z < 0 {
                        Slot::Fixed(0)
                    } else if pos.z >= CHUNK_LAYERS as i32 {
                        Slot::Fixed(MAX_LIGHT)
                    } else if store.chunk(pos).is_some() {
                        Slot::Stored
                    } else {
                        Slot::Virtual
                    };
                    self.slots[sx + sy * 3 + sz * 9] = slot;

                    let chunk = store.chunk(pos);
                    for index in 0..CHUNK_SIZE_CUBED {
                        let local = LocalPos::from_index(index);
                        let cell = window_index(
                            sx * CHUNK_SIZE + usize::from(local.x),
                            sy * CHUNK_SIZE + usize::from(local.y),
                            sz * CHUNK_SIZE + usize::from(local.z),
                        );
                        self.queued[cell] = false;
                        self.light[cell] = match slot {
                            Slot::Fixed(level) => level,
                            Slot::Virtual | Slot::Stored => 0,
                        };
                        self.opaque[cell] = chunk.is_some_and(|c| {
                            !registry.get(c.block_at_index(index)).is_transparent()
                        });
                    }
                }
            }
        }
        self.queue.clear();
    }

    fn is_solvable(&self, x: usize, y: usize, z: usize) -> bool {
        !matches!(self.slots[slot_index(x, y, z)], Slot::Fixed(_))
    }

    /// Queue every solvable cell whose light can come from outside the
    /// solvable region: window faces and cells touching fixed slots.
    fn seed(&mut self) {
        let last = WINDOW - 1;
        for z in 0..WINDOW {
            for y in 0..WINDOW {
                for x in 0..WINDOW {
                    if !self.is_solvable(x, y, z) {
                        continue;
                    }
                    let on_boundary = x == 0 || y == 0 || z == 0 || x == last || y == last || z == last;
                    let touches_fixed = on_boundary
                        || !self.is_solvable(x - 1, y, z)
                        || !self.is_solvable(x + 1, y, z)
                        || !self.is_solvable(x, y - 1, z)
                        || !self.is_solvable(x, y + 1, z)
                        || !self.is_solvable(x, y, z - 1)
                        || !self.is_solvable(x, y, z + 1);
                    if touches_fixed {
                        let index = window_index(x, y, z);
                        self.queued[index] = true;
                        self.queue.push_back(index);
                    }
                }
            }
        }
    }

    fn push_neighbors(&mut self, x: usize, y: usize, z: usize) {
        let mut push = |nx: usize, ny: usize, nz: usize| {
            if nx >= WINDOW || ny >= WINDOW || nz >= WINDOW {
                return;
            }
            if !self.is_solvable(nx, ny, nz) {
                return;
            }
            let index = window_index(nx, ny, nz);
            if !self.queued[index] {
                self.queued[index] = true;
                self.queue.push_back(index);
            }
        };
        // Wrapping underflow lands outside the window and is skipped.
        push(x.wrapping_sub(1), y, z);
        push(x + 1, y, z);
        push(x, y.wrapping_sub(1), z);
        push(x, y + 1, z);
        push(x, y, z.wrapping_sub(1));
        push(x, y, z + 1);
    }

    /// Light at a window-relative cell, which may lie just outside the window.
    fn neighbor_light(&self, store: &ChunkStore, origin: IVec3, cell: IVec3) -> u8 {
        if cell.cmpge(IVec3::ZERO).all() && cell.cmplt(IVec3::splat(WINDOW as i32)).all() {
            return self.light[window_index(cell.x as usize, cell.y as usize, cell.z as usize)];
        }
        outside_light(store, WorldPos::from(origin + cell))
    }

    fn write_back(&self, store: &mut ChunkStore, center: ChunkPos) {
        for sz in 0..3 {
            for sy in 0..3 {
                for sx in 0..3 {
                    if self.slots[sx + sy * 3 + sz * 9] != Slot::Stored {
                        continue;
                    }
                    let pos = ChunkPos::new(
                        center.x + sx as i32 - 1,
                        center.y + sy as i32 - 1,
                        center.z + sz as i32 - 1,
                    );
                    let Some(chunk) = store.chunk_mut(pos) else {
                        continue;
                    };
                    for index in 0..CHUNK_SIZE_CUBED {
                        let local = LocalPos::from_index(index);
                        let cell = window_index(
                            sx * CHUNK_SIZE + usize::from(local.x),
                            sy * CHUNK_SIZE + usize::from(local.y),
                            sz * CHUNK_SIZE + usize::from(local.z),
                        );
                        chunk.set_light(local, self.light[cell]);
                    }
                }
            }
        }
    }
}

/// Light seen at a cell the current solve does not cover.
fn outside_light(store: &ChunkStore, pos: WorldPos) -> u8 {
    let (chunk_pos, local) = pos.split();
    if chunk_pos.z < 0 {
        return 0;
    }
    if chunk_pos.z >= CHUNK_LAYERS as i32 {
        return MAX_LIGHT;
    }
    let Some(column) = store.column(chunk_pos.column()) else {
        return 0;
    };
    let layer = chunk_pos.z as usize;
    if let Some(chunk) = column.chunk(layer) {
        return chunk.light(local);
    }
    // Unallocated layers are air lit by whatever is stored above them
    (layer + 1..CHUNK_LAYERS)
        .find_map(|above| column.chunk(above))
        .map_or(MAX_LIGHT, |chunk| chunk.light(LocalPos::new(local.x, local.y, 0)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use blockwork_core::{BlockRegistry, BlockTypeId, ColumnPos};

    use super::*;

    const STONE: BlockTypeId = BlockTypeId(1);

    fn store_with_columns(columns: &[(i32, i32)]) -> ChunkStore {
        let mut store = ChunkStore::new(Arc::new(BlockRegistry::standard()));
        for &(x, y) in columns {
            store.insert_empty_column(ColumnPos::new(x, y));
        }
        store
    }

    fn light_at(store: &ChunkStore, pos: WorldPos) -> u8 {
        let (chunk, local) = pos.split();
        store.chunk(chunk).unwrap().light(local)
    }

    #[test]
    fn open_sky_is_fully_lit() {
        let mut store = store_with_columns(&[(0, 0)]);
        let top = ChunkPos::new(0, 0, CHUNK_LAYERS as i32 - 1);
        store.ensure_chunk(top).unwrap();
        store.ensure_chunk(ChunkPos::new(0, 0, CHUNK_LAYERS as i32 - 2)).unwrap();

        let pops = LightSolver::new().solve(&mut store, top);
        assert!(pops > 0);
        for chunk in [top, ChunkPos::new(0, 0, CHUNK_LAYERS as i32 - 2)] {
            let chunk = store.chunk(chunk).unwrap();
            for index in 0..CHUNK_SIZE_CUBED {
                assert_eq!(chunk.light(LocalPos::from_index(index)), MAX_LIGHT);
            }
        }
    }

    #[test]
    fn light_spreads_from_a_hole_in_the_roof() {
        let mut store = store_with_columns(&[(0, 0)]);
        for y in 0..16 {
            for x in 0..16 {
                if (x, y) != (8, 8) {
                    store.set_block(WorldPos::new(x, y, 10), STONE).unwrap();
                }
            }
        }

        LightSolver::new().solve(&mut store, ChunkPos::new(0, 0, 0));

        assert_eq!(light_at(&store, WorldPos::new(3, 3, 12)), MAX_LIGHT);
        assert_eq!(light_at(&store, WorldPos::new(3, 3, 10)), 0);
        assert_eq!(light_at(&store, WorldPos::new(8, 8, 10)), MAX_LIGHT);
        assert_eq!(light_at(&store, WorldPos::new(8, 8, 0)), MAX_LIGHT);
        assert_eq!(light_at(&store, WorldPos::new(10, 8, 5)), 13);
        assert_eq!(light_at(&store, WorldPos::new(8, 3, 9)), 10);
        assert_eq!(light_at(&store, WorldPos::new(11, 12, 2)), 8);
        assert_eq!(light_at(&store, WorldPos::new(0, 0, 0)), 0);
    }

    #[test]
    fn sealed_cavity_stays_dark() {
        let mut store = store_with_columns(&[(0, 0)]);
        for y in 0..16 {
            for x in 0..16 {
                store.set_block(WorldPos::new(x, y, 14), STONE).unwrap();
            }
        }

        LightSolver::new().solve(&mut store, ChunkPos::new(0, 0, 0));
        assert_eq!(light_at(&store, WorldPos::new(5, 5, 13)), 0);
        assert_eq!(light_at(&store, WorldPos::new(5, 5, 15)), MAX_LIGHT);
    }

    #[test]
    fn solve_can_be_repeated() {
        let mut store = store_with_columns(&[(0, 0), (1, 0)]);
        store.set_block(WorldPos::new(20, 4, 4), STONE).unwrap();
        store.set_block(WorldPos::new(4, 4, 4), STONE).unwrap();

        let mut solver = LightSolver::new();
        solver.solve(&mut store, ChunkPos::new(0, 0, 0));
        let first = light_at(&store, WorldPos::new(4, 4, 3));
        solver.solve(&mut store, ChunkPos::new(1, 0, 0));
        solver.solve(&mut store, ChunkPos::new(0, 0, 0));
        assert_eq!(light_at(&store, WorldPos::new(4, 4, 3)), first);
        assert_eq!(first, MAX_LIGHT - 1);
        assert_eq!(light_at(&store, WorldPos::new(20, 4, 4)), 0);
    }

    #[test]
    fn outside_light_reads_first_stored_cell_above() {
        let mut store = store_with_columns(&[(0, 0)]);
        let upper = ChunkPos::new(0, 0, 5);
        store.ensure_chunk(upper).unwrap();
        store
            .chunk_mut(upper)
            .unwrap()
            .set_light(LocalPos::new(2, 3, 0), 7);

        assert_eq!(outside_light(&store, WorldPos::new(2, 3, 20)), 7);
        assert_eq!(outside_light(&store, WorldPos::new(2, 3, 100)), MAX_LIGHT);
        assert_eq!(outside_light(&store, WorldPos::new(2, 3, -1)), 0);
        assert_eq!(outside_light(&store, WorldPos::new(-2, 3, 20)), 0);
        assert_eq!(outside_light(&store, WorldPos::new(2, 3, 300)), MAX_LIGHT);
    }
}
