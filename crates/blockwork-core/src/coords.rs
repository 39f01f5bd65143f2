//! Coordinate systems for the voxel world.
//!
//! World coordinates are block positions with Z pointing up. Chunk coordinates
//! are world coordinates shifted right by [`CHUNK_BITS`], and in-chunk coordinates
//! are the low bits. Arithmetic shift and masking keep negative coordinates in the
//! right chunk (`-1` lands in chunk `-1` at in-chunk `15`).

use crate::constants::{CHUNK_BITS, CHUNK_LAYERS, CHUNK_SIZE, KEY_X_BITS, KEY_Y_BITS, KEY_Z_BITS};
use crate::math::BlockSide;
use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

const LOCAL_MASK: i32 = (CHUNK_SIZE - 1) as i32;
const KEY_Y_SHIFT: u32 = KEY_Z_BITS;
const KEY_X_SHIFT: u32 = KEY_Y_BITS + KEY_Z_BITS;

/// Chunk coordinate containing a world coordinate.
#[inline]
pub const fn world_to_chunk(coord: i32) -> i32 {
    coord >> CHUNK_BITS
}

/// In-chunk coordinate of a world coordinate, always in `[0, CHUNK_SIZE)`.
#[inline]
pub const fn world_to_in_chunk(coord: i32) -> usize {
    (coord & LOCAL_MASK) as usize
}

/// Pack chunk coordinates into a single 64-bit key (28/28/8 bits for x/y/z).
#[inline]
pub const fn chunk_key(x: i32, y: i32, z: i32) -> u64 {
    let x = (x as u64) & ((1 << KEY_X_BITS) - 1);
    let y = (y as u64) & ((1 << KEY_Y_BITS) - 1);
    let z = (z as u64) & ((1 << KEY_Z_BITS) - 1);
    (x << KEY_X_SHIFT) | (y << KEY_Y_SHIFT) | z
}

/// Chunk x coordinate of a packed key.
#[inline]
pub const fn chunk_key_to_x(key: u64) -> i32 {
    ((key as i64) >> KEY_X_SHIFT) as i32
}

/// Chunk y coordinate of a packed key.
#[inline]
pub const fn chunk_key_to_y(key: u64) -> i32 {
    (((key << KEY_X_BITS) as i64) >> (64 - KEY_Y_BITS)) as i32
}

/// Chunk z coordinate of a packed key.
#[inline]
pub const fn chunk_key_to_z(key: u64) -> i32 {
    (((key << (64 - KEY_Z_BITS)) as i64) >> (64 - KEY_Z_BITS)) as i32
}

/// Linear index of an in-chunk position; x varies fastest, then y, then z.
#[inline]
pub const fn in_chunk_index(x: usize, y: usize, z: usize) -> usize {
    x | (y << CHUNK_BITS) | (z << (2 * CHUNK_BITS))
}

/// Inverse of [`in_chunk_index`].
#[inline]
pub const fn in_chunk_coords(index: usize) -> (usize, usize, usize) {
    let mask = CHUNK_SIZE - 1;
    (
        index & mask,
        (index >> CHUNK_BITS) & mask,
        (index >> (2 * CHUNK_BITS)) & mask,
    )
}

/// Position within a chunk (0 to CHUNK_SIZE-1 per axis).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalPos {
    pub x: u8,
    pub y: u8,
    pub z: u8,
}

impl LocalPos {
    /// Create a new local position
    #[inline]
    pub const fn new(x: u8, y: u8, z: u8) -> Self {
        debug_assert!((x as usize) < CHUNK_SIZE);
        debug_assert!((y as usize) < CHUNK_SIZE);
        debug_assert!((z as usize) < CHUNK_SIZE);
        Self { x, y, z }
    }

    /// Convert to linear index for flat array storage
    #[inline]
    pub const fn to_index(self) -> usize {
        in_chunk_index(self.x as usize, self.y as usize, self.z as usize)
    }

    /// Create from linear index
    #[inline]
    pub const fn from_index(index: usize) -> Self {
        let (x, y, z) = in_chunk_coords(index);
        Self {
            x: x as u8,
            y: y as u8,
            z: z as u8,
        }
    }

    /// True if the position lies on the chunk face facing `side`.
    #[inline]
    pub const fn is_on_face(self, side: BlockSide) -> bool {
        let last = (CHUNK_SIZE - 1) as u8;
        match side {
            BlockSide::West => self.x == 0,
            BlockSide::East => self.x == last,
            BlockSide::South => self.y == 0,
            BlockSide::North => self.y == last,
            BlockSide::Bottom => self.z == 0,
            BlockSide::Top => self.z == last,
        }
    }
}

/// Chunk position in chunk coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkPos {
    /// Create a new chunk position
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Packed 64-bit key of this chunk.
    #[inline]
    pub const fn key(self) -> u64 {
        chunk_key(self.x, self.y, self.z)
    }

    /// Unpack a key produced by [`ChunkPos::key`].
    #[inline]
    pub const fn from_key(key: u64) -> Self {
        Self::new(chunk_key_to_x(key), chunk_key_to_y(key), chunk_key_to_z(key))
    }

    /// Column this chunk belongs to.
    #[inline]
    pub const fn column(self) -> ColumnPos {
        ColumnPos::new(self.x, self.y)
    }

    /// Layer index inside the column, or `None` above/below the world.
    #[inline]
    pub const fn layer(self) -> Option<usize> {
        if self.z >= 0 && (self.z as usize) < CHUNK_LAYERS {
            Some(self.z as usize)
        } else {
            None
        }
    }

    /// Convert to world position (corner of chunk)
    #[inline]
    pub const fn to_world_pos(self) -> WorldPos {
        WorldPos::new(
            self.x << CHUNK_BITS,
            self.y << CHUNK_BITS,
            self.z << CHUNK_BITS,
        )
    }

    /// Chunk across the given side.
    #[inline]
    pub fn neighbor(self, side: BlockSide) -> Self {
        Self::from(self.to_ivec3() + side.normal())
    }

    /// Get the six neighboring chunk positions, ordered like [`BlockSide::ALL`]
    pub fn neighbors(self) -> [ChunkPos; 6] {
        BlockSide::ALL.map(|side| self.neighbor(side))
    }

    /// Convert to glam IVec3
    #[inline]
    pub const fn to_ivec3(self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }
}

impl From<IVec3> for ChunkPos {
    fn from(v: IVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Position of a chunk column (chunk x, chunk y).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnPos {
    pub x: i32,
    pub y: i32,
}

impl ColumnPos {
    /// Create a new column position
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chunk at layer `z` of this column.
    #[inline]
    pub const fn chunk(self, z: i32) -> ChunkPos {
        ChunkPos::new(self.x, self.y, z)
    }

    /// World x/y of the column's south-west corner.
    #[inline]
    pub const fn origin(self) -> (i32, i32) {
        (self.x << CHUNK_BITS, self.y << CHUNK_BITS)
    }

    /// True if the block lies inside this column's horizontal footprint.
    #[inline]
    pub const fn contains(self, pos: WorldPos) -> bool {
        world_to_chunk(pos.x) == self.x && world_to_chunk(pos.y) == self.y
    }

    /// The four horizontally adjacent columns (west, east, south, north).
    pub const fn neighbors(self) -> [ColumnPos; 4] {
        [
            ColumnPos::new(self.x - 1, self.y),
            ColumnPos::new(self.x + 1, self.y),
            ColumnPos::new(self.x, self.y - 1),
            ColumnPos::new(self.x, self.y + 1),
        ]
    }
}

/// World position in block coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl WorldPos {
    /// Create a new world position
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Get the chunk containing this position
    #[inline]
    pub const fn chunk_pos(self) -> ChunkPos {
        ChunkPos::new(
            world_to_chunk(self.x),
            world_to_chunk(self.y),
            world_to_chunk(self.z),
        )
    }

    /// Get the column containing this position
    #[inline]
    pub const fn column_pos(self) -> ColumnPos {
        ColumnPos::new(world_to_chunk(self.x), world_to_chunk(self.y))
    }

    /// Get the local position within the chunk
    #[inline]
    pub const fn local_pos(self) -> LocalPos {
        LocalPos::new(
            world_to_in_chunk(self.x) as u8,
            world_to_in_chunk(self.y) as u8,
            world_to_in_chunk(self.z) as u8,
        )
    }

    /// Split into chunk and local position
    #[inline]
    pub const fn split(self) -> (ChunkPos, LocalPos) {
        (self.chunk_pos(), self.local_pos())
    }

    /// Create from chunk and local position
    #[inline]
    pub const fn from_chunk_local(chunk: ChunkPos, local: LocalPos) -> Self {
        Self::new(
            (chunk.x << CHUNK_BITS) + local.x as i32,
            (chunk.y << CHUNK_BITS) + local.y as i32,
            (chunk.z << CHUNK_BITS) + local.z as i32,
        )
    }

    /// Adjacent block across `side`.
    #[inline]
    pub fn offset(self, side: BlockSide) -> Self {
        Self::from(self.to_ivec3() + side.normal())
    }

    /// Block containing a point.
    #[inline]
    pub fn from_vec3(v: Vec3) -> Self {
        Self::new(v.x.floor() as i32, v.y.floor() as i32, v.z.floor() as i32)
    }

    /// Convert to glam IVec3
    #[inline]
    pub const fn to_ivec3(self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }

    /// Convert to floating point Vec3
    #[inline]
    pub fn to_vec3(self) -> Vec3 {
        self.to_ivec3().as_vec3()
    }
}

impl From<IVec3> for WorldPos {
    fn from(v: IVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_chunk_index_roundtrip() {
        for z in 0..CHUNK_SIZE {
            for y in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    let index = in_chunk_index(x, y, z);
                    assert_eq!(in_chunk_coords(index), (x, y, z));
                    let pos = LocalPos::new(x as u8, y as u8, z as u8);
                    assert_eq!(LocalPos::from_index(pos.to_index()), pos);
                }
            }
        }
    }

    #[test]
    fn in_chunk_index_order() {
        assert_eq!(in_chunk_index(1, 0, 0), 1);
        assert_eq!(in_chunk_index(0, 1, 0), CHUNK_SIZE);
        assert_eq!(in_chunk_index(0, 0, 1), CHUNK_SIZE * CHUNK_SIZE);
        assert_eq!(in_chunk_index(15, 15, 15), CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE - 1);
    }

    #[test]
    fn chunk_key_roundtrip() {
        let max_x = (1 << (KEY_X_BITS - 1)) - 1;
        let max_y = (1 << (KEY_Y_BITS - 1)) - 1;
        let max_z = (1 << (KEY_Z_BITS - 1)) - 1;
        let xs = [0, 1, -1, 12345, -98765, max_x, -max_x - 1];
        let ys = [0, 7, -7, 54321, -1, max_y, -max_y - 1];
        let zs = [0, 1, 15, -1, max_z, -max_z - 1];

        for &x in &xs {
            for &y in &ys {
                for &z in &zs {
                    let key = chunk_key(x, y, z);
                    assert_eq!(chunk_key_to_x(key), x);
                    assert_eq!(chunk_key_to_y(key), y);
                    assert_eq!(chunk_key_to_z(key), z);
                    assert_eq!(ChunkPos::from_key(key), ChunkPos::new(x, y, z));
                }
            }
        }
    }

    #[test]
    fn distinct_chunks_have_distinct_keys() {
        let a = ChunkPos::new(1, 0, 0).key();
        let b = ChunkPos::new(0, 1, 0).key();
        let c = ChunkPos::new(0, 0, 1).key();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn negative_world_coordinates() {
        assert_eq!(world_to_chunk(-1), -1);
        assert_eq!(world_to_in_chunk(-1), CHUNK_SIZE - 1);
        assert_eq!(world_to_chunk(-16), -1);
        assert_eq!(world_to_in_chunk(-16), 0);
        assert_eq!(world_to_chunk(-17), -2);
        assert_eq!(world_to_in_chunk(-17), CHUNK_SIZE - 1);

        let world = WorldPos::new(-1, -1, -1);
        let (chunk, local) = world.split();
        assert_eq!(chunk, ChunkPos::new(-1, -1, -1));
        assert_eq!(local, LocalPos::new(15, 15, 15));
    }

    #[test]
    fn world_pos_chunk_local_roundtrip() {
        for world in [
            WorldPos::new(100, -50, 200),
            WorldPos::new(-33, 0, 15),
            WorldPos::new(0, -1, 16),
        ] {
            let (chunk, local) = world.split();
            assert_eq!(WorldPos::from_chunk_local(chunk, local), world);
        }
    }

    #[test]
    fn column_contains_only_its_footprint() {
        let column = ColumnPos::new(-1, 2);
        assert_eq!(column.origin(), (-16, 32));
        assert!(column.contains(WorldPos::new(-16, 32, 200)));
        assert!(column.contains(WorldPos::new(-1, 47, -5)));
        assert!(!column.contains(WorldPos::new(0, 40, 10)));
        assert!(!column.contains(WorldPos::new(-5, 48, 10)));
    }

    #[test]
    fn chunk_layers() {
        assert_eq!(ChunkPos::new(0, 0, 0).layer(), Some(0));
        assert_eq!(ChunkPos::new(0, 0, 15).layer(), Some(15));
        assert_eq!(ChunkPos::new(0, 0, 16).layer(), None);
        assert_eq!(ChunkPos::new(0, 0, -1).layer(), None);
    }

    #[test]
    fn offsets_follow_sides() {
        let pos = WorldPos::new(0, 0, 0);
        assert_eq!(pos.offset(BlockSide::West), WorldPos::new(-1, 0, 0));
        assert_eq!(pos.offset(BlockSide::North), WorldPos::new(0, 1, 0));
        assert_eq!(pos.offset(BlockSide::Top), WorldPos::new(0, 0, 1));
        assert_eq!(
            ChunkPos::new(0, 0, 0).neighbor(BlockSide::Bottom),
            ChunkPos::new(0, 0, -1)
        );
    }
}
