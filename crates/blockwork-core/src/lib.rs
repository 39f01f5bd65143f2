//! Core types, math, and traits for the Blockwork voxel core.
//!
//! This crate provides the foundational pieces shared by every other crate:
//! - Coordinate systems (world, chunk, column, local) and the chunk key codec
//! - Block types and the block registry
//! - AABB intersection math and grid ray traversal
//! - The engine error type

pub mod coords;
pub mod error;
pub mod math;
pub mod registry;
pub mod traversal;
pub mod types;

pub use coords::{ChunkPos, ColumnPos, LocalPos, WorldPos};
pub use error::{Error, Result};
pub use math::{Aabb, BlockSide, Ray, RayIntersection};
pub use registry::{BlockDefinition, BlockRegistry, BlockType};
pub use traversal::cast_ray;
pub use types::{BlockFlags, BlockKind, BlockTypeId};

/// Engine-wide constants
pub mod constants {
    /// Bits needed to represent position within a chunk (4 bits for 0-15)
    pub const CHUNK_BITS: u32 = 4;
    /// Size of a chunk in blocks per axis
    pub const CHUNK_SIZE: usize = 1 << CHUNK_BITS;
    /// Total blocks in a chunk (16^3)
    pub const CHUNK_SIZE_CUBED: usize = CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE;
    /// Chunks stacked in one column
    pub const CHUNK_LAYERS: usize = 16;
    /// Height of the world in blocks
    pub const WORLD_HEIGHT: i32 = (CHUNK_LAYERS * CHUNK_SIZE) as i32;
    /// Brightest light level (open sky)
    pub const MAX_LIGHT: u8 = 15;

    /// Bits of the packed chunk key holding the chunk x coordinate
    pub const KEY_X_BITS: u32 = 28;
    /// Bits of the packed chunk key holding the chunk y coordinate
    pub const KEY_Y_BITS: u32 = 28;
    /// Bits of the packed chunk key holding the chunk z coordinate
    pub const KEY_Z_BITS: u32 = 8;
}
