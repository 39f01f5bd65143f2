//! Core block types.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Registry id of a block type, stored per cell and persisted to disk.
///
/// Block type id 0 is reserved for air (empty space).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct BlockTypeId(pub u16);

impl BlockTypeId {
    /// Air block (empty space)
    pub const AIR: Self = Self(0);

    /// Returns true if this block is air (empty)
    #[inline]
    pub const fn is_air(self) -> bool {
        self.0 == 0
    }
}

bitflags! {
    /// Capabilities of a block type.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BlockFlags: u8 {
        /// Neighbouring faces stay visible and light passes through
        const TRANSPARENT = 1 << 0;
        /// Hides faces of neighbouring blocks for ambient occlusion
        const OCCLUDING = 1 << 1;
        /// Changes on its own (fluids); iterated separately from static blocks
        const DYNAMIC = 1 << 2;
    }
}

/// Closed set of block behaviours.
///
/// Each kind supplies default flags and a default hitbox; individual types
/// may override both.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Empty space
    #[default]
    Air,
    /// Full opaque cube
    Solid,
    /// Flowing, non-collidable
    Fluid,
    /// See-through but collidable cube (leaves, glass)
    Foliage,
    /// Decoration with no collision
    Plant,
    /// Half-height block; transparent to light, still occludes neighbour faces
    Slab,
}

impl BlockKind {
    /// Default flags for blocks of this kind.
    pub const fn default_flags(self) -> BlockFlags {
        match self {
            Self::Air | Self::Plant => BlockFlags::TRANSPARENT,
            Self::Solid => BlockFlags::OCCLUDING,
            Self::Fluid => BlockFlags::TRANSPARENT.union(BlockFlags::DYNAMIC),
            Self::Foliage | Self::Slab => BlockFlags::TRANSPARENT.union(BlockFlags::OCCLUDING),
        }
    }

    /// True if blocks of this kind get a hitbox by default.
    pub const fn is_collidable(self) -> bool {
        matches!(self, Self::Solid | Self::Foliage | Self::Slab)
    }
}
