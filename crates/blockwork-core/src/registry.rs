//! Block type registry.
//!
//! Ids are handed out sequentially in registration order and are what chunks
//! store and persist, so the registration order must be the same on every run.
//! Air is always id 0.

use glam::Vec3;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::math::Aabb;
use crate::types::{BlockFlags, BlockKind, BlockTypeId};

/// Immutable description of a block type.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockType {
    name: String,
    id: BlockTypeId,
    kind: BlockKind,
    flags: BlockFlags,
    hitbox: Option<Aabb>,
}

impl BlockType {
    /// New block type with the defaults of its kind. The id is assigned on registration.
    pub fn new(name: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            name: name.into(),
            id: BlockTypeId::AIR,
            kind,
            flags: kind.default_flags(),
            hitbox: kind.is_collidable().then_some(Aabb::UNIT),
        }
    }

    /// Replace the kind's default flags.
    #[must_use]
    pub fn with_flags(mut self, flags: BlockFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Replace the kind's default hitbox; `None` makes the block non-collidable.
    #[must_use]
    pub fn with_hitbox(mut self, hitbox: Option<Aabb>) -> Self {
        self.hitbox = hitbox;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn id(&self) -> BlockTypeId {
        self.id
    }

    pub const fn kind(&self) -> BlockKind {
        self.kind
    }

    pub const fn flags(&self) -> BlockFlags {
        self.flags
    }

    /// Hitbox in block-local coordinates (unit cube spans `0..1`).
    pub const fn hitbox(&self) -> Option<Aabb> {
        self.hitbox
    }

    #[inline]
    pub const fn is_air(&self) -> bool {
        self.id.is_air()
    }

    #[inline]
    pub const fn is_transparent(&self) -> bool {
        self.flags.contains(BlockFlags::TRANSPARENT)
    }

    #[inline]
    pub const fn is_occluding(&self) -> bool {
        self.flags.contains(BlockFlags::OCCLUDING)
    }

    #[inline]
    pub const fn is_dynamic(&self) -> bool {
        self.flags.contains(BlockFlags::DYNAMIC)
    }

    #[inline]
    pub const fn is_collidable(&self) -> bool {
        self.hitbox.is_some()
    }
}

/// Serializable block type description, for registries built from data files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockDefinition {
    pub name: String,
    pub kind: BlockKind,
    /// Overrides the kind's flags (bits of [`BlockFlags`])
    #[serde(default)]
    pub flags: Option<u8>,
    /// Overrides the kind's hitbox
    #[serde(default)]
    pub hitbox: Option<Aabb>,
}

impl From<BlockDefinition> for BlockType {
    fn from(def: BlockDefinition) -> Self {
        let mut block = Self::new(def.name, def.kind);
        if let Some(bits) = def.flags {
            block = block.with_flags(BlockFlags::from_bits_truncate(bits));
        }
        if def.hitbox.is_some() {
            block = block.with_hitbox(def.hitbox);
        }
        block
    }
}

/// Registry of every block type known to a world.
#[derive(Clone, Debug)]
pub struct BlockRegistry {
    types: Vec<BlockType>,
    by_name: HashMap<String, BlockTypeId>,
}

impl BlockRegistry {
    /// Identifier of the air block.
    pub const AIR_NAME: &'static str = "air";

    /// Registry holding only air.
    pub fn new() -> Self {
        let mut registry = Self {
            types: Vec::new(),
            by_name: HashMap::new(),
        };
        registry.push(BlockType::new(Self::AIR_NAME, BlockKind::Air));
        registry
    }

    /// Registry with the built-in block palette.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        let half = Aabb::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.5));
        for block in [
            BlockType::new("stone", BlockKind::Solid),
            BlockType::new("dirt", BlockKind::Solid),
            BlockType::new("grass", BlockKind::Solid),
            BlockType::new("sand", BlockKind::Solid),
            BlockType::new("water", BlockKind::Fluid),
            BlockType::new("log", BlockKind::Solid),
            BlockType::new("leaves", BlockKind::Foliage),
            BlockType::new("glass", BlockKind::Foliage).with_flags(BlockFlags::TRANSPARENT),
            BlockType::new("flower", BlockKind::Plant),
            BlockType::new("stone_slab", BlockKind::Slab).with_hitbox(Some(half)),
        ] {
            registry.push(block);
        }
        registry
    }

    /// Build a registry from definitions, registered in iteration order after air.
    pub fn from_definitions(defs: impl IntoIterator<Item = BlockDefinition>) -> Result<Self> {
        let mut registry = Self::new();
        for def in defs {
            registry.register(def.into())?;
        }
        Ok(registry)
    }

    /// Register a block type and return its new id.
    pub fn register(&mut self, block: BlockType) -> Result<BlockTypeId> {
        if self.by_name.contains_key(block.name()) {
            return Err(Error::DuplicateId(block.name));
        }
        if self.types.len() > usize::from(u16::MAX) {
            return Err(Error::OutOfBounds(format!(
                "block registry is full, cannot register {}",
                block.name
            )));
        }
        Ok(self.push(block))
    }

    fn push(&mut self, mut block: BlockType) -> BlockTypeId {
        let id = BlockTypeId(self.types.len() as u16);
        block.id = id;
        self.by_name.insert(block.name.clone(), id);
        self.types.push(block);
        id
    }

    pub fn lookup_by_name(&self, name: &str) -> Result<&BlockType> {
        self.by_name
            .get(name)
            .map(|id| &self.types[usize::from(id.0)])
            .ok_or_else(|| Error::NotFound(format!("block type {name:?}")))
    }

    pub fn lookup_by_id(&self, id: BlockTypeId) -> Result<&BlockType> {
        self.types
            .get(usize::from(id.0))
            .ok_or_else(|| Error::NotFound(format!("block type id {}", id.0)))
    }

    /// Id registered under `name`.
    pub fn id_of(&self, name: &str) -> Result<BlockTypeId> {
        self.lookup_by_name(name).map(BlockType::id)
    }

    /// Block type of an id read back from a chunk.
    ///
    /// Chunks only ever hold registered ids, so this indexes directly.
    #[inline]
    pub fn get(&self, id: BlockTypeId) -> &BlockType {
        &self.types[usize::from(id.0)]
    }

    #[inline]
    pub fn contains(&self, id: BlockTypeId) -> bool {
        usize::from(id.0) < self.types.len()
    }

    /// The air block type.
    pub fn air(&self) -> &BlockType {
        &self.types[0]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Always false; air is registered on construction.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockType> {
        self.types.iter()
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
