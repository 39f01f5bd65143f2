//! Column codec, column storage backends and the world file.
//!
//! A column is written layer by layer, bottom to top. Each layer starts with a
//! status byte:
//!
//! | bit | meaning |
//! |-----|---------|
//! | 0   | no blocks (layer absent or all air), block data omitted |
//! | 1   | no entities, entity snapshot omitted |
//!
//! followed by the 16³ block ids in index order and then the entity snapshot
//! (entity count plus one length-prefixed [`EntitySnapshot`] blob each).
//! Integers use bincode's varint encoding, so ids below 251 take one byte.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bincode::Options;
use bitflags::bitflags;
use blockwork_core::constants::{CHUNK_LAYERS, CHUNK_SIZE_CUBED};
use blockwork_core::{BlockRegistry, BlockTypeId, ColumnPos, Error, LocalPos, Result};
use blockwork_entity::{Entity, EntitySnapshot, World as EntityWorld};
use hashbrown::HashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::chunk::Chunk;
use crate::column::ChunkColumn;

bitflags! {
    /// Status byte written before each layer.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct LayerStatus: u8 {
        const NO_BLOCKS = 1 << 0;
        const NO_ENTITIES = 1 << 1;
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
}

fn write_value<T: Serialize + ?Sized>(out: &mut Vec<u8>, value: &T) -> Result<()> {
    codec()
        .serialize_into(out, value)
        .map_err(|e| Error::Serialization(e.to_string()))
}

fn read_value<T: DeserializeOwned>(input: &mut &[u8], what: &str) -> Result<T> {
    codec()
        .deserialize_from(input)
        .map_err(|e| Error::CorruptColumnData(format!("{what}: {e}")))
}

/// Encode a column and the snapshots of the entities attached to its chunks.
///
/// Handles of entities already despawned from `entities` are skipped.
pub fn encode_column(column: &ChunkColumn, entities: &EntityWorld) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for layer in 0..CHUNK_LAYERS {
        let chunk = column.chunk(layer);
        let blocks = chunk.filter(|chunk| !chunk.is_empty());
        let mut members: Vec<Entity> = chunk
            .map(|chunk| {
                chunk
                    .entities()
                    .iter()
                    .copied()
                    .filter(|&entity| entities.contains(entity))
                    .collect()
            })
            .unwrap_or_default();
        members.sort_by_key(|entity| entity.to_bits());

        let mut status = LayerStatus::empty();
        status.set(LayerStatus::NO_BLOCKS, blocks.is_none());
        status.set(LayerStatus::NO_ENTITIES, members.is_empty());
        write_value(&mut out, &status.bits())?;

        if let Some(chunk) = blocks {
            for id in chunk.blocks() {
                write_value(&mut out, &id.0)?;
            }
        }

        if !members.is_empty() {
            write_value(&mut out, &(members.len() as u32))?;
            for entity in members {
                let blob = EntitySnapshot::capture(entities, entity)?.to_bytes()?;
                write_value(&mut out, &blob)?;
            }
        }
    }
    Ok(out)
}

struct DecodedLayer {
    blocks: Option<Vec<BlockTypeId>>,
    snapshots: Vec<EntitySnapshot>,
}

/// Decode a column written by [`encode_column`].
///
/// The whole stream is validated before any entity is spawned, so a corrupt
/// column leaves `entities` untouched. The returned column is ready; its
/// occlusion is derived when it is inserted into a store.
pub fn decode_column(
    pos: ColumnPos,
    bytes: &[u8],
    registry: &BlockRegistry,
    entities: &mut EntityWorld,
) -> Result<ChunkColumn> {
    let mut input = bytes;
    let mut layers = Vec::with_capacity(CHUNK_LAYERS);

    for layer in 0..CHUNK_LAYERS {
        let bits: u8 = read_value(&mut input, "layer status")?;
        let status = LayerStatus::from_bits(bits).ok_or_else(|| {
            Error::CorruptColumnData(format!("layer {layer} has status bits {bits:#04x}"))
        })?;

        let blocks = if status.contains(LayerStatus::NO_BLOCKS) {
            None
        } else {
            let mut ids = Vec::with_capacity(CHUNK_SIZE_CUBED);
            for _ in 0..CHUNK_SIZE_CUBED {
                let id = BlockTypeId(read_value(&mut input, "block id")?);
                if !registry.contains(id) {
                    return Err(Error::CorruptColumnData(format!(
                        "layer {layer} holds unknown block id {}",
                        id.0
                    )));
                }
                ids.push(id);
            }
            Some(ids)
        };

        let mut snapshots = Vec::new();
        if !status.contains(LayerStatus::NO_ENTITIES) {
            let count: u32 = read_value(&mut input, "entity count")?;
            for _ in 0..count {
                let blob: Vec<u8> = read_value(&mut input, "entity blob")?;
                let snapshot = EntitySnapshot::from_bytes(&blob)
                    .map_err(|e| Error::CorruptColumnData(format!("layer {layer}: {e}")))?;
                snapshots.push(snapshot);
            }
        }

        layers.push(DecodedLayer { blocks, snapshots });
    }

    if !input.is_empty() {
        return Err(Error::CorruptColumnData(format!(
            "{} trailing bytes",
            input.len()
        )));
    }

    let mut column = ChunkColumn::new(pos);
    for (layer, decoded) in layers.into_iter().enumerate() {
        if decoded.blocks.is_none() && decoded.snapshots.is_empty() {
            continue;
        }
        let mut chunk = Chunk::new(pos.chunk(layer as i32));
        for (index, id) in decoded.blocks.unwrap_or_default().into_iter().enumerate() {
            if !id.is_air() {
                chunk.set_block(LocalPos::from_index(index), registry.get(id));
            }
        }
        for snapshot in decoded.snapshots {
            chunk.add_entity(snapshot.spawn(entities));
        }
        column.insert_chunk(chunk);
    }
    column.mark_ready();
    Ok(column)
}

/// Where encoded columns live between sessions.
///
/// Failures are reported only as a missing read or a `false` write; the
/// provider falls back to generation or keeps the column in memory.
pub trait ColumnStorage {
    fn read(&mut self, pos: ColumnPos) -> Option<Vec<u8>>;
    fn write(&mut self, pos: ColumnPos, bytes: &[u8]) -> bool;
}

/// One file per column under a root directory.
#[derive(Debug, Clone)]
pub struct ColumnFiles {
    root: PathBuf,
}

impl ColumnFiles {
    /// Use `root`, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the column at `pos`.
    pub fn path(&self, pos: ColumnPos) -> PathBuf {
        self.root.join(format!("c.{}.{}.col", pos.x, pos.y))
    }
}

impl ColumnStorage for ColumnFiles {
    fn read(&mut self, pos: ColumnPos) -> Option<Vec<u8>> {
        let path = self.path(pos);
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read column");
                None
            }
        }
    }

    fn write(&mut self, pos: ColumnPos, bytes: &[u8]) -> bool {
        let path = self.path(pos);
        let tmp = path.with_extension("col.tmp");
        let result = fs::write(&tmp, bytes).and_then(|()| fs::rename(&tmp, &path));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to write column");
            return false;
        }
        true
    }
}

/// In-memory column storage.
#[derive(Debug, Default)]
pub struct MemoryColumns {
    columns: HashMap<ColumnPos, Vec<u8>>,
    read_only: bool,
}

impl MemoryColumns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes, as a full or unavailable disk would.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn contains(&self, pos: ColumnPos) -> bool {
        self.columns.contains_key(&pos)
    }

    pub fn get(&self, pos: ColumnPos) -> Option<&[u8]> {
        self.columns.get(&pos).map(Vec::as_slice)
    }

    /// Overwrite the stored bytes of a column.
    pub fn insert(&mut self, pos: ColumnPos, bytes: Vec<u8>) {
        self.columns.insert(pos, bytes);
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl ColumnStorage for MemoryColumns {
    fn read(&mut self, pos: ColumnPos) -> Option<Vec<u8>> {
        self.columns.get(&pos).cloned()
    }

    fn write(&mut self, pos: ColumnPos, bytes: &[u8]) -> bool {
        if self.read_only {
            return false;
        }
        self.columns.insert(pos, bytes.to_vec());
        true
    }
}

/// Process-wide state saved alongside the columns.
pub trait Serializable {
    /// Stable name of the entry in the world file.
    fn key(&self) -> &str;
    fn save(&self) -> Result<Vec<u8>>;
    fn load(&mut self, bytes: &[u8]) -> Result<()>;
}

/// The world file: a list of (key, blob) entries.
pub struct WorldFile;

impl WorldFile {
    pub fn encode(states: &[&dyn Serializable]) -> Result<Vec<u8>> {
        let entries = states
            .iter()
            .map(|state| Ok((state.key().to_owned(), state.save()?)))
            .collect::<Result<Vec<(String, Vec<u8>)>>>()?;
        let mut out = Vec::new();
        write_value(&mut out, &entries)?;
        Ok(out)
    }

    /// Restore every state whose key is present. Returns how many were restored.
    pub fn decode(bytes: &[u8], states: &mut [&mut dyn Serializable]) -> Result<usize> {
        let entries: Vec<(String, Vec<u8>)> = codec()
            .deserialize(bytes)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let mut restored = 0;
        for (key, blob) in entries {
            match states.iter_mut().find(|state| state.key() == key) {
                Some(state) => {
                    state.load(&blob)?;
                    restored += 1;
                }
                None => debug!(%key, "ignoring unknown world file entry"),
            }
        }
        Ok(restored)
    }

    pub fn save(path: &Path, states: &[&dyn Serializable]) -> Result<()> {
        fs::write(path, Self::encode(states)?)?;
        Ok(())
    }

    /// Load from `path`. Returns `false` if there is no world file yet.
    pub fn load(path: &Path, states: &mut [&mut dyn Serializable]) -> Result<bool> {
        match fs::read(path) {
            Ok(bytes) => Self::decode(&bytes, states).map(|_| true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
