//! Chunks, columns, generation, persistence and lighting for the Blockwork voxel core.
//!
//! A [`World`] holds the set of loaded chunks. Chunks live in the
//! [`ChunkStore`] of a [`ChunkProvider`], grouped into [`ChunkColumn`]s that
//! are generated, populated, saved and evicted as a unit.

pub mod chunk;
pub mod column;
pub mod generation;
pub mod lighting;
pub mod persistence;
pub mod provider;
pub mod store;
pub mod world;

pub use chunk::{BlockVisit, Chunk, IterationHint, NonAirBlocks, OcclusionMask};
pub use column::{ChunkColumn, ColumnState};
pub use generation::{
    ColumnWriter, FlatGenerator, Generator, Populator, TerrainConfig, TerrainGenerator,
    TreePopulator,
};
pub use lighting::LightSolver;
pub use persistence::{
    decode_column, encode_column, ColumnFiles, ColumnStorage, LayerStatus, MemoryColumns,
    Serializable, WorldFile,
};
pub use provider::{ChunkProvider, ColumnProvider, ProviderConfig};
pub use store::{BlockChange, ChunkStore};
pub use world::{RayHit, World, WorldObserver};

/// World seed for procedural generation.
pub type WorldSeed = u64;
