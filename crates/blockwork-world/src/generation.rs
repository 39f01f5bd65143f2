//! Procedural column generation and population.
//!
//! Generation fills one column from nothing and may only touch that column.
//! Population runs once afterwards and may reach into neighbouring columns,
//! which are loaded or generated (never populated) on demand.

use blockwork_core::constants::{CHUNK_SIZE, WORLD_HEIGHT};
use blockwork_core::{BlockRegistry, BlockTypeId, ColumnPos, Error, Result, WorldPos};
use blockwork_entity::World as EntityWorld;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::column::ChunkColumn;
use crate::persistence::ColumnStorage;
use crate::provider::load_or_generate;
use crate::store::{BlockChange, ChunkStore};
use crate::WorldSeed;

/// Fills a freshly created column.
pub trait Generator {
    fn generate_column(&self, column: &mut ColumnWriter<'_>) -> Result<()>;
}

/// Decorates a generated column; may write into neighbouring columns.
pub trait Populator {
    fn populate_column(&self, column: &mut ColumnWriter<'_>) -> Result<()>;
}

/// What a population writer needs to pull neighbouring columns into memory.
pub(crate) struct NeighborSource<'a> {
    pub generator: &'a dyn Generator,
    pub storage: &'a mut dyn ColumnStorage,
    pub entities: &'a mut EntityWorld,
}

/// Block access handed to generators and populators.
pub struct ColumnWriter<'a> {
    column: ColumnPos,
    store: &'a mut ChunkStore,
    neighbors: Option<NeighborSource<'a>>,
    changes: Vec<BlockChange>,
}

impl<'a> ColumnWriter<'a> {
    pub(crate) fn for_generation(store: &'a mut ChunkStore, column: ColumnPos) -> Self {
        Self {
            column,
            store,
            neighbors: None,
            changes: Vec::new(),
        }
    }

    pub(crate) fn for_population(
        store: &'a mut ChunkStore,
        column: ColumnPos,
        neighbors: NeighborSource<'a>,
    ) -> Self {
        Self {
            column,
            store,
            neighbors: Some(neighbors),
            changes: Vec::new(),
        }
    }

    /// Writes that changed a block in another column.
    pub(crate) fn into_changes(self) -> Vec<BlockChange> {
        self.changes
    }

    /// Column being generated or populated.
    pub const fn pos(&self) -> ColumnPos {
        self.column
    }

    pub fn registry(&self) -> &BlockRegistry {
        self.store.registry()
    }

    /// Block at a world position; `None` for columns not in memory.
    pub fn get_block(&self, pos: WorldPos) -> Option<BlockTypeId> {
        self.store.block(pos)
    }

    /// Highest non-air block of a world (x, y) inside this column.
    pub fn surface_height(&self, x: i32, y: i32) -> Option<i32> {
        (0..WORLD_HEIGHT)
            .rev()
            .find(|&z| self.store.block(WorldPos::new(x, y, z)).is_some_and(|id| !id.is_air()))
    }

    /// Write a block.
    ///
    /// Writes outside this column fail with [`Error::BoundaryViolation`] until
    /// the column is populated. During population a missing neighbour column is
    /// loaded or generated first.
    pub fn set_block(&mut self, pos: WorldPos, id: BlockTypeId) -> Result<()> {
        let target = pos.column_pos();
        if target != self.column {
            let populated = self
                .store
                .column(self.column)
                .is_some_and(ChunkColumn::is_populated);
            let violation = Error::BoundaryViolation {
                column: self.column,
                target: pos,
            };
            if !populated {
                return Err(violation);
            }
            if !self.store.contains_column(target) {
                let Some(source) = self.neighbors.as_mut() else {
                    return Err(violation);
                };
                load_or_generate(
                    self.store,
                    source.generator,
                    source.storage,
                    source.entities,
                    target,
                )?;
            }
        }
        let change = self.store.set_block(pos, id)?;
        if target != self.column && change.old != change.new {
            self.changes.push(change);
        }
        Ok(())
    }

    /// Write a block by column-local x/y and world z.
    pub fn set_local(&mut self, x: usize, y: usize, z: i32, id: BlockTypeId) -> Result<()> {
        let (ox, oy) = self.column.origin();
        self.set_block(WorldPos::new(ox + x as i32, oy + y as i32, z), id)
    }
}

/// Terrain generator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainConfig {
    /// Seed for noise generation.
    pub seed: WorldSeed,
    /// Water fills empty cells up to this Z.
    pub sea_level: i32,
    /// Lowest surface Z.
    pub base_height: i32,
    /// Horizontal scale of terrain features.
    pub terrain_scale: f64,
    /// Maximum terrain height variation above the base.
    pub terrain_height: f64,
    /// Number of noise octaves for detail.
    pub octaves: usize,
    /// Frequency multiplier between octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between octaves.
    pub persistence: f64,
    /// Depth of dirt layer below surface.
    pub dirt_depth: u32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            sea_level: 62,
            base_height: 48,
            terrain_scale: 100.0,
            terrain_height: 48.0,
            octaves: 4,
            lacunarity: 2.0,
            persistence: 0.5,
            dirt_depth: 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TerrainPalette {
    stone: BlockTypeId,
    dirt: BlockTypeId,
    grass: BlockTypeId,
    sand: BlockTypeId,
    water: BlockTypeId,
}

impl TerrainPalette {
    fn resolve(registry: &BlockRegistry) -> Result<Self> {
        Ok(Self {
            stone: registry.id_of("stone")?,
            dirt: registry.id_of("dirt")?,
            grass: registry.id_of("grass")?,
            sand: registry.id_of("sand")?,
            water: registry.id_of("water")?,
        })
    }
}

/// Procedural terrain generator using fractal noise.
pub struct TerrainGenerator {
    config: TerrainConfig,
    height_noise: Fbm<Perlin>,
    palette: TerrainPalette,
}

impl TerrainGenerator {
    /// Create a new terrain generator. The registry must contain the terrain
    /// blocks (stone, dirt, grass, sand, water).
    pub fn new(config: TerrainConfig, registry: &BlockRegistry) -> Result<Self> {
        let height_noise = Fbm::<Perlin>::new(config.seed as u32)
            .set_octaves(config.octaves)
            .set_lacunarity(config.lacunarity)
            .set_persistence(config.persistence);

        Ok(Self {
            config,
            height_noise,
            palette: TerrainPalette::resolve(registry)?,
        })
    }

    /// Create a terrain generator with the default configuration and `seed`.
    pub fn with_seed(seed: WorldSeed, registry: &BlockRegistry) -> Result<Self> {
        Self::new(
            TerrainConfig {
                seed,
                ..Default::default()
            },
            registry,
        )
    }

    /// Get the terrain configuration.
    pub const fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Z of the surface block at world (x, y).
    pub fn height_at(&self, world_x: i32, world_y: i32) -> i32 {
        let nx = f64::from(world_x) / self.config.terrain_scale;
        let ny = f64::from(world_y) / self.config.terrain_scale;

        // Noise returns [-1, 1], map to [0, terrain_height] above the base
        let noise_value = self.height_noise.get([nx, ny]);
        let height = ((noise_value + 1.0) * 0.5 * self.config.terrain_height) as i32
            + self.config.base_height;
        height.clamp(0, WORLD_HEIGHT - 1)
    }

    /// Surface heights of a column, x fastest.
    pub fn height_map(&self, column: ColumnPos) -> Vec<i32> {
        let (ox, oy) = column.origin();
        (0..CHUNK_SIZE * CHUNK_SIZE)
            .into_par_iter()
            .map(|i| self.height_at(ox + (i % CHUNK_SIZE) as i32, oy + (i / CHUNK_SIZE) as i32))
            .collect()
    }

    /// Block at world Z for a given surface height.
    fn block_at_depth(&self, z: i32, surface: i32) -> BlockTypeId {
        let palette = self.palette;
        if z > surface {
            if z <= self.config.sea_level {
                palette.water
            } else {
                BlockTypeId::AIR
            }
        } else if z == surface {
            if surface <= self.config.sea_level {
                palette.sand
            } else {
                palette.grass
            }
        } else if z > surface - self.config.dirt_depth as i32 {
            palette.dirt
        } else {
            palette.stone
        }
    }
}

impl Generator for TerrainGenerator {
    fn generate_column(&self, column: &mut ColumnWriter<'_>) -> Result<()> {
        let heights = self.height_map(column.pos());
        let top = self.config.sea_level.min(WORLD_HEIGHT - 1);
        for (i, &surface) in heights.iter().enumerate() {
            let (x, y) = (i % CHUNK_SIZE, i / CHUNK_SIZE);
            for z in 0..=surface.max(top) {
                let block = self.block_at_depth(z, surface);
                if !block.is_air() {
                    column.set_local(x, y, z, block)?;
                }
            }
        }
        Ok(())
    }
}

/// Fixed strata, bottom up, identical in every column.
#[derive(Debug, Clone, Default)]
pub struct FlatGenerator {
    layers: Vec<(BlockTypeId, u32)>,
}

impl FlatGenerator {
    /// `layers` are (block, thickness) pairs starting at z = 0.
    pub fn new(layers: Vec<(BlockTypeId, u32)>) -> Self {
        Self { layers }
    }

    /// Z of the topmost filled block, or `None` if there are no strata.
    pub fn surface_height(&self) -> Option<i32> {
        let total: u32 = self.layers.iter().map(|&(_, thickness)| thickness).sum();
        (total > 0).then(|| total as i32 - 1)
    }
}

impl Generator for FlatGenerator {
    fn generate_column(&self, column: &mut ColumnWriter<'_>) -> Result<()> {
        let mut z = 0;
        for &(block, thickness) in &self.layers {
            for _ in 0..thickness {
                if z >= WORLD_HEIGHT {
                    return Ok(());
                }
                if !block.is_air() {
                    for y in 0..CHUNK_SIZE {
                        for x in 0..CHUNK_SIZE {
                            column.set_local(x, y, z, block)?;
                        }
                    }
                }
                z += 1;
            }
        }
        Ok(())
    }
}

/// splitmix64, for deterministic per-column decisions.
const fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Plants trees on grass. Canopies may overhang into neighbouring columns.
#[derive(Debug, Clone)]
pub struct TreePopulator {
    seed: WorldSeed,
    trees_per_column: u32,
    log: BlockTypeId,
    leaves: BlockTypeId,
    grass: BlockTypeId,
}

impl TreePopulator {
    pub fn new(seed: WorldSeed, trees_per_column: u32, registry: &BlockRegistry) -> Result<Self> {
        Ok(Self {
            seed,
            trees_per_column,
            log: registry.id_of("log")?,
            leaves: registry.id_of("leaves")?,
            grass: registry.id_of("grass")?,
        })
    }

    fn place_tree(&self, column: &mut ColumnWriter<'_>, base: WorldPos, trunk: i32) -> Result<()> {
        let top = base.z + trunk;
        if top + 2 >= WORLD_HEIGHT {
            return Ok(());
        }
        for dz in -1..=1 {
            let radius = if dz == 1 { 1 } else { 2 };
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let pos = WorldPos::new(base.x + dx, base.y + dy, top + dz);
                    if column.get_block(pos).map_or(true, |id| id.is_air()) {
                        column.set_block(pos, self.leaves)?;
                    }
                }
            }
        }
        for z in base.z..top {
            column.set_block(WorldPos::new(base.x, base.y, z), self.log)?;
        }
        Ok(())
    }
}

impl Populator for TreePopulator {
    fn populate_column(&self, column: &mut ColumnWriter<'_>) -> Result<()> {
        let pos = column.pos();
        let (ox, oy) = pos.origin();
        let column_seed = self.seed
            ^ (u64::from(pos.x as u32) << 32)
            ^ u64::from(pos.y as u32);

        for i in 0..self.trees_per_column {
            let roll = mix(column_seed ^ mix(u64::from(i)));
            let x = ox + (roll % CHUNK_SIZE as u64) as i32;
            let y = oy + ((roll >> 8) % CHUNK_SIZE as u64) as i32;
            let trunk = 4 + ((roll >> 16) % 3) as i32;

            let Some(surface) = column.surface_height(x, y) else {
                continue;
            };
            if column.get_block(WorldPos::new(x, y, surface)) != Some(self.grass) {
                continue;
            }
            self.place_tree(column, WorldPos::new(x, y, surface + 1), trunk)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn registry() -> Arc<BlockRegistry> {
        Arc::new(BlockRegistry::standard())
    }

    fn generate(generator: &dyn Generator, store: &mut ChunkStore, pos: ColumnPos) -> Result<()> {
        store.insert_empty_column(pos);
        let mut writer = ColumnWriter::for_generation(store, pos);
        generator.generate_column(&mut writer)
    }

    #[test]
    fn generator_deterministic() {
        let registry = registry();
        let gen1 = TerrainGenerator::with_seed(12345, &registry).unwrap();
        let gen2 = TerrainGenerator::with_seed(12345, &registry).unwrap();

        // Same seed should produce same heights
        for x in -100..100 {
            for y in -100..100 {
                assert_eq!(gen1.height_at(x, y), gen2.height_at(x, y));
            }
        }
    }

    #[test]
    fn different_seeds_different_terrain() {
        let registry = registry();
        let gen1 = TerrainGenerator::with_seed(12345, &registry).unwrap();
        let gen2 = TerrainGenerator::with_seed(54321, &registry).unwrap();

        // Different seeds should produce different heights (statistically)
        let mut differences = 0;
        for x in 0..10 {
            for y in 0..10 {
                if gen1.height_at(x * 7, y * 7) != gen2.height_at(x * 7, y * 7) {
                    differences += 1;
                }
            }
        }
        assert!(differences > 50, "Seeds should produce different terrain");
    }

    #[test]
    fn missing_palette_block_fails() {
        let err = TerrainGenerator::with_seed(1, &BlockRegistry::new()).err().unwrap();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn height_map_matches_height_at() {
        let registry = registry();
        let generator = TerrainGenerator::with_seed(42, &registry).unwrap();
        let column = ColumnPos::new(-2, 3);
        let (ox, oy) = column.origin();
        let heights = generator.height_map(column);
        for (i, &h) in heights.iter().enumerate() {
            let x = ox + (i % CHUNK_SIZE) as i32;
            let y = oy + (i / CHUNK_SIZE) as i32;
            assert_eq!(h, generator.height_at(x, y));
        }
    }

    #[test]
    fn terrain_column_layers() {
        let registry = registry();
        let generator = TerrainGenerator::with_seed(42, &registry).unwrap();
        let mut store = ChunkStore::new(Arc::clone(&registry));
        let column = ColumnPos::new(0, 0);
        generate(&generator, &mut store, column).unwrap();

        let stone = registry.id_of("stone").unwrap();
        let sea = generator.config().sea_level;
        for (x, y) in [(0, 0), (7, 3), (15, 15)] {
            let surface = generator.height_at(x, y);
            assert_eq!(store.block(WorldPos::new(x, y, 0)), Some(stone));
            let top = store.block(WorldPos::new(x, y, surface)).unwrap();
            assert!(!top.is_air());
            let above = store.block(WorldPos::new(x, y, surface.max(sea) + 1)).unwrap();
            assert!(above.is_air());
        }
    }

    #[test]
    fn generation_cannot_leave_its_column() {
        struct Spill;
        impl Generator for Spill {
            fn generate_column(&self, column: &mut ColumnWriter<'_>) -> Result<()> {
                let (ox, oy) = column.pos().origin();
                column.set_block(WorldPos::new(ox - 1, oy, 10), BlockTypeId(1))
            }
        }

        let mut store = ChunkStore::new(registry());
        let err = generate(&Spill, &mut store, ColumnPos::new(0, 0)).unwrap_err();
        assert!(matches!(
            err,
            Error::BoundaryViolation { column, target }
                if column == ColumnPos::new(0, 0) && target == WorldPos::new(-1, 0, 10)
        ));
        assert!(!store.contains_column(ColumnPos::new(-1, 0)));
    }

    #[test]
    fn flat_generator_fills_strata() {
        let registry = registry();
        let stone = registry.id_of("stone").unwrap();
        let dirt = registry.id_of("dirt").unwrap();
        let generator = FlatGenerator::new(vec![(stone, 3), (dirt, 2)]);
        assert_eq!(generator.surface_height(), Some(4));

        let mut store = ChunkStore::new(Arc::clone(&registry));
        generate(&generator, &mut store, ColumnPos::new(1, 1)).unwrap();
        assert_eq!(store.block(WorldPos::new(16, 16, 0)), Some(stone));
        assert_eq!(store.block(WorldPos::new(31, 31, 2)), Some(stone));
        assert_eq!(store.block(WorldPos::new(20, 25, 4)), Some(dirt));
        assert_eq!(store.block(WorldPos::new(20, 25, 5)), Some(BlockTypeId::AIR));
    }

    #[test]
    fn writer_finds_surface() {
        let registry = registry();
        let stone = registry.id_of("stone").unwrap();
        let mut store = ChunkStore::new(Arc::clone(&registry));
        generate(&FlatGenerator::new(vec![(stone, 20)]), &mut store, ColumnPos::new(0, 0)).unwrap();
        let writer = ColumnWriter::for_generation(&mut store, ColumnPos::new(0, 0));
        assert_eq!(writer.surface_height(3, 3), Some(19));
        assert_eq!(writer.surface_height(-3, 3), None);
    }

    #[test]
    fn mix_spreads_bits() {
        assert_ne!(mix(0), mix(1));
        assert_ne!(mix(1) % 16, mix(2) % 16);
    }
}
