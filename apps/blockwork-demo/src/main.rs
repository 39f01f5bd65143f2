//! Blockwork headless demo
//!
//! Generates (or reloads) terrain around a spawn point, drops a body onto it,
//! digs the block under it and saves everything back to disk.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p blockwork-demo -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--seed <N>`: World generation seed for new worlds (default: 42)
//! - `--radius <N>`: Horizontal chunk radius around spawn (default: 2)
//! - `--steps <N>`: Physics steps at 60 Hz (default: 180)
//! - `--world <DIR>`: World directory (default: system temp dir)
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod meta;
mod params;

use std::sync::Arc;

use anyhow::Context;
use blockwork_core::constants::{CHUNK_LAYERS, CHUNK_SIZE};
use blockwork_core::{BlockRegistry, BlockTypeId, ChunkPos, Ray};
use blockwork_entity::{BoxCollider, Entity, KinematicBody, Transform, Velocity};
use blockwork_physics::PhysicsSystem;
use blockwork_world::{
    Chunk, ChunkProvider, ChunkStore, ColumnFiles, ColumnProvider, TerrainGenerator,
    TreePopulator, World, WorldFile, WorldObserver,
};
use glam::Vec3;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::meta::WorldMeta;
use crate::params::DemoParams;

const STEP: f32 = 1.0 / 60.0;
const TREES_PER_COLUMN: u32 = 2;

/// Logs chunk lifecycle events and counts them.
#[derive(Default)]
struct ChunkLog {
    loaded: usize,
    changed: usize,
}

impl WorldObserver for ChunkLog {
    fn chunk_loaded(&mut self, chunk: &Chunk) {
        self.loaded += 1;
        debug!(pos = ?chunk.pos(), empty = chunk.is_empty(), "loaded");
    }

    fn chunk_changed(&mut self, chunk: &Chunk, static_blocks_affected: bool) {
        self.changed += 1;
        info!(pos = ?chunk.pos(), static_blocks_affected, total = self.changed, "changed");
    }

    fn chunk_unloaded(&mut self, chunk: &Chunk) {
        debug!(pos = ?chunk.pos(), loaded = self.loaded, "unloaded");
    }
}

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let params = DemoParams::from_args();
    let world_file = params.world_dir.join("world.dat");
    std::fs::create_dir_all(&params.world_dir)
        .with_context(|| format!("creating {}", params.world_dir.display()))?;

    let mut meta = WorldMeta::new(params.seed);
    if WorldFile::load(&world_file, &mut [&mut meta])? {
        info!(seed = meta.seed, sessions = meta.sessions, "reopened world");
    } else {
        info!(seed = meta.seed, "new world");
    }

    let registry = Arc::new(BlockRegistry::standard());
    let generator = TerrainGenerator::with_seed(meta.seed, &registry)?;
    let surface = generator.height_at(8, 8);
    let trees = TreePopulator::new(meta.seed, TREES_PER_COLUMN, &registry)?;
    let storage = ColumnFiles::new(params.world_dir.join("columns"))?;
    let store = ChunkStore::new(Arc::clone(&registry));
    let provider =
        ColumnProvider::new(store, Box::new(generator), storage).with_populator(Box::new(trees));

    let mut world = World::new(provider);
    world.add_observer(Box::new(ChunkLog::default()));

    // Load the layers around the surface at spawn
    let surface_layer = surface / CHUNK_SIZE as i32;
    let layers = (surface_layer - 1).max(0)..=(surface_layer + 1).min(CHUNK_LAYERS as i32 - 1);
    for y in -params.radius..=params.radius {
        for x in -params.radius..=params.radius {
            for z in layers.clone() {
                world.load_chunk(ChunkPos::new(x, y, z))?;
            }
        }
    }
    info!(chunks = world.loaded_count(), columns = world.store().len(), "terrain ready");

    let spawn = meta
        .spawn
        .unwrap_or_else(|| Vec3::new(8.5, 8.5, surface as f32 + 6.0));
    let player = world.entities.spawn((
        Transform::from_position(spawn),
        Velocity::default(),
        BoxCollider::standing(Vec3::new(0.6, 0.6, 1.8)),
        KinematicBody::default(),
    ));
    if world.attach_entity(player).is_none() {
        warn!(?spawn, "spawn point is outside the loaded area");
    }

    let physics = PhysicsSystem::default();
    for _ in 0..params.steps {
        physics.step(&mut world, STEP);
        world.tick(STEP)?;
    }
    let position = world.entities.get::<&Transform>(player)?.position;
    let grounded = world.entities.get::<&KinematicBody>(player)?.grounded;
    info!(?position, grounded, "player settled");

    let eye = position + Vec3::new(0.0, 0.0, 1.6);
    match world.cast_ray(&Ray::new(eye, Vec3::NEG_Z), 8.0) {
        Some(hit) => {
            let name = world.registry().get(hit.block_type).name().to_owned();
            info!(
                block = ?hit.block,
                side = ?hit.side,
                distance = hit.distance,
                %name,
                "looking at"
            );
            let old = world.set_block(hit.block, BlockTypeId::AIR)?;
            debug!(?old, "dug");
        }
        None => info!("nothing below the player"),
    }

    park_player(&mut world, player, &mut meta)?;
    meta.sessions += 1;
    world.unload_all()?;
    WorldFile::save(&world_file, &[&meta])?;
    info!(
        path = %world_file.display(),
        columns_in_memory = world.store().len(),
        "world saved"
    );
    Ok(())
}

/// Record the player's position as the next spawn point and remove its body,
/// so it is not saved with its column and respawned next session.
fn park_player<P: ChunkProvider>(
    world: &mut World<P>,
    player: Entity,
    meta: &mut WorldMeta,
) -> anyhow::Result<()> {
    let position = world.entities.get::<&Transform>(player)?.position;
    meta.spawn = Some(position + Vec3::Z);
    world.detach_entity(player);
    world.entities.despawn(player)?;
    Ok(())
}

fn print_help() {
    eprintln!(
        "Blockwork headless demo

USAGE:
    cargo run -p blockwork-demo -- [OPTIONS]

OPTIONS:
    --seed <N>      World generation seed for new worlds (default: 42)
    --radius <N>    Horizontal chunk radius around spawn (default: 2)
    --steps <N>     Physics steps at 60 Hz (default: 180)
    --world <DIR>   World directory (default: system temp dir)
    -h, --help      Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG        Set log level (e.g., info, debug, trace)"
    );
}
