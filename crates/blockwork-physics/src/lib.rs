//! Voxel collision and kinematic movement for the Blockwork voxel core.
//!
//! Collision is resolved by sweeping an entity's box through the block grid
//! ([`SweptResolver`]); [`PhysicsSystem`] drives it for every kinematic body
//! in a [`World`](blockwork_world::World).

pub mod kinematics;
pub mod sweep;

use blockwork_core::{Aabb, WorldPos};
use blockwork_world::{ChunkProvider, World};
use glam::IVec3;

pub use kinematics::{PhysicsConfig, PhysicsSystem};
pub use sweep::{SweepConfig, SweepResult, SweptResolver};

/// Source of block hitboxes for collision.
pub trait BlockQuery {
    /// World-space hitbox of the block in `cell`, if it collides.
    fn collidable_hitbox(&self, cell: IVec3) -> Option<Aabb>;
}

/// Adapts a closure to [`BlockQuery`].
pub struct QueryFn<F>(pub F);

impl<F> BlockQuery for QueryFn<F>
where
    F: Fn(IVec3) -> Option<Aabb>,
{
    fn collidable_hitbox(&self, cell: IVec3) -> Option<Aabb> {
        (self.0)(cell)
    }
}

/// Blocks in unloaded chunks do not collide.
impl<P: ChunkProvider> BlockQuery for World<P> {
    fn collidable_hitbox(&self, cell: IVec3) -> Option<Aabb> {
        let block = self.block_type(WorldPos::from(cell))?;
        block.hitbox().map(|hitbox| hitbox.translated(cell.as_vec3()))
    }
}
