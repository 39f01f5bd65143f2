//! Swept AABB collision against the block grid.

use blockwork_core::{cast_ray, Aabb, BlockSide, RayIntersection};
use blockwork_entity::BoxCollider;
use glam::{IVec3, Vec3};
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::BlockQuery;

/// Moves shorter than this are dropped.
const MIN_MOVE: f32 = 1e-6;

/// Sweep configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Slides allowed after the first contact
    pub max_bounces: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { max_bounces: 2 }
    }
}

/// Outcome of one resolved move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepResult {
    pub position: Vec3,
    /// A top face was struck while moving down
    pub grounded: bool,
    /// Face of the last block struck
    pub last_hit: Option<BlockSide>,
}

#[derive(Debug, Clone, Copy)]
struct Contact {
    hit: RayIntersection,
    hitbox: Aabb,
}

/// Resolves box movement through solid blocks by sliding along them.
#[derive(Debug, Clone, Default)]
pub struct SweptResolver {
    config: SweepConfig,
}

impl SweptResolver {
    pub const fn new(config: SweepConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Move a collider at `position` by `displacement`.
    ///
    /// On contact the box is placed flush against the struck face, the
    /// velocity along that axis is zeroed and the rest of the move slides
    /// along the other two axes.
    pub fn resolve<Q: BlockQuery + ?Sized>(
        &self,
        blocks: &Q,
        collider: &BoxCollider,
        position: Vec3,
        velocity: &mut Vec3,
        displacement: Vec3,
    ) -> SweepResult {
        let mut result = SweepResult {
            position,
            grounded: false,
            last_hit: None,
        };
        let mut remaining = displacement;

        for _ in 0..=self.config.max_bounces {
            let length = remaining.length();
            if length < MIN_MOVE {
                break;
            }
            let direction = remaining / length;

            let contact = earliest_contact(blocks, collider, result.position, direction, length);
            let Some(contact) = contact else {
                result.position += remaining;
                return result;
            };

            let side = contact.hit.side;
            let axis = side.axis();
            result.position += direction * contact.hit.t;
            result.position[axis] = if side.is_positive() {
                contact.hitbox.max[axis] - collider.offset[axis]
            } else {
                contact.hitbox.min[axis] - collider.offset[axis] - collider.size[axis]
            };
            velocity[axis] = 0.0;
            result.grounded |= side == BlockSide::Top;
            result.last_hit = Some(side);

            remaining = direction * (length - contact.hit.t);
            remaining[axis] = 0.0;
        }
        result
    }
}

/// Earliest block hit by the collider moving along `direction` for `length`.
fn earliest_contact<Q: BlockQuery + ?Sized>(
    blocks: &Q,
    collider: &BoxCollider,
    position: Vec3,
    direction: Vec3,
    length: f32,
) -> Option<Contact> {
    let body = collider.aabb_at(position);
    let corner = Vec3::select(direction.cmpgt(Vec3::ZERO), body.max, body.min);
    let extent = collider.size.ceil().as_ivec3();

    // Cells the body can overlap while its leading corner is in a cell
    let behind = IVec3::select(direction.cmpgt(Vec3::ZERO), extent, IVec3::ZERO) + 1;
    let ahead = IVec3::select(direction.cmpgt(Vec3::ZERO), IVec3::ZERO, extent) + 1;

    let mut best: Option<Contact> = None;
    let mut tested = HashSet::new();
    cast_ray(corner, direction, length, |cell, t, _| {
        if best.is_some_and(|b| t > b.hit.t) {
            return true;
        }
        let (lo, hi) = (cell - behind, cell + ahead);
        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    let candidate = IVec3::new(x, y, z);
                    if !tested.insert(candidate) {
                        continue;
                    }
                    let Some(hitbox) = blocks.collidable_hitbox(candidate) else {
                        continue;
                    };
                    let Some(hit) = hitbox.intersects_box(&body, direction, length) else {
                        continue;
                    };
                    if best.map_or(true, |b| hit.t < b.hit.t) {
                        best = Some(Contact { hit, hitbox });
                    }
                }
            }
        }
        false
    });
    best
}
