//! Gravity and collision for kinematic bodies.

use blockwork_entity::{BoxCollider, Entity, KinematicBody, Transform, Velocity};
use blockwork_world::{ChunkProvider, World};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::sweep::{SweepConfig, SweptResolver};

/// Physics configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsConfig {
    /// Acceleration applied to every body, scaled by its gravity scale
    pub gravity: Vec3,
    /// Cap on speed along the gravity direction
    pub terminal_speed: f32,
    pub sweep: SweepConfig,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, 0.0, -20.0),
            terminal_speed: 50.0,
            sweep: SweepConfig::default(),
        }
    }
}

/// Moves every entity that has a transform, velocity, box collider and
/// kinematic body.
#[derive(Debug, Clone, Default)]
pub struct PhysicsSystem {
    config: PhysicsConfig,
    resolver: SweptResolver,
}

impl PhysicsSystem {
    pub const fn new(config: PhysicsConfig) -> Self {
        Self {
            config,
            resolver: SweptResolver::new(config.sweep),
        }
    }

    pub const fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    fn apply_gravity(&self, velocity: Vec3, scale: f32, dt: f32) -> Vec3 {
        let velocity = velocity + self.config.gravity * scale * dt;
        let down = self.config.gravity.normalize_or_zero();
        let fall = velocity.dot(down);
        if fall > self.config.terminal_speed {
            velocity - down * (fall - self.config.terminal_speed)
        } else {
            velocity
        }
    }

    /// Advance the kinematic bodies inside loaded chunks by `dt` seconds.
    /// Returns how many moved.
    ///
    /// Bodies whose position lies in an unloaded chunk are left alone. Bodies
    /// crossing into another loaded chunk are re-attached to it; a body that
    /// moves into an unloaded chunk stays attached where it was.
    pub fn step<P: ChunkProvider>(&self, world: &mut World<P>, dt: f32) -> usize {
        let _span = tracing::trace_span!("physics_step").entered();

        let bodies: Vec<(Entity, Transform, Velocity, BoxCollider, KinematicBody)> = world
            .entities
            .query::<(&Transform, &Velocity, &BoxCollider, &KinematicBody)>()
            .iter()
            .filter(|(_, (transform, ..))| world.is_loaded(transform.chunk_pos()))
            .map(|(entity, (transform, velocity, collider, body))| {
                (entity, *transform, *velocity, *collider, *body)
            })
            .collect();

        let mut moved = 0;
        for (entity, mut transform, velocity, collider, mut body) in bodies {
            let mut velocity = self.apply_gravity(velocity.0, body.gravity_scale, dt);
            let displacement = velocity * dt;
            let result = self.resolver.resolve(
                &*world,
                &collider,
                transform.position,
                &mut velocity,
                displacement,
            );

            let from = transform.chunk_pos();
            if result.position != transform.position {
                moved += 1;
            }
            transform.position = result.position;
            body.grounded = result.grounded;

            if let Ok(mut t) = world.entities.get::<&mut Transform>(entity) {
                *t = transform;
            }
            if let Ok(mut v) = world.entities.get::<&mut Velocity>(entity) {
                v.0 = velocity;
            }
            if let Ok(mut b) = world.entities.get::<&mut KinematicBody>(entity) {
                *b = body;
            }

            let to = transform.chunk_pos();
            if from != to && world.move_entity(entity, from, to) {
                trace!(?entity, ?from, ?to, "entity changed chunk");
            }
        }
        moved
    }
}
