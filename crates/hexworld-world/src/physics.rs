//! Actor collision against variable-height hex columns.
//!
//! A solid cell occupies its layer from the integer floor up to a per-cell
//! physical height in `[0.6, 1.0]`. The height is 1.0 when an opaque solid
//! block sits directly above, otherwise a pseudo-random value seeded by the
//! world seed and the cell position. Heights are recomputed on demand.

use glam::Vec3;
use hexworld_common::{world_to_axial, VoxelPos, CHUNK_HEIGHT};
use serde::{Deserialize, Serialize};

use crate::blocks::{BlockRegistry, BlockSource};

/// Physics tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Vertical acceleration in units/s^2 (negative = down)
    pub gravity: f32,
    /// Bottom slice of the actor that ignores horizontal collisions
    pub step_height: f32,
    /// Lowest seeded column height
    pub min_column_height: f32,
    /// Gap kept below the actor's top when checking horizontal collisions
    pub head_clearance: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: -30.0,
            step_height: 0.61,
            min_column_height: 0.6,
            head_clearance: 0.1,
        }
    }
}

impl PhysicsConfig {
    /// Clamps values to sensible ranges.
    pub fn validate(&mut self) {
        self.gravity = self.gravity.clamp(-200.0, 0.0);
        self.step_height = self.step_height.clamp(0.0, 1.0);
        self.min_column_height = self.min_column_height.clamp(0.1, 1.0);
        self.head_clearance = self.head_clearance.clamp(0.0, 0.5);
    }
}

/// Collision query interface for the block field.
pub trait CollisionQuery {
    /// Whether the cell blocks movement.
    fn is_solid(&self, pos: VoxelPos) -> bool;

    /// Whether the cell holds a liquid.
    fn is_liquid(&self, pos: VoxelPos) -> bool;

    /// Height of a solid cell's top above its floor, in `(0, 1]`.
    fn physical_height(&self, pos: VoxelPos) -> f32;
}

/// Seeded column height: 1.0 under an opaque solid block, else in `[min, 1.0]`.
#[must_use]
pub fn column_height(seed: u64, pos: VoxelPos, covered: bool, min: f32) -> f32 {
    if covered {
        return 1.0;
    }
    min + (1.0 - min) * unit_hash(seed, pos)
}

/// Deterministic hash of a seed and a cell, mapped to `[0, 1]`.
fn unit_hash(seed: u64, pos: VoxelPos) -> f32 {
    let mut h = seed ^ 0x9E37_79B9_7F4A_7C15;
    for v in [pos.q, pos.r, pos.y] {
        h ^= u64::from(v as u32);
        h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        h ^= h >> 31;
    }
    h = h.wrapping_mul(0x94D0_49BB_1331_11EB);
    h ^= h >> 29;
    (h >> 40) as f32 / ((1u64 << 24) - 1) as f32
}

/// Cell containing a world-space point, `None` outside the height range.
#[must_use]
pub fn voxel_at(point: Vec3) -> Option<VoxelPos> {
    let y = point.y.floor();
    if y < 0.0 || y >= CHUNK_HEIGHT as f32 {
        return None;
    }
    let column = world_to_axial(point.x, point.z);
    Some(VoxelPos::new(column.q, column.r, y as i32))
}

/// Block id under a world-space point, 0 outside the world.
#[must_use]
pub fn block_at_point<W: BlockSource + ?Sized>(world: &W, point: Vec3) -> u8 {
    voxel_at(point).map_or(0, |pos| world.block_at(pos))
}

/// Collision view over resident world data.
///
/// Absent chunks read as air, so they neither block nor support.
pub struct WorldCollision<'a, W: BlockSource + ?Sized> {
    world: &'a W,
    blocks: &'a BlockRegistry,
    seed: u64,
    min_height: f32,
}

impl<'a, W: BlockSource + ?Sized> WorldCollision<'a, W> {
    /// Creates a view with the given world seed.
    #[must_use]
    pub fn new(world: &'a W, blocks: &'a BlockRegistry, seed: u64, config: &PhysicsConfig) -> Self {
        Self {
            world,
            blocks,
            seed,
            min_height: config.min_column_height,
        }
    }
}

impl<W: BlockSource + ?Sized> CollisionQuery for WorldCollision<'_, W> {
    fn is_solid(&self, pos: VoxelPos) -> bool {
        self.blocks.is_solid(self.world.block_at(pos))
    }

    fn is_liquid(&self, pos: VoxelPos) -> bool {
        self.blocks.is_liquid(self.world.block_at(pos))
    }

    fn physical_height(&self, pos: VoxelPos) -> f32 {
        let above = self.world.block_at(pos.offset(0, 0, 1));
        column_height(
            self.seed,
            pos,
            self.blocks.is_opaque_solid(above),
            self.min_height,
        )
    }
}

/// A vertical cylinder moved by the physics step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    /// Feet position (bottom center)
    pub position: Vec3,
    /// Velocity in units/s
    pub velocity: Vec3,
    /// Cylinder radius
    pub radius: f32,
    /// Cylinder height
    pub height: f32,
}

impl Actor {
    /// Creates a player-sized actor at rest.
    #[must_use]
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            radius: 0.3,
            height: 1.7,
        }
    }

    /// Center plus four cardinal points on the footprint rim.
    fn footprint(&self, x: f32, z: f32) -> [(f32, f32); 5] {
        let r = self.radius;
        [(x, z), (x + r, z), (x - r, z), (x, z + r), (x, z - r)]
    }
}

/// Result of one physics step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// Standing on a block after the step
    pub on_ground: bool,
    /// Horizontal X motion was stopped
    pub blocked_x: bool,
    /// Horizontal Z motion was stopped
    pub blocked_z: bool,
    /// Feet are inside a liquid
    pub feet_in_liquid: bool,
    /// Head is inside a liquid
    pub head_in_liquid: bool,
}

/// Resolves actor motion against a [`CollisionQuery`].
#[derive(Debug, Clone, Default)]
pub struct PhysicsEngine {
    config: PhysicsConfig,
}

impl PhysicsEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(config: PhysicsConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Advances the actor by `dt` seconds.
    pub fn step<C: CollisionQuery + ?Sized>(
        &self,
        actor: &mut Actor,
        world: &C,
        dt: f32,
    ) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        let start = actor.position;

        actor.velocity.y += self.config.gravity * dt;
        let mut next_y = start.y + actor.velocity.y * dt;

        if actor.velocity.y <= 0.0 {
            if let Some(top) = self.support_top(actor, world, start.y, next_y) {
                next_y = top;
                actor.velocity.y = 0.0;
                outcome.on_ground = true;
            }
        } else if let Some(ceiling) = self.ceiling(actor, world, next_y) {
            next_y = ceiling - actor.height;
            actor.velocity.y = 0.0;
        }

        let mut next_x = start.x + actor.velocity.x * dt;
        if actor.velocity.x != 0.0 && self.blocked(actor, world, next_x, start.z, next_y) {
            next_x = start.x;
            actor.velocity.x = 0.0;
            outcome.blocked_x = true;
        }

        let mut next_z = start.z + actor.velocity.z * dt;
        if actor.velocity.z != 0.0 && self.blocked(actor, world, next_x, next_z, next_y) {
            next_z = start.z;
            actor.velocity.z = 0.0;
            outcome.blocked_z = true;
        }

        actor.position = Vec3::new(next_x, next_y, next_z);

        let feet = actor.position + Vec3::Y * 0.1;
        let eyes = actor.position + Vec3::Y * (actor.height * 0.9);
        outcome.feet_in_liquid = voxel_at(feet).is_some_and(|p| world.is_liquid(p));
        outcome.head_in_liquid = voxel_at(eyes).is_some_and(|p| world.is_liquid(p));

        outcome
    }

    /// Highest block top the descending actor lands on or steps up to.
    ///
    /// Tops between `next_y` and the higher of the previous feet height or
    /// `next_y + step_height` count, so fast falls do not tunnel and small
    /// bumps entered horizontally lift the actor.
    fn support_top<C: CollisionQuery + ?Sized>(
        &self,
        actor: &Actor,
        world: &C,
        prev_y: f32,
        next_y: f32,
    ) -> Option<f32> {
        let upper = prev_y.max(next_y + self.config.step_height);
        let lowest = (next_y.floor() as i32 - 1).max(0);
        let highest = (upper.floor() as i32).min(CHUNK_HEIGHT - 1);

        let mut best: Option<f32> = None;
        for (x, z) in actor.footprint(actor.position.x, actor.position.z) {
            let column = world_to_axial(x, z);
            for layer in lowest..=highest {
                let pos = VoxelPos::new(column.q, column.r, layer);
                if !world.is_solid(pos) {
                    continue;
                }
                let top = layer as f32 + world.physical_height(pos);
                if top >= next_y && top <= upper && best.map_or(true, |b| top > b) {
                    best = Some(top);
                }
            }
        }
        best
    }

    /// Integer floor of a solid cell the rising head would enter.
    fn ceiling<C: CollisionQuery + ?Sized>(
        &self,
        actor: &Actor,
        world: &C,
        next_y: f32,
    ) -> Option<f32> {
        let head_layer = (next_y + actor.height).floor();
        if head_layer < 0.0 || head_layer >= CHUNK_HEIGHT as f32 {
            return None;
        }
        actor
            .footprint(actor.position.x, actor.position.z)
            .into_iter()
            .map(|(x, z)| world_to_axial(x, z))
            .any(|c| world.is_solid(VoxelPos::new(c.q, c.r, head_layer as i32)))
            .then_some(head_layer)
    }

    /// Whether the actor's body at `(x, feet, z)` overlaps a solid column.
    ///
    /// The bottom `step_height` of the body is ignored. Every layer the body
    /// spans is compared against the exact block extent
    /// `[layer, layer + physical_height]`.
    fn blocked<C: CollisionQuery + ?Sized>(
        &self,
        actor: &Actor,
        world: &C,
        x: f32,
        z: f32,
        feet: f32,
    ) -> bool {
        let body_bottom = feet + self.config.step_height;
        let body_top = feet + actor.height - self.config.head_clearance;
        let lowest = (feet.floor() as i32).max(0);
        let highest = (body_top.floor() as i32).min(CHUNK_HEIGHT - 1);

        actor.footprint(x, z).into_iter().any(|(px, pz)| {
            let column = world_to_axial(px, pz);
            (lowest..=highest).any(|layer| {
                let pos = VoxelPos::new(column.q, column.r, layer);
                if !world.is_solid(pos) {
                    return false;
                }
                let bottom = layer as f32;
                let top = bottom + world.physical_height(pos);
                top > body_bottom && bottom < body_top
            })
        })
    }
}
