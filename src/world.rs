//! Rigid-body world: rapier2d simulation, arena walls, fixed-step stepping and AABB queries.
//!
//! Coordinates are screen-oriented: x grows to the right, y grows downward and gravity
//! pulls toward +y. The floor's top face sits at `y = PLAY_HEIGHT`, the walls' inner faces
//! at `x = 0` and `x = PLAY_WIDTH`. There is no ceiling.

use crate::piece::{Shade, TetrominoKind};
use rapier2d::prelude::*;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::time::Instant;

/// Arena width in cells (one unit per cell).
pub const PLAY_WIDTH: usize = 10;
/// Arena height in cells.
pub const PLAY_HEIGHT: usize = 18;

/// Fixed simulation increment (seconds).
pub const FIXED_STEP: f32 = 1.0 / 60.0;
/// Upper bound on fixed increments consumed by one `step` call.
const MAX_STEPS_PER_CALL: u32 = 4;
const VELOCITY_ITERATIONS: usize = 8;
const POSITION_ITERATIONS: usize = 3;

/// Bodies slower than this (units/sec) count as at rest.
pub const SETTLE_VELOCITY_THRESHOLD: f32 = 0.2;

const WALL_THICKNESS: f32 = 0.5;
const WALL_FRICTION: f32 = 0.7;
const WALL_RESTITUTION: f32 = 0.05;

const PIECE_LINEAR_DAMPING: f32 = 0.1;
const PIECE_ANGULAR_DAMPING: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallSide {
    Left,
    Right,
    Floor,
}

/// Per-piece metadata. `active` can only go from true to false.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PieceData {
    pub kind: TetrominoKind,
    pub shade: Shade,
    active: bool,
    /// Seconds spent grounded and vertically at rest.
    pub settle_timer: f32,
    pub spawned_at: Instant,
}

impl PieceData {
    pub fn new(kind: TetrominoKind, active: bool, now: Instant) -> Self {
        Self {
            kind,
            shade: kind.shade(),
            active,
            settle_timer: 0.0,
            spawned_at: now,
        }
    }

    /// Settled copy for a fragment split off this piece.
    pub fn fragment(&self, now: Instant) -> Self {
        Self {
            active: false,
            settle_timer: 0.0,
            spawned_at: now,
            ..*self
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn settle(&mut self) {
        self.active = false;
    }
}

/// What a body in the world is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BodyTag {
    Wall { side: WallSide },
    Piece(PieceData),
}

impl BodyTag {
    pub fn as_piece(&self) -> Option<&PieceData> {
        match self {
            Self::Piece(p) => Some(p),
            Self::Wall { .. } => None,
        }
    }

    /// True for pieces that have left player control.
    pub fn is_settled_piece(&self) -> bool {
        self.as_piece().is_some_and(|p| !p.is_active())
    }
}

/// Physical parameters shared by every piece block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockMaterial {
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    /// Half-width of a block; slightly under 0.5 so neighbouring blocks show a seam.
    pub half_extent: f32,
}

impl Default for BlockMaterial {
    fn default() -> Self {
        Self {
            density: 1.0,
            friction: 0.5,
            restitution: 0.05,
            half_extent: 0.45,
        }
    }
}

/// Axis-aligned box in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vector<Real>,
    pub max: Vector<Real>,
}

impl Bounds {
    pub fn new(min: Vector<Real>, max: Vector<Real>) -> Self {
        Self { min, max }
    }

    /// Horizontal slab spanning the whole arena width, `height` tall, centred on `center_y`.
    pub fn slab(center_y: f32, height: f32) -> Self {
        let half = height / 2.0;
        Self::new(
            vector![0.0, center_y - half],
            vector![PLAY_WIDTH as f32, center_y + half],
        )
    }

    /// Touching boxes overlap.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    pub fn shrunk(&self, by: f32) -> Self {
        Self::new(self.min.add_scalar(by), self.max.add_scalar(-by))
    }
}

/// One collision shape and the body that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeRef {
    pub shape: ColliderHandle,
    pub body: RigidBodyHandle,
}

/// Render-side view of one block.
#[derive(Debug, Clone, Copy)]
pub struct BlockView {
    pub shape: ColliderHandle,
    pub center: Vector<Real>,
    pub angle: Real,
    pub half_extents: Vector<Real>,
    pub tag: BodyTag,
}

/// Owns the rapier simulation plus the body metadata side table.
pub struct PhysicsWorld {
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    tags: HashMap<RigidBodyHandle, BodyTag>,
    material: BlockMaterial,
    accumulator: f32,
}

impl PhysicsWorld {
    pub fn new(gravity: f32, material: BlockMaterial) -> Self {
        let mut params = IntegrationParameters::default();
        params.dt = FIXED_STEP;
        params.num_solver_iterations =
            NonZeroUsize::new(VELOCITY_ITERATIONS).unwrap_or(NonZeroUsize::MIN);
        params.num_internal_stabilization_iterations = POSITION_ITERATIONS;

        let mut world = Self {
            gravity: vector![0.0, gravity],
            params,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            tags: HashMap::new(),
            material,
            accumulator: 0.0,
        };
        world.create_walls();
        world
    }

    fn create_walls(&mut self) {
        let w = PLAY_WIDTH as f32;
        let h = PLAY_HEIGHT as f32;
        let t = WALL_THICKNESS;
        let walls = [
            (WallSide::Floor, vector![w / 2.0, h + t / 2.0], w / 2.0 + t, t / 2.0),
            (WallSide::Left, vector![-t / 2.0, h / 2.0], t / 2.0, h / 2.0 + t),
            (WallSide::Right, vector![w + t / 2.0, h / 2.0], t / 2.0, h / 2.0 + t),
        ];
        for (side, at, hx, hy) in walls {
            let body = self
                .bodies
                .insert(RigidBodyBuilder::fixed().translation(at).build());
            let collider = ColliderBuilder::cuboid(hx, hy)
                .friction(WALL_FRICTION)
                .restitution(WALL_RESTITUTION)
                .build();
            self.colliders
                .insert_with_parent(collider, body, &mut self.bodies);
            self.tags.insert(body, BodyTag::Wall { side });
        }
    }

    /// Unconsumed simulation time carried into the next `step`.
    #[cfg(test)]
    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    /// Advance by `dt` seconds in fixed increments; returns how many increments ran.
    pub fn step(&mut self, dt: f32) -> u32 {
        self.accumulator += dt.max(0.0);
        let mut steps = 0;
        while self.accumulator >= FIXED_STEP && steps < MAX_STEPS_PER_CALL {
            self.step_once();
            self.accumulator -= FIXED_STEP;
            steps += 1;
        }
        if self.accumulator > FIXED_STEP * 2.0 {
            self.accumulator = 0.0;
        }
        // User forces persist in rapier until reset.
        for (_, body) in self.bodies.iter_mut() {
            body.reset_forces(false);
        }
        steps
    }

    fn step_once(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
    }

    /// Visit every shape whose bounds overlap `area`. Return `ControlFlow::Break` to stop.
    ///
    /// Bounds come from the owning body's current pose, so a pose set just before the
    /// query (a probe) is honoured without stepping. The visitor cannot mutate the world;
    /// callers collect what they need and apply changes after the query returns.
    pub fn query_aabb<F>(&self, area: &Bounds, mut visit: F)
    where
        F: FnMut(ShapeRef) -> ControlFlow<()>,
    {
        for (shape, collider) in self.colliders.iter() {
            let Some(body) = collider.parent() else {
                continue;
            };
            let Some(bounds) = self.shape_bounds(shape) else {
                continue;
            };
            if bounds.overlaps(area) && visit(ShapeRef { shape, body }).is_break() {
                return;
            }
        }
    }

    /// World pose of a shape, derived from its parent body.
    pub fn shape_pose(&self, shape: ColliderHandle) -> Option<Isometry<Real>> {
        let collider = self.colliders.get(shape)?;
        match collider.parent() {
            Some(parent) => {
                let body = self.bodies.get(parent)?;
                let local = collider
                    .position_wrt_parent()
                    .copied()
                    .unwrap_or_else(Isometry::identity);
                Some(body.position() * local)
            }
            None => Some(*collider.position()),
        }
    }

    pub fn shape_bounds(&self, shape: ColliderHandle) -> Option<Bounds> {
        let pose = self.shape_pose(shape)?;
        let aabb = self.colliders.get(shape)?.shape().compute_aabb(&pose);
        Some(Bounds::new(aabb.mins.coords, aabb.maxs.coords))
    }

    /// World-space centre of a block. Non-box shapes fall back to the body position.
    pub fn shape_centroid(&self, shape: ShapeRef) -> Option<Vector<Real>> {
        let collider = self.colliders.get(shape.shape)?;
        if collider.shape().as_cuboid().is_some() {
            return self.shape_pose(shape.shape).map(|p| p.translation.vector);
        }
        self.bodies.get(shape.body).map(|b| *b.translation())
    }

    /// Offset of a shape from its body's origin, in body space.
    pub fn shape_local_offset(&self, shape: ColliderHandle) -> Option<Vector<Real>> {
        self.colliders
            .get(shape)?
            .position_wrt_parent()
            .map(|iso| iso.translation.vector)
    }

    /// Shapes currently attached to `body` (empty if the body is gone).
    pub fn body_shapes(&self, body: RigidBodyHandle) -> Vec<ColliderHandle> {
        self.bodies
            .get(body)
            .map(|b| b.colliders().to_vec())
            .unwrap_or_default()
    }

    pub fn contains_body(&self, body: RigidBodyHandle) -> bool {
        self.bodies.contains(body)
    }

    /// Create a dynamic piece body with no shapes yet.
    pub fn spawn_piece_body(
        &mut self,
        at: Vector<Real>,
        angle: Real,
        data: PieceData,
    ) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(at)
            .rotation(angle)
            .linear_damping(PIECE_LINEAR_DAMPING)
            .angular_damping(PIECE_ANGULAR_DAMPING)
            .build();
        let handle = self.bodies.insert(body);
        self.tags.insert(handle, BodyTag::Piece(data));
        handle
    }

    /// Attach one square block at `offset` (body space) using the world's block material.
    pub fn attach_block(&mut self, body: RigidBodyHandle, offset: Vector<Real>) -> ColliderHandle {
        let m = self.material;
        let collider = ColliderBuilder::cuboid(m.half_extent, m.half_extent)
            .translation(offset)
            .density(m.density)
            .friction(m.friction)
            .restitution(m.restitution)
            .build();
        self.colliders
            .insert_with_parent(collider, body, &mut self.bodies)
    }

    /// Detach and drop a shape. Returns the former owner; a stale handle is a no-op.
    pub fn remove_shape(&mut self, shape: ColliderHandle) -> Option<RigidBodyHandle> {
        let owner = self.colliders.get(shape)?.parent();
        self.colliders
            .remove(shape, &mut self.islands, &mut self.bodies, true)?;
        owner
    }

    /// Remove a body with all its shapes. A stale handle is a no-op.
    pub fn remove_body(&mut self, body: RigidBodyHandle) {
        self.bodies.remove(
            body,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        self.tags.remove(&body);
    }

    /// Remove every non-static body; the arena walls stay.
    pub fn clear_dynamic_bodies(&mut self) {
        let doomed: Vec<RigidBodyHandle> = self
            .bodies
            .iter()
            .filter(|(handle, body)| {
                !body.is_fixed()
                    && !matches!(self.tags.get(handle), Some(BodyTag::Wall { .. }))
            })
            .map(|(handle, _)| handle)
            .collect();
        for handle in doomed {
            self.remove_body(handle);
        }
        self.accumulator = 0.0;
    }

    pub fn tag(&self, body: RigidBodyHandle) -> Option<&BodyTag> {
        self.tags.get(&body)
    }

    pub fn piece(&self, body: RigidBodyHandle) -> Option<&PieceData> {
        self.tags.get(&body).and_then(BodyTag::as_piece)
    }

    pub fn piece_mut(&mut self, body: RigidBodyHandle) -> Option<&mut PieceData> {
        match self.tags.get_mut(&body) {
            Some(BodyTag::Piece(p)) => Some(p),
            _ => None,
        }
    }

    /// Handles of every piece body, active or settled.
    #[cfg(test)]
    pub fn piece_bodies(&self) -> Vec<RigidBodyHandle> {
        self.tags
            .iter()
            .filter(|(_, tag)| tag.as_piece().is_some())
            .map(|(handle, _)| *handle)
            .collect()
    }

    pub fn pose(&self, body: RigidBodyHandle) -> Option<Isometry<Real>> {
        self.bodies.get(body).map(|b| *b.position())
    }

    /// Teleport a body. Forces and velocities are left alone.
    pub fn set_pose(&mut self, body: RigidBodyHandle, pose: Isometry<Real>) {
        if let Some(b) = self.bodies.get_mut(body) {
            b.set_position(pose, true);
        }
    }

    pub fn linvel(&self, body: RigidBodyHandle) -> Vector<Real> {
        self.bodies
            .get(body)
            .map(|b| *b.linvel())
            .unwrap_or_else(Vector::zeros)
    }

    pub fn set_linvel(&mut self, body: RigidBodyHandle, velocity: Vector<Real>) {
        if let Some(b) = self.bodies.get_mut(body) {
            b.set_linvel(velocity, true);
        }
    }

    pub fn angvel(&self, body: RigidBodyHandle) -> Real {
        self.bodies.get(body).map_or(0.0, |b| b.angvel())
    }

    pub fn set_angvel(&mut self, body: RigidBodyHandle, velocity: Real) {
        if let Some(b) = self.bodies.get_mut(body) {
            b.set_angvel(velocity, true);
        }
    }

    pub fn speed(&self, body: RigidBodyHandle) -> Real {
        self.linvel(body).norm()
    }

    pub fn add_force(&mut self, body: RigidBodyHandle, force: Vector<Real>) {
        if let Some(b) = self.bodies.get_mut(body) {
            b.add_force(force, true);
        }
    }

    /// Every piece block with its pose, for drawing.
    pub fn blocks(&self) -> Vec<BlockView> {
        let mut out = Vec::new();
        for (shape, collider) in self.colliders.iter() {
            let Some(parent) = collider.parent() else {
                continue;
            };
            let Some(tag) = self.tags.get(&parent) else {
                continue;
            };
            if tag.as_piece().is_none() {
                continue;
            }
            let Some(pose) = self.shape_pose(shape) else {
                continue;
            };
            let half_extents = collider
                .shape()
                .as_cuboid()
                .map(|c| c.half_extents)
                .unwrap_or_else(|| vector![self.material.half_extent, self.material.half_extent]);
            out.push(BlockView {
                shape,
                center: pose.translation.vector,
                angle: pose.rotation.angle(),
                half_extents,
                tag: *tag,
            });
        }
        out
    }
}
