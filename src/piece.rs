//! Tetromino definitions and the piece factory: spawning, steering, rotation, hard drop.

use crate::world::{BodyTag, Bounds, PLAY_HEIGHT, PhysicsWorld, PieceData, WallSide};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rapier2d::prelude::*;
use std::f32::consts::FRAC_PI_2;
use std::ops::ControlFlow;
use std::time::Instant;
use tracing::debug;

/// Horizontal speed while a move key is held (units/sec).
const HORIZONTAL_SPEED: f32 = 4.0;
/// Base magnitude of the soft-drop force.
const DOWN_FORCE: f32 = 30.0;
/// Depth of the ground probe beneath each block.
const GROUND_PROBE_DEPTH: f32 = 0.15;
/// Horizontal inset of the ground probe so side walls never register.
const GROUND_PROBE_INSET: f32 = 0.1;
/// Overlap smaller than this is resting contact, not a collision.
const CONTACT_SKIN: f32 = 0.01;
const KICK: f32 = 0.5;
/// Wall-kick offsets tried after an in-place rotation fails. Up is -y.
const KICKS: [(f32, f32); 5] = [(KICK, 0.0), (-KICK, 0.0), (0.0, -KICK), (KICK, -KICK), (-KICK, -KICK)];
const HARD_DROP_STEP: f32 = 0.1;

/// The seven tetrominoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TetrominoKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

/// Four-level palette slot a piece is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shade {
    Lightest,
    Light,
    Dark,
    Darkest,
}

impl Shade {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Self::Lightest => 0,
            Self::Light => 1,
            Self::Dark => 2,
            Self::Darkest => 3,
        }
    }
}

impl TetrominoKind {
    pub const ALL: [Self; 7] = [Self::I, Self::O, Self::T, Self::S, Self::Z, Self::J, Self::L];

    /// 4 cells in shape-local integer coordinates; each (x, y), y down.
    pub fn cells(&self) -> &'static [(i8, i8); 4] {
        match self {
            Self::I => &[(0, 0), (1, 0), (2, 0), (3, 0)],
            Self::O => &[(0, 0), (1, 0), (0, 1), (1, 1)],
            Self::T => &[(1, 0), (0, 1), (1, 1), (2, 1)],
            Self::S => &[(1, 0), (2, 0), (0, 1), (1, 1)],
            Self::Z => &[(0, 0), (1, 0), (1, 1), (2, 1)],
            Self::J => &[(0, 0), (0, 1), (1, 1), (2, 1)],
            Self::L => &[(2, 0), (0, 1), (1, 1), (2, 1)],
        }
    }

    pub fn shade(&self) -> Shade {
        match self {
            Self::I => Shade::Lightest,
            Self::O => Shade::Light,
            Self::S | Self::Z => Shade::Dark,
            Self::T | Self::J | Self::L => Shade::Darkest,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::I => "I",
            Self::O => "O",
            Self::T => "T",
            Self::S => "S",
            Self::Z => "Z",
            Self::J => "J",
            Self::L => "L",
        }
    }

    /// Block offsets from the body origin: cell centres minus the cells' centroid.
    pub fn block_offsets(&self) -> [Vector<Real>; 4] {
        let cells = self.cells();
        let (sx, sy) = cells
            .iter()
            .fold((0.0, 0.0), |(x, y), &(cx, cy)| (x + f32::from(cx), y + f32::from(cy)));
        let (mx, my) = (sx / 4.0, sy / 4.0);
        cells.map(|(cx, cy)| vector![f32::from(cx) - mx, f32::from(cy) - my])
    }
}

/// Which way the player is steering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    fn sign(self) -> f32 {
        match self {
            Self::Left => -1.0,
            Self::Right => 1.0,
        }
    }
}

/// Spawns tetromino bodies. Owns the piece RNG.
pub struct PieceFactory {
    rng: StdRng,
}

impl PieceFactory {
    /// Seeded for reproducible sequences; `None` draws from OS entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Uniform over the seven kinds.
    pub fn random_kind(&mut self) -> TetrominoKind {
        TetrominoKind::ALL[self.rng.gen_range(0..TetrominoKind::ALL.len())]
    }

    pub fn create_piece(
        &self,
        world: &mut PhysicsWorld,
        kind: TetrominoKind,
        x: f32,
        y: f32,
        active: bool,
        now: Instant,
    ) -> RigidBodyHandle {
        let body = world.spawn_piece_body(vector![x, y], 0.0, PieceData::new(kind, active, now));
        for offset in kind.block_offsets() {
            world.attach_block(body, offset);
        }
        debug!(kind = kind.name(), x, y, active, "piece spawned");
        body
    }
}

pub fn settle_piece(world: &mut PhysicsWorld, body: RigidBodyHandle) {
    if let Some(piece) = world.piece_mut(body) {
        if piece.is_active() {
            let age_ms = piece.spawned_at.elapsed().as_millis();
            debug!(kind = piece.kind.name(), age_ms, "piece settled");
        }
        piece.settle();
    }
}

pub fn apply_horizontal_velocity(world: &mut PhysicsWorld, body: RigidBodyHandle, direction: Direction) {
    let v = world.linvel(body);
    world.set_linvel(body, vector![HORIZONTAL_SPEED * direction.sign(), v.y]);
}

pub fn stop_horizontal_movement(world: &mut PhysicsWorld, body: RigidBodyHandle) {
    let v = world.linvel(body);
    world.set_linvel(body, vector![0.0, v.y]);
}

pub fn apply_downward_force(world: &mut PhysicsWorld, body: RigidBodyHandle, multiplier: f32) {
    world.add_force(body, vector![0.0, DOWN_FORCE * multiplier]);
}

/// Pin the vertical speed, keeping the horizontal component.
pub fn set_fall_speed(world: &mut PhysicsWorld, body: RigidBodyHandle, speed: f32) {
    let v = world.linvel(body);
    world.set_linvel(body, vector![v.x, speed]);
}

/// Floor or a settled piece directly beneath any block. Side walls never count.
pub fn is_touching_ground(world: &PhysicsWorld, body: RigidBodyHandle) -> bool {
    for shape in world.body_shapes(body) {
        let Some(b) = world.shape_bounds(shape) else {
            continue;
        };
        let probe = Bounds::new(
            vector![b.min.x + GROUND_PROBE_INSET, b.max.y],
            vector![b.max.x - GROUND_PROBE_INSET, b.max.y + GROUND_PROBE_DEPTH],
        );
        let mut grounded = false;
        world.query_aabb(&probe, |other| {
            if other.body == body {
                return ControlFlow::Continue(());
            }
            grounded = match world.tag(other.body) {
                Some(BodyTag::Wall { side: WallSide::Floor }) => true,
                Some(tag) => tag.is_settled_piece(),
                None => false,
            };
            if grounded {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        if grounded {
            return true;
        }
    }
    false
}

/// Would `body` fit at `position` (and `angle`, if given)? The pose is restored exactly.
pub fn is_valid_position(
    world: &mut PhysicsWorld,
    body: RigidBodyHandle,
    position: Vector<Real>,
    angle: Option<Real>,
) -> bool {
    let Some(original) = world.pose(body) else {
        return false;
    };
    let rotation = angle.map_or(original.rotation, Rotation::new);
    world.set_pose(body, Isometry::from_parts(position.into(), rotation));
    let valid = !overlaps_anything(world, body);
    world.set_pose(body, original);
    valid
}

fn overlaps_anything(world: &PhysicsWorld, body: RigidBodyHandle) -> bool {
    world.body_shapes(body).into_iter().any(|shape| {
        let Some(bounds) = world.shape_bounds(shape) else {
            return false;
        };
        let mut hit = false;
        world.query_aabb(&bounds.shrunk(CONTACT_SKIN), |other| {
            if other.body == body || world.tag(other.body).is_none() {
                return ControlFlow::Continue(());
            }
            let touches = world
                .shape_bounds(other.shape)
                .is_some_and(|o| o.shrunk(CONTACT_SKIN).overlaps(&bounds.shrunk(CONTACT_SKIN)));
            if touches {
                hit = true;
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        hit
    })
}

/// Quarter-turn with wall kicks. On failure the body is left untouched.
pub fn rotate_piece(world: &mut PhysicsWorld, body: RigidBodyHandle, clockwise: bool) -> bool {
    let Some(pose) = world.pose(body) else {
        return false;
    };
    let turn = if clockwise { FRAC_PI_2 } else { -FRAC_PI_2 };
    let target = ((pose.rotation.angle() + turn) / FRAC_PI_2).round() * FRAC_PI_2;
    let here = pose.translation.vector;

    let candidates = std::iter::once((0.0, 0.0)).chain(KICKS);
    for (kx, ky) in candidates {
        let at = here + vector![kx, ky];
        if is_valid_position(world, body, at, Some(target)) {
            world.set_pose(body, Isometry::new(at, target));
            world.set_angvel(body, 0.0);
            return true;
        }
    }
    false
}

/// Drop straight down to the lowest free spot, then settle.
pub fn hard_drop_piece(world: &mut PhysicsWorld, body: RigidBodyHandle) {
    let Some(pose) = world.pose(body) else {
        return;
    };
    let start = pose.translation.vector;
    let steps = (PLAY_HEIGHT as f32 / HARD_DROP_STEP) as usize;
    let mut drop = 0.0;
    for i in 1..steps {
        let dy = i as f32 * HARD_DROP_STEP;
        if !is_valid_position(world, body, start + vector![0.0, dy], None) {
            break;
        }
        drop = dy;
    }
    if drop > 0.0 {
        world.set_pose(body, Isometry::from_parts((start + vector![0.0, drop]).into(), pose.rotation));
    }
    settle_piece(world, body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{BlockMaterial, FIXED_STEP, PLAY_WIDTH};

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(8.0, BlockMaterial::default())
    }

    #[test]
    fn offsets_are_centred_on_the_cells_centroid() {
        for kind in TetrominoKind::ALL {
            let sum = kind
                .block_offsets()
                .iter()
                .fold(Vector::zeros(), |acc: Vector<Real>, o| acc + o);
            assert!(sum.norm() < 1e-5, "{:?}", kind);
        }
        let i = TetrominoKind::I.block_offsets();
        assert_eq!(i[0], vector![-1.5, 0.0]);
        assert_eq!(i[3], vector![1.5, 0.0]);
    }

    #[test]
    fn create_piece_attaches_four_blocks() {
        let mut w = world();
        let f = PieceFactory::new(Some(1));
        let body = f.create_piece(&mut w, TetrominoKind::T, 5.0, 1.0, true, Instant::now());
        assert_eq!(w.body_shapes(body).len(), 4);
        let data = w.piece(body).unwrap();
        assert!(data.is_active());
        assert_eq!(data.kind, TetrominoKind::T);
        assert_eq!(data.shade, Shade::Darkest);
    }

    #[test]
    fn seeded_factories_agree() {
        let mut a = PieceFactory::new(Some(42));
        let mut b = PieceFactory::new(Some(42));
        let xs: Vec<_> = (0..20).map(|_| a.random_kind()).collect();
        let ys: Vec<_> = (0..20).map(|_| b.random_kind()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn hard_drop_lands_on_floor_and_settles() {
        let mut w = world();
        let f = PieceFactory::new(Some(1));
        let body = f.create_piece(&mut w, TetrominoKind::I, 2.0, 1.0, true, Instant::now());
        hard_drop_piece(&mut w, body);
        let y = w.pose(body).unwrap().translation.y;
        assert!((y - 17.5).abs() < 0.06, "landed at {y}");
        assert!(!w.piece(body).unwrap().is_active());
    }

    #[test]
    fn hard_drop_stacks_on_settled_piece() {
        let mut w = world();
        let f = PieceFactory::new(Some(1));
        let floor = f.create_piece(&mut w, TetrominoKind::I, 2.0, 1.0, true, Instant::now());
        hard_drop_piece(&mut w, floor);
        let top = f.create_piece(&mut w, TetrominoKind::I, 2.0, 1.0, true, Instant::now());
        hard_drop_piece(&mut w, top);
        // Faces meet within the contact skin, one block height above the floor row.
        let y = w.pose(top).unwrap().translation.y;
        assert!((y - 16.6).abs() < 0.06, "landed at {y}");
    }

    #[test]
    fn touching_ground_needs_floor_below() {
        let mut w = world();
        let f = PieceFactory::new(Some(1));
        let body = f.create_piece(&mut w, TetrominoKind::I, 2.0, 8.0, true, Instant::now());
        assert!(!is_touching_ground(&w, body));
        hard_drop_piece(&mut w, body);
        assert!(is_touching_ground(&w, body));
    }

    #[test]
    fn side_walls_never_count_as_ground() {
        let mut w = world();
        let f = PieceFactory::new(Some(1));
        let now = Instant::now();
        let max_x = PLAY_WIDTH as f32 - 0.45;
        for x in [0.45, max_x] {
            let body = f.create_piece(&mut w, TetrominoKind::I, 5.0, 8.0, true, now);
            w.set_pose(body, Isometry::new(vector![x, 8.0], FRAC_PI_2));
            let shapes = w.body_shapes(body);
            let flush = shapes.iter().filter_map(|&s| w.shape_bounds(s)).all(|b| {
                if x < 1.0 {
                    b.min.x.abs() < 1e-4
                } else {
                    (b.max.x - PLAY_WIDTH as f32).abs() < 1e-4
                }
            });
            assert!(flush, "I at x={x} should sit flush against the wall");
            assert!(!is_touching_ground(&w, body), "wall at x={x} counted as ground");
            w.remove_body(body);
        }
    }

    #[test]
    fn active_piece_below_does_not_count_as_ground() {
        let mut w = world();
        let f = PieceFactory::new(Some(1));
        let _below = f.create_piece(&mut w, TetrominoKind::I, 2.0, 10.0, true, Instant::now());
        let above = f.create_piece(&mut w, TetrominoKind::I, 2.0, 9.0, true, Instant::now());
        assert!(!is_touching_ground(&w, above));
    }

    #[test]
    fn failed_rotation_leaves_pose_bit_identical() {
        let mut w = world();
        let f = PieceFactory::new(Some(1));
        // Every column but column 2 is full: a vertical I there has nowhere to turn.
        for col in (0..PLAY_WIDTH).filter(|&c| c != 2) {
            for row in 0..PLAY_HEIGHT {
                let b = w.spawn_piece_body(
                    vector![col as f32 + 0.5, row as f32 + 0.5],
                    0.0,
                    PieceData::new(TetrominoKind::O, false, Instant::now()),
                );
                w.attach_block(b, Vector::zeros());
            }
        }
        let body = f.create_piece(&mut w, TetrominoKind::I, 2.5, 9.0, true, Instant::now());
        w.set_pose(body, Isometry::new(vector![2.5, 9.0], FRAC_PI_2));
        w.set_angvel(body, 0.25);
        let before = w.pose(body).unwrap();
        assert!(!rotate_piece(&mut w, body, true));
        assert!(!rotate_piece(&mut w, body, false));
        assert_eq!(w.pose(body).unwrap(), before);
        assert_eq!(w.angvel(body), 0.25);
    }

    #[test]
    fn rotation_snaps_to_quarter_turns() {
        let mut w = world();
        let f = PieceFactory::new(Some(1));
        let body = f.create_piece(&mut w, TetrominoKind::T, 5.0, 6.0, true, Instant::now());
        let pose = w.pose(body).unwrap();
        w.set_pose(body, Isometry::new(pose.translation.vector, 0.1));
        assert!(rotate_piece(&mut w, body, true));
        let angle = w.pose(body).unwrap().rotation.angle();
        assert!((angle - FRAC_PI_2).abs() < 1e-5);
        assert_eq!(w.angvel(body), 0.0);
    }

    #[test]
    fn rotation_kicks_away_from_wall() {
        let mut w = world();
        let f = PieceFactory::new(Some(1));
        // Vertical I beside the left wall: lying flat in place pokes through it.
        let body = f.create_piece(&mut w, TetrominoKind::I, 1.5, 6.0, true, Instant::now());
        w.set_pose(body, Isometry::new(vector![1.5, 6.0], FRAC_PI_2));
        assert!(rotate_piece(&mut w, body, true));
        let pose = w.pose(body).unwrap();
        assert!((pose.translation.x - 2.0).abs() < 1e-5);
        assert!((pose.translation.y - 6.0).abs() < 1e-5);
    }

    #[test]
    fn steering_touches_only_one_axis() {
        let mut w = world();
        let f = PieceFactory::new(Some(1));
        let body = f.create_piece(&mut w, TetrominoKind::O, 5.0, 3.0, true, Instant::now());
        set_fall_speed(&mut w, body, 1.0);
        apply_horizontal_velocity(&mut w, body, Direction::Left);
        assert_eq!(w.linvel(body), vector![-4.0, 1.0]);
        stop_horizontal_movement(&mut w, body);
        assert_eq!(w.linvel(body), vector![0.0, 1.0]);
    }

    #[test]
    fn soft_drop_force_accelerates_and_is_cleared() {
        let mut w = world();
        let f = PieceFactory::new(Some(1));
        let fast = f.create_piece(&mut w, TetrominoKind::O, 2.0, 3.0, true, Instant::now());
        let slow = f.create_piece(&mut w, TetrominoKind::O, 7.0, 3.0, true, Instant::now());
        apply_downward_force(&mut w, fast, 2.0);
        w.step(FIXED_STEP);
        assert!(w.linvel(fast).y > w.linvel(slow).y);
        let gap = w.linvel(fast).y - w.linvel(slow).y;
        w.step(FIXED_STEP);
        let later = w.linvel(fast).y - w.linvel(slow).y;
        assert!((later - gap).abs() < 0.05);
    }
}
