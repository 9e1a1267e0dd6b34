//! Line detection over settled rigid bodies, the blink-then-destroy clear sequence,
//! and splitting bodies that fall apart once their cleared blocks are gone.
//!
//! There is no cell grid. A row is complete when a horizontal slab of the arena holds
//! at least `MIN_BLOCKS_FOR_LINE` resting blocks whose centres sit within `ROW_TOLERANCE`
//! of each other vertically and land in `PLAY_WIDTH` distinct columns.

use crate::components::connected_components;
use crate::scoring::{ClearOutcome, Scoreboard};
use crate::sound::{Cue, CueQueue};
use crate::world::{
    Bounds, PLAY_HEIGHT, PLAY_WIDTH, PhysicsWorld, SETTLE_VELOCITY_THRESHOLD, ShapeRef,
};
use rapier2d::prelude::*;
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const MIN_BLOCKS_FOR_LINE: usize = 10;
/// Largest vertical gap between consecutive block centres of one row.
pub const ROW_TOLERANCE: f32 = 0.3;
const SLICE_HEIGHT: f32 = 0.8;
const SCAN_STEP: f32 = 0.5;

pub const BLINK_DURATION: Duration = Duration::from_millis(500);
const BLINK_RATE_MS: u128 = 80;

/// Rows probed from the top when checking for game over.
const GAME_OVER_ROWS: usize = 2;
const GAME_OVER_SLICE_HEIGHT: f32 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedRow {
    /// Mean centre height of the row's blocks.
    pub y: f32,
    pub shapes: Vec<ShapeRef>,
}

/// A clear in progress: blocks blink, then get destroyed.
#[derive(Debug, Clone)]
pub struct PendingClear {
    shapes: Vec<ShapeRef>,
    started_at: Instant,
    rows: u32,
}

impl PendingClear {
    #[cfg(test)]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }
}

/// Blocks to blink this frame and whether they are in the visible phase.
#[derive(Debug, Clone)]
pub struct Blink {
    pub shapes: HashSet<ColliderHandle>,
    pub visible: bool,
}

/// Group centres whose sorted heights are chained by gaps of at most `ROW_TOLERANCE`.
/// Returns indices into `centres`, each group ordered top to bottom.
pub fn cluster_rows(centres: &[Vector<Real>]) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..centres.len()).collect();
    order.sort_by(|&a, &b| centres[a].y.total_cmp(&centres[b].y));

    let mut clusters: Vec<Vec<usize>> = Vec::new();
    let mut prev_y = f32::NEG_INFINITY;
    for i in order {
        let y = centres[i].y;
        match clusters.last_mut() {
            Some(current) if y - prev_y <= ROW_TOLERANCE => current.push(i),
            _ => clusters.push(vec![i]),
        }
        prev_y = y;
    }
    clusters
}

/// Distinct arena columns hit by the given centres. Centres outside the arena don't count.
pub fn covered_columns<'a>(centres: impl IntoIterator<Item = &'a Vector<Real>>) -> usize {
    let mut seen = [false; PLAY_WIDTH];
    for c in centres {
        let col = c.x.floor();
        if col >= 0.0 && col < PLAY_WIDTH as f32 {
            seen[col as usize] = true;
        }
    }
    seen.iter().filter(|&&s| s).count()
}

/// Detects completed rows and runs the clear animation. `Idle` while `pending` is `None`.
#[derive(Debug, Default)]
pub struct LineDetector {
    pending: Option<PendingClear>,
}

impl LineDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_animating(&self) -> bool {
        self.pending.is_some()
    }

    #[cfg(test)]
    pub fn pending(&self) -> Option<&PendingClear> {
        self.pending.as_ref()
    }

    /// Scan slabs bottom to top for complete rows of resting, settled blocks.
    /// A block joins at most one row.
    pub fn detect_completed_lines(&self, world: &PhysicsWorld) -> Vec<CompletedRow> {
        let mut completed = Vec::new();
        let mut taken: HashSet<ColliderHandle> = HashSet::new();

        for i in 0..PLAY_HEIGHT * 2 {
            let center = PLAY_HEIGHT as f32 - 0.5 - i as f32 * SCAN_STEP;
            let mut shapes: Vec<ShapeRef> = Vec::new();
            world.query_aabb(&Bounds::slab(center, SLICE_HEIGHT), |s| {
                if !taken.contains(&s.shape) && is_resting_settled(world, s.body) {
                    shapes.push(s);
                }
                ControlFlow::Continue(())
            });
            if shapes.len() < MIN_BLOCKS_FOR_LINE {
                continue;
            }

            let (shapes, centres): (Vec<ShapeRef>, Vec<Vector<Real>>) = shapes
                .into_iter()
                .filter_map(|s| world.shape_centroid(s).map(|c| (s, c)))
                .unzip();

            for cluster in cluster_rows(&centres) {
                if cluster.len() < MIN_BLOCKS_FOR_LINE {
                    continue;
                }
                if covered_columns(cluster.iter().map(|&i| &centres[i])) < MIN_BLOCKS_FOR_LINE {
                    continue;
                }
                let y = cluster.iter().map(|&i| centres[i].y).sum::<f32>() / cluster.len() as f32;
                let row: Vec<ShapeRef> = cluster.iter().map(|&i| shapes[i]).collect();
                taken.extend(row.iter().map(|s| s.shape));
                debug!(y, blocks = row.len(), "completed row");
                completed.push(CompletedRow { y, shapes: row });
            }
        }
        completed
    }

    /// Begin blinking `rows`. Refused (false) while another clear is pending or when empty.
    pub fn clear_lines(&mut self, rows: &[CompletedRow], now: Instant, cues: &mut CueQueue) -> bool {
        if self.pending.is_some() {
            return false;
        }
        let shapes: Vec<ShapeRef> = rows.iter().flat_map(|r| r.shapes.iter().copied()).collect();
        if shapes.is_empty() {
            return false;
        }
        let count = rows.len() as u32;
        cues.play_sequential(Cue::Line, count, now);
        info!(rows = count, blocks = shapes.len(), "clearing rows");
        self.pending = Some(PendingClear {
            shapes,
            started_at: now,
            rows: count,
        });
        true
    }

    pub fn blinking(&self, now: Instant) -> Option<Blink> {
        let pending = self.pending.as_ref()?;
        let phase = pending.elapsed(now).as_millis() / BLINK_RATE_MS;
        Some(Blink {
            shapes: pending.shapes.iter().map(|s| s.shape).collect(),
            visible: phase % 2 == 0,
        })
    }

    /// Finish the pending clear once it has blinked for `BLINK_DURATION`.
    pub fn update_animation(
        &mut self,
        world: &mut PhysicsWorld,
        now: Instant,
        board: &mut Scoreboard,
        cues: &mut CueQueue,
    ) -> Option<ClearOutcome> {
        let done = self.pending.as_ref()?.elapsed(now) >= BLINK_DURATION;
        if done {
            self.finish_clear(world, now, board, cues)
        } else {
            None
        }
    }

    /// Destroy the pending blocks, drop emptied bodies, split broken ones and score.
    pub fn finish_clear(
        &mut self,
        world: &mut PhysicsWorld,
        now: Instant,
        board: &mut Scoreboard,
        cues: &mut CueQueue,
    ) -> Option<ClearOutcome> {
        let pending = self.pending.take()?;

        let mut affected: Vec<RigidBodyHandle> = Vec::new();
        for s in &pending.shapes {
            let Some(owner) = world.remove_shape(s.shape) else {
                continue;
            };
            if !affected.contains(&owner) {
                affected.push(owner);
            }
        }
        for body in affected {
            if !world.contains_body(body) {
                continue;
            }
            if world.body_shapes(body).is_empty() {
                world.remove_body(body);
            } else {
                split_disconnected(world, body, now);
            }
        }

        let outcome = board.apply_clear(pending.rows);
        if outcome.leveled_up {
            cues.play(Cue::LevelUp, now);
        }
        info!(
            rows = outcome.rows,
            points = outcome.points,
            score = board.score,
            "rows cleared"
        );
        Some(outcome)
    }

    /// A settled, resting block sits in one of the top rows.
    pub fn is_game_over(&self, world: &PhysicsWorld) -> bool {
        (0..GAME_OVER_ROWS).any(|row| {
            let mut hit = false;
            world.query_aabb(
                &Bounds::slab(row as f32 + 0.5, GAME_OVER_SLICE_HEIGHT),
                |s| {
                    hit = is_resting_settled(world, s.body);
                    if hit {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                },
            );
            hit
        })
    }
}

fn is_resting_settled(world: &PhysicsWorld, body: RigidBodyHandle) -> bool {
    world.tag(body).is_some_and(|t| t.is_settled_piece())
        && world.speed(body) < SETTLE_VELOCITY_THRESHOLD
}

/// Split `body` into edge-connected pieces. The largest keeps the body; every other
/// component moves to a new settled body at its centroid with the same angle and velocity.
/// Returns the new bodies.
pub fn split_disconnected(
    world: &mut PhysicsWorld,
    body: RigidBodyHandle,
    now: Instant,
) -> Vec<RigidBodyHandle> {
    let shapes = world.body_shapes(body);
    if shapes.len() < 2 {
        return Vec::new();
    }
    let (Some(pose), Some(data)) = (world.pose(body), world.piece(body).copied()) else {
        return Vec::new();
    };
    let locals: Vec<Vector<Real>> = shapes
        .iter()
        .map(|&s| world.shape_local_offset(s).unwrap_or_else(Vector::zeros))
        .collect();
    let components = connected_components(&locals);
    if components.len() < 2 {
        return Vec::new();
    }

    let linvel = world.linvel(body);
    let angvel = world.angvel(body);
    let mut spawned = Vec::new();
    for component in components.iter().skip(1) {
        let centre = component.iter().fold(Vector::zeros(), |acc: Vector<Real>, &i| acc + locals[i])
            / component.len() as f32;
        let at = pose.transform_point(&Point::from(centre)).coords;
        let fragment = world.spawn_piece_body(at, pose.rotation.angle(), data.fragment(now));
        for &i in component {
            world.remove_shape(shapes[i]);
            world.attach_block(fragment, locals[i] - centre);
        }
        world.set_linvel(fragment, linvel);
        world.set_angvel(fragment, angvel);
        spawned.push(fragment);
    }
    debug!(pieces = components.len(), kind = data.kind.name(), "body split");
    spawned
}
