//! Game state: mode, active piece, per-tick order of operations, score.

use crate::GameConfig;
use crate::lines::{Blink, LineDetector};
use crate::piece::{self, Direction, PieceFactory, TetrominoKind};
use crate::scoring::{ClearOutcome, Scoreboard};
use crate::sound::{Cue, CueQueue};
use crate::world::{PLAY_WIDTH, PhysicsWorld};
use rapier2d::prelude::RigidBodyHandle;
use std::time::Instant;
use tracing::info;

/// Where new pieces appear (body origin).
const SPAWN_X: f32 = PLAY_WIDTH as f32 / 2.0;
const SPAWN_Y: f32 = 1.0;

/// Seconds a piece must rest on the ground before it settles.
const SETTLE_DELAY: f32 = 0.0;
/// Falling pieces with less vertical speed than this count as resting.
const SETTLE_VERTICAL_SPEED: f32 = 0.2;

const SOFT_DROP_MULTIPLIER: f32 = 2.0;
const MAX_FALL_SPEED: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
    Menu,
    Playing,
    Paused,
    GameOver,
}

/// What happened during one `update`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickEvents {
    pub settled: bool,
    pub cleared: Option<ClearOutcome>,
    pub game_over: bool,
    /// Set with `game_over` when the final score beat the stored best.
    pub new_record: bool,
}

/// Slow-fall speed for a level when soft drop is not held.
pub fn fall_speed(level: u32) -> f32 {
    (1.0 + level.saturating_sub(1) as f32).min(MAX_FALL_SPEED)
}

pub struct GameState {
    world: PhysicsWorld,
    factory: PieceFactory,
    detector: LineDetector,
    cues: CueQueue,
    board: Scoreboard,
    high_score: u32,
    mode: GameMode,
    active: Option<RigidBodyHandle>,
    next_kind: TetrominoKind,
    animate_clears: bool,
}

impl GameState {
    pub fn new(config: &GameConfig, high_score: u32) -> Self {
        let mut factory = PieceFactory::new(config.seed);
        let next_kind = factory.random_kind();
        Self {
            world: PhysicsWorld::new(config.gravity, config.material),
            factory,
            detector: LineDetector::new(),
            cues: CueQueue::new(config.sound),
            board: Scoreboard::new(config.initial_level),
            high_score,
            mode: GameMode::Menu,
            active: None,
            next_kind,
            animate_clears: config.animation,
        }
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn board(&self) -> &Scoreboard {
        &self.board
    }

    pub fn high_score(&self) -> u32 {
        self.high_score
    }

    pub fn next_kind(&self) -> TetrominoKind {
        self.next_kind
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    #[cfg(test)]
    pub fn active_piece(&self) -> Option<RigidBodyHandle> {
        self.active
    }

    pub fn blinking(&self, now: Instant) -> Option<Blink> {
        self.detector.blinking(now)
    }

    pub fn sound_enabled(&self) -> bool {
        self.cues.is_enabled()
    }

    pub fn toggle_sound(&mut self) -> bool {
        self.cues.toggle()
    }

    /// Cues whose time has come; the shell plays them.
    pub fn drain_cues(&mut self, now: Instant) -> Vec<Cue> {
        self.cues.drain_due(now)
    }

    pub fn start(&mut self, now: Instant) {
        if self.mode != GameMode::Menu {
            return;
        }
        info!(level = self.board.level, "game started");
        self.mode = GameMode::Playing;
        self.spawn_next_piece(now);
    }

    /// Clear the arena and return to the menu.
    pub fn reset(&mut self) {
        self.world.clear_dynamic_bodies();
        self.detector = LineDetector::new();
        self.cues.clear();
        self.board.reset();
        self.active = None;
        self.next_kind = self.factory.random_kind();
        self.mode = GameMode::Menu;
    }

    pub fn toggle_pause(&mut self) {
        self.mode = match self.mode {
            GameMode::Playing => GameMode::Paused,
            GameMode::Paused => GameMode::Playing,
            other => other,
        };
    }

    fn spawn_next_piece(&mut self, now: Instant) {
        let body = self
            .factory
            .create_piece(&mut self.world, self.next_kind, SPAWN_X, SPAWN_Y, true, now);
        self.active = Some(body);
        self.next_kind = self.factory.random_kind();
    }

    /// The active piece, if it is still player-controlled and play is running.
    fn controllable(&self) -> Option<RigidBodyHandle> {
        if self.mode != GameMode::Playing {
            return None;
        }
        let body = self.active?;
        self.world.piece(body).filter(|p| p.is_active()).map(|_| body)
    }

    /// Per-frame steering of the active piece.
    pub fn steer(&mut self, horizontal: Option<Direction>, soft_drop: bool) {
        let Some(body) = self.controllable() else {
            return;
        };
        match horizontal {
            Some(dir) => piece::apply_horizontal_velocity(&mut self.world, body, dir),
            None => piece::stop_horizontal_movement(&mut self.world, body),
        }
        if soft_drop {
            piece::apply_downward_force(&mut self.world, body, SOFT_DROP_MULTIPLIER);
        } else {
            piece::set_fall_speed(&mut self.world, body, fall_speed(self.board.level));
        }
    }

    pub fn rotate(&mut self, clockwise: bool, now: Instant) -> bool {
        let Some(body) = self.controllable() else {
            return false;
        };
        if !piece::rotate_piece(&mut self.world, body, clockwise) {
            return false;
        }
        if let Some(p) = self.world.piece_mut(body) {
            p.settle_timer = 0.0;
        }
        self.cues.play(Cue::Rotate, now);
        true
    }

    /// Drop and settle the active piece, then spawn the next one straight away.
    pub fn hard_drop(&mut self, now: Instant) -> bool {
        let Some(body) = self.controllable() else {
            return false;
        };
        piece::hard_drop_piece(&mut self.world, body);
        self.cues.play(Cue::Touch, now);
        self.spawn_next_piece(now);
        true
    }

    /// One frame: physics, settle check, spawn, clear animation, detection, game over.
    pub fn update(&mut self, dt: f32, now: Instant) -> TickEvents {
        let mut events = TickEvents::default();
        if self.mode != GameMode::Playing {
            return events;
        }

        self.world.step(dt);

        if let Some(body) = self.active {
            events.settled = self.update_active_piece(body, dt, now);
        }
        if self.active.is_none() {
            self.spawn_next_piece(now);
        }

        events.cleared =
            self.detector
                .update_animation(&mut self.world, now, &mut self.board, &mut self.cues);

        if !self.detector.is_animating() {
            let rows = self.detector.detect_completed_lines(&self.world);
            if self.detector.clear_lines(&rows, now, &mut self.cues) && !self.animate_clears {
                events.cleared =
                    self.detector
                        .finish_clear(&mut self.world, now, &mut self.board, &mut self.cues);
            }
        }

        if !self.detector.is_animating() && self.detector.is_game_over(&self.world) {
            self.mode = GameMode::GameOver;
            self.cues.play(Cue::GameOver, now);
            events.game_over = true;
            if self.board.score > self.high_score {
                self.high_score = self.board.score;
                events.new_record = true;
            }
            info!(
                score = self.board.score,
                lines = self.board.lines,
                level = self.board.level,
                new_record = events.new_record,
                "game over"
            );
        }
        events
    }

    /// Settle the active piece once it has rested on the ground long enough.
    fn update_active_piece(&mut self, body: RigidBodyHandle, dt: f32, now: Instant) -> bool {
        if !self.world.piece(body).is_some_and(|p| p.is_active()) {
            self.active = None;
            return false;
        }
        let resting = self.world.linvel(body).y.abs() < SETTLE_VERTICAL_SPEED
            && piece::is_touching_ground(&self.world, body);
        let Some(data) = self.world.piece_mut(body) else {
            return false;
        };
        if !resting {
            data.settle_timer = 0.0;
            return false;
        }
        data.settle_timer += dt;
        if data.settle_timer < SETTLE_DELAY {
            return false;
        }
        piece::settle_piece(&mut self.world, body);
        self.active = None;
        self.cues.play(Cue::Touch, now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::BLINK_DURATION;
    use crate::world::FIXED_STEP;
    use std::time::Duration;

    fn config() -> GameConfig {
        GameConfig {
            seed: Some(3),
            ..GameConfig::default()
        }
    }

    #[test]
    fn fall_speed_rises_with_level_and_caps() {
        assert_eq!(fall_speed(1), 1.0);
        assert_eq!(fall_speed(3), 3.0);
        assert_eq!(fall_speed(20), 8.0);
        assert_eq!(fall_speed(0), 1.0);
    }

    #[test]
    fn start_spawns_one_active_piece() {
        let mut g = GameState::new(&config(), 0);
        let next = g.next_kind();
        assert_eq!(g.mode(), GameMode::Menu);
        g.start(Instant::now());
        assert_eq!(g.mode(), GameMode::Playing);
        let body = g.active_piece().unwrap();
        assert_eq!(g.world().piece(body).unwrap().kind, next);
        let actives = g
            .world()
            .piece_bodies()
            .into_iter()
            .filter(|&b| g.world().piece(b).unwrap().is_active())
            .count();
        assert_eq!(actives, 1);
    }

    #[test]
    fn paused_game_does_not_advance() {
        let mut g = GameState::new(&config(), 0);
        let now = Instant::now();
        g.start(now);
        let body = g.active_piece().unwrap();
        let before = g.world().pose(body).unwrap();
        g.toggle_pause();
        assert_eq!(g.mode(), GameMode::Paused);
        g.update(0.1, now);
        assert_eq!(g.world().pose(body).unwrap(), before);
        assert!(!g.rotate(true, now));
        g.toggle_pause();
        assert_eq!(g.mode(), GameMode::Playing);
    }

    #[test]
    fn hard_drop_spawns_next_piece_immediately() {
        let mut g = GameState::new(&config(), 0);
        let now = Instant::now();
        g.start(now);
        let first = g.active_piece().unwrap();
        assert!(g.hard_drop(now));
        let second = g.active_piece().unwrap();
        assert_ne!(first, second);
        assert!(!g.world().piece(first).unwrap().is_active());
        assert_eq!(g.drain_cues(now), vec![Cue::Touch]);
    }

    #[test]
    fn falling_piece_settles_and_next_spawns() {
        let mut g = GameState::new(&config(), 0);
        let mut now = Instant::now();
        g.start(now);
        let first = g.active_piece().unwrap();
        let mut settled = false;
        for _ in 0..3000 {
            g.steer(None, false);
            now += Duration::from_secs_f32(FIXED_STEP);
            if g.update(FIXED_STEP, now).settled {
                settled = true;
                break;
            }
        }
        assert!(settled);
        assert!(!g.world().piece(first).unwrap().is_active());
        assert_ne!(g.active_piece(), Some(first));
        assert!(g.drain_cues(now).contains(&Cue::Touch));
    }

    #[test]
    fn hard_dropped_bottom_row_clears_once_and_scores() {
        let mut g = GameState::new(&config(), 0);
        let now = Instant::now();
        for (kind, x) in [
            (TetrominoKind::I, 2.0),
            (TetrominoKind::I, 6.0),
            (TetrominoKind::O, 9.0),
        ] {
            let body = g.factory.create_piece(&mut g.world, kind, x, 1.0, true, now);
            piece::hard_drop_piece(&mut g.world, body);
        }
        g.start(now);

        g.update(0.0, now);
        assert!(g.detector.is_animating());
        assert_eq!(g.detector.pending().map(|p| p.rows()), Some(1));

        let mid = g.update(0.0, now + BLINK_DURATION / 2);
        assert!(mid.cleared.is_none());
        assert_eq!(g.board().score, 0);

        let done = g.update(0.0, now + BLINK_DURATION);
        assert_eq!(done.cleared.map(|c| c.points), Some(40));
        assert_eq!(g.board().score, 40);
        assert_eq!(g.board().lines, 1);
        assert!(!g.detector.is_animating());

        // Only the O piece's upper half and the falling piece remain.
        let after = g.update(0.0, now + BLINK_DURATION * 2);
        assert!(after.cleared.is_none());
        assert_eq!(g.board().score, 40);
        assert_eq!(g.world().blocks().len(), 2 + 4);
    }

    #[test]
    fn hard_dropped_row_clears_while_physics_runs() {
        let mut g = GameState::new(&config(), 0);
        let start = Instant::now();
        for (kind, x) in [
            (TetrominoKind::I, 2.0),
            (TetrominoKind::I, 6.0),
            (TetrominoKind::O, 9.0),
        ] {
            let body = g.factory.create_piece(&mut g.world, kind, x, 1.0, true, start);
            piece::hard_drop_piece(&mut g.world, body);
        }
        g.start(start);

        let mut now = start;
        let mut blink_started = None;
        let mut cleared = Vec::new();
        for _ in 0..60 {
            now += Duration::from_secs_f32(FIXED_STEP);
            let ev = g.update(FIXED_STEP, now);
            assert!(!ev.game_over);
            if blink_started.is_none() && g.detector.is_animating() {
                blink_started = Some(now);
            }
            if let Some(outcome) = ev.cleared {
                cleared.push((now, outcome));
            }
        }

        let blink_started = blink_started.expect("row was never detected");
        assert_eq!(cleared.len(), 1);
        let (done_at, outcome) = cleared[0];
        assert!(done_at.duration_since(blink_started) >= BLINK_DURATION);
        assert_eq!(outcome.rows, 1);
        assert_eq!(outcome.points, 40);
        assert_eq!(g.board().score, 40);
        assert_eq!(g.board().lines, 1);
    }

    #[test]
    fn clears_finish_at_once_without_animation() {
        let mut g = GameState::new(
            &GameConfig {
                animation: false,
                ..config()
            },
            0,
        );
        let now = Instant::now();
        for (kind, x) in [
            (TetrominoKind::I, 2.0),
            (TetrominoKind::I, 6.0),
            (TetrominoKind::O, 9.0),
        ] {
            let body = g.factory.create_piece(&mut g.world, kind, x, 1.0, true, now);
            piece::hard_drop_piece(&mut g.world, body);
        }
        g.start(now);
        let ev = g.update(0.0, now);
        assert_eq!(ev.cleared.map(|c| c.rows), Some(1));
        assert!(!g.detector.is_animating());
    }

    #[test]
    fn stack_reaching_the_top_ends_the_game() {
        let mut g = GameState::new(&config(), 10);
        let now = Instant::now();
        g.start(now);
        g.board.score = 25;
        let body = g
            .factory
            .create_piece(&mut g.world, TetrominoKind::I, 2.0, 0.5, false, now);
        assert!(g.world().piece(body).is_some());
        let ev = g.update(0.0, now);
        assert!(ev.game_over);
        assert!(ev.new_record);
        assert_eq!(g.mode(), GameMode::GameOver);
        assert_eq!(g.high_score(), 25);
        assert!(g.drain_cues(now).contains(&Cue::GameOver));
    }

    #[test]
    fn reset_clears_board_and_returns_to_menu() {
        let mut g = GameState::new(&config(), 0);
        let now = Instant::now();
        g.start(now);
        g.hard_drop(now);
        g.reset();
        assert_eq!(g.mode(), GameMode::Menu);
        assert!(g.world().piece_bodies().is_empty());
        assert!(g.active_piece().is_none());
        assert_eq!(g.board().score, 0);
    }
}
