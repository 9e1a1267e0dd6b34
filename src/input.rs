//! Key bindings (arrows and vim-style) plus held-key and cooldown tracking.

use crate::piece::Direction;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::time::{Duration, Instant};

/// Minimum time between successful rotations.
pub const ROTATION_COOLDOWN: Duration = Duration::from_millis(150);
/// A pressed move key drives the piece for at least this long, even if released sooner.
pub const MOVE_COOLDOWN: Duration = Duration::from_millis(100);
/// Without release events, a key counts as held this long after its last press or repeat.
const HOLD_WINDOW: Duration = Duration::from_millis(150);

/// Action from a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    MoveLeft,
    MoveRight,
    RotateCw,
    RotateCcw,
    SoftDrop,
    HardDrop,
    Pause,
    Confirm,
    Reset,
    Mute,
    Quit,
    None,
}

/// Map key event to game action. Supports both normal (arrows, space) and vim (hjkl, etc.).
pub fn key_to_action(key: KeyEvent) -> Action {
    let KeyEvent { code, modifiers, .. } = key;
    let no_mod = modifiers.is_empty() || modifiers == KeyModifiers::SHIFT;
    match code {
        KeyCode::Char('c') if modifiers == KeyModifiers::CONTROL => Action::Quit,
        _ if !no_mod => Action::None,
        KeyCode::Char('q' | 'Q') => Action::Quit,
        KeyCode::Esc | KeyCode::Char('p' | 'P') => Action::Pause,
        KeyCode::Left | KeyCode::Char('h') => Action::MoveLeft,
        KeyCode::Right | KeyCode::Char('l') => Action::MoveRight,
        KeyCode::Up | KeyCode::Char('k' | 'x') => Action::RotateCw,
        KeyCode::Char('z' | 'u') => Action::RotateCcw,
        KeyCode::Down | KeyCode::Char('j') => Action::SoftDrop,
        KeyCode::Char(' ') => Action::HardDrop,
        KeyCode::Enter => Action::Confirm,
        KeyCode::Char('r' | 'R') => Action::Reset,
        KeyCode::Char('m' | 'M') => Action::Mute,
        _ => Action::None,
    }
}

#[derive(Debug, Clone, Copy)]
struct Hold {
    pressed_at: Instant,
    last_seen: Instant,
    released: bool,
}

/// Which continuous inputs are held, and when the player last rotated.
#[derive(Debug, Clone, Default)]
pub struct Controls {
    left: Option<Hold>,
    right: Option<Hold>,
    down: Option<Hold>,
    last_rotation: Option<Instant>,
    /// Flipped on by the first release event; terminals that never send one fall back to `HOLD_WINDOW`.
    releases_reported: bool,
}

impl Controls {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, action: Action) -> Option<&mut Option<Hold>> {
        match action {
            Action::MoveLeft => Some(&mut self.left),
            Action::MoveRight => Some(&mut self.right),
            Action::SoftDrop => Some(&mut self.down),
            _ => None,
        }
    }

    /// Feed one key event. Returns the action for fresh presses, `Action::None` otherwise.
    pub fn handle(&mut self, key: KeyEvent, now: Instant) -> Action {
        let action = key_to_action(key);
        match key.kind {
            KeyEventKind::Release => {
                self.releases_reported = true;
                if let Some(Some(hold)) = self.slot(action) {
                    hold.released = true;
                }
                Action::None
            }
            KeyEventKind::Repeat => {
                if let Some(Some(hold)) = self.slot(action) {
                    hold.last_seen = now;
                }
                Action::None
            }
            KeyEventKind::Press => {
                if let Some(slot) = self.slot(action) {
                    match slot {
                        Some(hold) if !hold.released => hold.last_seen = now,
                        _ => {
                            *slot = Some(Hold {
                                pressed_at: now,
                                last_seen: now,
                                released: false,
                            });
                        }
                    }
                }
                action
            }
        }
    }

    fn is_held(&self, hold: Option<Hold>, now: Instant) -> bool {
        let Some(h) = hold else {
            return false;
        };
        if now.saturating_duration_since(h.pressed_at) < MOVE_COOLDOWN {
            return true;
        }
        if h.released {
            return false;
        }
        self.releases_reported || now.saturating_duration_since(h.last_seen) < HOLD_WINDOW
    }

    /// Held direction; when both are held the later press wins.
    pub fn horizontal(&self, now: Instant) -> Option<Direction> {
        let left = self.is_held(self.left, now);
        let right = self.is_held(self.right, now);
        match (left, right) {
            (true, false) => Some(Direction::Left),
            (false, true) => Some(Direction::Right),
            (true, true) => {
                let l = self.left.map(|h| h.pressed_at);
                let r = self.right.map(|h| h.pressed_at);
                if r >= l { Some(Direction::Right) } else { Some(Direction::Left) }
            }
            (false, false) => None,
        }
    }

    pub fn soft_drop(&self, now: Instant) -> bool {
        self.is_held(self.down, now)
    }

    pub fn rotation_ready(&self, now: Instant) -> bool {
        self.last_rotation
            .is_none_or(|at| now.saturating_duration_since(at) > ROTATION_COOLDOWN)
    }

    /// Start the rotation cooldown. Call only after a rotation succeeded.
    pub fn note_rotation(&mut self, now: Instant) {
        self.last_rotation = Some(now);
    }

    /// Forget held keys (on pause, reset, game over).
    pub fn release_all(&mut self) {
        self.left = None;
        self.right = None;
        self.down = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, kind: KeyEventKind) -> KeyEvent {
        KeyEvent::new_with_kind(code, KeyModifiers::NONE, kind)
    }

    #[test]
    fn arrows_and_vim_keys_map_alike() {
        let press = |c| key_to_action(key(c, KeyEventKind::Press));
        assert_eq!(press(KeyCode::Left), Action::MoveLeft);
        assert_eq!(press(KeyCode::Char('h')), Action::MoveLeft);
        assert_eq!(press(KeyCode::Up), Action::RotateCw);
        assert_eq!(press(KeyCode::Char('z')), Action::RotateCcw);
        assert_eq!(press(KeyCode::Char(' ')), Action::HardDrop);
        assert_eq!(press(KeyCode::Enter), Action::Confirm);
        assert_eq!(press(KeyCode::Esc), Action::Pause);
        assert_eq!(press(KeyCode::Char('m')), Action::Mute);
        assert_eq!(press(KeyCode::Char('w')), Action::None);
    }

    #[test]
    fn modifiers_block_game_keys_except_ctrl_c() {
        let ctrl = |c| key_to_action(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL));
        assert_eq!(ctrl('c'), Action::Quit);
        assert_eq!(ctrl('h'), Action::None);
    }

    #[test]
    fn tap_moves_for_at_least_the_cooldown() {
        let t0 = Instant::now();
        let mut c = Controls::new();
        c.handle(key(KeyCode::Left, KeyEventKind::Press), t0);
        c.handle(key(KeyCode::Left, KeyEventKind::Release), t0);
        assert_eq!(c.horizontal(t0 + Duration::from_millis(50)), Some(Direction::Left));
        assert_eq!(c.horizontal(t0 + Duration::from_millis(120)), None);
    }

    #[test]
    fn held_key_lasts_until_release_when_reported() {
        let t0 = Instant::now();
        let mut c = Controls::new();
        c.handle(key(KeyCode::Down, KeyEventKind::Release), t0);
        c.handle(key(KeyCode::Down, KeyEventKind::Press), t0);
        assert!(c.soft_drop(t0 + Duration::from_secs(2)));
        c.handle(key(KeyCode::Down, KeyEventKind::Release), t0 + Duration::from_secs(2));
        assert!(!c.soft_drop(t0 + Duration::from_secs(3)));
    }

    #[test]
    fn without_releases_hold_expires_after_window() {
        let t0 = Instant::now();
        let mut c = Controls::new();
        c.handle(key(KeyCode::Right, KeyEventKind::Press), t0);
        let t1 = t0 + Duration::from_millis(120);
        c.handle(key(KeyCode::Right, KeyEventKind::Press), t1);
        assert_eq!(c.horizontal(t1 + Duration::from_millis(100)), Some(Direction::Right));
        assert_eq!(c.horizontal(t1 + Duration::from_millis(200)), None);
    }

    #[test]
    fn later_press_wins_when_both_held() {
        let t0 = Instant::now();
        let mut c = Controls::new();
        c.handle(key(KeyCode::Right, KeyEventKind::Press), t0);
        c.handle(key(KeyCode::Left, KeyEventKind::Press), t0 + Duration::from_millis(10));
        assert_eq!(c.horizontal(t0 + Duration::from_millis(20)), Some(Direction::Left));
    }

    #[test]
    fn rotation_cooldown_gates_only_after_success() {
        let t0 = Instant::now();
        let mut c = Controls::new();
        assert!(c.rotation_ready(t0));
        c.note_rotation(t0);
        assert!(!c.rotation_ready(t0 + Duration::from_millis(100)));
        assert!(c.rotation_ready(t0 + Duration::from_millis(160)));
    }

    #[test]
    fn repeat_events_are_not_fresh_actions() {
        let t0 = Instant::now();
        let mut c = Controls::new();
        assert_eq!(c.handle(key(KeyCode::Up, KeyEventKind::Press), t0), Action::RotateCw);
        assert_eq!(c.handle(key(KeyCode::Up, KeyEventKind::Repeat), t0), Action::None);
    }
}
