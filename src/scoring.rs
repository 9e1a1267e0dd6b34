//! Score, level and line counters.

use tracing::info;

pub const LINES_PER_LEVEL: u32 = 10;

const SINGLE: u32 = 40;
const DOUBLE: u32 = 100;
const TRIPLE: u32 = 300;
const TETRIS: u32 = 1200;

/// Base points for clearing `rows` rows at once, before the level multiplier.
pub fn line_clear_points(rows: u32) -> u32 {
    match rows {
        0 => 0,
        1 => SINGLE,
        2 => DOUBLE,
        3 => TRIPLE,
        4 => TETRIS,
        n => n.saturating_mul(SINGLE),
    }
}

/// Result of one finished clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearOutcome {
    pub rows: u32,
    pub points: u32,
    pub leveled_up: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scoreboard {
    pub score: u32,
    pub level: u32,
    pub lines: u32,
    initial_level: u32,
}

impl Scoreboard {
    pub fn new(initial_level: u32) -> Self {
        let initial_level = initial_level.max(1);
        Self {
            score: 0,
            level: initial_level,
            lines: 0,
            initial_level,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.initial_level);
    }

    /// Score `rows` cleared rows at the current level, then advance the level.
    pub fn apply_clear(&mut self, rows: u32) -> ClearOutcome {
        let points = line_clear_points(rows).saturating_mul(self.level);
        self.score = self.score.saturating_add(points);
        self.lines = self.lines.saturating_add(rows);
        let new_level = self.initial_level + self.lines / LINES_PER_LEVEL;
        let leveled_up = new_level > self.level;
        if leveled_up {
            info!(level = new_level, lines = self.lines, "level up");
            self.level = new_level;
        }
        ClearOutcome {
            rows,
            points,
            leveled_up,
        }
    }
}

impl Default for Scoreboard {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_table() {
        assert_eq!(line_clear_points(1), 40);
        assert_eq!(line_clear_points(2), 100);
        assert_eq!(line_clear_points(3), 300);
        assert_eq!(line_clear_points(4), 1200);
        assert_eq!(line_clear_points(5), 200);
    }

    #[test]
    fn points_scale_with_level() {
        let mut b = Scoreboard::new(3);
        let out = b.apply_clear(2);
        assert_eq!(out.points, 300);
        assert_eq!(b.score, 300);
        assert_eq!(b.lines, 2);
    }

    #[test]
    fn five_rows_use_fallback() {
        let mut b = Scoreboard::new(2);
        b.apply_clear(5);
        assert_eq!(b.score, 5 * 40 * 2);
    }

    #[test]
    fn level_rises_once_per_threshold() {
        let mut b = Scoreboard::default();
        b.apply_clear(4);
        assert_eq!(b.level, 1);
        let out = b.apply_clear(4);
        assert!(!out.leveled_up);
        let out = b.apply_clear(4);
        assert!(out.leveled_up);
        assert_eq!(b.lines, 12);
        assert_eq!(b.level, 2);
    }

    #[test]
    fn reset_returns_to_initial_level() {
        let mut b = Scoreboard::new(5);
        for _ in 0..5 {
            b.apply_clear(4);
        }
        assert!(b.level > 5);
        b.reset();
        assert_eq!(b, Scoreboard::new(5));
    }

    #[test]
    fn score_saturates() {
        let mut b = Scoreboard::new(1);
        b.score = u32::MAX - 10;
        b.apply_clear(1);
        assert_eq!(b.score, u32::MAX);
    }
}
