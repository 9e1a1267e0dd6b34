//! Audio cues. The core queues them with due times; the shell drains and plays them.

use std::time::{Duration, Instant};

/// Spacing between repeated cues queued with `play_sequential`.
pub const SEQUENTIAL_CUE_SPACING: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Line,
    LevelUp,
    GameOver,
    Touch,
    Rotate,
}

#[derive(Debug, Clone)]
pub struct CueQueue {
    enabled: bool,
    scheduled: Vec<(Instant, Cue)>,
}

impl CueQueue {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            scheduled: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Flip mute; returns the new enabled state. Muting drops anything queued.
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        if !self.enabled {
            self.scheduled.clear();
        }
        self.enabled
    }

    pub fn play(&mut self, cue: Cue, now: Instant) {
        if self.enabled {
            self.scheduled.push((now, cue));
        }
    }

    /// Queue `count` copies of `cue`, `SEQUENTIAL_CUE_SPACING` apart, the first at `now`.
    pub fn play_sequential(&mut self, cue: Cue, count: u32, now: Instant) {
        if !self.enabled {
            return;
        }
        for i in 0..count {
            self.scheduled.push((now + SEQUENTIAL_CUE_SPACING * i, cue));
        }
    }

    /// Remove and return every cue due at or before `now`, earliest first.
    pub fn drain_due(&mut self, now: Instant) -> Vec<Cue> {
        self.scheduled.sort_by_key(|(at, _)| *at);
        let split = self.scheduled.partition_point(|(at, _)| *at <= now);
        self.scheduled.drain(..split).map(|(_, cue)| cue).collect()
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.scheduled.len()
    }

    pub fn clear(&mut self) {
        self.scheduled.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_cues_come_due_in_turn() {
        let t0 = Instant::now();
        let mut q = CueQueue::new(true);
        q.play_sequential(Cue::Line, 3, t0);
        assert_eq!(q.drain_due(t0), vec![Cue::Line]);
        assert!(q.drain_due(t0 + Duration::from_millis(50)).is_empty());
        assert_eq!(q.drain_due(t0 + Duration::from_millis(250)), vec![Cue::Line, Cue::Line]);
        assert_eq!(q.pending(), 0);
    }

    #[test]
    fn muted_queue_stays_empty() {
        let t0 = Instant::now();
        let mut q = CueQueue::new(false);
        q.play(Cue::Touch, t0);
        q.play_sequential(Cue::Line, 4, t0);
        assert_eq!(q.pending(), 0);
    }

    #[test]
    fn muting_drops_queued_cues() {
        let t0 = Instant::now();
        let mut q = CueQueue::new(true);
        q.play_sequential(Cue::Line, 2, t0);
        assert!(!q.toggle());
        assert_eq!(q.pending(), 0);
        assert!(q.toggle());
        q.play(Cue::Rotate, t0);
        assert_eq!(q.drain_due(t0), vec![Cue::Rotate]);
    }
}
