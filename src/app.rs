//! App: terminal init, frame loop, key handling and audio cues.

use crate::GameConfig;
use crate::game::{GameMode, GameState, TickEvents};
use crate::highscores;
use crate::input::{Action, Controls};
use crate::sound::Cue;
use crate::theme::Theme;
use crate::ui::{self, BoardFade, View};
use anyhow::Result;
use crossterm::event::{self, Event, KeyEvent};
use ratatui::DefaultTerminal;
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Frame deltas longer than this are clamped before reaching the simulation.
const MAX_FRAME_DELTA: f32 = 0.1;
const DEFAULT_FRAME_RATE: f64 = 60.0;

/// Frame pacing for `frame_rate` Hz, kept within 1..=240. Non-finite rates use the default.
fn frame_interval(frame_rate: f64) -> Duration {
    let hz = if frame_rate.is_finite() {
        frame_rate.clamp(1.0, 240.0)
    } else {
        DEFAULT_FRAME_RATE
    };
    Duration::from_secs_f64(1.0 / hz)
}

pub struct App {
    config: GameConfig,
    theme: Theme,
    state: GameState,
    controls: Controls,
    fade: BoardFade,
    frame_interval: Duration,
    last_frame: Instant,
    /// Last game ended with a new best score.
    new_record: bool,
}

impl App {
    pub fn new(config: GameConfig, theme: Theme, frame_rate: f64) -> Self {
        let high_score = highscores::load_high_score();
        info!(high_score, "loaded high score");
        let mut state = GameState::new(&config, high_score);
        let now = Instant::now();
        if !config.show_menu {
            state.start(now);
        }
        Self {
            config,
            theme,
            state,
            controls: Controls::new(),
            fade: BoardFade::default(),
            frame_interval: frame_interval(frame_rate),
            last_frame: now,
            new_record: false,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        use crossterm::{
            event::{KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags},
            execute,
            terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
        };

        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        // Release events let held keys end exactly; terminals without them fall back to a hold window.
        let _ = execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        );

        let mut terminal =
            ratatui::DefaultTerminal::new(ratatui::backend::CrosstermBackend::new(stdout))?;

        let result = self.run_loop(&mut terminal);

        let _ = execute!(std::io::stdout(), PopKeyboardEnhancementFlags);
        execute!(std::io::stdout(), LeaveAlternateScreen)?;
        disable_raw_mode()?;

        result
    }

    fn run_loop(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        self.last_frame = Instant::now();
        loop {
            let frame_start = Instant::now();
            let view = View {
                theme: &self.theme,
                now: frame_start,
                new_record: self.new_record,
                animation: self.config.animation,
            };
            terminal.draw(|f| ui::draw(f, &self.state, &view, &mut self.fade))?;

            let timeout = self.frame_interval.saturating_sub(frame_start.elapsed());
            if event::poll(timeout)? {
                while event::poll(Duration::ZERO)? {
                    let Event::Key(key) = event::read()? else {
                        continue;
                    };
                    if self.handle_key(key, Instant::now()) {
                        return Ok(());
                    }
                }
            }

            self.tick(Instant::now());
        }
    }

    /// Returns true when the player asked to quit.
    fn handle_key(&mut self, key: KeyEvent, now: Instant) -> bool {
        let action = self.controls.handle(key, now);
        match (self.state.mode(), action) {
            (_, Action::None) => {}
            (_, Action::Quit) => return true,
            (_, Action::Mute) => {
                let on = self.state.toggle_sound();
                info!(sound = on, "sound toggled");
            }
            (GameMode::Menu, Action::Confirm | Action::HardDrop) => {
                self.state.start(now);
                self.last_frame = now;
            }
            (GameMode::Playing | GameMode::Paused, Action::Pause) => {
                self.state.toggle_pause();
                self.controls.release_all();
                self.last_frame = now;
            }
            (GameMode::Playing, Action::RotateCw | Action::RotateCcw) => {
                let clockwise = action == Action::RotateCw;
                if self.controls.rotation_ready(now) && self.state.rotate(clockwise, now) {
                    self.controls.note_rotation(now);
                }
            }
            (GameMode::Playing, Action::HardDrop) => {
                self.state.hard_drop(now);
            }
            (GameMode::Playing | GameMode::Paused, Action::Reset)
            | (GameMode::GameOver, Action::Confirm | Action::Reset) => self.reset(now),
            _ => {}
        }
        false
    }

    fn reset(&mut self, now: Instant) {
        self.state.reset();
        self.controls.release_all();
        self.fade.reset();
        self.new_record = false;
        if !self.config.show_menu {
            self.state.start(now);
        }
        self.last_frame = now;
    }

    /// Steer, step the game with a clamped delta, then react to what happened.
    fn tick(&mut self, now: Instant) {
        let dt = now
            .saturating_duration_since(self.last_frame)
            .as_secs_f32()
            .min(MAX_FRAME_DELTA);
        self.last_frame = now;

        self.state
            .steer(self.controls.horizontal(now), self.controls.soft_drop(now));
        let events = self.state.update(dt, now);
        self.on_events(events);

        let cues = self.state.drain_cues(now);
        if !cues.is_empty() {
            play_cues(&cues);
        }
    }

    fn on_events(&mut self, events: TickEvents) {
        if events.settled {
            debug!(score = self.state.board().score, "piece came to rest");
        }
        if let Some(cleared) = events.cleared {
            debug!(rows = cleared.rows, points = cleared.points, "clear applied");
        }
        if events.game_over {
            self.controls.release_all();
            self.fade.reset();
            self.new_record = events.new_record;
            if events.new_record {
                highscores::save_high_score(self.state.high_score());
            }
        }
    }
}

/// Terminal rendition of audio: one bell per frame that has any due cue.
fn play_cues(cues: &[Cue]) {
    debug!(?cues, "cues");
    let mut out = std::io::stdout();
    let _ = out.write_all(b"\x07");
    let _ = out.flush();
}
