//! Tumbletris: falling-block puzzle in the terminal where pieces are rigid bodies,
//! not grid cells. Rows are found geometrically and cleared block by block.

mod app;
mod components;
mod game;
mod highscores;
mod input;
mod lines;
mod piece;
mod scoring;
mod sound;
mod theme;
mod ui;
mod world;

use anyhow::Result;
use app::App;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use world::BlockMaterial;

const DEFAULT_GRAVITY: f32 = 8.0;
const LOG_FILE: &str = "tumbletris.log";

/// Options derived from CLI that affect game behaviour (physics, level, sound, clear animation).
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Downward acceleration (units/sec²).
    pub gravity: f32,
    pub material: BlockMaterial,
    pub initial_level: u32,
    /// Piece sequence seed; `None` for a fresh random sequence.
    pub seed: Option<u64>,
    pub sound: bool,
    /// Blink completed rows before removing them.
    pub animation: bool,
    pub show_menu: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            gravity: DEFAULT_GRAVITY,
            material: BlockMaterial::default(),
            initial_level: 1,
            seed: None,
            sound: true,
            animation: true,
            show_menu: true,
        }
    }
}

impl From<&Args> for GameConfig {
    fn from(args: &Args) -> Self {
        Self {
            gravity: args.gravity,
            initial_level: args.initial_level.max(1),
            seed: args.seed,
            sound: !args.no_sound,
            animation: !args.no_animation,
            show_menu: !args.no_menu,
            ..Self::default()
        }
    }
}

/// Restore terminal state - called on panic.
fn restore_terminal() {
    use crossterm::{
        execute,
        terminal::{LeaveAlternateScreen, disable_raw_mode},
    };
    let _ = disable_raw_mode();
    let _ = execute!(std::io::stdout(), LeaveAlternateScreen);
}

/// Log to a file in the config dir; the terminal belongs to the game.
fn init_logging() {
    let dir = highscores::config_dir();
    let _ = std::fs::create_dir_all(&dir);

    #[cfg(unix)]
    let null_device = "/dev/null";
    #[cfg(windows)]
    let null_device = "NUL";

    let writer: Box<dyn std::io::Write + Send> = match std::fs::File::create(dir.join(LOG_FILE)) {
        Ok(file) => Box::new(file),
        Err(_) => match std::fs::File::create(null_device) {
            Ok(file) => Box::new(file),
            Err(_) => Box::new(std::io::sink()),
        },
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::sync::Mutex::new(writer))
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        restore_terminal();
        original_hook(panic_info);
    }));

    let args = Args::parse();
    init_logging();

    let theme = theme::Theme::load(args.theme.as_deref(), args.palette).unwrap_or_else(|e| {
        warn!(error = %e, "theme not loaded, using built-in palette");
        theme::Theme::for_palette(args.palette)
    });
    let config = GameConfig::from(&args);
    info!(?config, "starting");

    let mut app = App::new(config, theme, args.frame_rate);
    app.run()?;
    Ok(())
}

/// Falling-block puzzle with rigid-body physics, in the terminal.
#[derive(Debug, Parser)]
#[command(
    name = "tumbletris",
    version,
    about = "Falling-block puzzle in the terminal where pieces tumble as rigid bodies.",
    long_about = "Tumbletris is a terminal puzzle game with physics.\n\n\
        Tetrominoes fall under gravity, bump, tilt and come to rest. A row clears when ten \
        resting blocks line up across the arena; pieces cut by a clear break apart and fall \
        on their own.\n\n\
        CONTROLS:\n  Left/Right h/l  Move        Up k x      Rotate CW   z u  Rotate CCW\n  \
        Down j          Fall faster Space       Drop        Enter Start\n  \
        Esc p           Pause       r           Reset       m     Mute   q  Quit\n\n\
        Logs go to $XDG_CONFIG_HOME/tumbletris/tumbletris.log (RUST_LOG sets the level)."
)]
pub struct Args {
    /// Path to theme file (btop-style theme[key]=\"value\"). Keys override the palette.
    #[arg(short, long, value_name = "FILE")]
    pub theme: Option<std::path::PathBuf>,

    /// Colour palette.
    #[arg(long, default_value = "gameboy")]
    pub palette: Palette,

    /// Initial level (scoring multiplier and fall speed).
    #[arg(long, default_value = "1", value_name = "N")]
    pub initial_level: u32,

    /// Seed for the piece sequence.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Gravity in units per second squared.
    #[arg(long, default_value_t = DEFAULT_GRAVITY, value_name = "G")]
    pub gravity: f32,

    /// Disable sound cues (terminal bell).
    #[arg(long)]
    pub no_sound: bool,

    /// Skip main menu and start game immediately.
    #[arg(long)]
    pub no_menu: bool,

    /// Target frames per second.
    #[arg(long, default_value = "60.0", value_name = "HZ", value_parser = parse_frame_rate)]
    pub frame_rate: f64,

    /// Remove completed rows at once instead of blinking them first.
    #[arg(long)]
    pub no_animation: bool,
}

fn parse_frame_rate(s: &str) -> Result<f64, String> {
    let hz: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if hz.is_finite() && hz > 0.0 {
        Ok(hz)
    } else {
        Err(format!("frame rate must be a positive number, got {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Palette {
    #[default]
    #[value(alias = "gb")]
    Gameboy,

    #[value(alias = "one-dark")]
    Onedark,

    #[value(alias = "highcontrast", alias = "contrast")]
    HighContrast,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_game_defaults() {
        let args = Args::parse_from(["tumbletris"]);
        let config = GameConfig::from(&args);
        let default = GameConfig::default();
        assert_eq!(config.gravity, default.gravity);
        assert_eq!(config.initial_level, 1);
        assert!(config.sound && config.animation && config.show_menu);
        assert_eq!(args.palette, Palette::Gameboy);
    }

    #[test]
    fn cli_flags_fold_into_config() {
        let args = Args::parse_from([
            "tumbletris",
            "--seed",
            "9",
            "--initial-level",
            "0",
            "--no-sound",
            "--no-animation",
            "--no-menu",
            "--palette",
            "high-contrast",
        ]);
        let config = GameConfig::from(&args);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.initial_level, 1);
        assert!(!config.sound && !config.animation && !config.show_menu);
        assert_eq!(args.palette, Palette::HighContrast);
    }

    #[test]
    fn frame_rate_must_be_finite_and_positive() {
        for bad in ["nan", "inf", "0", "-30"] {
            assert!(
                Args::try_parse_from(["tumbletris", "--frame-rate", bad]).is_err(),
                "accepted --frame-rate {bad}"
            );
        }
        let args = Args::try_parse_from(["tumbletris", "--frame-rate", "30"]).unwrap();
        assert_eq!(args.frame_rate, 30.0);
    }
}
