//! Persist the best score to disk (XDG config or ~/.config/tumbletris).

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const APP_DIR: &str = "tumbletris";
const FILENAME: &str = "highscore";

/// `$XDG_CONFIG_HOME/tumbletris`, else `~/.config/tumbletris`, else `./tumbletris`.
pub fn config_dir() -> PathBuf {
    let base = match std::env::var("XDG_CONFIG_HOME") {
        Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
        _ => std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".config"))
            .unwrap_or_else(|_| PathBuf::from(".")),
    };
    base.join(APP_DIR)
}

fn score_path() -> PathBuf {
    config_dir().join(FILENAME)
}

/// Best score so far; 0 when the file is missing or unreadable.
pub fn load_high_score() -> u32 {
    load_from(&score_path())
}

/// Store the best score. Failures are logged and otherwise ignored.
pub fn save_high_score(score: u32) {
    let path = score_path();
    if let Err(e) = save_to(&path, score) {
        warn!(path = %path.display(), error = %e, "could not save high score");
    }
}

fn load_from(path: &Path) -> u32 {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no high score file");
            return 0;
        }
    };
    match content.trim().parse::<u32>() {
        Ok(n) => n,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring malformed high score");
            0
        }
    }
}

fn save_to(path: &Path, score: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, format!("{score}\n")).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
