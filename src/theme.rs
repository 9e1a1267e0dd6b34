//! Theme loading: built-in palettes, btop-style `theme[key]="value"` overrides, hex → ratatui Color.

use crate::Palette;
use crate::piece::Shade;
use ratatui::style::Color;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Board and UI colours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    /// Piece colours, lightest to darkest (see `Shade`).
    pub shades: [Color; 4],
    /// Playfield background.
    pub bg: Color,
    /// Border.
    pub div_line: Color,
    /// Text (score, level).
    pub main_fg: Color,
    /// Highlight / titles.
    pub title: Color,
    /// Blocks of a clearing row in the visible blink phase.
    pub flash: Color,
}

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

impl Default for Theme {
    fn default() -> Self {
        Self::gameboy()
    }
}

impl Theme {
    /// Four-green handheld palette. The board sits on a paler screen green so the
    /// lightest pieces still read.
    pub fn gameboy() -> Self {
        Self {
            shades: [
                Color::Rgb(0x9B, 0xBC, 0x0F),
                Color::Rgb(0x8B, 0xAC, 0x0F),
                Color::Rgb(0x30, 0x62, 0x30),
                Color::Rgb(0x0F, 0x38, 0x0F),
            ],
            bg: Color::Rgb(0xC4, 0xCF, 0xA1),
            div_line: Color::Rgb(0x30, 0x62, 0x30),
            main_fg: Color::Rgb(0x8B, 0xAC, 0x0F),
            title: Color::Rgb(0x9B, 0xBC, 0x0F),
            flash: Color::Rgb(0xE0, 0xF8, 0xD0),
        }
    }

    /// One Dark colours (hex values from onedark.theme).
    pub fn onedark() -> Self {
        Self {
            shades: [
                Color::Rgb(0x56, 0xB6, 0xC2), // cyan
                Color::Rgb(0xE5, 0xC0, 0x7B), // yellow
                Color::Rgb(0x98, 0xC3, 0x79), // green
                Color::Rgb(0xC6, 0x78, 0xDD), // magenta
            ],
            bg: Color::Rgb(0x31, 0x35, 0x3F),
            div_line: Color::Rgb(0x3F, 0x44, 0x4F),
            main_fg: Color::Rgb(0xAB, 0xB2, 0xBF),
            title: Color::Rgb(0xE5, 0xC0, 0x7B),
            flash: Color::Rgb(0xFF, 0xFF, 0xFF),
        }
    }

    pub fn high_contrast() -> Self {
        Self {
            shades: [
                Color::Rgb(0x00, 0xFF, 0xFF),
                Color::Rgb(0xFF, 0xFF, 0x00),
                Color::Rgb(0x00, 0xFF, 0x00),
                Color::Rgb(0xFF, 0x00, 0xFF),
            ],
            bg: Color::Rgb(0x00, 0x00, 0x00),
            div_line: Color::Rgb(0xFF, 0xFF, 0xFF),
            main_fg: Color::Rgb(0xFF, 0xFF, 0xFF),
            title: Color::Rgb(0xFF, 0xFF, 0x00),
            flash: Color::Rgb(0xFF, 0xFF, 0xFF),
        }
    }

    pub fn for_palette(palette: Palette) -> Self {
        match palette {
            Palette::Gameboy => Self::gameboy(),
            Palette::Onedark => Self::onedark(),
            Palette::HighContrast => Self::high_contrast(),
        }
    }

    /// Start from `palette`, then apply any keys set in the btop-style file at `path`.
    /// A missing path or file yields the plain palette.
    pub fn load(path: Option<&Path>, palette: Palette) -> Result<Self, ThemeError> {
        let mut theme = Self::for_palette(palette);
        let path = match path {
            Some(p) if p.exists() => p,
            _ => return Ok(theme),
        };
        let s = std::fs::read_to_string(path)?;
        theme.overlay(&parse_theme_file(&s));
        Ok(theme)
    }

    /// Keys are our own (`shade0`..`shade3`, `bg`, `flash`) with btop names as fallbacks.
    fn overlay(&mut self, map: &HashMap<String, String>) {
        let get = |keys: &[&str]| keys.iter().find_map(|k| map.get(*k).and_then(|v| parse_hex(v).ok()));
        let shade_keys: [&[&str]; 4] = [
            &["shade0", "hi_fg"],
            &["shade1", "title"],
            &["shade2", "mem_box"],
            &["shade3", "net_box"],
        ];
        for (slot, keys) in self.shades.iter_mut().zip(shade_keys) {
            if let Some(c) = get(keys) {
                *slot = c;
            }
        }
        let ui: [(&mut Color, &[&str]); 5] = [
            (&mut self.bg, &["bg", "meter_bg"]),
            (&mut self.div_line, &["div_line"]),
            (&mut self.main_fg, &["main_fg"]),
            (&mut self.title, &["title"]),
            (&mut self.flash, &["flash", "selected_fg"]),
        ];
        for (slot, keys) in ui {
            if let Some(c) = get(keys) {
                *slot = c;
            }
        }
    }

    #[inline]
    pub fn shade(&self, shade: Shade) -> Color {
        self.shades[shade.index()]
    }
}

/// Parse btop-style theme file into key -> value map.
fn parse_theme_file(s: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in s.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(stripped) = line.strip_prefix("theme[") else {
            continue;
        };
        let Some(end) = stripped.find(']') else {
            continue;
        };
        let key = stripped[..end].trim();
        let rest = stripped[end + 1..].trim();
        if let Some(value) = rest.strip_prefix('=') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if !value.is_empty() {
                map.insert(key.to_string(), value.to_string());
            }
        }
    }
    map
}

/// Parse hex colour "#RRGGBB" or "#RGB" into ratatui Color.
pub fn parse_hex(s: &str) -> Result<Color, ThemeError> {
    let s = s.trim().trim_start_matches('#');
    let invalid = || ThemeError::InvalidHex(s.to_string());
    let channel = |range: std::ops::Range<usize>| {
        s.get(range)
            .and_then(|h| u8::from_str_radix(h, 16).ok())
            .ok_or_else(invalid)
    };
    let (r, g, b) = match s.len() {
        6 => (channel(0..2)?, channel(2..4)?, channel(4..6)?),
        3 => (channel(0..1)? * 17, channel(1..2)? * 17, channel(2..3)? * 17),
        _ => return Err(invalid()),
    };
    Ok(Color::Rgb(r, g, b))
}
