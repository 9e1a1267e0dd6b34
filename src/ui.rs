//! Layout and drawing: board rasterization, sidebar, menu, pause and game-over overlays.

use crate::game::{GameMode, GameState};
use crate::lines::Blink;
use crate::piece::TetrominoKind;
use crate::theme::Theme;
use crate::world::{BlockView, BodyTag, PLAY_HEIGHT, PLAY_WIDTH};
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Widget};
use std::time::Instant;
use tachyonfx::{Duration as TfxDuration, Effect, EffectRenderer, Interpolation, fx};

/// Board pixels per world unit. Two terminal columns by one half-block row pair make a
/// roughly square cell.
const PX_PER_UNIT: usize = 2;
const BOARD_PX_W: usize = PLAY_WIDTH * PX_PER_UNIT;
const BOARD_PX_H: usize = PLAY_HEIGHT * PX_PER_UNIT;
/// Board size in terminal cells (▀ packs two pixel rows per cell).
const BOARD_COLS: u16 = BOARD_PX_W as u16;
const BOARD_ROWS: u16 = (BOARD_PX_H / 2) as u16;

const SIDEBAR_WIDTH: u16 = 22;

/// Fade of the board after game over, in ms.
const GAME_OVER_FADE_MS: u32 = 800;

/// Next preview: small grid.
const NEXT_PREVIEW_COLS: u16 = 4;
const NEXT_PREVIEW_ROWS: u16 = 2;
const NEXT_MINI_CELL_W: u16 = 2;
const NEXT_MINI_CELL_H: u16 = 1;

/// Board colours sampled at pixel centres. `None` is empty board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    pixels: Vec<Option<Color>>,
}

impl Raster {
    pub fn get(&self, x: usize, y: usize) -> Option<Color> {
        if x >= BOARD_PX_W || y >= BOARD_PX_H {
            return None;
        }
        self.pixels[y * BOARD_PX_W + x]
    }
}

/// Rasterize rotated blocks. Blinking blocks take the flash colour in the visible phase
/// and are left out otherwise.
pub fn rasterize(blocks: &[BlockView], blink: Option<&Blink>, theme: &Theme) -> Raster {
    let mut pixels = vec![None; BOARD_PX_W * BOARD_PX_H];
    let scale = PX_PER_UNIT as f32;
    for b in blocks {
        let BodyTag::Piece(piece) = b.tag else {
            continue;
        };
        let color = match blink {
            Some(blink) if blink.shapes.contains(&b.shape) => {
                if !blink.visible {
                    continue;
                }
                theme.flash
            }
            _ => theme.shade(piece.shade),
        };

        let (sin, cos) = b.angle.sin_cos();
        // World-space reach of the rotated square.
        let reach_x = b.half_extents.x * cos.abs() + b.half_extents.y * sin.abs();
        let reach_y = b.half_extents.x * sin.abs() + b.half_extents.y * cos.abs();
        let x0 = ((b.center.x - reach_x) * scale).floor().max(0.0) as usize;
        let x1 = (((b.center.x + reach_x) * scale).ceil().max(0.0) as usize).min(BOARD_PX_W);
        let y0 = ((b.center.y - reach_y) * scale).floor().max(0.0) as usize;
        let y1 = (((b.center.y + reach_y) * scale).ceil().max(0.0) as usize).min(BOARD_PX_H);

        for py in y0..y1 {
            for px in x0..x1 {
                let dx = (px as f32 + 0.5) / scale - b.center.x;
                let dy = (py as f32 + 0.5) / scale - b.center.y;
                // Into the block's frame.
                let lx = dx * cos + dy * sin;
                let ly = -dx * sin + dy * cos;
                if lx.abs() <= b.half_extents.x && ly.abs() <= b.half_extents.y {
                    pixels[py * BOARD_PX_W + px] = Some(color);
                }
            }
        }
    }
    Raster { pixels }
}

/// Game-over fade carried between frames.
#[derive(Default)]
pub struct BoardFade {
    effect: Option<Effect>,
    last: Option<Instant>,
}

impl BoardFade {
    pub fn reset(&mut self) {
        self.effect = None;
        self.last = None;
    }

    fn done(&self) -> bool {
        self.effect.as_ref().is_some_and(Effect::done)
    }
}

/// Per-frame inputs to `draw` that live outside the game state.
pub struct View<'a> {
    pub theme: &'a Theme,
    pub now: Instant,
    pub new_record: bool,
    pub animation: bool,
}

/// Draw the board and sidebar, plus the overlay for the current mode.
pub fn draw(frame: &mut Frame, state: &GameState, view: &View, fade: &mut BoardFade) {
    let area = frame.area();
    let (board_area, sidebar_area) = game_layout(area);
    let faded = state.mode() == GameMode::GameOver && (fade.done() || !view.animation);
    draw_board(frame, state, view, board_area, faded);
    draw_sidebar(frame, state, view.theme, sidebar_area);

    match state.mode() {
        GameMode::Menu => draw_menu(frame, view.theme, board_area),
        GameMode::Playing => {}
        GameMode::Paused => draw_pause_overlay(frame, view.theme, board_area),
        GameMode::GameOver => {
            if view.animation && !fade.done() {
                apply_game_over_fade(frame, view.theme, board_area, fade, view.now);
            }
            draw_game_over(frame, state, view, board_area);
        }
    }
}

/// Board (with border) and sidebar, centred in `area`.
fn game_layout(area: Rect) -> (Rect, Rect) {
    let board_w = BOARD_COLS + 2;
    let board_h = BOARD_ROWS + 2;
    let total_w = board_w + SIDEBAR_WIDTH;

    let horiz = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(total_w),
            Constraint::Fill(1),
        ])
        .split(area);
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(board_h),
            Constraint::Fill(1),
        ])
        .split(horiz[1]);
    let inner = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(board_w), Constraint::Length(SIDEBAR_WIDTH)])
        .split(vert[1]);
    (inner[0], inner[1])
}

fn draw_board(frame: &mut Frame, state: &GameState, view: &View, area: Rect, faded: bool) {
    let theme = view.theme;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
        .title(Span::styled(" Tumbletris ", theme.title));
    let inner = block.inner(area);
    block.render(area, frame.buffer_mut());

    let raster = if faded {
        Raster {
            pixels: vec![None; BOARD_PX_W * BOARD_PX_H],
        }
    } else {
        let blink = state.blinking(view.now);
        rasterize(&state.world().blocks(), blink.as_ref(), theme)
    };

    let buf = frame.buffer_mut();
    let rows = BOARD_ROWS.min(inner.height);
    let cols = BOARD_COLS.min(inner.width);
    for ry in 0..rows {
        for rx in 0..cols {
            let top = raster.get(rx as usize, ry as usize * 2).unwrap_or(theme.bg);
            let bot = raster.get(rx as usize, ry as usize * 2 + 1).unwrap_or(theme.bg);
            buf[(inner.x + rx, inner.y + ry)]
                .set_symbol("▀")
                .set_style(Style::default().fg(top).bg(bot));
        }
    }
}

/// Fade the board to the background (TachyonFX), advancing by wall-clock delta.
fn apply_game_over_fade(
    frame: &mut Frame,
    theme: &Theme,
    area: Rect,
    fade: &mut BoardFade,
    now: Instant,
) {
    let delta = fade
        .last
        .map(|t| now.saturating_duration_since(t))
        .unwrap_or(std::time::Duration::ZERO);
    let delta_ms = delta.as_millis().min(u32::MAX as u128) as u32;
    fade.last = Some(now);

    let effect = fade.effect.get_or_insert_with(|| {
        fx::fade_to(theme.bg, theme.bg, (GAME_OVER_FADE_MS, Interpolation::Linear)).with_area(area)
    });
    frame.render_effect(effect, area, TfxDuration::from_millis(delta_ms));
}

fn centered_popup(area: Rect, width: u16, height: u16) -> Rect {
    Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

fn popup_block(theme: &Theme) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
}

fn draw_menu(frame: &mut Frame, theme: &Theme, area: Rect) {
    let popup = centered_popup(area, BOARD_COLS, 11);
    let fg = Style::default().fg(theme.main_fg).bg(theme.bg);
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(" TUMBLETRIS ", Style::default().fg(theme.bg).bg(theme.title).bold())),
        Line::from(""),
        Line::from(Span::styled("Enter  start", fg)),
        Line::from(""),
        Line::from(Span::styled("←→ move  ↓ fall", fg)),
        Line::from(Span::styled("↑/z rotate", fg)),
        Line::from(Span::styled("Space  drop", fg)),
        Line::from(Span::styled("m mute  q quit", fg)),
    ];
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .style(Style::default().bg(theme.bg))
        .block(popup_block(theme))
        .render(popup, frame.buffer_mut());
}

fn draw_pause_overlay(frame: &mut Frame, theme: &Theme, area: Rect) {
    let popup = centered_popup(area, BOARD_COLS, 6);
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            " Paused ",
            Style::default().fg(Color::Black).bg(Color::Yellow),
        )),
        Line::from(""),
        Line::from(Span::styled("P resume  R reset", Style::default().fg(theme.main_fg))),
    ];
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .style(Style::default().bg(theme.bg))
        .block(popup_block(theme))
        .render(popup, frame.buffer_mut());
}

fn draw_game_over(frame: &mut Frame, state: &GameState, view: &View, area: Rect) {
    let theme = view.theme;
    let fg = Style::default().fg(theme.main_fg);
    let board = state.board();
    let mut lines: Vec<Line> = vec![
        Line::from(""),
        Line::from(Span::styled(
            " Game Over ",
            Style::default().fg(Color::White).bg(Color::Red),
        )),
        Line::from(""),
        Line::from(Span::styled(format!("Score: {}", board.score), fg)),
        Line::from(Span::styled(format!("Best: {}", state.high_score()), fg)),
        Line::from(Span::styled(format!("Lines: {}", board.lines), fg)),
    ];
    if view.new_record {
        lines.push(Line::from(Span::styled(
            "New record!",
            Style::default().fg(theme.title).bold(),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("Enter menu  Q quit", fg)));
    let height = lines.len() as u16 + 2;
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .style(Style::default().bg(theme.bg))
        .block(popup_block(theme))
        .render(centered_popup(area, BOARD_COLS, height), frame.buffer_mut());
}

fn draw_sidebar(frame: &mut Frame, state: &GameState, theme: &Theme, area: Rect) {
    let title_style = Style::default().fg(theme.title);
    let fg_style = Style::default().fg(theme.main_fg);
    let border_style = Style::default().fg(theme.div_line).bg(theme.bg);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Next (border + title + preview)
            Constraint::Length(1), // gap
            Constraint::Length(7), // Stats
            Constraint::Fill(1),
        ])
        .split(area);

    let next_block = Block::default().borders(Borders::ALL).border_style(border_style);
    let next_inner = next_block.inner(chunks[0]);
    next_block.render(chunks[0], frame.buffer_mut());
    let next_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(NEXT_PREVIEW_ROWS)])
        .split(next_inner);
    Paragraph::new(Line::from(Span::styled("Next", title_style)))
        .render(next_layout[0], frame.buffer_mut());
    if state.mode() != GameMode::Menu {
        draw_piece_preview(frame, theme, next_layout[1], state.next_kind());
    }

    let board = state.board();
    let stat = |label: &'static str, value: String| {
        Line::from(vec![
            Span::styled(label, title_style),
            Span::styled(value, fg_style),
        ])
    };
    let stats_block = Block::default().borders(Borders::ALL).border_style(border_style);
    let stats_inner = stats_block.inner(chunks[2]);
    stats_block.render(chunks[2], frame.buffer_mut());
    let stats = vec![
        stat("Score: ", board.score.to_string()),
        stat("Best:  ", state.high_score().max(board.score).to_string()),
        stat("Level: ", board.level.to_string()),
        stat("Lines: ", board.lines.to_string()),
        stat(
            "Sound: ",
            if state.sound_enabled() { "on" } else { "off" }.to_string(),
        ),
    ];
    Paragraph::new(Text::from(stats)).render(stats_inner, frame.buffer_mut());
}

/// Draw a piece as a small block preview (actual shape).
fn draw_piece_preview(frame: &mut Frame, theme: &Theme, area: Rect, kind: TetrominoKind) {
    let inner = Rect {
        x: area.x,
        y: area.y,
        width: area.width.min(NEXT_PREVIEW_COLS * NEXT_MINI_CELL_W),
        height: area.height.min(NEXT_PREVIEW_ROWS * NEXT_MINI_CELL_H),
    };
    let color = theme.shade(kind.shade());
    let cells = kind.cells();
    let max_x = cells.iter().map(|&(x, _)| x).max().unwrap_or(0);
    let max_y = cells.iter().map(|&(_, y)| y).max().unwrap_or(0);
    let bw = (max_x + 1) as u16;
    let bh = (max_y + 1) as u16;
    let off_x = inner.width.saturating_sub(bw * NEXT_MINI_CELL_W) / 2;
    let off_y = inner.height.saturating_sub(bh * NEXT_MINI_CELL_H) / 2;

    for &(dx, dy) in cells {
        let r = Rect {
            x: inner.x + off_x + dx as u16 * NEXT_MINI_CELL_W,
            y: inner.y + off_y + dy as u16 * NEXT_MINI_CELL_H,
            width: NEXT_MINI_CELL_W,
            height: NEXT_MINI_CELL_H,
        }
        .intersection(area);
        Paragraph::new("██")
            .style(Style::default().fg(color).bg(theme.bg))
            .render(r, frame.buffer_mut());
    }
}
