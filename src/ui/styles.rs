use ratatui::style::{Color, Modifier, Style};

// ── Background colors ──
pub const BG: Color = Color::Rgb(12, 12, 12);
pub const SURFACE: Color = Color::Rgb(20, 20, 20);
pub const PANEL: Color = Color::Rgb(26, 26, 26);
pub const BORDER: Color = Color::Rgb(42, 42, 42);

// ── Text colors ──
pub const TEXT: Color = Color::Rgb(200, 200, 200);
pub const DIM: Color = Color::Rgb(102, 102, 102);
pub const MUTED: Color = Color::Rgb(136, 136, 136);
pub const BRIGHT: Color = Color::Rgb(232, 232, 232);

// ── Accent colors ──
pub const BLUE: Color = Color::Rgb(96, 165, 250);
pub const CYAN: Color = Color::Rgb(34, 211, 238);
pub const GREEN: Color = Color::Rgb(74, 222, 128);
pub const YELLOW: Color = Color::Rgb(250, 204, 21);
pub const RED: Color = Color::Rgb(248, 113, 113);
pub const ORANGE: Color = Color::Rgb(251, 146, 60);

// ── Source pane ──
pub const CURSOR_LINE_BG: Color = Color::Rgb(30, 30, 36);
pub const SELECTION_BG: Color = Color::Rgb(38, 58, 92);

// ── Diff panel ──
pub const SYNCED_ROW_BG: Color = Color::Rgb(52, 46, 20);

// ── Composed styles ──

pub fn default_style() -> Style {
    Style::default().fg(TEXT).bg(BG)
}

pub fn surface_style() -> Style {
    Style::default().fg(TEXT).bg(SURFACE)
}

pub fn selected_style() -> Style {
    Style::default().fg(BLUE).bg(Color::Rgb(26, 42, 58))
}

pub fn key_hint_style() -> Style {
    Style::default().fg(MUTED).add_modifier(Modifier::BOLD)
}

pub fn gutter_style() -> Style {
    Style::default().fg(DIM)
}

pub fn synced_row_style() -> Style {
    Style::default().fg(BRIGHT).bg(SYNCED_ROW_BG)
}

pub fn stale_style() -> Style {
    Style::default().fg(ORANGE).add_modifier(Modifier::BOLD)
}

pub fn error_style() -> Style {
    Style::default().fg(RED)
}
