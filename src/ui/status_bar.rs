use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use super::styles;
use crate::app::{App, InputMode};

/// Render the top status bar:
///   workspace · file        ● tracked_function  running  stale
pub fn render_top_bar(f: &mut Frame, area: Rect, app: &App) {
    let panel_bg = Style::default().bg(styles::PANEL);

    let left = vec![
        Span::styled(
            format!(" {}", app.workspace_name()),
            Style::default().fg(styles::CYAN).add_modifier(Modifier::BOLD),
        ),
        Span::styled(" · ", Style::default().fg(styles::BORDER)),
        Span::styled(app.display_path(), Style::default().fg(styles::TEXT)),
    ];

    let mut right: Vec<Span> = Vec::new();
    match app.session.tracked() {
        Some(tracked) => {
            right.push(Span::styled("● ", Style::default().fg(styles::GREEN)));
            right.push(Span::styled(
                tracked.symbol.clone(),
                Style::default().fg(styles::BRIGHT),
            ));
        }
        None => right.push(Span::styled("no function tracked", Style::default().fg(styles::DIM))),
    }
    if app.is_busy() {
        right.push(Span::raw("  "));
        right.push(Span::styled(
            " running ",
            Style::default()
                .fg(styles::BG)
                .bg(styles::YELLOW)
                .add_modifier(Modifier::BOLD),
        ));
    }
    if app.is_stale() {
        right.push(Span::raw("  "));
        right.push(Span::styled("⚠ stale", styles::stale_style()));
    }
    right.push(Span::raw(" "));

    // Right-align the status part
    let used = spans_width(&left) + spans_width(&right);
    let mut spans = left;
    spans.push(Span::raw(" ".repeat((area.width as usize).saturating_sub(used))));
    spans.extend(right);

    f.render_widget(Paragraph::new(Line::from(spans)).style(panel_bg), area);
}

/// Compute the display width of a list of spans
fn spans_width(spans: &[Span]) -> usize {
    spans.iter().map(|s| s.content.chars().count()).sum()
}

/// A key hint for the bottom bar
struct Hint {
    key: &'static str,
    label: &'static str,
}

impl Hint {
    const fn new(key: &'static str, label: &'static str) -> Self {
        Self { key, label }
    }
    fn width(&self) -> usize {
        self.key.chars().count() + self.label.chars().count()
    }
}

fn build_hints(app: &App) -> Vec<Hint> {
    let mut hints = vec![
        Hint::new("j/k", " move "),
        Hint::new("v", " select "),
        Hint::new("w", " word "),
        Hint::new("d", " diff "),
    ];
    if app.session.tracked().is_some() {
        hints.push(Hint::new("r", " rerun "));
    }
    if app.panel.is_active() {
        hints.push(Hint::new("x", " close panel "));
    }
    hints.extend([
        Hint::new("c", " m2c "),
        Hint::new("p/P", " tool paths "),
        Hint::new("q", " quit "),
    ]);
    hints
}

/// Pack hints into rows that fit within `width`
fn pack_hint_lines(hints: &[Hint], width: usize) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current_spans: Vec<Span<'static>> = Vec::new();
    let mut current_w: usize = 1; // leading space

    for hint in hints {
        let hw = hint.width();
        if current_w + hw > width && !current_spans.is_empty() {
            lines.push(Line::from(current_spans));
            current_spans = Vec::new();
            current_w = 1;
        }
        if current_spans.is_empty() {
            current_spans.push(Span::raw(" "));
        }
        current_spans.push(Span::styled(hint.key, styles::key_hint_style()));
        current_spans.push(Span::styled(hint.label, Style::default().fg(styles::DIM)));
        current_w += hw;
    }
    if !current_spans.is_empty() {
        lines.push(Line::from(current_spans));
    }
    if lines.is_empty() {
        lines.push(Line::from(vec![Span::raw(" ")]));
    }
    lines
}

/// Calculate how many rows the bottom bar needs
pub fn bottom_bar_height(app: &App, width: u16) -> u16 {
    match app.input_mode {
        InputMode::Context => 1,
        InputMode::Normal => {
            let lines = pack_hint_lines(&build_hints(app), width as usize);
            (lines.len() as u16).max(1)
        }
    }
}

/// Render the bottom keybinding hints bar, or the context prompt
pub fn render_bottom_bar(f: &mut Frame, area: Rect, app: &App) {
    let panel_bg = Style::default().bg(styles::PANEL);

    match app.input_mode {
        InputMode::Context => {
            let spans = vec![
                Span::styled(
                    " m2c context ",
                    Style::default()
                        .fg(styles::BG)
                        .bg(styles::CYAN)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!(" {}", app.context_input),
                    Style::default().fg(styles::TEXT),
                ),
                Span::styled("█", Style::default().fg(styles::CYAN)),
                Span::raw("  "),
                Span::styled("Enter", styles::key_hint_style()),
                Span::styled(" generate  ", Style::default().fg(styles::DIM)),
                Span::styled("Esc", styles::key_hint_style()),
                Span::styled(" cancel", Style::default().fg(styles::DIM)),
            ];
            f.render_widget(Paragraph::new(Line::from(spans)).style(panel_bg), area);
        }
        InputMode::Normal => {
            let lines = pack_hint_lines(&build_hints(app), area.width as usize);
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints(lines.iter().map(|_| Constraint::Length(1)).collect::<Vec<_>>())
                .split(area);

            for (i, line) in lines.into_iter().enumerate() {
                f.render_widget(Paragraph::new(line).style(panel_bg), rows[i]);
            }
        }
    }
}

/// Render the notification bubble in the top-right corner
pub fn render_notification(f: &mut Frame, area: Rect, message: &str) {
    let notif_width = (message.chars().count() as u16 + 4).min(area.width);
    let notif_area = Rect {
        x: area.x + area.width.saturating_sub(notif_width + 2),
        y: area.y + 2,
        width: notif_width,
        height: 1,
    };

    let notif = Paragraph::new(Line::from(vec![
        Span::styled(" ● ", Style::default().fg(styles::GREEN)),
        Span::styled(message.to_string(), Style::default().fg(styles::TEXT)),
        Span::raw(" "),
    ]))
    .style(Style::default().bg(styles::PANEL).fg(styles::TEXT));

    f.render_widget(notif, notif_area);
}
