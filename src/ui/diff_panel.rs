use ratatui::{
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use std::time::Instant;

use super::styles;
use crate::app::App;
use crate::surface::{rows::RowIndex, DiffTable, LineStyle, MessageLine, SurfaceView, TerminalSurface};

/// Pad or cut `text` to exactly `width` characters
fn fit(text: &str, width: usize) -> String {
    let count = text.chars().count();
    if count > width {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        if width > 0 {
            cut.push('…');
        }
        cut
    } else {
        format!("{}{}", text, " ".repeat(width - count))
    }
}

/// Column widths for `columns` cells sharing `width`, one space between
fn column_widths(columns: usize, width: usize) -> Vec<usize> {
    if columns == 0 {
        return Vec::new();
    }
    let usable = width.saturating_sub(columns - 1);
    let base = usable / columns;
    let mut widths = vec![base; columns];
    if let Some(last) = widths.last_mut() {
        *last += usable - base * columns;
    }
    widths
}

/// First visible row: the first synced row sits in the middle when possible
pub(crate) fn table_scroll(index: &RowIndex, height: usize, total: usize) -> usize {
    let Some(&first) = index.selected().first() else {
        return 0;
    };
    if total <= height {
        return 0;
    }
    first.saturating_sub(height / 2).min(total - height)
}

fn table_lines(table: &DiffTable, index: &RowIndex, area: Rect) -> Vec<Line<'static>> {
    let columns = table
        .rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(table.header.len()))
        .max()
        .unwrap_or(0);
    let widths = column_widths(columns, area.width as usize);
    let render_row = |cells: &[String], style: Style| -> Line<'static> {
        let text = widths
            .iter()
            .enumerate()
            .map(|(i, w)| fit(cells.get(i).map_or("", String::as_str), *w))
            .collect::<Vec<_>>()
            .join(" ");
        Line::from(Span::styled(text, style))
    };

    let mut lines = Vec::new();
    let mut height = area.height as usize;
    if !table.header.is_empty() {
        lines.push(render_row(
            &table.header,
            Style::default().fg(styles::CYAN).add_modifier(Modifier::BOLD),
        ));
        height = height.saturating_sub(1);
    }

    let top = table_scroll(index, height, table.rows.len());
    for (i, row) in table.rows.iter().enumerate().skip(top).take(height) {
        let style = if index.is_selected(i) {
            styles::synced_row_style()
        } else {
            Style::default().fg(styles::TEXT)
        };
        lines.push(render_row(row, style));
    }
    lines
}

fn message_lines(messages: &[MessageLine]) -> Vec<Line<'static>> {
    messages
        .iter()
        .map(|m| {
            let style = match m.style {
                LineStyle::Heading => Style::default().fg(styles::BRIGHT).add_modifier(Modifier::BOLD),
                LineStyle::Kind => Style::default().fg(styles::YELLOW),
                LineStyle::Error => styles::error_style(),
                LineStyle::Plain => Style::default().fg(styles::TEXT),
            };
            Line::from(Span::styled(m.text.clone(), style))
        })
        .collect()
}

fn render_surface(f: &mut Frame, inner: Rect, surface: &TerminalSurface) {
    match surface.view() {
        SurfaceView::Blank => {}
        SurfaceView::Loading(_) => {
            let label = surface.loading_label(Instant::now()).unwrap_or_default();
            let top = inner.height / 2;
            let area = Rect {
                y: inner.y + top,
                height: inner.height.saturating_sub(top).min(1),
                ..inner
            };
            let text = Paragraph::new(Line::from(Span::styled(label, Style::default().fg(styles::MUTED))))
                .alignment(Alignment::Center);
            f.render_widget(text, area);
        }
        SurfaceView::Table(table) => {
            let lines = table_lines(table, surface.index(), inner);
            f.render_widget(Paragraph::new(lines), inner);
        }
        SurfaceView::Message(messages) => {
            let text = Paragraph::new(message_lines(messages)).wrap(Wrap { trim: false });
            f.render_widget(text, inner);
        }
    }
}

/// Render the diff panel (right side). Draws nothing unless the panel is open.
pub fn render(f: &mut Frame, area: Rect, app: &App) {
    let Some(surface) = app.panel.surface() else {
        return;
    };

    let mut title = vec![Span::styled(
        format!(" {} ", surface.title()),
        Style::default().fg(styles::CYAN).add_modifier(Modifier::BOLD),
    )];
    if let Some(tracked) = app.session.tracked() {
        title.push(Span::styled(
            format!("{} ", tracked.symbol),
            Style::default().fg(styles::GREEN),
        ));
    }
    if app.is_stale() {
        title.push(Span::styled("stale ", styles::stale_style()));
    }

    let block = Block::default()
        .title(Line::from(title))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(styles::BORDER))
        .style(styles::surface_style());
    let inner = block.inner(area);
    f.render_widget(block, area);
    render_surface(f, inner, surface);
}
