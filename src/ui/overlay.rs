use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
    Frame,
};

use super::styles;
use crate::app::{DirEntry, OverlayData};
use crate::tool::ToolKind;

/// Render the active overlay on top of the main UI
pub fn render_overlay(f: &mut Frame, area: Rect, overlay: &OverlayData) {
    match overlay {
        OverlayData::PathPicker {
            tool,
            current_path,
            entries,
            selected,
        } => render_path_picker(f, area, *tool, current_path, entries, *selected),
    }
}

/// Keep the tail of `path` within `max` characters
fn shorten_path(path: &str, max: usize) -> String {
    let count = path.chars().count();
    if count <= max {
        return path.to_string();
    }
    let suffix: String = path.chars().skip(count - max).collect();
    format!("…{}", suffix)
}

fn render_path_picker(
    f: &mut Frame,
    area: Rect,
    tool: ToolKind,
    current_path: &str,
    entries: &[DirEntry],
    selected: usize,
) {
    let popup_height = (entries.len() as u16 + 2).min(area.height.saturating_sub(6)).max(5);
    let popup_width = 76u16.min(area.width.saturating_sub(6)).max(20);
    let popup = centered_rect(popup_width, popup_height, area);

    f.render_widget(Clear, popup);

    let title_path = shorten_path(current_path, popup_width.saturating_sub(24) as usize);
    let block = Block::default()
        .title(Span::styled(
            format!(" {} path: {} ", tool.label(), title_path),
            Style::default().fg(styles::CYAN),
        ))
        .title_bottom(Span::styled(
            " Enter=select/open  s=choose this  Bksp=up  Esc=close ",
            Style::default().fg(styles::DIM),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(styles::CYAN))
        .style(Style::default().bg(styles::PANEL));

    if entries.is_empty() {
        let empty = Paragraph::new(Line::from(Span::styled(
            "  (empty directory)",
            Style::default().fg(styles::MUTED),
        )))
        .block(block);
        f.render_widget(empty, popup);
        return;
    }

    // Keep the selection inside the visible rows
    let visible = popup_height.saturating_sub(2) as usize;
    let skip = selected.saturating_sub(visible.saturating_sub(1));

    let items: Vec<ListItem> = entries
        .iter()
        .enumerate()
        .skip(skip)
        .map(|(idx, entry)| {
            let is_sel = idx == selected;
            let marker = if is_sel { "▶ " } else { "  " };

            let name_style = if entry.has_script {
                Style::default().fg(styles::GREEN)
            } else if entry.is_dir {
                Style::default().fg(styles::BLUE)
            } else {
                Style::default().fg(styles::DIM)
            };

            let mut spans = vec![
                Span::styled(marker, Style::default().fg(styles::CYAN)),
                Span::styled(
                    entry.name.clone(),
                    if is_sel {
                        Style::default().fg(styles::BRIGHT)
                    } else {
                        name_style
                    },
                ),
            ];
            if entry.has_script {
                spans.push(Span::styled(
                    format!("  [{}]", tool.script()),
                    Style::default().fg(styles::GREEN),
                ));
            } else if entry.is_dir {
                spans.push(Span::styled("/", Style::default().fg(styles::DIM)));
            }

            let style = if is_sel {
                styles::selected_style()
            } else {
                Style::default().bg(styles::PANEL)
            };
            ListItem::new(Line::from(spans)).style(style)
        })
        .collect();

    f.render_widget(List::new(items).block(block), popup);
}

/// Calculate a centered rectangle within an area
fn centered_rect(width: u16, height: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(r.height.saturating_sub(height) / 2),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(r.width.saturating_sub(width) / 2),
            Constraint::Length(width),
            Constraint::Min(0),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_paths_keep_their_tail() {
        assert_eq!(shorten_path("/ws/tools", 20), "/ws/tools");
        assert_eq!(shorten_path("/home/me/decomp/tools/asm-differ", 10), "…asm-differ");
    }

    #[test]
    fn popup_is_centered() {
        let r = centered_rect(20, 10, Rect::new(0, 0, 100, 50));
        assert_eq!(r, Rect::new(40, 20, 20, 10));
    }
}
