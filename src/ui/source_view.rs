use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use super::highlight::{Highlighter, Segment};
use super::styles;
use crate::app::App;
use crate::editor::Position;

/// First visible line keeping `cursor` near the middle of `height` rows
pub(crate) fn scroll_top(cursor: usize, height: usize, total: usize) -> usize {
    if height == 0 || total <= height {
        return 0;
    }
    cursor.saturating_sub(height / 2).min(total - height)
}

/// Selected columns on `line`, as a half-open char range
fn selected_columns(line: usize, width: usize, range: Option<(Position, Position)>) -> Option<(usize, usize)> {
    let (start, end) = range?;
    if line < start.line || line > end.line {
        return None;
    }
    let from = if line == start.line { start.column } else { 0 };
    let to = if line == end.line { end.column } else { width };
    (from < to).then_some((from, to))
}

/// Turn highlighted segments into spans, repainting the background of the
/// selected columns and marking the cursor cell.
pub(crate) fn paint_line(
    segments: &[Segment],
    base: Style,
    selection: Option<(usize, usize)>,
    cursor: Option<usize>,
) -> Vec<Span<'static>> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut run = String::new();
    let mut run_style: Option<Style> = None;
    let mut column = 0;

    let mut push = |ch: char, style: Style, run: &mut String, run_style: &mut Option<Style>| {
        if *run_style != Some(style) {
            if let Some(prev) = run_style.take() {
                spans.push(Span::styled(std::mem::take(run), prev));
            }
            *run_style = Some(style);
        }
        run.push(ch);
    };

    for (fg, text) in segments {
        for ch in text.chars() {
            let mut style = base.fg(*fg);
            if selection.is_some_and(|(from, to)| column >= from && column < to) {
                style = style.bg(styles::SELECTION_BG);
            }
            if cursor == Some(column) {
                style = style.add_modifier(Modifier::REVERSED);
            }
            push(ch, style, &mut run, &mut run_style);
            column += 1;
        }
    }
    // Cursor past the last character
    if cursor.is_some_and(|c| c >= column) {
        push(' ', base.add_modifier(Modifier::REVERSED), &mut run, &mut run_style);
    }
    if let Some(style) = run_style {
        spans.push(Span::styled(run, style));
    }
    spans
}

/// Render the source pane (left side)
pub fn render(f: &mut Frame, area: Rect, app: &App, hl: &mut Highlighter) {
    let editor = &app.editor;
    let cursor = editor.position();
    let selection = editor.selection_range();

    let mut title = format!(" {} ", app.display_path());
    if let Some(symbol) = editor.symbol_at_cursor() {
        title.push_str(&format!("· {} ", symbol.name));
    }

    let block = Block::default()
        .title(Span::styled(title, Style::default().fg(styles::BRIGHT)))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(styles::BORDER))
        .style(styles::default_style());
    let inner_height = block.inner(area).height as usize;

    let all_lines = editor.lines();
    let gutter = all_lines.len().to_string().len().max(3);
    let top = scroll_top(cursor.line, inner_height, all_lines.len());
    let highlighted = hl.document(editor.digest(), editor.path(), all_lines);

    let lines: Vec<Line> = highlighted
        .iter()
        .enumerate()
        .skip(top)
        .take(inner_height)
        .map(|(idx, segments)| {
            let on_cursor = idx == cursor.line;
            let base = if on_cursor {
                Style::default().bg(styles::CURSOR_LINE_BG)
            } else {
                Style::default().bg(styles::BG)
            };
            let width = all_lines.get(idx).map_or(0, |l| l.chars().count());

            let mut spans = vec![Span::styled(
                format!("{:>width$} ", idx + 1, width = gutter),
                if on_cursor {
                    Style::default().fg(styles::YELLOW).bg(styles::CURSOR_LINE_BG)
                } else {
                    styles::gutter_style()
                },
            )];
            spans.extend(paint_line(
                segments,
                base,
                selected_columns(idx, width, selection),
                on_cursor.then_some(cursor.column),
            ));
            Line::from(spans).style(base)
        })
        .collect();

    f.render_widget(Paragraph::new(lines).block(block), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::style::Color;

    #[test]
    fn scroll_centers_cursor_and_clamps() {
        assert_eq!(scroll_top(3, 10, 5), 0);
        assert_eq!(scroll_top(50, 10, 100), 45);
        assert_eq!(scroll_top(99, 10, 100), 90);
        assert_eq!(scroll_top(2, 10, 100), 0);
    }

    #[test]
    fn selection_columns_span_lines() {
        let range = Some((Position::new(1, 4), Position::new(3, 2)));
        assert_eq!(selected_columns(0, 10, range), None);
        assert_eq!(selected_columns(1, 10, range), Some((4, 10)));
        assert_eq!(selected_columns(2, 7, range), Some((0, 7)));
        assert_eq!(selected_columns(3, 10, range), Some((0, 2)));
        assert_eq!(selected_columns(1, 10, None), None);
    }

    #[test]
    fn paint_marks_selection_and_cursor() {
        let segments = vec![(Color::Red, "int".to_string()), (Color::Blue, " x;".to_string())];
        let spans = paint_line(&segments, Style::default(), Some((2, 4)), Some(5));
        let text: String = spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "int x;");

        let styles_at: Vec<Style> = spans
            .iter()
            .flat_map(|s| s.content.chars().map(move |_| s.style))
            .collect();
        assert_eq!(styles_at[0].bg, None);
        assert_eq!(styles_at[2].bg, Some(styles::SELECTION_BG));
        assert_eq!(styles_at[3].bg, Some(styles::SELECTION_BG));
        assert_eq!(styles_at[4].bg, None);
        assert!(styles_at[5].add_modifier.contains(Modifier::REVERSED));
    }

    #[test]
    fn cursor_past_end_gets_a_cell() {
        let spans = paint_line(&[(Color::Reset, "ab".to_string())], Style::default(), None, Some(2));
        let text: String = spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "ab ");
        assert!(spans
            .last()
            .is_some_and(|s| s.style.add_modifier.contains(Modifier::REVERSED)));
    }
}
