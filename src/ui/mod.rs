mod diff_panel;
pub mod highlight;
mod overlay;
mod source_view;
mod status_bar;
mod styles;

use crate::app::App;
use highlight::Highlighter;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::Frame;

/// Render the entire UI
pub fn draw(f: &mut Frame, app: &App, hl: &mut Highlighter) {
    let bottom_height = status_bar::bottom_bar_height(app, f.area().width);

    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),             // top bar
            Constraint::Min(1),                // main content
            Constraint::Length(bottom_height), // bottom bar (dynamic rows)
        ])
        .split(f.area());

    status_bar::render_top_bar(f, outer[0], app);

    // Source pane, plus the diff panel while it is open
    if app.panel.is_active() {
        let direction = if outer[1].width < 100 {
            Direction::Vertical
        } else {
            Direction::Horizontal
        };
        let main_area = Layout::default()
            .direction(direction)
            .constraints([Constraint::Fill(2), Constraint::Fill(3)])
            .split(outer[1]);

        source_view::render(f, main_area[0], app, hl);
        diff_panel::render(f, main_area[1], app);
    } else {
        source_view::render(f, outer[1], app, hl);
    }

    status_bar::render_bottom_bar(f, outer[2], app);

    if let Some(ref msg) = app.watch_message {
        status_bar::render_notification(f, f.area(), msg);
    }

    if let Some(ref overlay_data) = app.overlay {
        overlay::render_overlay(f, f.area(), overlay_data);
    }
}
