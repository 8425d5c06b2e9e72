mod app;
mod codegen;
mod config;
mod editor;
mod panel;
mod session;
mod surface;
mod tool;
mod ui;
mod watch;

use anyhow::{Context, Result};
use app::{App, InputMode};
use clap::Parser;
use config::Settings;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Instant;
use tool::ToolKind;
use watch::{FileWatcher, WatchEvent};

/// Run asm-differ on the function under the cursor and keep the diff in sync
#[derive(Parser)]
#[command(name = "asmdiff", version, about)]
struct Cli {
    /// Source file to open
    file: PathBuf,

    /// Workspace root; tools run from here (defaults to current directory)
    #[arg(long, default_value = ".")]
    workspace: PathBuf,

    /// Initial cursor line (1-based)
    #[arg(long, default_value_t = 1)]
    line: usize,

    /// Diff this function right away
    #[arg(long)]
    symbol: Option<String>,

    /// Log file (defaults to <cache dir>/asm-diff/asmdiff.log)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// Log to a file: stderr belongs to the terminal UI. Logging stays off if
/// the file cannot be opened.
fn init_logging(log_file: Option<&Path>) {
    let path = match log_file {
        Some(p) => p.to_path_buf(),
        None => match dirs::cache_dir() {
            Some(dir) => dir.join("asm-diff").join("asmdiff.log"),
            None => return,
        },
    };
    if let Some(dir) = path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    let file = match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
        Ok(f) => f,
        Err(_) => return,
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format_timestamp_millis()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref());

    let settings = Settings::load(&cli.workspace);
    let mut app = App::new(&cli.file, &cli.workspace, settings)?;
    app.editor.goto_line(cli.line.saturating_sub(1));
    log::info!(
        "opened {} in workspace {}",
        app.editor.path().display(),
        app.workspace.display()
    );

    if let Some(ref symbol) = cli.symbol {
        app.request_diff(Some(symbol));
    }

    // Load syntax highlighting (once, reused across reloads)
    let mut highlighter = ui::highlight::Highlighter::new();

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app, &mut highlighter);

    // Cleanup
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    // Dispose the panel so a running tool is not left behind
    app.close_panel();

    if let Err(err) = result {
        log::error!("{:?}", err);
        eprintln!("Error: {:?}", err);
    }
    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    hl: &mut ui::highlight::Highlighter,
) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    // Channel for save events
    let (watch_tx, watch_rx) = mpsc::channel::<WatchEvent>();

    let source_dir = app
        .editor
        .path()
        .parent()
        .map(Path::to_path_buf)
        .context("Source file has no parent directory")?;
    let debounce_ms = app.settings.config().watch.debounce_ms;
    let _watcher: Option<FileWatcher> = match FileWatcher::new(&source_dir, debounce_ms, watch_tx) {
        Ok(w) => {
            app.watching = true;
            Some(w)
        }
        Err(e) => {
            log::warn!("save events unavailable: {:#}", e);
            app.notify("Not watching for saves");
            None
        }
    };

    loop {
        terminal.draw(|f| ui::draw(f, app, hl))?;

        // Sleep until a key arrives or the next line ping is due
        if event::poll(app.poll_timeout(Instant::now()))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if app.overlay.is_some() {
                        handle_overlay_input(app, key);
                    } else {
                        match app.input_mode {
                            InputMode::Context => handle_context_input(app, key),
                            InputMode::Normal => handle_normal_input(app, key),
                        }
                    }
                }
            }
        }

        // Save events (non-blocking)
        while let Ok(event) = watch_rx.try_recv() {
            match event {
                WatchEvent::Saved(path) => app.on_saved(&path),
                WatchEvent::Failed(msg) => {
                    app.watching = false;
                    app.notify(&format!("Watch error: {}", msg));
                }
            }
        }

        app.poll_jobs();
        app.sync_tick(Instant::now());

        // Used for auto-clearing notifications
        app.tick();

        if app.should_quit {
            return Ok(());
        }
    }
}

fn handle_overlay_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.overlay_next(),
        KeyCode::Char('k') | KeyCode::Up => app.overlay_prev(),
        KeyCode::Enter => app.overlay_select(),
        KeyCode::Char('s') => app.overlay_choose_current(),
        KeyCode::Backspace => app.overlay_go_up(),
        KeyCode::Esc | KeyCode::Char('q') => app.overlay_close(),
        _ => {}
    }
}

fn handle_context_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => app.submit_context(),
        KeyCode::Esc => app.cancel_context(),
        KeyCode::Backspace => {
            app.context_input.pop();
        }
        KeyCode::Char(c) => app.context_input.push(c),
        _ => {}
    }
}

fn handle_normal_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') if key.modifiers.contains(KeyModifiers::CONTROL) => app.should_quit = true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => app.should_quit = true,
        KeyCode::Char('q') => app.should_quit = true,

        // Cursor
        KeyCode::Char('j') | KeyCode::Down => app.move_cursor(1),
        KeyCode::Char('k') | KeyCode::Up => app.move_cursor(-1),
        KeyCode::Char('h') | KeyCode::Left => app.move_column(-1),
        KeyCode::Char('l') | KeyCode::Right => app.move_column(1),
        KeyCode::PageDown => app.move_cursor(20),
        KeyCode::PageUp => app.move_cursor(-20),
        KeyCode::Char('g') | KeyCode::Home => app.editor.goto_line(0),
        KeyCode::Char('G') | KeyCode::End => app.editor.goto_end(),

        // Selection
        KeyCode::Char('v') => app.editor.toggle_selection(),
        KeyCode::Char('w') => app.editor.select_word(),

        // Diffing
        KeyCode::Char('d') => app.request_diff(None),
        KeyCode::Char('r') => app.rerun_diff(),
        KeyCode::Char('x') => app.close_panel(),

        // Tool paths and code generation
        KeyCode::Char('p') => app.open_path_picker(ToolKind::AsmDiff),
        KeyCode::Char('P') => app.open_path_picker(ToolKind::M2c),
        KeyCode::Char('c') => app.start_codegen(),
        _ => {}
    }
}
