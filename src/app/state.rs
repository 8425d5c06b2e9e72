use crate::codegen::{self, CodegenError, CodegenJob, CodegenTarget};
use crate::config::Settings;
use crate::editor::SourceEditor;
use crate::panel::message::SurfaceMessage;
use crate::panel::PanelChannel;
use crate::session::{DiffSession, RequestError};
use crate::surface::TerminalSurface;
use crate::tool::{self, DiffResult, ErrorKind, ToolKind};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// How long a notification stays on screen
const NOTICE_TTL: Duration = Duration::from_secs(3);

/// Upper bound on how long the event loop sleeps waiting for input
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Whether keys move the cursor or type into the context prompt
#[derive(Debug, Clone, PartialEq)]
pub enum InputMode {
    Normal,
    Context,
}

// ── Overlay types ──

/// A directory entry for the tool path picker
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    /// Directory holding the tool's script
    pub has_script: bool,
}

/// Active overlay popup state
#[derive(Debug, Clone)]
pub enum OverlayData {
    PathPicker {
        tool: ToolKind,
        current_path: String,
        entries: Vec<DirEntry>,
        selected: usize,
    },
}

// ── Main App State ──

pub struct App {
    pub workspace: PathBuf,
    pub editor: SourceEditor,
    pub settings: Settings,
    pub session: DiffSession,
    pub panel: PanelChannel<TerminalSurface>,

    /// Running m2c invocation, if any
    pub codegen: Option<CodegenJob>,

    pub input_mode: InputMode,

    /// Context file being typed in the m2c prompt
    pub context_input: String,

    /// Pragma the m2c prompt was opened for
    pending_target: Option<CodegenTarget>,

    /// Whether the panel's message handlers are installed
    panel_hooked: bool,

    /// Should the app quit?
    pub should_quit: bool,

    /// Active overlay popup (None = no overlay)
    pub overlay: Option<OverlayData>,

    /// Whether save events are being delivered
    pub watching: bool,

    /// Last notification and when it was posted
    pub watch_message: Option<String>,
    watch_message_at: Instant,
}

impl App {
    pub fn new(file: &Path, workspace: &Path, settings: Settings) -> Result<Self> {
        let workspace = std::fs::canonicalize(workspace)
            .with_context(|| format!("Workspace not found: {}", workspace.display()))?;
        let file = std::fs::canonicalize(file)
            .with_context(|| format!("File not found: {}", file.display()))?;
        let editor = SourceEditor::open(&file)?;

        let config = settings.config();
        let panel = PanelChannel::new(
            config.asset_root(),
            Duration::from_millis(config.panel.sync_interval_ms.max(1)),
        );

        Ok(App {
            session: DiffSession::new(workspace.clone()),
            workspace,
            editor,
            settings,
            panel,
            codegen: None,
            input_mode: InputMode::Normal,
            context_input: String::new(),
            pending_target: None,
            panel_hooked: false,
            should_quit: false,
            overlay: None,
            watching: false,
            watch_message: None,
            watch_message_at: Instant::now(),
        })
    }

    /// Short workspace name for the top bar
    pub fn workspace_name(&self) -> String {
        self.workspace
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.workspace.display().to_string())
    }

    /// Source path relative to the workspace, when it is inside it
    pub fn display_path(&self) -> String {
        let path = self.editor.path();
        path.strip_prefix(&self.workspace)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    /// The panel shows a diff of content that has since changed on disk
    pub fn is_stale(&self) -> bool {
        self.panel.is_active() && self.session.is_stale(self.editor.digest())
    }

    // ── Diffing ──

    /// Diff the function under the cursor (or `explicit`).
    pub fn request_diff(&mut self, explicit: Option<&str>) {
        let result = self
            .session
            .request(explicit, &self.editor, &self.settings, &mut self.panel);
        self.after_launch(result);
    }

    /// Run the tracked function again, as a save would.
    pub fn rerun_diff(&mut self) {
        match self.session.rerun(&self.settings, &mut self.panel) {
            Some(result) => self.after_launch(result),
            None => self.notify("No function tracked yet"),
        }
    }

    fn after_launch(&mut self, result: std::result::Result<u64, RequestError>) {
        match result {
            Ok(generation) => {
                log::debug!("launched diff #{}", generation);
                self.hook_panel();
            }
            Err(RequestError::Refused(kind)) => {
                self.notify(&kind.to_string());
                if kind == ErrorKind::ToolPathUnset {
                    self.open_path_picker(ToolKind::AsmDiff);
                }
            }
            Err(e) => self.notify(&e.to_string()),
        }
    }

    fn hook_panel(&mut self) {
        if self.panel_hooked || !self.panel.is_active() {
            return;
        }
        self.panel.on_message(Box::new(|message| match message {
            SurfaceMessage::Scanned { rows } => log::debug!("surface indexed {} rows", rows),
        }));
        self.panel_hooked = true;
    }

    /// The user closed the diff panel.
    pub fn close_panel(&mut self) {
        if !self.panel.is_active() {
            return;
        }
        self.panel.dispose(&mut self.session);
        self.panel_hooked = false;
        self.notify("Panel closed");
    }

    /// A file in the source's directory was written.
    pub fn on_saved(&mut self, path: &Path) {
        if path != self.editor.path() {
            return;
        }
        match self.editor.reload() {
            Ok(true) => log::info!("reloaded {}", path.display()),
            Ok(false) => {}
            Err(e) => {
                self.notify(&format!("Reload failed: {}", e));
                return;
            }
        }
        if let Some(result) = self.session.on_save(path, &self.settings, &mut self.panel) {
            self.after_launch(result);
        }
    }

    /// Collect finished tool runs.
    pub fn poll_jobs(&mut self) {
        if let Some(result) = self.session.poll(&mut self.panel) {
            if let Some(kind) = result.kind() {
                self.notify(&kind.to_string());
            }
        }

        let finished = self
            .codegen
            .as_mut()
            .and_then(|job| job.poll().map(|result| (job.target().clone(), result)));
        if let Some((target, result)) = finished {
            self.codegen = None;
            self.finish_codegen(&target, result);
        }
    }

    /// Drive the panel: inbound messages, line pings, surface-side handling.
    pub fn sync_tick(&mut self, now: Instant) {
        self.panel.tick(now, Some(&self.editor));
        if let Some(surface) = self.panel.surface_mut() {
            surface.pump();
        }
    }

    /// How long the event loop may block on input
    pub fn poll_timeout(&self, now: Instant) -> Duration {
        self.panel
            .until_next_tick(now)
            .map_or(IDLE_POLL, |due| due.min(IDLE_POLL))
    }

    pub fn is_busy(&self) -> bool {
        self.session.is_running() || self.codegen.is_some()
    }

    // ── Code generation ──

    /// Start generating code for the pragma on the cursor line: asks for
    /// the context file first.
    pub fn start_codegen(&mut self) {
        if self.codegen.is_some() {
            self.notify("m2c is already running");
            return;
        }
        match codegen::target_at_cursor(&self.editor, &self.settings) {
            Ok(target) => {
                self.context_input = self.settings.config().m2c.context.clone();
                self.pending_target = Some(target);
                self.input_mode = InputMode::Context;
            }
            Err(CodegenError::PathUnset) => {
                self.notify(&CodegenError::PathUnset.to_string());
                self.open_path_picker(ToolKind::M2c);
            }
            Err(e) => self.notify(&e.to_string()),
        }
    }

    pub fn submit_context(&mut self) {
        self.input_mode = InputMode::Normal;
        let context = self.context_input.trim().to_string();
        let Some(target) = self.pending_target.take() else {
            return;
        };
        if context.is_empty() {
            return;
        }

        match CodegenJob::start(target, &context, &self.settings, &self.workspace) {
            Ok(job) => {
                self.codegen = Some(job);
                self.notify("Running m2c...");
            }
            Err(e) => {
                log::warn!("could not launch m2c: {}", e);
                self.notify(&ErrorKind::UnknownFailure.to_string());
            }
        }
    }

    pub fn cancel_context(&mut self) {
        self.input_mode = InputMode::Normal;
        self.pending_target = None;
        self.context_input.clear();
    }

    fn finish_codegen(&mut self, target: &CodegenTarget, result: DiffResult) {
        match result {
            DiffResult::Success { html: code } => {
                match codegen::apply(&mut self.editor, target, &code) {
                    Ok(true) => self.notify("Code generated!"),
                    Ok(false) => self.notify("Pragma line changed, nothing written"),
                    Err(e) => self.notify(&format!("{:#}", e)),
                }
            }
            DiffResult::Failure(failure) => self.notify(&failure.kind.to_string()),
        }
    }

    // ── Cursor ──

    pub fn move_cursor(&mut self, lines: isize) {
        self.editor.move_lines(lines);
    }

    pub fn move_column(&mut self, columns: isize) {
        self.editor.move_columns(columns);
    }

    // ── Overlay: tool path picker ──

    /// Browse for a tool directory, starting at the workspace root.
    pub fn open_path_picker(&mut self, tool: ToolKind) {
        let start_path = self.workspace.to_string_lossy().to_string();
        let entries = Self::read_directory(&start_path, tool);
        self.overlay = Some(OverlayData::PathPicker {
            tool,
            current_path: start_path,
            entries,
            selected: 0,
        });
    }

    pub fn overlay_next(&mut self) {
        match &mut self.overlay {
            Some(OverlayData::PathPicker { entries, selected, .. }) => {
                if *selected + 1 < entries.len() {
                    *selected += 1;
                }
            }
            None => {}
        }
    }

    pub fn overlay_prev(&mut self) {
        match &mut self.overlay {
            Some(OverlayData::PathPicker { selected, .. }) => {
                *selected = selected.saturating_sub(1);
            }
            None => {}
        }
    }

    /// Enter: choose a directory that holds the script, descend into any other
    pub fn overlay_select(&mut self) {
        let overlay = match self.overlay.take() {
            Some(o) => o,
            None => return,
        };

        match overlay {
            OverlayData::PathPicker {
                tool,
                current_path,
                entries,
                selected,
            } => {
                let entry = entries.get(selected).filter(|e| e.is_dir).cloned();
                match entry {
                    Some(entry) => {
                        let full_path = Path::new(&current_path).join(&entry.name);
                        if entry.has_script {
                            self.set_tool_path(tool, &full_path);
                        } else {
                            let full_path = full_path.to_string_lossy().to_string();
                            self.overlay = Some(OverlayData::PathPicker {
                                tool,
                                entries: Self::read_directory(&full_path, tool),
                                current_path: full_path,
                                selected: 0,
                            });
                        }
                    }
                    None => {
                        // Restore overlay if nothing was chosen
                        self.overlay = Some(OverlayData::PathPicker {
                            tool,
                            current_path,
                            entries,
                            selected,
                        });
                    }
                }
            }
        }
    }

    /// `s`: choose the directory currently being browsed
    pub fn overlay_choose_current(&mut self) {
        if let Some(OverlayData::PathPicker {
            tool, current_path, ..
        }) = self.overlay.take()
        {
            self.set_tool_path(tool, Path::new(&current_path));
        }
    }

    /// Go up one directory in the path picker
    pub fn overlay_go_up(&mut self) {
        if let Some(OverlayData::PathPicker {
            tool,
            current_path,
            entries,
            selected,
        }) = &mut self.overlay
        {
            if let Some(parent) = Path::new(current_path.as_str()).parent() {
                let parent_str = parent.to_string_lossy().to_string();
                if !parent_str.is_empty() {
                    *entries = Self::read_directory(&parent_str, *tool);
                    *current_path = parent_str;
                    *selected = 0;
                }
            }
        }
    }

    pub fn overlay_close(&mut self) {
        self.overlay = None;
    }

    /// Validate `dir` for `tool` and store it relative to the workspace.
    pub fn set_tool_path(&mut self, tool: ToolKind, dir: &Path) {
        let relative = match tool::validate_tool_dir(&self.workspace, dir, tool) {
            Ok(relative) => relative,
            Err(e) => {
                self.notify(&e.to_string());
                return;
            }
        };
        let value = relative.to_string_lossy().to_string();
        match self.settings.set(tool.config_key(), &value) {
            Ok(()) => self.notify(&format!("{} path set to {}", tool.label(), value)),
            Err(e) => self.notify(&format!("Failed to save: {}", e)),
        }
    }

    /// Directories first, then files; hidden entries skipped
    fn read_directory(path: &str, tool: ToolKind) -> Vec<DirEntry> {
        let mut entries = Vec::new();
        if let Ok(read_dir) = std::fs::read_dir(path) {
            for entry in read_dir.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') {
                    continue;
                }
                if let Ok(metadata) = entry.metadata() {
                    let is_dir = metadata.is_dir();
                    let has_script = is_dir && entry.path().join(tool.script()).is_file();
                    entries.push(DirEntry {
                        name,
                        is_dir,
                        has_script,
                    });
                }
            }
        }
        entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });
        entries
    }

    // ── Notifications ──

    pub fn notify(&mut self, msg: &str) {
        log::info!("notice: {}", msg);
        self.watch_message = Some(msg.to_string());
        self.watch_message_at = Instant::now();
    }

    /// Called on every event loop iteration, clears stale notifications
    pub fn tick(&mut self) {
        if self.watch_message.is_some() && self.watch_message_at.elapsed() > NOTICE_TTL {
            self.watch_message = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AsmDiffConfig;

    const SOURCE: &str = "#include \"common.h\"\n\nvoid func_80001000(void) {\n    return;\n}\n\n#pragma GLOBAL_ASM(\"asm/func_80002000.s\")\n";

    fn make_app(config: AsmDiffConfig) -> (tempfile::TempDir, App) {
        let ws = tempfile::tempdir().unwrap();
        let file = ws.path().join("code.c");
        std::fs::write(&file, SOURCE).unwrap();
        let app = App::new(&file, ws.path(), Settings::in_memory(config)).unwrap();
        (ws, app)
    }

    fn tool_dir(ws: &Path, rel: &str, script: &str) -> PathBuf {
        let dir = ws.join(rel);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(script), "").unwrap();
        dir
    }

    #[test]
    fn unset_path_opens_picker() {
        let (_ws, mut app) = make_app(AsmDiffConfig::default());
        app.editor.goto_line(3);
        app.request_diff(None);

        assert_eq!(
            app.watch_message.as_deref(),
            Some("No path set for the tool, please set one")
        );
        assert!(matches!(
            app.overlay,
            Some(OverlayData::PathPicker {
                tool: ToolKind::AsmDiff,
                ..
            })
        ));
        assert!(!app.panel.is_active());
    }

    #[test]
    fn no_symbol_is_reported() {
        let mut config = AsmDiffConfig::default();
        config.tools.path = Some("tools".to_string());
        let (_ws, mut app) = make_app(config);
        app.request_diff(None);
        assert_eq!(app.watch_message.as_deref(), Some("No function found or selected"));
        assert!(!app.panel.is_active());
    }

    #[test]
    fn picker_stores_relative_path() {
        let (_ws, mut app) = make_app(AsmDiffConfig::default());
        tool_dir(&app.workspace, "tools/asm-differ", "diff.py");

        app.open_path_picker(ToolKind::AsmDiff);
        let Some(OverlayData::PathPicker { entries, .. }) = &app.overlay else {
            panic!("picker not open");
        };
        assert_eq!(entries[0].name, "tools");
        assert!(entries[0].is_dir && !entries[0].has_script);
        assert!(entries.iter().any(|e| e.name == "code.c" && !e.is_dir));

        // descend into tools/, then pick asm-differ
        app.overlay_select();
        app.overlay_select();
        assert!(app.overlay.is_none());
        assert_eq!(app.settings.get("path").as_deref(), Some("tools/asm-differ"));
        assert_eq!(
            app.watch_message.as_deref(),
            Some("asm-diff path set to tools/asm-differ")
        );
    }

    #[test]
    fn picker_rejects_bad_directories() {
        let (_ws, mut app) = make_app(AsmDiffConfig::default());
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("diff.py"), "").unwrap();

        app.set_tool_path(ToolKind::AsmDiff, outside.path());
        assert_eq!(app.watch_message.as_deref(), Some("Path must be relative to workspace"));

        let empty = app.workspace.join("empty");
        std::fs::create_dir_all(&empty).unwrap();
        app.set_tool_path(ToolKind::M2c, &empty);
        assert_eq!(app.watch_message.as_deref(), Some("Invalid path, m2c.py not found"));
        assert!(!app.settings.has("path") && !app.settings.has("path:m2c"));
    }

    #[test]
    fn choose_current_and_go_up() {
        let (_ws, mut app) = make_app(AsmDiffConfig::default());
        let dir = tool_dir(&app.workspace, "tools/m2c", "m2c.py");

        app.open_path_picker(ToolKind::M2c);
        app.overlay_select();
        let Some(OverlayData::PathPicker { current_path, .. }) = &app.overlay else {
            panic!("picker closed");
        };
        assert_eq!(Path::new(current_path), app.workspace.join("tools").as_path());

        app.overlay_go_up();
        app.overlay_choose_current();
        assert!(app.overlay.is_none());
        assert_eq!(app.watch_message.as_deref(), Some("Invalid path, m2c.py not found"));

        app.set_tool_path(ToolKind::M2c, &dir);
        assert_eq!(app.settings.get("path:m2c").as_deref(), Some("tools/m2c"));
    }

    #[test]
    fn codegen_prompts_for_context() {
        let mut config = AsmDiffConfig::default();
        config.tools.m2c_path = Some("m2c".to_string());
        config.m2c.context = "include/ctx.c".to_string();
        let (_ws, mut app) = make_app(config);

        app.start_codegen();
        assert_eq!(app.watch_message.as_deref(), Some("No ASM function found"));
        assert_eq!(app.input_mode, InputMode::Normal);

        app.editor.goto_line(6);
        app.start_codegen();
        assert_eq!(app.input_mode, InputMode::Context);
        assert_eq!(app.context_input, "include/ctx.c");

        app.context_input.clear();
        app.submit_context();
        assert_eq!(app.input_mode, InputMode::Normal);
        assert!(app.codegen.is_none());
    }

    #[test]
    fn codegen_without_path_opens_m2c_picker() {
        let (_ws, mut app) = make_app(AsmDiffConfig::default());
        app.editor.goto_line(6);
        app.start_codegen();
        assert!(matches!(
            app.overlay,
            Some(OverlayData::PathPicker {
                tool: ToolKind::M2c,
                ..
            })
        ));
    }

    #[test]
    fn notifications_expire() {
        let (_ws, mut app) = make_app(AsmDiffConfig::default());
        app.notify("hello");
        app.tick();
        assert!(app.watch_message.is_some());
        app.watch_message_at = Instant::now() - Duration::from_secs(10);
        app.tick();
        assert!(app.watch_message.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn save_of_tracked_file_reruns_diff() {
        let mut config = AsmDiffConfig::default();
        config.tools.interpreter = "sh".to_string();
        config.tools.path = Some("tools".to_string());
        config.panel.assets = Some("/nonexistent-assets".to_string());
        let (_ws, mut app) = make_app(config);
        std::fs::create_dir_all(app.workspace.join("tools")).unwrap();
        std::fs::write(
            app.workspace.join("tools/diff.py"),
            "echo \"$4\" >> calls.log\nprintf \"<table class='diff'><tbody></tbody></table>\"\n",
        )
        .unwrap();

        app.editor.goto_line(3);
        app.request_diff(None);
        assert!(app.panel.is_active());
        let deadline = Instant::now() + Duration::from_secs(10);
        while app.session.is_running() {
            assert!(Instant::now() < deadline);
            app.poll_jobs();
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(app.session.tracked().unwrap().symbol, "func_80001000");

        let path = app.editor.path().to_path_buf();
        std::fs::write(&path, SOURCE.replace("return;", "return; ")).unwrap();
        app.editor.goto_line(0);
        app.on_saved(&path);
        assert!(app.session.is_running());
        assert_eq!(app.session.generation(), 2);

        app.close_panel();
        assert!(!app.panel.is_active());
        assert!(app.session.tracked().is_none());
    }
}
