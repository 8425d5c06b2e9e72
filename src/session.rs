use crate::config::Settings;
use crate::editor::{content_digest, resolve_target_symbol, Editor};
use crate::panel::message::HostMessage;
use crate::panel::template::DIFFER_TEMPLATE;
use crate::panel::{PanelChannel, Surface};
use crate::tool::{self, classify, strip_control, DiffFailure, DiffResult, ErrorKind, ProcessRunner, RunHandle, ToolKind};
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use v_htmlescape::escape;

const FACES: &[&str] = &[
    "°՞(ᗒᗣᗕ)՞°",
    "(っ◞‸◟ c)",
    "｡°(°.◜ᯅ◝°)°｡",
    "(◞‸◟；)",
    "ヽ(´□｀。)ﾉ",
];

/// The function a session diffs and the file whose saves re-trigger it.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffRequest {
    pub symbol: String,
    pub source_file: PathBuf,
}

/// Reasons a request is turned down before any process is launched.
#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("No active editor")]
    NoActiveEditor,
    #[error("No function found or selected")]
    NoSymbolResolved,
    #[error("{0}")]
    Refused(ErrorKind),
}

struct InFlight {
    request: DiffRequest,
    run: RunHandle,
    digest: Option<String>,
}

/// Tracks one function across edits: resolves it once, re-runs the diff
/// tool on every save of its file and renders each result into the panel.
///
/// Only the most recent launch can reach the panel. A new launch kills the
/// previous child, and completions carrying an older generation are dropped.
pub struct DiffSession {
    workspace_root: PathBuf,
    tracked: Option<DiffRequest>,
    generation: u64,
    inflight: Option<InFlight>,
    shown_digest: Option<String>,
}

impl DiffSession {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self {
            workspace_root,
            tracked: None,
            generation: 0,
            inflight: None,
            shown_digest: None,
        }
    }

    pub fn tracked(&self) -> Option<&DiffRequest> {
        self.tracked.as_ref()
    }

    /// Number of processes launched so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        self.inflight.is_some()
    }

    /// Whether the panel shows a result built from content other than `current_digest`
    pub fn is_stale(&self, current_digest: &str) -> bool {
        self.shown_digest
            .as_deref()
            .is_some_and(|shown| shown != current_digest)
    }

    /// Start a diff. `explicit` wins over the tracked function, which wins
    /// over whatever the cursor or selection resolves to. Returns the
    /// generation of the launched run.
    pub fn request<S: Surface>(
        &mut self,
        explicit: Option<&str>,
        editor: &dyn Editor,
        settings: &Settings,
        panel: &mut PanelChannel<S>,
    ) -> Result<u64, RequestError> {
        let document = editor
            .document_path()
            .ok_or(RequestError::NoActiveEditor)?
            .to_path_buf();

        let request = match (explicit, &self.tracked) {
            (Some(symbol), _) => DiffRequest {
                symbol: symbol.trim().to_string(),
                source_file: document,
            },
            (None, Some(tracked)) => tracked.clone(),
            (None, None) => DiffRequest {
                symbol: resolve_target_symbol(editor).ok_or(RequestError::NoSymbolResolved)?,
                source_file: document,
            },
        };
        if request.symbol.is_empty() {
            return Err(RequestError::NoSymbolResolved);
        }

        self.launch(request, settings, panel)
    }

    /// Re-run the tracked function, if there is one.
    pub fn rerun<S: Surface>(
        &mut self,
        settings: &Settings,
        panel: &mut PanelChannel<S>,
    ) -> Option<Result<u64, RequestError>> {
        let request = self.tracked.clone()?;
        Some(self.launch(request, settings, panel))
    }

    /// A file was saved. Re-runs with the stored symbol when it is the
    /// tracked file; anything else is ignored.
    pub fn on_save<S: Surface>(
        &mut self,
        path: &Path,
        settings: &Settings,
        panel: &mut PanelChannel<S>,
    ) -> Option<Result<u64, RequestError>> {
        let tracked = self.tracked.as_ref()?;
        if !same_file(&tracked.source_file, path) {
            return None;
        }
        log::debug!("save of tracked file {}", path.display());
        self.rerun(settings, panel)
    }

    fn launch<S: Surface>(
        &mut self,
        request: DiffRequest,
        settings: &Settings,
        panel: &mut PanelChannel<S>,
    ) -> Result<u64, RequestError> {
        let tool_dir = settings
            .get(ToolKind::AsmDiff.config_key())
            .ok_or(RequestError::Refused(ErrorKind::ToolPathUnset))?;
        let interpreter = settings.config().tools.interpreter.clone();

        panel.create();

        if let Some(mut prior) = self.inflight.take() {
            log::info!("superseding run #{}", prior.run.generation());
            prior.run.cancel();
        }
        self.generation += 1;
        let generation = self.generation;

        let command = tool::diff_command(&interpreter, Path::new(&tool_dir), &request.symbol);
        let digest = std::fs::read_to_string(&request.source_file)
            .ok()
            .map(|text| content_digest(&text));

        match ProcessRunner::spawn(&command, &self.workspace_root, generation) {
            Ok(run) => {
                self.inflight = Some(InFlight {
                    request,
                    run,
                    digest,
                });
            }
            Err(e) => {
                log::warn!("could not launch {}: {}", command.display(), e);
                let failure = DiffFailure::new(ErrorKind::UnknownFailure, e.to_string());
                self.apply(DiffResult::Failure(failure), request, digest, panel);
            }
        }
        Ok(generation)
    }

    /// Collect the current run's output once it has terminated and render
    /// it. Returns the applied result.
    pub fn poll<S: Surface>(&mut self, panel: &mut PanelChannel<S>) -> Option<DiffResult> {
        let raw = self.inflight.as_mut()?.run.poll()?;
        let finished = self.inflight.take()?;

        if finished.run.generation() != self.generation {
            log::info!(
                "dropping result of #{} (current #{})",
                finished.run.generation(),
                self.generation
            );
            return None;
        }

        let result = classify(ToolKind::AsmDiff.profile(), &raw.text);
        log::info!(
            "#{} {}: {}",
            self.generation,
            finished.request.symbol,
            match &result {
                DiffResult::Success { .. } => "diff ready".to_string(),
                DiffResult::Failure(f) => format!("{:?}", f.kind),
            }
        );
        self.apply(result.clone(), finished.request, finished.digest, panel);
        Some(result)
    }

    fn apply<S: Surface>(
        &mut self,
        result: DiffResult,
        request: DiffRequest,
        digest: Option<String>,
        panel: &mut PanelChannel<S>,
    ) {
        let buffer = match result {
            DiffResult::Success { html } => {
                if self.tracked.is_none() {
                    log::info!("tracking {} in {}", request.symbol, request.source_file.display());
                    self.tracked = Some(request);
                }
                html
            }
            DiffResult::Failure(failure) => error_fragment(&failure),
        };

        let values = HashMap::from([("buffer".to_string(), buffer)]);
        if let Err(e) = panel.render(DIFFER_TEMPLATE, &values) {
            log::warn!("could not render result: {:#}", e);
            return;
        }
        panel.send(&HostMessage::Rebuild);
        self.shown_digest = digest;
    }

    /// Forget the tracked function and stop any running diff.
    pub fn clear(&mut self) {
        if let Some(mut inflight) = self.inflight.take() {
            inflight.run.cancel();
        }
        self.tracked = None;
        self.shown_digest = None;
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Panel body for a failed run: a banner with a random face, the kind's
/// message and every non-empty line of the tool's output.
pub fn error_fragment(failure: &DiffFailure) -> String {
    let face = FACES.choose(&mut rand::rng()).copied().unwrap_or("");
    let mut out = String::from("<div class=\"error-app\">");
    out.push_str(&format!(
        "<p>An error occurred during compilation {}</p>",
        face
    ));
    out.push_str(&format!(
        "<p class=\"error-kind\">{}</p>",
        escape(&failure.kind.to_string())
    ));
    for line in strip_control(&failure.detail).lines() {
        let line = line.trim();
        if !line.is_empty() {
            out.push_str(&format!("<span class=\"error\">{}</span>", escape(line)));
        }
    }
    out.push_str("</div>");
    out
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::AsmDiffConfig;
    use crate::editor::tests::{symbol, FakeEditor};
    use crate::editor::Position;
    use crate::panel::tests::{test_panel, RecordingSurface};
    use std::time::{Duration, Instant};

    const DIFF_SCRIPT: &str = r#"echo "$4" >> calls.log
if [ "$4" = slow ]; then sleep 5; fi
if [ "$4" = missing ]; then echo "Not able to find function $4" >&2; exit 1; fi
printf "building...\n<table class='diff'><tbody><tr><td>%s {buffer}</td></tr></tbody></table>" "$4"
"#;

    struct Fixture {
        workspace: tempfile::TempDir,
        settings: Settings,
        panel: PanelChannel<RecordingSurface>,
        session: DiffSession,
        editor: FakeEditor,
    }

    fn fixture(with_path: bool) -> Fixture {
        let workspace = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(workspace.path().join("tools")).unwrap();
        std::fs::write(workspace.path().join("tools/diff.py"), DIFF_SCRIPT).unwrap();
        let source = workspace.path().join("code.c");
        std::fs::write(&source, "void first(void) {\n}\nvoid second(void) {\n}\n").unwrap();

        let mut config = AsmDiffConfig::default();
        config.tools.interpreter = "sh".to_string();
        if with_path {
            config.tools.path = Some("tools".to_string());
        }

        let editor = FakeEditor {
            path: Some(source),
            cursor: Some(Position::new(0, 5)),
            symbols: vec![symbol("first(void)", 0, 1), symbol("second(void)", 2, 3)],
            ..Default::default()
        };

        Fixture {
            panel: test_panel(workspace.path()),
            session: DiffSession::new(workspace.path().to_path_buf()),
            settings: Settings::in_memory(config),
            workspace,
            editor,
        }
    }

    impl Fixture {
        fn settle(&mut self) -> DiffResult {
            let deadline = Instant::now() + Duration::from_secs(10);
            loop {
                if let Some(result) = self.session.poll(&mut self.panel) {
                    return result;
                }
                assert!(Instant::now() < deadline, "diff never finished");
                std::thread::sleep(Duration::from_millis(10));
            }
        }

        fn calls(&self) -> Vec<String> {
            std::fs::read_to_string(self.workspace.path().join("calls.log"))
                .unwrap_or_default()
                .lines()
                .map(|l| l.to_string())
                .collect()
        }

        fn html(&self) -> &str {
            self.panel.surface().unwrap().current_html()
        }
    }

    #[test]
    fn unset_path_refuses_without_launching() {
        let mut f = fixture(false);
        let err = f
            .session
            .request(None, &f.editor, &f.settings, &mut f.panel)
            .unwrap_err();
        assert_eq!(err, RequestError::Refused(ErrorKind::ToolPathUnset));
        assert_eq!(f.session.generation(), 0);
        assert!(!f.session.is_running());
        assert!(f.panel.surface().is_none());
        assert!(f.calls().is_empty());
    }

    #[test]
    fn unresolved_symbol_is_a_precondition_failure() {
        let mut f = fixture(true);
        f.editor.cursor = Some(Position::new(10, 0));
        let err = f
            .session
            .request(None, &f.editor, &f.settings, &mut f.panel)
            .unwrap_err();
        assert_eq!(err, RequestError::NoSymbolResolved);
        assert!(f.panel.surface().is_none());

        let no_doc = FakeEditor::default();
        assert_eq!(
            f.session.request(None, &no_doc, &f.settings, &mut f.panel),
            Err(RequestError::NoActiveEditor)
        );
    }

    #[test]
    fn request_launches_exactly_one_process() {
        let mut f = fixture(true);
        let generation = f
            .session
            .request(None, &f.editor, &f.settings, &mut f.panel)
            .unwrap();
        assert_eq!(generation, 1);
        assert!(f.html().contains("Building"));

        let result = f.settle();
        assert!(result.is_success());
        assert_eq!(f.calls(), vec!["first"]);
        assert_eq!(
            f.session.tracked(),
            Some(&DiffRequest {
                symbol: "first".to_string(),
                source_file: f.workspace.path().join("code.c"),
            })
        );
    }

    #[test]
    fn success_renders_payload_once_and_rebuilds() {
        let mut f = fixture(true);
        f.session
            .request(None, &f.editor, &f.settings, &mut f.panel)
            .unwrap();
        f.settle();

        let html = f.html();
        assert!(!html.contains("building..."));
        assert_eq!(html.matches("<table class='diff'>").count(), 1);
        // placeholder syntax inside the payload is not substituted again
        assert_eq!(html.matches("first {buffer}").count(), 1);
        assert_eq!(
            f.panel.surface().unwrap().posted.last().map(|s| s.as_str()),
            Some(r#"{"command":"rebuild"}"#)
        );
    }

    #[test]
    fn save_reruns_tracked_symbol_after_cursor_moves() {
        let mut f = fixture(true);
        f.session
            .request(None, &f.editor, &f.settings, &mut f.panel)
            .unwrap();
        f.settle();

        f.editor.cursor = Some(Position::new(2, 5));
        let source = f.workspace.path().join("code.c");
        let rerun = f.session.on_save(&source, &f.settings, &mut f.panel);
        assert_eq!(rerun, Some(Ok(2)));
        f.settle();
        assert_eq!(f.calls(), vec!["first", "first"]);

        let other = f.workspace.path().join("other.c");
        assert!(f.session.on_save(&other, &f.settings, &mut f.panel).is_none());
    }

    #[test]
    fn explicit_symbol_wins_but_keeps_tracking() {
        let mut f = fixture(true);
        f.session
            .request(None, &f.editor, &f.settings, &mut f.panel)
            .unwrap();
        f.settle();

        f.session
            .request(Some("func_80001234"), &f.editor, &f.settings, &mut f.panel)
            .unwrap();
        f.settle();
        assert_eq!(f.calls(), vec!["first", "func_80001234"]);
        assert_eq!(f.session.tracked().unwrap().symbol, "first");
    }

    #[test]
    fn failed_first_attempt_leaves_context_unset() {
        let mut f = fixture(true);
        f.session
            .request(Some("missing"), &f.editor, &f.settings, &mut f.panel)
            .unwrap();
        let result = f.settle();
        assert_eq!(result.kind(), Some(ErrorKind::SymbolNotFound));
        assert!(f.session.tracked().is_none());
        assert!(f.html().contains("error-app"));
        assert!(f.html().contains("Not able to find function missing"));

        f.session
            .request(None, &f.editor, &f.settings, &mut f.panel)
            .unwrap();
        f.settle();
        assert_eq!(f.session.tracked().unwrap().symbol, "first");
    }

    #[test]
    fn dispose_resets_sticky_context() {
        let mut f = fixture(true);
        f.session
            .request(None, &f.editor, &f.settings, &mut f.panel)
            .unwrap();
        f.settle();

        f.panel.dispose(&mut f.session);
        assert!(f.session.tracked().is_none());

        f.editor.cursor = Some(Position::new(2, 5));
        f.session
            .request(None, &f.editor, &f.settings, &mut f.panel)
            .unwrap();
        assert!(f.panel.is_active());
        f.settle();
        assert_eq!(f.calls(), vec!["first", "second"]);
        assert_eq!(f.session.tracked().unwrap().symbol, "second");
    }

    #[test]
    fn new_request_cancels_prior_run() {
        let mut f = fixture(true);
        f.session
            .request(Some("slow"), &f.editor, &f.settings, &mut f.panel)
            .unwrap();
        let started = Instant::now();
        let generation = f
            .session
            .request(Some("fast"), &f.editor, &f.settings, &mut f.panel)
            .unwrap();
        assert_eq!(generation, 2);

        let result = f.settle();
        assert!(started.elapsed() < Duration::from_secs(5));
        match result {
            DiffResult::Success { html } => {
                assert!(html.contains("fast"));
                assert!(!html.contains("slow"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!f.session.is_running());
        assert!(f.session.poll(&mut f.panel).is_none());
    }

    #[test]
    fn spawn_failure_renders_unknown_failure() {
        let mut f = fixture(true);
        let mut config = f.settings.config().clone();
        config.tools.interpreter = "/nonexistent/interpreter".to_string();
        let settings = Settings::in_memory(config);

        f.session
            .request(None, &f.editor, &settings, &mut f.panel)
            .unwrap();
        assert!(!f.session.is_running());
        assert!(f.html().contains("error-app"));
        assert!(f.session.tracked().is_none());
    }

    #[test]
    fn staleness_follows_shown_content() {
        let mut f = fixture(true);
        f.session
            .request(None, &f.editor, &f.settings, &mut f.panel)
            .unwrap();
        f.settle();

        let source = f.workspace.path().join("code.c");
        let current = content_digest(&std::fs::read_to_string(&source).unwrap());
        assert!(!f.session.is_stale(&current));
        assert!(f.session.is_stale(&content_digest("edited")));
    }

    #[test]
    fn error_fragment_escapes_and_strips() {
        let failure = DiffFailure::new(
            ErrorKind::ToolExecutionError,
            "\x1b[31mError:\x1b[0m <bad>\n\n  line two  ",
        );
        let html = error_fragment(&failure);
        assert!(html.starts_with("<div class=\"error-app\"><p>An error occurred during compilation "));
        assert!(html.contains("<p class=\"error-kind\">The tool encountered an error</p>"));
        assert!(html.contains("<span class=\"error\">Error: &lt;bad&gt;</span><span class=\"error\">line two</span></div>"));
        assert!(FACES.iter().any(|face| html.contains(face)));
    }

    #[test]
    fn error_fragment_escapes_paths_and_quotes() {
        let failure = DiffFailure::new(
            ErrorKind::SourceNotFound,
            "cc: src/foo.c: No such file or directory
expected ')' & \"x\"",
        );
        let html = error_fragment(&failure);
        assert!(html.contains("<span class=\"error\">cc: src&#x2f;foo.c: No such file or directory</span>"));
        assert!(html.contains("<span class=\"error\">expected &#x27;)&#x27; &amp; &quot;x&quot;</span>"));
        assert!(!html.contains("src/foo.c"));
    }
}
