mod source;

pub use source::{content_digest, SourceEditor};

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Zero-based line/column position in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Inclusive start, exclusive end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    /// Both ends inclusive: a cursor just past the closing brace is still
    /// inside the function.
    pub fn contains(&self, pos: Position) -> bool {
        self.start <= pos && pos <= self.end
    }

    /// Ordering key for "smallest enclosing symbol"
    fn extent(&self) -> (usize, usize) {
        let lines = self.end.line.saturating_sub(self.start.line);
        let columns = if lines == 0 {
            self.end.column.saturating_sub(self.start.column)
        } else {
            self.end.column
        };
        (lines, columns)
    }
}

/// A named routine found in the document, as reported by the symbol index.
/// Names may carry a parameter list (`func(s32 arg0)`).
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSymbol {
    pub name: String,
    pub range: Range,
}

/// What the diff session needs from the editor.
pub trait Editor {
    /// Path of the active document
    fn document_path(&self) -> Option<&Path>;

    fn cursor(&self) -> Option<Position>;

    /// Text of the current selection, if any
    fn selection_text(&self) -> Option<String>;

    fn symbols(&self) -> Vec<DocumentSymbol>;

    fn line_text(&self, line: usize) -> Option<&str>;

    /// 1-based cursor line, as pushed to the panel
    fn cursor_line(&self) -> Option<usize> {
        self.cursor().map(|p| p.line + 1)
    }
}

fn param_suffix() -> &'static Regex {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    SUFFIX.get_or_init(|| Regex::new(r"\(.*$").expect("static regex"))
}

/// `func_80001234(s32 arg0)` -> `func_80001234`
pub fn strip_parameter_list(name: &str) -> String {
    param_suffix().replace(name, "").into_owned()
}

/// Pick the function to diff: the smallest symbol containing the cursor,
/// then the trimmed selection. `None` when both come up empty.
pub fn resolve_target_symbol(editor: &dyn Editor) -> Option<String> {
    if let Some(cursor) = editor.cursor() {
        let best = editor
            .symbols()
            .into_iter()
            .filter(|s| s.range.contains(cursor))
            .min_by_key(|s| s.range.extent());
        if let Some(symbol) = best {
            let name = strip_parameter_list(&symbol.name);
            if !name.trim().is_empty() {
                return Some(name.trim().to_string());
            }
        }
    }

    editor
        .selection_text()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
