use super::{DocumentSymbol, Editor, Position, Range};
use anyhow::{Context, Result};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Compute SHA-256 of file content (for staleness detection)
pub fn content_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The source pane's document: file lines, cursor, optional selection and
/// a symbol index rebuilt on every load.
pub struct SourceEditor {
    path: PathBuf,
    lines: Vec<String>,
    symbols: Vec<DocumentSymbol>,
    digest: String,
    cursor: Position,
    anchor: Option<Position>,
}

impl SourceEditor {
    pub fn open(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut editor = Self {
            path: path.to_path_buf(),
            lines: Vec::new(),
            symbols: Vec::new(),
            digest: String::new(),
            cursor: Position::new(0, 0),
            anchor: None,
        };
        editor.load_text(&text);
        Ok(editor)
    }

    fn load_text(&mut self, text: &str) {
        self.lines = text.lines().map(|l| l.to_string()).collect();
        if self.lines.is_empty() {
            self.lines.push(String::new());
        }
        self.symbols = scan_symbols(&self.lines);
        self.digest = content_digest(text);
        self.clamp_cursor();
        self.anchor = self.anchor.and_then(|a| self.clamp(a));
    }

    /// Pull a position back inside the text, or `None` when its line is gone
    fn clamp(&self, pos: Position) -> Option<Position> {
        let width = self.lines.get(pos.line)?.chars().count();
        Some(Position::new(pos.line, pos.column.min(width)))
    }

    /// Re-read the file from disk. Returns whether the content changed.
    pub fn reload(&mut self) -> Result<bool> {
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if content_digest(&text) == self.digest {
            return Ok(false);
        }
        self.load_text(&text);
        Ok(true)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn position(&self) -> Position {
        self.cursor
    }

    // ── Cursor movement ──

    pub fn move_lines(&mut self, delta: isize) {
        let line = self.cursor.line as isize + delta;
        self.cursor.line = line.max(0) as usize;
        self.clamp_cursor();
    }

    pub fn move_columns(&mut self, delta: isize) {
        let column = self.cursor.column as isize + delta;
        self.cursor.column = column.max(0) as usize;
        self.clamp_cursor();
    }

    /// Jump to a zero-based line
    pub fn goto_line(&mut self, line: usize) {
        self.cursor = Position::new(line, 0);
        self.clamp_cursor();
    }

    pub fn goto_end(&mut self) {
        self.goto_line(self.lines.len().saturating_sub(1));
    }

    fn clamp_cursor(&mut self) {
        let last = self.lines.len().saturating_sub(1);
        self.cursor.line = self.cursor.line.min(last);
        let width = self.lines[self.cursor.line].chars().count();
        self.cursor.column = self.cursor.column.min(width);
    }

    // ── Selection ──

    /// Start a selection at the cursor, or drop the current one
    pub fn toggle_selection(&mut self) {
        self.anchor = match self.anchor {
            Some(_) => None,
            None => Some(self.cursor),
        };
    }

    /// Select the identifier under the cursor
    pub fn select_word(&mut self) {
        let chars: Vec<char> = self.lines[self.cursor.line].chars().collect();
        let is_ident = |c: char| c.is_alphanumeric() || c == '_';
        let mut start = self.cursor.column.min(chars.len());
        if start == chars.len() || !is_ident(chars[start]) {
            self.anchor = None;
            return;
        }
        while start > 0 && is_ident(chars[start - 1]) {
            start -= 1;
        }
        let mut end = self.cursor.column;
        while end < chars.len() && is_ident(chars[end]) {
            end += 1;
        }
        self.anchor = Some(Position::new(self.cursor.line, start));
        self.cursor.column = end;
    }

    /// Ordered (start, end) of the selection, end exclusive
    pub fn selection_range(&self) -> Option<(Position, Position)> {
        let anchor = self.anchor?;
        if anchor == self.cursor {
            return None;
        }
        Some((anchor.min(self.cursor), anchor.max(self.cursor)))
    }

    // ── Editing ──

    /// Replace one line with `text` (which may span several lines) and
    /// write the file back to disk.
    pub fn replace_line(&mut self, line: usize, text: &str) -> Result<()> {
        if line >= self.lines.len() {
            anyhow::bail!("Line {} is past the end of {}", line + 1, self.path.display());
        }
        let mut lines = self.lines.clone();
        lines.splice(line..=line, text.lines().map(|l| l.to_string()));
        let mut content = lines.join("\n");
        content.push('\n');
        std::fs::write(&self.path, &content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        self.load_text(&content);
        Ok(())
    }

    /// Symbol the cursor currently sits in, for display
    pub fn symbol_at_cursor(&self) -> Option<&DocumentSymbol> {
        self.symbols
            .iter()
            .filter(|s| s.range.contains(self.cursor))
            .min_by_key(|s| s.range.end.line - s.range.start.line)
    }
}

impl Editor for SourceEditor {
    fn document_path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn cursor(&self) -> Option<Position> {
        Some(self.cursor)
    }

    fn selection_text(&self) -> Option<String> {
        let (start, end) = self.selection_range()?;
        let mut out = String::new();
        for line in start.line..=end.line {
            let chars: Vec<char> = self.lines.get(line)?.chars().collect();
            let from = if line == start.line { start.column } else { 0 };
            let to = if line == end.line { end.column } else { chars.len() };
            out.extend(&chars[from.min(chars.len())..to.min(chars.len())]);
            if line != end.line {
                out.push('\n');
            }
        }
        Some(out)
    }

    fn symbols(&self) -> Vec<DocumentSymbol> {
        self.symbols.clone()
    }

    fn line_text(&self, line: usize) -> Option<&str> {
        self.lines.get(line).map(|l| l.as_str())
    }
}

fn function_header() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| {
        Regex::new(r"([A-Za-z_]\w*)\s*\((.*)\)\s*$").expect("static regex")
    })
}

const NOT_FUNCTIONS: &[&str] = &["if", "for", "while", "switch", "return", "sizeof", "do"];

/// `static s32 func(s32 a, void *b)` -> `func(s32 a, void *b)`
fn function_name(header: &str) -> Option<String> {
    let collapsed = header.split_whitespace().collect::<Vec<_>>().join(" ");
    let caps = function_header().captures(&collapsed)?;
    let ident = caps.get(1)?.as_str();
    if NOT_FUNCTIONS.contains(&ident) {
        return None;
    }
    Some(format!("{}({})", ident, caps.get(2)?.as_str().trim()))
}

/// Find top-level C function definitions. A definition is a brace block at
/// file scope whose preceding text ends in `name(...)`; its range runs from
/// the first character of that text to the closing brace.
fn scan_symbols(lines: &[String]) -> Vec<DocumentSymbol> {
    let mut symbols = Vec::new();
    let mut depth = 0usize;
    let mut header = String::new();
    let mut header_start: Option<Position> = None;
    let mut open: Option<(String, Position)> = None;
    let mut in_block_comment = false;

    for (ln, line) in lines.iter().enumerate() {
        if depth == 0 && !in_block_comment && line.trim_start().starts_with('#') {
            header.clear();
            header_start = None;
            continue;
        }

        let chars: Vec<char> = line.chars().collect();
        let mut in_literal: Option<char> = None;
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            if in_block_comment {
                if c == '*' && next == Some('/') {
                    in_block_comment = false;
                    i += 2;
                } else {
                    i += 1;
                }
                continue;
            }
            if let Some(quote) = in_literal {
                if c == '\\' {
                    i += 2;
                    continue;
                }
                if c == quote {
                    in_literal = None;
                }
                i += 1;
                continue;
            }

            match c {
                '/' if next == Some('/') => break,
                '/' if next == Some('*') => {
                    in_block_comment = true;
                    i += 2;
                    continue;
                }
                '"' | '\'' => in_literal = Some(c),
                '{' => {
                    if depth == 0 {
                        if let Some(name) = function_name(&header) {
                            open = Some((name, header_start.unwrap_or(Position::new(ln, i))));
                        }
                        header.clear();
                        header_start = None;
                    }
                    depth += 1;
                    i += 1;
                    continue;
                }
                '}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        if let Some((name, start)) = open.take() {
                            symbols.push(DocumentSymbol {
                                name,
                                range: Range {
                                    start,
                                    end: Position::new(ln, i + 1),
                                },
                            });
                        }
                        header.clear();
                        header_start = None;
                    }
                    i += 1;
                    continue;
                }
                ';' if depth == 0 => {
                    header.clear();
                    header_start = None;
                    i += 1;
                    continue;
                }
                _ => {}
            }

            if depth == 0 {
                if header_start.is_none() && !c.is_whitespace() {
                    header_start = Some(Position::new(ln, i));
                }
                if header_start.is_some() {
                    header.push(c);
                }
            }
            i += 1;
        }

        if depth == 0 && header_start.is_some() {
            header.push(' ');
        }
    }

    symbols
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::resolve_target_symbol;

    const SOURCE: &str = r#"#include "common.h"

/* helper { not a block */
static s32 D_80001000 = 0;

#pragma GLOBAL_ASM("asm/nonmatchings/code/func_80001234.s")

s32 func_80001300(s32 arg0,
                  s32 arg1) {
    if (arg0 != 0) {
        return arg1; // }
    }
    return "}"[0];
}

void func_80001400(void)
{
    D_80001000++;
}
"#;

    fn editor_for(src: &str) -> (tempfile::TempDir, SourceEditor) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("code.c");
        std::fs::write(&path, src).unwrap();
        let editor = SourceEditor::open(&path).unwrap();
        (dir, editor)
    }

    #[test]
    fn finds_top_level_functions() {
        let (_dir, editor) = editor_for(SOURCE);
        let names: Vec<_> = editor.symbols().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["func_80001300(s32 arg0, s32 arg1)", "func_80001400(void)"]
        );

        let first = &editor.symbols()[0];
        assert_eq!(first.range.start, Position::new(7, 0));
        assert_eq!(first.range.end.line, 13);
    }

    #[test]
    fn cursor_inside_function_resolves_it() {
        let (_dir, mut editor) = editor_for(SOURCE);
        editor.goto_line(10);
        assert_eq!(resolve_target_symbol(&editor).as_deref(), Some("func_80001300"));

        editor.goto_line(17);
        assert_eq!(resolve_target_symbol(&editor).as_deref(), Some("func_80001400"));
    }

    #[test]
    fn cursor_outside_functions_uses_selection() {
        let (_dir, mut editor) = editor_for(SOURCE);
        editor.goto_line(5);
        assert_eq!(resolve_target_symbol(&editor), None);

        editor.move_columns(45);
        editor.select_word();
        assert_eq!(editor.selection_text().as_deref(), Some("func_80001234"));
        assert_eq!(resolve_target_symbol(&editor).as_deref(), Some("func_80001234"));
    }

    #[test]
    fn multi_line_selection() {
        let (_dir, mut editor) = editor_for("abc\ndef\nghi\n");
        editor.move_columns(1);
        editor.toggle_selection();
        editor.move_lines(1);
        assert_eq!(editor.selection_text().as_deref(), Some("bc\nd"));
        editor.toggle_selection();
        assert_eq!(editor.selection_text(), None);
    }

    #[test]
    fn cursor_is_clamped() {
        let (_dir, mut editor) = editor_for("one\ntwo\n");
        editor.move_lines(10);
        assert_eq!(editor.position(), Position::new(1, 0));
        editor.move_columns(99);
        assert_eq!(editor.position(), Position::new(1, 3));
        editor.move_lines(-5);
        assert_eq!(editor.position(), Position::new(0, 3));
    }

    #[test]
    fn reload_reports_changes_only() {
        let (_dir, mut editor) = editor_for("int a;\n");
        let before = editor.digest().to_string();
        assert!(!editor.reload().unwrap());

        std::fs::write(editor.path(), "void f(void) {\n}\n").unwrap();
        assert!(editor.reload().unwrap());
        assert_ne!(editor.digest(), before);
        assert_eq!(editor.symbols().len(), 1);
    }

    #[test]
    fn replace_line_writes_file() {
        let (_dir, mut editor) = editor_for("a\nb\nc\n");
        editor.replace_line(1, "x\ny").unwrap();
        assert_eq!(std::fs::read_to_string(editor.path()).unwrap(), "a\nx\ny\nc\n");
        assert_eq!(editor.lines().len(), 4);
        assert!(editor.replace_line(9, "z").is_err());
    }

    #[test]
    fn cursor_on_closing_brace_resolves_function() {
        let (_dir, mut editor) = editor_for("void f(void) {\n    x = 1;\n}\n");
        editor.goto_line(1);
        editor.move_columns(4);
        editor.move_lines(1);
        assert_eq!(editor.position(), Position::new(2, 1));
        assert_eq!(resolve_target_symbol(&editor).as_deref(), Some("f"));
    }

    #[test]
    fn shrinking_reload_drops_selection_past_end() {
        let src: String = (0..50).map(|i| format!("int v{};\n", i)).collect();
        let (_dir, mut editor) = editor_for(&src);
        editor.goto_line(40);
        editor.toggle_selection();
        editor.goto_line(45);

        std::fs::write(editor.path(), "int a;\nint b;\n").unwrap();
        assert!(editor.reload().unwrap());
        assert_eq!(editor.position(), Position::new(1, 0));
        assert_eq!(editor.selection_range(), None);
        assert_eq!(resolve_target_symbol(&editor), None);
    }

    #[test]
    fn shrinking_reload_clamps_surviving_anchor() {
        let (_dir, mut editor) = editor_for("abcdef\nghi\njkl\n");
        editor.move_columns(5);
        editor.toggle_selection();
        editor.move_lines(2);

        std::fs::write(editor.path(), "ab\ncd\n").unwrap();
        assert!(editor.reload().unwrap());
        assert_eq!(editor.selection_text().as_deref(), Some("\ncd"));
    }
}
