use crate::config::Settings;
use crate::editor::{Editor, SourceEditor};
use crate::tool::{self, classify, DiffResult, ProcessRunner, RunHandle, ToolKind};
use anyhow::Result;
use regex::Regex;
use std::io;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CodegenError {
    #[error("No path set for m2c, please set one")]
    PathUnset,
    #[error("No ASM function found")]
    NoAsmFunction,
}

fn pragma_pattern() -> &'static Regex {
    static PRAGMA: OnceLock<Regex> = OnceLock::new();
    PRAGMA.get_or_init(|| Regex::new(r#"#pragma GLOBAL_ASM\("([^"]+)"\)"#).expect("static regex"))
}

/// Assembly path named by a `#pragma GLOBAL_ASM("...")` on `line`
pub fn global_asm_directive(line: &str) -> Option<String> {
    let caps = pragma_pattern().captures(line)?;
    let asm = caps[1].replace('"', "");
    (!asm.is_empty()).then_some(asm)
}

/// The pragma, kept but disabled, followed by the generated code.
pub fn splice_block(asm: &str, code: &str) -> String {
    [
        "#if 0".to_string(),
        format!("#pragma GLOBAL_ASM(\"{}\")", asm),
        "#else".to_string(),
        code.trim_end_matches('\n').to_string(),
        "#endif".to_string(),
    ]
    .join("\n")
}

/// The pragma line code generation will replace.
#[derive(Debug, Clone, PartialEq)]
pub struct CodegenTarget {
    pub line: usize,
    pub asm: String,
}

/// Check preconditions for generating code at the cursor.
pub fn target_at_cursor(editor: &dyn Editor, settings: &Settings) -> Result<CodegenTarget, CodegenError> {
    if !settings.has(ToolKind::M2c.config_key()) {
        return Err(CodegenError::PathUnset);
    }
    let line = editor.cursor().ok_or(CodegenError::NoAsmFunction)?.line;
    let asm = editor
        .line_text(line)
        .and_then(global_asm_directive)
        .ok_or(CodegenError::NoAsmFunction)?;
    Ok(CodegenTarget { line, asm })
}

/// A running m2c invocation for one pragma.
pub struct CodegenJob {
    target: CodegenTarget,
    run: RunHandle,
}

impl CodegenJob {
    pub fn start(
        target: CodegenTarget,
        context: &str,
        settings: &Settings,
        workspace: &Path,
    ) -> io::Result<Self> {
        let tool_dir = settings.get(ToolKind::M2c.config_key()).unwrap_or_default();
        let command = tool::m2c_command(
            &settings.config().tools.interpreter,
            Path::new(&tool_dir),
            context,
            &workspace.join(&target.asm),
        );
        let run = ProcessRunner::spawn(&command, workspace, 0)?;
        Ok(Self { target, run })
    }

    pub fn target(&self) -> &CodegenTarget {
        &self.target
    }

    /// Classified output once m2c has exited
    pub fn poll(&mut self) -> Option<DiffResult> {
        let raw = self.run.poll()?;
        Some(classify(ToolKind::M2c.profile(), &raw.text))
    }
}

/// Write generated code over the target pragma. Returns false, writing
/// nothing, when that line no longer holds the same pragma.
pub fn apply(editor: &mut SourceEditor, target: &CodegenTarget, code: &str) -> Result<bool> {
    let unchanged = editor
        .line_text(target.line)
        .and_then(global_asm_directive)
        .is_some_and(|asm| asm == target.asm);
    if !unchanged {
        log::info!("pragma at line {} moved, generated code discarded", target.line + 1);
        return Ok(false);
    }
    editor.replace_line(target.line, &splice_block(&target.asm, code))?;
    Ok(true)
}
