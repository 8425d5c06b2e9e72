mod classify;
mod runner;

pub use classify::{
    classify, strip_control, DiffFailure, DiffResult, ErrorKind, PayloadMarker, ToolProfile,
};
pub use runner::{CommandLine, ProcessRunner, RawOutput, RunHandle};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// The external tools this crate drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    AsmDiff,
    M2c,
}

impl ToolKind {
    /// Script expected inside the configured tool directory
    pub fn script(self) -> &'static str {
        match self {
            ToolKind::AsmDiff => "diff.py",
            ToolKind::M2c => "m2c.py",
        }
    }

    /// Settings key holding the tool directory
    pub fn config_key(self) -> &'static str {
        match self {
            ToolKind::AsmDiff => "path",
            ToolKind::M2c => "path:m2c",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ToolKind::AsmDiff => "asm-diff",
            ToolKind::M2c => "m2c",
        }
    }

    pub fn profile(self) -> &'static ToolProfile {
        match self {
            ToolKind::AsmDiff => &ToolProfile::ASM_DIFF,
            ToolKind::M2c => &ToolProfile::M2C,
        }
    }
}

/// `./<tool_dir>/<script>`, or the absolute path when `tool_dir` is absolute.
fn script_path(tool_dir: &Path, kind: ToolKind) -> String {
    Path::new(".")
        .join(tool_dir)
        .join(kind.script())
        .to_string_lossy()
        .into_owned()
}

/// `<interpreter> -u ./<tool_dir>/diff.py -mow3 --format html <symbol>`
pub fn diff_command(interpreter: &str, tool_dir: &Path, symbol: &str) -> CommandLine {
    CommandLine::new(interpreter)
        .arg("-u")
        .arg(script_path(tool_dir, ToolKind::AsmDiff))
        .arg("-mow3")
        .arg("--format")
        .arg("html")
        .arg(symbol)
}

/// `<interpreter> -u ./<tool_dir>/m2c.py --context=<context> <asm_path>`
pub fn m2c_command(interpreter: &str, tool_dir: &Path, context: &str, asm_path: &Path) -> CommandLine {
    CommandLine::new(interpreter)
        .arg("-u")
        .arg(script_path(tool_dir, ToolKind::M2c))
        .arg(format!("--context={}", context))
        .arg(asm_path.to_string_lossy().into_owned())
}

#[derive(Debug, Error, PartialEq)]
pub enum ToolPathError {
    #[error("Path must be relative to workspace")]
    OutsideWorkspace,
    #[error("Invalid path, {0} not found")]
    ScriptMissing(&'static str),
}

/// Check a directory picked by the user and return it relative to the
/// workspace root, which is how tool paths are stored.
pub fn validate_tool_dir(workspace: &Path, dir: &Path, kind: ToolKind) -> Result<PathBuf, ToolPathError> {
    let relative = dir
        .strip_prefix(workspace)
        .map_err(|_| ToolPathError::OutsideWorkspace)?;

    if !dir.join(kind.script()).is_file() {
        return Err(ToolPathError::ScriptMissing(kind.script()));
    }

    if relative.as_os_str().is_empty() {
        Ok(PathBuf::from("."))
    } else {
        Ok(relative.to_path_buf())
    }
}
