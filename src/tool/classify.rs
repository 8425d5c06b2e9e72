use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Failure categories, listed in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("No path set for the tool, please set one")]
    ToolPathUnset,
    #[error("No such file or directory")]
    SourceNotFound,
    #[error("No such function found")]
    SymbolNotFound,
    #[error("The tool encountered an error")]
    ToolExecutionError,
    #[error("No diff generated, compilation may have failed!")]
    NoDiffProduced,
    #[error("An unknown error occurred, try to validate your code and rebuild")]
    UnknownFailure,
}

/// A classified failure. `detail` is the tool's own output with control
/// sequences removed, or the kind's message when the tool said nothing.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}")]
pub struct DiffFailure {
    pub kind: ErrorKind,
    pub detail: String,
}

impl DiffFailure {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let detail = if detail.trim().is_empty() {
            kind.to_string()
        } else {
            detail
        };
        Self { kind, detail }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiffResult {
    Success { html: String },
    Failure(DiffFailure),
}

impl DiffResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DiffResult::Success { .. })
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            DiffResult::Success { .. } => None,
            DiffResult::Failure(f) => Some(f.kind),
        }
    }
}

/// How a genuine result body is recognized in tool output.
#[derive(Debug, Clone, Copy)]
pub enum PayloadMarker {
    /// A literal opening tag. The payload is the output from the tag onwards.
    Tag(&'static str),
    /// Output that looks like generated source: both characters present.
    /// The payload is the whole output.
    CodeShape { open: char, terminator: char },
}

/// Marker and failure table for one external tool. The failure table is
/// scanned in order; the first hit wins.
#[derive(Debug, Clone, Copy)]
pub struct ToolProfile {
    pub name: &'static str,
    pub marker: PayloadMarker,
    pub failures: &'static [(&'static str, ErrorKind)],
}

impl ToolProfile {
    pub const ASM_DIFF: ToolProfile = ToolProfile {
        name: "asm-diff",
        marker: PayloadMarker::Tag("<table class='diff'>"),
        failures: &[
            ("no such file or directory", ErrorKind::SourceNotFound),
            ("not able to find", ErrorKind::SymbolNotFound),
            ("error", ErrorKind::ToolExecutionError),
        ],
    };

    pub const M2C: ToolProfile = ToolProfile {
        name: "m2c",
        marker: PayloadMarker::CodeShape {
            open: '{',
            terminator: ';',
        },
        failures: &[
            ("no such file or directory", ErrorKind::SourceNotFound),
            ("error", ErrorKind::ToolExecutionError),
        ],
    };
}

impl fmt::Display for ToolProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Decide what a finished tool run produced.
///
/// Matching runs on an ASCII-lowercased copy so byte offsets line up with
/// `raw`. A payload marker beats any failure substring: rendered diffs may
/// contain the word "error".
pub fn classify(profile: &ToolProfile, raw: &str) -> DiffResult {
    let lower = raw.to_ascii_lowercase();

    let payload_start = match profile.marker {
        PayloadMarker::Tag(tag) => lower.find(&tag.to_ascii_lowercase()),
        PayloadMarker::CodeShape { open, terminator } => {
            (lower.contains(open) && lower.contains(terminator)).then_some(0)
        }
    };

    if let Some(start) = payload_start {
        log::debug!("{}: payload marker at byte {}", profile, start);
        return DiffResult::Success {
            html: raw[start..].to_string(),
        };
    }

    let kind = profile
        .failures
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, kind)| *kind)
        .unwrap_or(ErrorKind::NoDiffProduced);

    log::debug!("{}: classified as {:?}", profile, kind);
    DiffResult::Failure(DiffFailure::new(kind, strip_control(raw).trim()))
}

fn ansi_pattern() -> &'static Regex {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    ANSI.get_or_init(|| {
        Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(\x07|\x1b\\)|\x1b[^m]*m")
            .expect("static regex")
    })
}

/// Remove terminal escape sequences and every control character except
/// newline and tab.
pub fn strip_control(text: &str) -> String {
    ansi_pattern()
        .replace_all(text, "")
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}
