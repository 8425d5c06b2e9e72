pub mod dom;
pub mod rows;

use crate::panel::message::{HostMessage, SurfaceMessage};
use crate::panel::{Surface, SurfaceOptions};
use dom::{Document, Element};
use rows::RowIndex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// What the terminal can show for the current document.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceView {
    Blank,
    /// The loading template; carries its label text
    Loading(String),
    Table(DiffTable),
    Message(Vec<MessageLine>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Heading,
    Kind,
    Error,
    Plain,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageLine {
    pub style: LineStyle,
    pub text: String,
}

/// Flatten cell text into one display line.
fn cell_text(cell: &Element) -> String {
    cell.text()
        .replace('\t', "    ")
        .lines()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end()
        .to_string()
}

fn build_table(document: &Document) -> Option<DiffTable> {
    let table = document.root.find_by_class("diff")?;
    let header = table
        .find(&|e| e.tag == "tr")
        .filter(|tr| tr.child_elements().any(|c| c.tag == "th"))
        .map(|tr| tr.child_elements().map(cell_text).collect())
        .unwrap_or_default();
    let rows = rows::table_rows(document)
        .into_iter()
        .map(|tr| tr.child_elements().map(cell_text).collect())
        .collect();
    Some(DiffTable { header, rows })
}

fn build_messages(body: &Element) -> Vec<MessageLine> {
    let mut lines = Vec::new();
    body.walk(&mut |e| {
        let style = match e.tag.as_str() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => LineStyle::Heading,
            "p" if e.has_class("error-kind") => LineStyle::Kind,
            "p" | "pre" | "li" => LineStyle::Plain,
            _ if e.has_class("error") => LineStyle::Error,
            _ => return,
        };
        let text = e.text();
        for part in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            lines.push(MessageLine {
                style,
                text: part.to_string(),
            });
        }
    });
    if let Some(first) = lines.first_mut() {
        if first.style == LineStyle::Plain {
            first.style = LineStyle::Heading;
        }
    }
    lines
}

fn build_view(document: &Document) -> SurfaceView {
    if let Some(label) = document.root.find_by_id("loadingText") {
        return SurfaceView::Loading(label.text().trim().to_string());
    }
    if let Some(table) = build_table(document) {
        return SurfaceView::Table(table);
    }
    let messages = build_messages(document.body());
    if messages.is_empty() {
        SurfaceView::Blank
    } else {
        SurfaceView::Message(messages)
    }
}

/// Rendering surface drawn inside the terminal. Like a sandboxed web view it
/// only sees the HTML it is handed and the messages posted to it; the
/// row-scan and highlight logic runs here, against its own document.
pub struct TerminalSurface {
    title: String,
    asset_root: PathBuf,
    document: Document,
    view: SurfaceView,
    index: RowIndex,
    inbox: VecDeque<String>,
    outbox: Vec<String>,
    loaded_at: Instant,
}

impl TerminalSurface {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn view(&self) -> &SurfaceView {
        &self.view
    }

    pub fn index(&self) -> &RowIndex {
        &self.index
    }

    /// "Building", "Building.", ... cycling while the loading view is up
    pub fn loading_label(&self, now: Instant) -> Option<String> {
        let SurfaceView::Loading(label) = &self.view else {
            return None;
        };
        let elapsed = now.saturating_duration_since(self.loaded_at);
        let dots = (elapsed.as_millis() / Duration::from_millis(300).as_millis()) % 4;
        Some(format!("{}{}", label, ".".repeat(dots as usize)))
    }

    /// Handle every message posted since the last call, in order.
    pub fn pump(&mut self) {
        while let Some(wire) = self.inbox.pop_front() {
            match serde_json::from_str::<HostMessage>(&wire) {
                Ok(HostMessage::Rebuild) => self.scan(),
                Ok(HostMessage::Ping { line }) => {
                    self.index.select_line(line);
                }
                Err(e) => log::debug!("surface ignored {}: {}", wire, e),
            }
        }
    }

    fn scan(&mut self) {
        self.index = RowIndex::scan(&self.document);
        let reply = SurfaceMessage::Scanned {
            rows: self.index.len(),
        };
        match serde_json::to_string(&reply) {
            Ok(wire) => self.outbox.push(wire),
            Err(e) => log::warn!("could not encode {:?}: {}", reply, e),
        }
    }
}

impl Surface for TerminalSurface {
    fn open(options: &SurfaceOptions) -> Self {
        Self {
            title: options.title.clone(),
            asset_root: options.asset_root.clone(),
            document: Document::default(),
            view: SurfaceView::Blank,
            index: RowIndex::default(),
            inbox: VecDeque::new(),
            outbox: Vec::new(),
            loaded_at: Instant::now(),
        }
    }

    fn csp_source(&self) -> String {
        "asmdiff-surface:".to_string()
    }

    fn asset_uri(&self, path: &Path) -> String {
        if !path.starts_with(&self.asset_root) {
            log::warn!("asset {} is outside {}", path.display(), self.asset_root.display());
        }
        format!("file://{}", path.display())
    }

    /// Replaces the document and runs the load-time scan.
    fn set_html(&mut self, html: String) {
        self.document = dom::parse(&html);
        self.view = build_view(&self.document);
        self.loaded_at = Instant::now();
        self.scan();
    }

    fn post_message(&mut self, wire: String) {
        self.inbox.push_back(wire);
    }

    fn take_inbound(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbox)
    }
}
