//! Just enough of an HTML tree to read the documents the panel is given:
//! the differ template with asm-differ's table inside, the loading view and
//! the error view. Not a conforming parser.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
    /// Source text between the start and end tags
    pub inner_html: String,
}

impl Element {
    fn new(tag: &str, attrs: Vec<(String, String)>) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs,
            children: Vec::new(),
            inner_html: String::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    /// Element children only, text nodes skipped
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn child_element(&self, index: usize) -> Option<&Element> {
        self.child_elements().nth(index)
    }

    /// Concatenated text of every descendant
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) if e.tag == "script" || e.tag == "style" => {}
                Node::Element(e) => e.collect_text(out),
            }
        }
    }

    /// First descendant (document order) matching `pred`
    pub fn find(&self, pred: &dyn Fn(&Element) -> bool) -> Option<&Element> {
        for child in self.child_elements() {
            if pred(child) {
                return Some(child);
            }
            if let Some(found) = child.find(pred) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_by_class(&self, class: &str) -> Option<&Element> {
        self.find(&|e| e.has_class(class))
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        self.find(&|e| e.id() == Some(id))
    }

    /// Visit every descendant element in document order
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Element)) {
        for child in self.child_elements() {
            visit(child);
            child.walk(visit);
        }
    }
}

/// A parsed document. `root` is a synthetic element holding the top level.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub root: Element,
}

impl Document {
    pub fn body(&self) -> &Element {
        self.root
            .find(&|e| e.tag == "body")
            .unwrap_or(&self.root)
    }
}

const VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT: &[&str] = &["script", "style", "textarea", "title"];

fn tag_pattern() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| {
        Regex::new(
            r#"(?s)<!--.*?-->|<![^>]*>|</\s*([A-Za-z][A-Za-z0-9-]*)\s*>|<([A-Za-z][A-Za-z0-9-]*)((?:\s+[^\s"'>/=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+))?)*)\s*(/?)>"#,
        )
        .expect("static regex")
    })
}

fn attr_pattern() -> &'static Regex {
    static ATTR: OnceLock<Regex> = OnceLock::new();
    ATTR.get_or_init(|| {
        Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
            .expect("static regex")
    })
}

fn parse_attrs(source: &str) -> Vec<(String, String)> {
    attr_pattern()
        .captures_iter(source)
        .map(|c| {
            let value = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            (c[1].to_ascii_lowercase(), value)
        })
        .collect()
}

/// Start tags that implicitly end an open element of the same family.
fn closes_implicitly(open: &str, incoming: &str) -> bool {
    match incoming {
        "tr" => matches!(open, "tr" | "td" | "th"),
        "td" | "th" => matches!(open, "td" | "th"),
        "li" => open == "li",
        "p" => open == "p",
        "tbody" | "thead" | "tfoot" => matches!(open, "tbody" | "thead" | "tfoot" | "tr" | "td" | "th"),
        _ => false,
    }
}

struct Open {
    element: Element,
    inner_start: usize,
}

struct Builder<'a> {
    source: &'a str,
    stack: Vec<Open>,
}

impl Builder<'_> {
    fn append(&mut self, node: Node) {
        if let Some(top) = self.stack.last_mut() {
            top.element.children.push(node);
        }
    }

    fn text(&mut self, raw: &str) {
        if !raw.is_empty() {
            self.append(Node::Text(decode_entities(raw)));
        }
    }

    /// Pop the top element, recording its inner html up to `inner_end`.
    fn close_top(&mut self, inner_end: usize) {
        if self.stack.len() <= 1 {
            return;
        }
        if let Some(mut open) = self.stack.pop() {
            let end = inner_end.max(open.inner_start);
            open.element.inner_html = self.source[open.inner_start..end].to_string();
            self.append(Node::Element(open.element));
        }
    }
}

pub fn parse(html: &str) -> Document {
    let mut builder = Builder {
        source: html,
        stack: vec![Open {
            element: Element::new("#document", Vec::new()),
            inner_start: 0,
        }],
    };

    let mut pos = 0;
    while let Some(caps) = tag_pattern().captures_at(html, pos) {
        let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((pos, html.len()));
        builder.text(&html[pos..whole.0]);
        pos = whole.1;

        if let Some(name) = caps.get(1) {
            let name = name.as_str().to_ascii_lowercase();
            if let Some(depth) = builder.stack.iter().rposition(|o| o.element.tag == name) {
                if depth > 0 {
                    while builder.stack.len() > depth {
                        builder.close_top(whole.0);
                    }
                }
            }
            continue;
        }

        let Some(name) = caps.get(2) else {
            // comment or doctype
            continue;
        };
        let tag = name.as_str().to_ascii_lowercase();
        while builder
            .stack
            .last()
            .is_some_and(|top| closes_implicitly(&top.element.tag, &tag))
        {
            builder.close_top(whole.0);
        }

        let element = Element::new(&tag, parse_attrs(caps.get(3).map_or("", |m| m.as_str())));
        let self_closing = caps.get(4).is_some_and(|m| !m.as_str().is_empty());
        if self_closing || VOID.contains(&tag.as_str()) {
            builder.append(Node::Element(element));
            continue;
        }

        if RAW_TEXT.contains(&tag.as_str()) {
            let close = format!("</{}", tag);
            let rest = &html[pos..];
            let end = rest.to_ascii_lowercase().find(&close).map_or(html.len(), |i| pos + i);
            let mut element = element;
            element.inner_html = html[pos..end].to_string();
            element.children.push(Node::Text(html[pos..end].to_string()));
            builder.append(Node::Element(element));
            pos = html[end..].find('>').map_or(html.len(), |i| end + i + 1);
            continue;
        }

        builder.stack.push(Open {
            element,
            inner_start: pos,
        });
    }
    builder.text(&html[pos..]);

    while builder.stack.len() > 1 {
        builder.close_top(html.len());
    }
    let root = builder
        .stack
        .pop()
        .map(|o| o.element)
        .unwrap_or_default();
    Document { root }
}

/// Decode the character references asm-differ and the templates produce.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            let name = &tail[1..semi];
            let c = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => name.strip_prefix('#').and_then(|num| {
                    let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num.parse().ok(),
                    };
                    code.and_then(char::from_u32)
                }),
            };
            c.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
