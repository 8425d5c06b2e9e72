use ratatui::style::Color;
use std::path::Path;
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;

/// One highlighted run of text within a line
pub type Segment = (Color, String);

/// Syntax highlighting for the source pane. The whole document is
/// highlighted in one pass so block comments and multi-line macros keep
/// their state across lines, and the result is reused until the content
/// digest changes.
pub struct Highlighter {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
    cached: Option<(String, Vec<Vec<Segment>>)>,
}

impl Highlighter {
    pub fn new() -> Self {
        Highlighter {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
            cached: None,
        }
    }

    /// Highlighted lines for the document with content digest `digest`.
    pub fn document(&mut self, digest: &str, path: &Path, lines: &[String]) -> &[Vec<Segment>] {
        let fresh = self
            .cached
            .as_ref()
            .is_some_and(|(cached_digest, _)| cached_digest == digest);
        if !fresh {
            let highlighted = self.highlight_all(path, lines);
            self.cached = Some((digest.to_string(), highlighted));
        }
        match &self.cached {
            Some((_, lines)) => lines,
            None => &[],
        }
    }

    fn highlight_all(&self, path: &Path, lines: &[String]) -> Vec<Vec<Segment>> {
        let syntax = self
            .syntax_set
            .find_syntax_for_file(path)
            .ok()
            .flatten()
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text());
        let theme = &self.theme_set.themes["base16-ocean.dark"];
        let mut highlighter = HighlightLines::new(syntax, theme);

        lines
            .iter()
            .map(|line| {
                // syntect needs the newline to close line-scoped state
                let input = format!("{}\n", line);
                match highlighter.highlight_line(&input, &self.syntax_set) {
                    Ok(ranges) => ranges
                        .into_iter()
                        .map(|(style, text)| {
                            let fg = Color::Rgb(style.foreground.r, style.foreground.g, style.foreground.b);
                            (fg, text.trim_end_matches('\n').to_string())
                        })
                        .filter(|(_, text)| !text.is_empty())
                        .collect(),
                    Err(e) => {
                        log::debug!("highlighting failed for {}: {}", path.display(), e);
                        vec![(Color::Reset, line.clone())]
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &str) -> Vec<String> {
        src.lines().map(|l| l.to_string()).collect()
    }

    #[test]
    fn keeps_text_of_every_line() {
        let src = lines("/* header\n   still comment */\nvoid f(void) {\n    return;\n}");
        let mut hl = Highlighter::new();
        let out = hl.document("d1", Path::new("code.c"), &src);
        assert_eq!(out.len(), src.len());
        for (segments, line) in out.iter().zip(&src) {
            let joined: String = segments.iter().map(|(_, t)| t.as_str()).collect();
            assert_eq!(&joined, line);
        }
    }

    #[test]
    fn comment_state_carries_across_lines() {
        let src = lines("/* open\nint x;\n*/\nint x;");
        let mut hl = Highlighter::new();
        let out = hl.document("d1", Path::new("code.c"), &src).to_vec();
        // "int x;" inside the comment is colored like the comment, outside it is not
        let inside: Vec<Color> = out[1].iter().map(|(c, _)| *c).collect();
        let outside: Vec<Color> = out[3].iter().map(|(c, _)| *c).collect();
        assert_ne!(inside, outside);
    }

    #[test]
    fn reuses_result_for_same_digest() {
        let mut hl = Highlighter::new();
        hl.document("same", Path::new("code.c"), &lines("int a;"));
        let out = hl.document("same", Path::new("code.c"), &lines("int b;"));
        assert_eq!(out[0].iter().map(|(_, t)| t.as_str()).collect::<String>(), "int a;");
        let out = hl.document("other", Path::new("code.c"), &lines("int b;"));
        assert_eq!(out[0].iter().map(|(_, t)| t.as_str()).collect::<String>(), "int b;");
    }
}
