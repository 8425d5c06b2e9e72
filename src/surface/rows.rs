use super::dom::{Document, Element};

/// One indexed diff row: its position among the table body's rows and the
/// source line printed in its "current" column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedRow {
    pub row: usize,
    pub line: usize,
}

/// Line-number index over the rendered diff table plus the current
/// selection. Lives entirely on the surface side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowIndex {
    rows: Vec<IndexedRow>,
    selected: Vec<usize>,
}

/// The "current" column's label: the digits inside the first element of the
/// row's second cell.
fn row_line(tr: &Element) -> Option<usize> {
    let current = tr.child_element(1)?;
    let label = current.child_element(0)?;
    let digits: String = label.inner_html.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Rows of the first `.diff` table's body, i.e. its second child element.
pub fn table_rows(document: &Document) -> Vec<&Element> {
    document
        .root
        .find_by_class("diff")
        .and_then(|table| table.child_element(1))
        .map(|body| body.child_elements().collect())
        .unwrap_or_default()
}

impl RowIndex {
    /// Rebuild the index. Rows without a parseable number are left out.
    pub fn scan(document: &Document) -> Self {
        let rows = table_rows(document)
            .into_iter()
            .enumerate()
            .filter_map(|(row, tr)| row_line(tr).map(|line| IndexedRow { row, line }))
            .collect();
        Self {
            rows,
            selected: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[IndexedRow] {
        &self.rows
    }

    /// Select every row labelled `line` and deselect the rest.
    /// Returns how many rows ended up selected.
    pub fn select_line(&mut self, line: usize) -> usize {
        self.selected = self
            .rows
            .iter()
            .filter(|r| r.line == line)
            .map(|r| r.row)
            .collect();
        self.selected.len()
    }

    pub fn is_selected(&self, row: usize) -> bool {
        self.selected.contains(&row)
    }

    pub fn selected(&self) -> &[usize] {
        &self.selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::dom::parse;

    fn row(current: &str) -> String {
        format!("<tr><td><span>0:</span> lw</td><td>{}</td><td></td></tr>", current)
    }

    fn table(rows: &[String]) -> Document {
        parse(&format!(
            "<div id=\"app\"><table class='diff'><thead><tr><th>TARGET</th><th>CURRENT</th></tr></thead><tbody>{}</tbody></table></div>",
            rows.concat()
        ))
    }

    fn labelled(lines: &[usize]) -> Document {
        let rows: Vec<String> = lines
            .iter()
            .map(|l| row(&format!("<span class='line-num'>{}</span> addiu", l)))
            .collect();
        table(&rows)
    }

    #[test]
    fn ping_selects_exact_line_only() {
        let mut index = RowIndex::scan(&labelled(&[10, 25, 40]));
        assert_eq!(index.len(), 3);

        assert_eq!(index.select_line(25), 1);
        assert!(!index.is_selected(0));
        assert!(index.is_selected(1));
        assert!(!index.is_selected(2));

        assert_eq!(index.select_line(26), 0);
        assert!(index.selected().is_empty());
    }

    #[test]
    fn skips_rows_without_label() {
        let doc = table(&[
            row("<span>12</span>"),
            row("plain text"),
            row("<span>--</span>"),
            "<tr><td>only one cell</td></tr>".to_string(),
            row("<i>line 7:</i>"),
        ]);
        let index = RowIndex::scan(&doc);
        assert_eq!(
            index.rows(),
            &[IndexedRow { row: 0, line: 12 }, IndexedRow { row: 4, line: 7 }]
        );
    }

    #[test]
    fn label_digits_are_joined() {
        let doc = table(&[row("<span>1,024</span>")]);
        assert_eq!(RowIndex::scan(&doc).rows()[0].line, 1024);
    }

    #[test]
    fn duplicate_lines_are_all_selected() {
        let mut index = RowIndex::scan(&labelled(&[5, 5, 6]));
        assert_eq!(index.select_line(5), 2);
        assert_eq!(index.selected(), &[0, 1]);
    }

    #[test]
    fn no_table_no_rows() {
        let index = RowIndex::scan(&parse("<p>An error occurred</p>"));
        assert!(index.is_empty());
    }
}
