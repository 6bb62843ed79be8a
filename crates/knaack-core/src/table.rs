//! Table row reconstruction from extracted page text.
//!
//! PDF text extraction yields one line per visual text run, not table
//! cells. Grade tables have a stable shape (a leading number, a free-text
//! title, then numeric columns), so rows are rebuilt from tokens:
//!
//! 1. A line whose first token parses as a number opens a new row.
//! 2. A line that does not start with a number continues the open row's
//!    title, as long as that row has not yet produced numeric columns
//!    (titles wrap; numbers sit on the row's last line).
//! 3. Cells are `[number, title, trailing numeric tokens…]`.
//!
//! Lines that neither open nor continue a row (headers, footers, notes)
//! are dropped.

/// A reconstructed table row.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub cells: Vec<String>,
}

impl TableRow {
    /// The row number cell parsed as a float.
    pub fn number(&self) -> Option<f64> {
        self.cells.first().and_then(|c| parse_number(c))
    }

    /// The last `n` numeric cells, parsed. `None` when the row has fewer.
    pub fn numeric_tail(&self, n: usize) -> Option<Vec<f64>> {
        if self.cells.len() < 2 + n {
            return None;
        }
        self.cells[self.cells.len() - n..]
            .iter()
            .map(|c| parse_number(c))
            .collect()
    }
}

/// Parse a cell as a number, tolerating thousands separators.
pub fn parse_number(cell: &str) -> Option<f64> {
    let cleaned: String = cell.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Replace embedded line breaks in a cell with spaces.
pub fn clean_cell(cell: &str) -> String {
    cell.replace(['\n', '\r'], " ").trim().to_string()
}

struct OpenRow {
    number: String,
    title: Vec<String>,
    tail: Vec<String>,
}

impl OpenRow {
    fn into_row(self) -> TableRow {
        let mut cells = Vec::with_capacity(2 + self.tail.len());
        cells.push(self.number);
        cells.push(clean_cell(&self.title.join(" ")));
        cells.extend(self.tail);
        TableRow { cells }
    }

    fn absorb(&mut self, tokens: &[&str]) {
        let split = trailing_numeric_start(tokens);
        self.title
            .extend(tokens[..split].iter().map(|t| t.to_string()));
        self.tail = tokens[split..].iter().map(|t| t.to_string()).collect();
    }
}

/// Index where the run of trailing numeric tokens begins.
fn trailing_numeric_start(tokens: &[&str]) -> usize {
    let mut i = tokens.len();
    while i > 0 && parse_number(tokens[i - 1]).is_some() {
        i -= 1;
    }
    i
}

/// Rebuild table rows from one page of extracted text.
pub fn rows_from_text(page: &str) -> Vec<TableRow> {
    let mut rows = Vec::new();
    let mut open: Option<OpenRow> = None;

    for line in page.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = tokens.first() else {
            continue;
        };

        if parse_number(first).is_some() {
            if let Some(prev) = open.take() {
                rows.push(prev.into_row());
            }
            let mut row = OpenRow {
                number: first.to_string(),
                title: Vec::new(),
                tail: Vec::new(),
            };
            row.absorb(&tokens[1..]);
            open = Some(row);
            continue;
        }

        match open.as_mut() {
            Some(row) if row.tail.is_empty() => row.absorb(&tokens),
            Some(_) => {
                if let Some(prev) = open.take() {
                    rows.push(prev.into_row());
                }
            }
            None => {}
        }
    }

    if let Some(prev) = open.take() {
        rows.push(prev.into_row());
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_row() {
        let rows = rows_from_text("1 Curricular Aspects 150 3.20 480.00 3.20");
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].cells,
            vec!["1", "Curricular Aspects", "150", "3.20", "480.00", "3.20"]
        );
        assert_eq!(rows[0].number(), Some(1.0));
    }

    #[test]
    fn wrapped_title_is_joined() {
        let text = "2 Teaching-Learning and\nEvaluation 350 3.46 1211 3.46";
        let rows = rows_from_text(text);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells[1], "Teaching-Learning and Evaluation");
        assert_eq!(
            rows[0].numeric_tail(3),
            Some(vec![3.46, 1211.0, 3.46])
        );
    }

    #[test]
    fn header_and_footer_lines_are_dropped() {
        let text = "Criteria Weightage Grade Point\n\
                    1.1 Curricular Planning 20 3.5\n\
                    Total 1000\n\
                    Page 3 of 5";
        let rows = rows_from_text(text);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells[0], "1.1");
    }

    #[test]
    fn trailing_text_after_numbers_closes_row() {
        let text = "1.2 Academic Flexibility 30 4.0\nInstitutional Grade: A";
        let rows = rows_from_text(text);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].numeric_tail(2), Some(vec![30.0, 4.0]));
    }

    #[test]
    fn numeric_tail_requires_enough_cells() {
        let rows = rows_from_text("3 Research 250");
        assert_eq!(rows[0].numeric_tail(3), None);
        assert_eq!(rows[0].numeric_tail(1), Some(vec![250.0]));
    }

    #[test]
    fn parse_number_handles_separators() {
        assert_eq!(parse_number("1,211.5"), Some(1211.5));
        assert_eq!(parse_number("NA"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn clean_cell_strips_line_breaks() {
        assert_eq!(clean_cell("Best\r\nPractices\n"), "Best  Practices");
    }
}
