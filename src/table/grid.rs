//! Pipe-grid serialization of tables.

use crate::error::{Error, Result};
use crate::model::Table;

/// Serialize a table as a Markdown pipe grid.
///
/// With more than one row, the first row is the header and is followed by a
/// `---` separator of the same width. A single row is emitted alone. Rows
/// wider than the header cannot be expressed and fail with
/// [`Error::TableExtraction`]; callers fall back to [`raw_grid`].
pub fn build_grid(table: &Table) -> Result<String> {
    let width = table.column_count();
    if width == 0 {
        return Err(Error::TableExtraction("table has no columns".to_string()));
    }

    if let Some((index, row)) = table
        .rows
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() > width)
    {
        return Err(Error::TableExtraction(format!(
            "row {} has {} cells, header has {}",
            index + 1,
            row.len(),
            width
        )));
    }

    let mut lines = Vec::with_capacity(table.row_count() + 1);
    for (i, row) in table.rows.iter().enumerate() {
        let mut cells: Vec<String> = row.iter().map(|c| escape_cell(c)).collect();
        cells.resize(width, " ".to_string());
        lines.push(pipe_row(&cells));

        if i == 0 && table.row_count() > 1 {
            lines.push(pipe_row(&vec!["---".to_string(); width]));
        }
    }

    Ok(lines.join("\n"))
}

/// Last-resort rendering: one `| a | b |` line per row, no header separator.
pub fn raw_grid(rows: &[Vec<String>]) -> String {
    rows.iter()
        .map(|row| pipe_row(row))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a table, falling back to the raw grid.
///
/// The flag is true when the fallback was used.
pub fn render_table(table: &Table) -> (String, bool) {
    match build_grid(table) {
        Ok(grid) => (grid, false),
        Err(e) => {
            log::debug!("render_table: {}, using raw grid", e);
            (raw_grid(&table.rows), true)
        }
    }
}

fn pipe_row<S: AsRef<str>>(cells: &[S]) -> String {
    let mut line = String::from("|");
    for cell in cells {
        line.push(' ');
        line.push_str(cell.as_ref());
        line.push_str(" |");
    }
    line
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}
