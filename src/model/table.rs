//! Table types.

use serde::{Deserialize, Serialize};

/// Placeholder for a cell with no text.
pub(crate) const EMPTY_CELL: &str = " ";

/// A grid of text cells, first row first.
///
/// Cells are normalized on construction: line breaks become spaces, text is
/// trimmed, and empty cells hold a single space. Rows shorter than the first
/// row are padded with empty cells. Rows longer than the first row are kept
/// as they are; [`crate::table::build_grid`] rejects them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Rows of cells
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table from raw cell text.
    pub fn from_rows<R, C, S>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(|c| normalize_cell(c.as_ref())).collect())
            .collect();

        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        for row in rows.iter_mut().skip(1) {
            while row.len() < width {
                row.push(EMPTY_CELL.to_string());
            }
        }

        Self { rows }
    }

    /// Get the number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Column count, taken from the first row.
    pub fn column_count(&self) -> usize {
        self.rows.first().map(|r| r.len()).unwrap_or(0)
    }

    /// Check if the table has no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.column_count() == 0
    }

    /// Whether every row has the same width as the first.
    pub fn is_rectangular(&self) -> bool {
        let width = self.column_count();
        self.rows.iter().all(|r| r.len() == width)
    }

    /// Get plain text content, cells separated by tabs.
    pub fn plain_text(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|c| c.trim())
                    .collect::<Vec<_>>()
                    .join("\t")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Normalize one cell: line breaks to spaces, trimmed, empty to `" "`.
pub(crate) fn normalize_cell(text: &str) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    let trimmed = flat.trim();
    if trimmed.is_empty() {
        EMPTY_CELL.to_string()
    } else {
        trimmed.to_string()
    }
}
