//! Table detection from text alignment alone (stream mode).
//!
//! Fragments are grouped into rows by vertical position; left edges that
//! recur across rows become column boundaries; runs of rows that line up
//! with those boundaries form a table. Numbered and bulleted lists look
//! like two-column tables to this test and are rejected explicitly.

use super::{DetectedTable, TableStrategy};
use crate::error::Result;
use crate::model::{BoundingBox, Table};
use crate::parser::{LayoutPage, TextFragment};
use std::collections::{HashMap, HashSet};

/// Stream detector configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Minimum number of rows to consider as table
    pub min_rows: usize,
    /// Minimum number of columns to consider as table
    pub min_columns: usize,
    /// Maximum number of columns (above this, likely word-level splitting)
    pub max_columns: usize,
    /// Y tolerance for grouping fragments into rows (fraction of font size)
    pub y_tolerance_factor: f32,
    /// Minimum column alignment ratio (0.0-1.0)
    pub min_alignment_ratio: f32,
    /// Minimum gap between columns (points)
    pub min_column_gap: f32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            min_rows: 2,
            min_columns: 2,
            max_columns: 6,
            y_tolerance_factor: 0.4,
            min_alignment_ratio: 0.3,
            min_column_gap: 15.0,
        }
    }
}

/// Text-alignment table strategy.
#[derive(Debug, Clone, Default)]
pub struct StreamStrategy {
    config: StreamConfig,
}

/// A row of fragment indices sharing a vertical position.
#[derive(Debug, Clone)]
struct StreamRow {
    members: Vec<usize>,
}

impl StreamStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: StreamConfig) -> Self {
        Self { config }
    }

    /// Detect tables among `fragments`.
    pub fn detect(&self, fragments: &[TextFragment]) -> Vec<DetectedTable> {
        log::debug!("StreamStrategy: starting with {} fragments", fragments.len());

        if fragments.len() < self.config.min_rows * self.config.min_columns {
            return Vec::new();
        }

        let rows = self.group_into_rows(fragments);
        if rows.len() < self.config.min_rows {
            log::debug!("StreamStrategy: not enough rows ({})", rows.len());
            return Vec::new();
        }

        let columns = self.detect_columns(fragments, &rows);
        log::debug!("StreamStrategy: column edges {:?}", columns);
        if columns.len() < self.config.min_columns {
            return Vec::new();
        }

        let mut tables = Vec::new();
        for (start, end) in self.find_table_regions(fragments, &rows, &columns) {
            let region = &rows[start..=end];

            // Columns of this region alone
            let region_columns = self.detect_columns(fragments, region);
            if region_columns.len() < self.config.min_columns {
                continue;
            }
            if region_columns.len() > self.config.max_columns {
                log::debug!(
                    "StreamStrategy: skipping region, too many columns ({} > {})",
                    region_columns.len(),
                    self.config.max_columns
                );
                continue;
            }
            if self.is_list_pattern(fragments, region, &region_columns) {
                log::debug!("StreamStrategy: skipping region, detected as list pattern");
                continue;
            }

            tables.push(self.to_detected(fragments, region, &region_columns));
        }

        tables
    }

    /// Group fragments into rows, top to bottom.
    fn group_into_rows(&self, fragments: &[TextFragment]) -> Vec<StreamRow> {
        let mut order: Vec<usize> = (0..fragments.len()).collect();
        order.sort_by(|&a, &b| {
            let (fa, fb) = (&fragments[a].bbox, &fragments[b].bbox);
            fa.y0.total_cmp(&fb.y0).then(fa.x0.total_cmp(&fb.x0))
        });

        let mut rows: Vec<StreamRow> = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let mut current_y: Option<f32> = None;

        let close = |members: &mut Vec<usize>, rows: &mut Vec<StreamRow>| {
            if !members.is_empty() {
                rows.push(StreamRow {
                    members: std::mem::take(members),
                });
            }
        };

        for index in order {
            let fragment = &fragments[index];
            let tolerance = fragment.font_size * self.config.y_tolerance_factor;
            match current_y {
                Some(y) if (fragment.bbox.y0 - y).abs() <= tolerance => current.push(index),
                _ => {
                    close(&mut current, &mut rows);
                    current_y = Some(fragment.bbox.y0);
                    current.push(index);
                }
            }
        }
        close(&mut current, &mut rows);

        rows
    }

    /// Left edges shared by enough rows, merged when closer than the column gap.
    fn detect_columns(&self, fragments: &[TextFragment], rows: &[StreamRow]) -> Vec<f32> {
        let multi: Vec<&StreamRow> = rows.iter().filter(|r| r.members.len() >= 2).collect();

        // Rows with a single fragment count too when few rows are multi-fragment
        let (counted, once_per_row): (Vec<&StreamRow>, bool) = if multi.len() >= self.config.min_rows {
            (multi, true)
        } else {
            (rows.iter().collect(), false)
        };
        if counted.is_empty() {
            return Vec::new();
        }

        let bucket_size = 5.0;
        let mut edge_counts: HashMap<i32, usize> = HashMap::new();
        for row in &counted {
            let mut seen = HashSet::new();
            for &i in &row.members {
                let bucket = (fragments[i].bbox.x0 / bucket_size).round() as i32;
                if !once_per_row || seen.insert(bucket) {
                    *edge_counts.entry(bucket).or_insert(0) += 1;
                }
            }
        }

        let min_occurrences =
            ((counted.len() as f32 * self.config.min_alignment_ratio) as usize).max(2);

        let mut edges: Vec<f32> = edge_counts
            .iter()
            .filter(|(_, count)| **count >= min_occurrences)
            .map(|(bucket, _)| *bucket as f32 * bucket_size)
            .collect();
        edges.sort_by(f32::total_cmp);

        let mut merged: Vec<f32> = Vec::new();
        for edge in edges {
            match merged.last() {
                Some(&last) if edge - last < self.config.min_column_gap => {}
                _ => merged.push(edge),
            }
        }
        merged
    }

    /// Contiguous runs of aligned rows, as inclusive index ranges.
    fn find_table_regions(
        &self,
        fragments: &[TextFragment],
        rows: &[StreamRow],
        columns: &[f32],
    ) -> Vec<(usize, usize)> {
        let mut regions = Vec::new();
        let mut start: Option<usize> = None;

        for (i, row) in rows.iter().enumerate() {
            if self.alignment_score(fragments, row, columns) >= self.config.min_alignment_ratio {
                start.get_or_insert(i);
            } else if let Some(s) = start.take() {
                if i - s >= self.config.min_rows {
                    regions.push((s, i - 1));
                }
            }
        }
        if let Some(s) = start {
            if rows.len() - s >= self.config.min_rows {
                regions.push((s, rows.len() - 1));
            }
        }

        regions
    }

    /// Fraction of a row's fragments that start on a column edge.
    fn alignment_score(&self, fragments: &[TextFragment], row: &StreamRow, columns: &[f32]) -> f32 {
        if row.members.is_empty() || columns.is_empty() {
            return 0.0;
        }
        let tolerance = 5.0;
        let aligned = row
            .members
            .iter()
            .filter(|&&i| {
                let x = fragments[i].bbox.x0;
                columns.iter().any(|c| (x - c).abs() <= tolerance)
            })
            .count();
        aligned as f32 / row.members.len() as f32
    }

    fn to_detected(
        &self,
        fragments: &[TextFragment],
        rows: &[StreamRow],
        columns: &[f32],
    ) -> DetectedTable {
        let members = rows.iter().flat_map(|r| r.members.iter().copied());
        let right_x = members
            .clone()
            .map(|i| fragments[i].bbox.x1)
            .fold(f32::MIN, f32::max);

        let mut grid = Vec::with_capacity(rows.len());
        let mut bbox: Option<BoundingBox> = None;
        for row in rows {
            let mut cells: Vec<Vec<&str>> = vec![Vec::new(); columns.len()];
            let mut ordered = row.members.clone();
            ordered.sort_by(|&a, &b| fragments[a].bbox.x0.total_cmp(&fragments[b].bbox.x0));
            for i in ordered {
                let fragment = &fragments[i];
                let column = find_column(fragment.bbox.x0, columns, right_x);
                cells[column].push(fragment.text.trim());
                bbox = Some(match bbox {
                    Some(b) => b.union(&fragment.bbox),
                    None => fragment.bbox,
                });
            }
            grid.push(cells.into_iter().map(|c| c.join(" ")).collect::<Vec<_>>());
        }

        DetectedTable {
            table: Table::from_rows(grid),
            bbox,
            consumed: members.collect(),
        }
    }

    /// Whether the region is really a numbered or bulleted list.
    fn is_list_pattern(&self, fragments: &[TextFragment], rows: &[StreamRow], columns: &[f32]) -> bool {
        if columns.len() < 2 || rows.is_empty() {
            return false;
        }

        let mut bullets = 0;
        let mut numbers = 0;
        for row in rows {
            let first = row
                .members
                .iter()
                .map(|&i| &fragments[i])
                .min_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
            if let Some(fragment) = first {
                let text = fragment.text.trim();
                if is_bullet_marker(text) {
                    bullets += 1;
                } else if is_number_marker(text) {
                    numbers += 1;
                }
            }
        }

        let bullet_ratio = bullets as f32 / rows.len() as f32;
        let marker_ratio = (bullets + numbers) as f32 / rows.len() as f32;

        // Numbered first columns are common in real tables, so only two-column
        // regions are rejected on numbers
        bullet_ratio >= 0.5 || (columns.len() == 2 && marker_ratio >= 0.5)
    }
}

impl TableStrategy for StreamStrategy {
    fn name(&self) -> &'static str {
        "stream"
    }

    fn extract(&self, page: &LayoutPage) -> Result<Vec<DetectedTable>> {
        Ok(self.detect(&page.fragments))
    }
}

/// Column whose span contains `x`, or the nearest column start.
fn find_column(x: f32, columns: &[f32], right_x: f32) -> usize {
    for (i, &start) in columns.iter().enumerate() {
        let end = columns.get(i + 1).copied().unwrap_or(right_x + 100.0);
        if x >= start - 10.0 && x < end - 10.0 {
            return i;
        }
    }

    columns
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (x - **a).abs().total_cmp(&(x - **b).abs()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn is_bullet_marker(text: &str) -> bool {
    matches!(
        text.trim(),
        "-" | "–" | "—" | "•" | "·" | "*" | "○" | "▪" | "◦" | "▸" | "►" | "■" | "●" | "□" | "◆" | "◇" | "▶" | "➤"
    )
}

/// `1.`, `12)`, `3`, `a.`, `B)`
fn is_number_marker(text: &str) -> bool {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return false;
    }

    if let Some(pos) = cleaned.find(|c: char| !c.is_ascii_digit()) {
        let (digits, suffix) = cleaned.split_at(pos);
        if !digits.is_empty() && (suffix == "." || suffix == ")") {
            return true;
        }
    } else {
        return true;
    }

    let chars: Vec<char> = cleaned.chars().collect();
    chars.len() == 2 && chars[0].is_alphabetic() && (chars[1] == '.' || chars[1] == ')')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(text: &str, x: f32, y: f32) -> TextFragment {
        let width = text.chars().count() as f32 * 6.0;
        TextFragment::new(text, BoundingBox::new(x, y, x + width, y + 12.0), 12.0)
    }

    #[test]
    fn test_group_into_rows() {
        let fragments = vec![
            frag("A2", 10.0, 115.0),
            frag("B1", 60.0, 100.0),
            frag("A1", 10.0, 101.0),
            frag("B2", 60.0, 115.0),
        ];
        let rows = StreamStrategy::new().group_into_rows(&fragments);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].members, vec![1, 2]);
        assert_eq!(rows[1].members, vec![0, 3]);
    }

    #[test]
    fn test_detect_simple_table() {
        let fragments = vec![
            frag("Intro paragraph", 30.0, 60.0),
            frag("Name", 10.0, 100.0),
            frag("Age", 60.0, 100.0),
            frag("Alice", 10.0, 115.0),
            frag("30", 60.0, 115.0),
            frag("Bob", 10.0, 130.0),
            frag("25", 60.0, 130.0),
        ];

        let tables = StreamStrategy::new().detect(&fragments);
        assert_eq!(tables.len(), 1);
        let detected = &tables[0];
        assert_eq!(
            detected.table.rows,
            vec![
                vec!["Name".to_string(), "Age".to_string()],
                vec!["Alice".to_string(), "30".to_string()],
                vec!["Bob".to_string(), "25".to_string()],
            ]
        );
        let mut consumed = detected.consumed.clone();
        consumed.sort();
        assert_eq!(consumed, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(detected.bbox.map(|b| b.y0), Some(100.0));
    }

    #[test]
    fn test_single_column_is_not_a_table() {
        let fragments = vec![
            frag("Line 1", 10.0, 100.0),
            frag("Line 2", 10.0, 115.0),
            frag("Line 3", 10.0, 130.0),
        ];
        assert!(StreamStrategy::new().detect(&fragments).is_empty());
    }

    #[test]
    fn test_numbered_list_not_a_table() {
        let fragments = vec![
            frag("1.", 50.0, 100.0),
            frag("Device settings", 80.0, 100.0),
            frag("2.", 50.0, 130.0),
            frag("Object management", 80.0, 130.0),
            frag("3.", 50.0, 160.0),
            frag("Routing policy", 80.0, 160.0),
        ];
        assert!(StreamStrategy::new().detect(&fragments).is_empty());
    }

    #[test]
    fn test_bullet_list_not_a_table() {
        let fragments = vec![
            frag("•", 50.0, 100.0),
            frag("Management", 80.0, 100.0),
            frag("•", 50.0, 130.0),
            frag("Interface options", 80.0, 130.0),
            frag("•", 50.0, 160.0),
            frag("Firmware", 80.0, 160.0),
        ];
        assert!(StreamStrategy::new().detect(&fragments).is_empty());
    }

    #[test]
    fn test_list_markers() {
        assert!(is_number_marker("1."));
        assert!(is_number_marker("12)"));
        assert!(is_number_marker("1 ."));
        assert!(is_number_marker("3"));
        assert!(is_number_marker("a."));
        assert!(is_bullet_marker("–"));
        assert!(!is_number_marker("Name"));
        assert!(!is_number_marker(""));
        assert!(!is_bullet_marker("Alice"));
    }
}
