//! Table detection from ruling lines (lattice mode).
//!
//! Horizontal and vertical segments that touch each other are clustered;
//! each cluster's distinct rule positions define a grid of cells, and text
//! fragments are dropped into the cell containing their center.

use super::{DetectedTable, TableStrategy};
use crate::error::Result;
use crate::model::{BoundingBox, Table};
use crate::parser::{LayoutPage, Segment, TextFragment};

/// Lattice detector configuration.
#[derive(Debug, Clone)]
pub struct LatticeConfig {
    /// Slope tolerance when classifying a segment (points)
    pub axis_tolerance: f32,
    /// Distance at which two rules are considered touching (points)
    pub join_tolerance: f32,
    /// Shorter segments are ignored (points)
    pub min_segment_length: f32,
    /// A grid needs at least this many cells
    pub min_cells: usize,
}

impl Default for LatticeConfig {
    fn default() -> Self {
        Self {
            axis_tolerance: 1.0,
            join_tolerance: 2.0,
            min_segment_length: 10.0,
            min_cells: 2,
        }
    }
}

/// Ruling-line table strategy.
#[derive(Debug, Clone, Default)]
pub struct LatticeStrategy {
    config: LatticeConfig,
}

#[derive(Debug, Clone, Copy)]
enum Rule {
    /// y, x-start, x-end
    Horizontal(f32, f32, f32),
    /// x, y-start, y-end
    Vertical(f32, f32, f32),
}

impl LatticeStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LatticeConfig) -> Self {
        Self { config }
    }

    /// Detect ruled tables and fill them from `fragments`.
    pub fn detect(&self, rulings: &[Segment], fragments: &[TextFragment]) -> Vec<DetectedTable> {
        let rules = self.classify(rulings);
        if rules.len() < 4 {
            return Vec::new();
        }

        let mut tables = Vec::new();
        for cluster in self.cluster(&rules) {
            let members: Vec<Rule> = cluster.iter().map(|&i| rules[i]).collect();
            if let Some(table) = self.fill_grid(&members, fragments) {
                tables.push(table);
            }
        }

        log::debug!(
            "LatticeStrategy: {} rules, {} tables",
            rules.len(),
            tables.len()
        );
        tables
    }

    fn classify(&self, rulings: &[Segment]) -> Vec<Rule> {
        let tol = self.config.axis_tolerance;
        rulings
            .iter()
            .filter(|s| s.length() >= self.config.min_segment_length)
            .filter_map(|s| {
                if s.is_horizontal(tol) {
                    Some(Rule::Horizontal(
                        (s.y0 + s.y1) / 2.0,
                        s.x0.min(s.x1),
                        s.x0.max(s.x1),
                    ))
                } else if s.is_vertical(tol) {
                    Some(Rule::Vertical(
                        (s.x0 + s.x1) / 2.0,
                        s.y0.min(s.y1),
                        s.y0.max(s.y1),
                    ))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Connected components of touching rules, in discovery order.
    fn cluster(&self, rules: &[Rule]) -> Vec<Vec<usize>> {
        let mut parent: Vec<usize> = (0..rules.len()).collect();

        fn find(parent: &mut [usize], mut i: usize) -> usize {
            while parent[i] != i {
                parent[i] = parent[parent[i]];
                i = parent[i];
            }
            i
        }

        for a in 0..rules.len() {
            for b in (a + 1)..rules.len() {
                if self.touches(&rules[a], &rules[b]) {
                    let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
                    if ra != rb {
                        parent[rb] = ra;
                    }
                }
            }
        }

        let mut clusters: Vec<(usize, Vec<usize>)> = Vec::new();
        for i in 0..rules.len() {
            let root = find(&mut parent, i);
            match clusters.iter_mut().find(|(r, _)| *r == root) {
                Some((_, members)) => members.push(i),
                None => clusters.push((root, vec![i])),
            }
        }
        clusters.into_iter().map(|(_, members)| members).collect()
    }

    fn touches(&self, a: &Rule, b: &Rule) -> bool {
        let tol = self.config.join_tolerance;
        let cross = |y: f32, x0: f32, x1: f32, x: f32, y0: f32, y1: f32| {
            x >= x0 - tol && x <= x1 + tol && y >= y0 - tol && y <= y1 + tol
        };
        match (*a, *b) {
            (Rule::Horizontal(y, x0, x1), Rule::Vertical(x, y0, y1))
            | (Rule::Vertical(x, y0, y1), Rule::Horizontal(y, x0, x1)) => {
                cross(y, x0, x1, x, y0, y1)
            }
            _ => false,
        }
    }

    fn fill_grid(&self, rules: &[Rule], fragments: &[TextFragment]) -> Option<DetectedTable> {
        let tol = self.config.join_tolerance;
        let mut ys: Vec<f32> = Vec::new();
        let mut xs: Vec<f32> = Vec::new();
        for rule in rules {
            match *rule {
                Rule::Horizontal(y, _, _) => ys.push(y),
                Rule::Vertical(x, _, _) => xs.push(x),
            }
        }
        let ys = dedup_positions(ys, tol);
        let xs = dedup_positions(xs, tol);
        if ys.len() < 2 || xs.len() < 2 {
            return None;
        }

        let (n_rows, n_cols) = (ys.len() - 1, xs.len() - 1);
        if n_rows * n_cols < self.config.min_cells {
            return None;
        }

        let bbox = BoundingBox::new(xs[0], ys[0], xs[n_cols], ys[n_rows]);

        // Fragments in reading order within the grid
        let mut inside: Vec<usize> = (0..fragments.len())
            .filter(|&i| {
                let (cx, cy) = fragments[i].bbox.center();
                bbox.contains(cx, cy)
            })
            .collect();
        if inside.is_empty() {
            log::debug!("LatticeStrategy: {}x{} grid holds no text", n_rows, n_cols);
            return None;
        }
        inside.sort_by(|&a, &b| {
            let (fa, fb) = (&fragments[a].bbox, &fragments[b].bbox);
            fa.y0.total_cmp(&fb.y0).then(fa.x0.total_cmp(&fb.x0))
        });

        let mut cells: Vec<Vec<Vec<&str>>> = vec![vec![Vec::new(); n_cols]; n_rows];
        for &i in &inside {
            let (cx, cy) = fragments[i].bbox.center();
            let row = band_index(&ys, cy);
            let col = band_index(&xs, cx);
            cells[row][col].push(fragments[i].text.trim());
        }

        let rows: Vec<Vec<String>> = cells
            .into_iter()
            .map(|row| row.into_iter().map(|parts| parts.join(" ")).collect())
            .collect();

        Some(DetectedTable {
            table: Table::from_rows(rows),
            bbox: Some(bbox),
            consumed: inside,
        })
    }
}

impl TableStrategy for LatticeStrategy {
    fn name(&self) -> &'static str {
        "lattice"
    }

    fn extract(&self, page: &LayoutPage) -> Result<Vec<DetectedTable>> {
        Ok(self.detect(&page.rulings, &page.fragments))
    }
}

/// Sort and merge positions closer than `tol`.
fn dedup_positions(mut values: Vec<f32>, tol: f32) -> Vec<f32> {
    values.sort_by(f32::total_cmp);
    let mut merged: Vec<f32> = Vec::new();
    for v in values {
        match merged.last() {
            Some(&last) if v - last <= tol => {}
            _ => merged.push(v),
        }
    }
    merged
}

/// Index of the band `[edges[i], edges[i + 1])` holding `v`, clamped.
fn band_index(edges: &[f32], v: f32) -> usize {
    let last = edges.len().saturating_sub(2);
    edges
        .windows(2)
        .position(|w| v >= w[0] && v < w[1])
        .unwrap_or(if v < edges[0] { 0 } else { last })
}
