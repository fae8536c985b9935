//! Table extraction.
//!
//! Tables reach the block stream along two paths:
//!
//! - **Structured**: the reader already enumerated rows and cells (DOCX and
//!   PPTX tables, grids supplied with a PDF page). [`structured`] only
//!   normalizes the cells.
//! - **Detected**: the grid has to be recovered from geometry. Page-layout
//!   pages go through an ordered list of [`TableStrategy`]s (supplied grids,
//!   ruling lines, text alignment) in a [`TableExtractor`]; raster images go
//!   through [`VisionExtractor`].
//!
//! Whatever the path, the result is a [`Table`], serialized by
//! [`build_grid`] with [`raw_grid`] as the fallback that never fails.

mod grid;
mod lattice;
mod stream;
mod vision;

pub use grid::{build_grid, raw_grid, render_table};
pub use lattice::{LatticeConfig, LatticeStrategy};
pub use stream::{StreamConfig, StreamStrategy};
pub use vision::{
    adaptive_threshold_inv, detect_regions, open_lines, tokenize_rows, VisionExtractor,
    VisionOptions,
};

use crate::error::Result;
use crate::model::{BoundingBox, Table};
use crate::parser::LayoutPage;
use crate::report::{ConversionReport, FailureKind};

/// Normalize an enumerated grid. Returns `None` for a grid with no cells.
pub fn structured<R, C, S>(rows: R) -> Option<Table>
where
    R: IntoIterator<Item = C>,
    C: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let table = Table::from_rows(rows);
    if table.is_empty() {
        None
    } else {
        Some(table)
    }
}

/// A table found on a page-layout page.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedTable {
    pub table: Table,
    /// Position on the page, when known
    pub bbox: Option<BoundingBox>,
    /// Indices of the page fragments the table absorbed
    pub consumed: Vec<usize>,
}

/// One way of finding tables on a page.
pub trait TableStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Find tables on the page. An empty list means "not found here".
    fn extract(&self, page: &LayoutPage) -> Result<Vec<DetectedTable>>;
}

/// Uses the grids the page reader already reported.
#[derive(Debug, Clone, Default)]
pub struct SuppliedGridStrategy;

impl TableStrategy for SuppliedGridStrategy {
    fn name(&self) -> &'static str {
        "supplied"
    }

    fn extract(&self, page: &LayoutPage) -> Result<Vec<DetectedTable>> {
        let mut tables = Vec::new();
        for grid in &page.tables {
            let Some(table) = structured(&grid.rows) else {
                continue;
            };

            // Text drawn inside a known grid belongs to the grid
            let consumed = match grid.bbox {
                Some(bbox) => page
                    .fragments
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| {
                        let (cx, cy) = f.bbox.center();
                        bbox.contains(cx, cy)
                    })
                    .map(|(i, _)| i)
                    .collect(),
                None => Vec::new(),
            };

            tables.push(DetectedTable {
                table,
                bbox: grid.bbox,
                consumed,
            });
        }
        Ok(tables)
    }
}

/// Tries strategies in priority order; the first one that finds a table wins.
pub struct TableExtractor {
    strategies: Vec<Box<dyn TableStrategy>>,
}

impl TableExtractor {
    /// Supplied grids, then ruling lines, then text alignment.
    pub fn new() -> Self {
        Self {
            strategies: vec![
                Box::new(SuppliedGridStrategy),
                Box::new(LatticeStrategy::new()),
                Box::new(StreamStrategy::new()),
            ],
        }
    }

    /// Use a custom strategy list.
    pub fn with_strategies(strategies: Vec<Box<dyn TableStrategy>>) -> Self {
        Self { strategies }
    }

    /// Names of the configured strategies, in order.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the strategies on one page.
    ///
    /// A failing strategy is recorded and the next one is tried. Finding
    /// nothing is not a failure.
    pub fn extract(&self, page: &LayoutPage, report: &mut ConversionReport) -> Vec<DetectedTable> {
        for strategy in &self.strategies {
            match strategy.extract(page) {
                Ok(tables) if !tables.is_empty() => {
                    log::debug!(
                        "TableExtractor: page {} has {} tables ({})",
                        page.number,
                        tables.len(),
                        strategy.name()
                    );
                    return tables;
                }
                Ok(_) => {}
                Err(e) => report.record(
                    FailureKind::TableExtraction,
                    format!("page {}: {} strategy: {}", page.number, strategy.name(), e),
                ),
            }
        }
        Vec::new()
    }
}

impl Default for TableExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::parser::{PlacedGrid, TextFragment};

    struct Failing;

    impl TableStrategy for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn extract(&self, _page: &LayoutPage) -> Result<Vec<DetectedTable>> {
            Err(Error::TableExtraction("broken".into()))
        }
    }

    fn page_with_grid(bbox: Option<BoundingBox>) -> LayoutPage {
        LayoutPage {
            number: 1,
            fragments: vec![
                TextFragment::new("Name", BoundingBox::new(10.0, 10.0, 40.0, 20.0), 10.0),
                TextFragment::new("Body", BoundingBox::new(10.0, 300.0, 40.0, 310.0), 10.0),
            ],
            tables: vec![PlacedGrid {
                rows: vec![vec!["Name".into(), "".into()], vec!["Ana".into()]],
                bbox,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_structured_normalizes() {
        let table = structured(vec![vec!["a\nb", ""], vec!["c"]]).unwrap();
        assert_eq!(table.rows, vec![vec!["a b", " "], vec!["c", " "]]);
        assert!(structured(Vec::<Vec<String>>::new()).is_none());
    }

    #[test]
    fn test_supplied_grid_consumes_fragments_inside() {
        let page = page_with_grid(Some(BoundingBox::new(0.0, 0.0, 100.0, 50.0)));
        let tables = SuppliedGridStrategy.extract(&page).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].consumed, vec![0]);

        let page = page_with_grid(None);
        let tables = SuppliedGridStrategy.extract(&page).unwrap();
        assert!(tables[0].consumed.is_empty());
    }

    #[test]
    fn test_failing_strategy_falls_through() {
        let extractor = TableExtractor::with_strategies(vec![
            Box::new(Failing),
            Box::new(SuppliedGridStrategy),
        ]);
        let mut report = ConversionReport::new();
        let tables = extractor.extract(&page_with_grid(None), &mut report);
        assert_eq!(tables.len(), 1);
        assert_eq!(report.count(FailureKind::TableExtraction), 1);
    }

    #[test]
    fn test_nothing_found_is_silent() {
        let mut report = ConversionReport::new();
        let tables = TableExtractor::new().extract(&LayoutPage::default(), &mut report);
        assert!(tables.is_empty());
        assert!(report.is_clean());
    }

    #[test]
    fn test_default_order() {
        assert_eq!(
            TableExtractor::new().strategy_names(),
            vec!["supplied", "lattice", "stream"]
        );
    }
}
