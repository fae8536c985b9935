//! Reading order for page-layout pages.
//!
//! Blocks from one page arrive in discovery order (text first, then tables,
//! then images). They are stable-sorted by top edge, then left edge. Blocks
//! without a position keep their relative order and go to the bottom of
//! the page.

use crate::model::{Block, BoundingBox};
use std::cmp::Ordering;

/// A block waiting for its place on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedBlock {
    pub block: Block,
    pub bbox: Option<BoundingBox>,
}

impl PositionedBlock {
    pub fn new(block: Block, bbox: BoundingBox) -> Self {
        Self {
            block,
            bbox: Some(bbox),
        }
    }

    /// A block whose position on the page is unknown.
    pub fn unplaced(block: Block) -> Self {
        Self { block, bbox: None }
    }

    fn key(&self) -> (f32, f32) {
        match self.bbox {
            Some(b) => (b.y0, b.x0),
            None => (f32::INFINITY, f32::INFINITY),
        }
    }
}

/// Compare two items by (top, left).
fn compare(a: &PositionedBlock, b: &PositionedBlock) -> Ordering {
    let (ka, kb) = (a.key(), b.key());
    ka.0.total_cmp(&kb.0).then(ka.1.total_cmp(&kb.1))
}

/// Order one page's blocks for output.
pub fn resolve_page(mut items: Vec<PositionedBlock>) -> Vec<Block> {
    // sort_by is stable: exact ties keep discovery order
    items.sort_by(compare);
    log::debug!("resolve_page: ordered {} blocks", items.len());
    items.into_iter().map(|item| item.block).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Block {
        Block::text(s).unwrap()
    }

    fn at(s: &str, x: f32, y: f32) -> PositionedBlock {
        PositionedBlock::new(text(s), BoundingBox::new(x, y, x + 10.0, y + 10.0))
    }

    #[test]
    fn test_same_line_left_to_right() {
        let blocks = resolve_page(vec![at("B", 300.0, 10.0), at("A", 20.0, 10.0)]);
        assert_eq!(blocks, vec![text("A"), text("B")]);
    }

    #[test]
    fn test_top_to_bottom() {
        let blocks = resolve_page(vec![
            at("third", 0.0, 300.0),
            at("first", 400.0, 5.0),
            at("second", 0.0, 100.0),
        ]);
        assert_eq!(blocks, vec![text("first"), text("second"), text("third")]);
    }

    #[test]
    fn test_exact_ties_keep_discovery_order() {
        let blocks = resolve_page(vec![at("one", 10.0, 10.0), at("two", 10.0, 10.0)]);
        assert_eq!(blocks, vec![text("one"), text("two")]);
    }

    #[test]
    fn test_unplaced_go_last_in_order() {
        let blocks = resolve_page(vec![
            PositionedBlock::unplaced(Block::image("images/a.png")),
            at("body", 0.0, 700.0),
            PositionedBlock::unplaced(Block::image("images/b.png")),
        ]);
        assert_eq!(
            blocks,
            vec![
                text("body"),
                Block::image("images/a.png"),
                Block::image("images/b.png"),
            ]
        );
    }
}
