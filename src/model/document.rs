//! Document-level types.

use super::{Asset, Block};
use serde::{Deserialize, Serialize};

/// A converted document: blocks in reading order plus the assets they use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Content blocks, in output order
    pub blocks: Vec<Block>,

    /// Images written for this document
    pub assets: Vec<Asset>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block. Blank blocks are dropped.
    pub fn push(&mut self, block: Block) {
        if block.is_blank() {
            log::debug!("Document: dropping blank {:?} block", block);
            return;
        }
        self.blocks.push(block);
    }

    /// Append an optional block, as returned by [`Block::text`].
    pub fn push_opt(&mut self, block: Option<Block>) {
        if let Some(block) = block {
            self.push(block);
        }
    }

    /// Append blocks in order.
    pub fn extend<I: IntoIterator<Item = Block>>(&mut self, blocks: I) {
        for block in blocks {
            self.push(block);
        }
    }

    /// Record a written asset.
    pub fn add_asset(&mut self, asset: Asset) {
        self.assets.push(asset);
    }

    /// Check if the document has no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Get plain text content of the document.
    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.plain_text())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Table;

    #[test]
    fn test_push_drops_blank() {
        let mut doc = Document::new();
        doc.push(Block::Text {
            level: 0,
            content: "   ".to_string(),
        });
        doc.push(Block::Table(Table::default()));
        doc.push_opt(Block::text("\n"));
        assert!(doc.is_empty());

        doc.push_opt(Block::text("kept"));
        doc.push(Block::Rule);
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_plain_text() {
        let mut doc = Document::new();
        doc.push_opt(Block::heading("Title", 1));
        doc.push(Block::Rule);
        doc.push_opt(Block::text("Body"));
        assert_eq!(doc.plain_text(), "Title\n\nBody");
    }
}
