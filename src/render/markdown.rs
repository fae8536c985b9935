//! Markdown rendering.

use crate::error::{Error, Result};
use crate::model::{Block, Document, Table, MAX_HEADING_LEVEL};
use crate::table::render_table;

use super::{RenderResult, RenderStats};

/// Convert a document to Markdown.
pub fn to_markdown(doc: &Document) -> Result<String> {
    MarkdownRenderer::new().render_blocks(&doc.blocks)
}

/// Convert a document to Markdown with statistics.
pub fn to_markdown_with_stats(doc: &Document) -> Result<RenderResult> {
    MarkdownRenderer::new().render_with_stats(doc)
}

/// Markdown renderer.
///
/// Blocks are rendered in sequence order and joined by one blank line.
/// Headings become `#`, `##` or `###` followed by a space, tables become
/// pipe grids, images become `![alt](path)` and rules become `---`.
#[derive(Debug, Default)]
pub struct MarkdownRenderer {
    stats: RenderStats,
}

impl MarkdownRenderer {
    /// Create a new Markdown renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Render a block sequence to Markdown.
    pub fn render_blocks(mut self, blocks: &[Block]) -> Result<String> {
        self.render_internal(blocks)
    }

    /// Render a document to Markdown with statistics.
    pub fn render_with_stats(mut self, doc: &Document) -> Result<RenderResult> {
        let content = self.render_internal(&doc.blocks)?;
        self.stats.count_text(&content);
        Ok(RenderResult::new(content, self.stats))
    }

    fn render_internal(&mut self, blocks: &[Block]) -> Result<String> {
        let mut parts = Vec::with_capacity(blocks.len());
        for block in blocks {
            if let Some(part) = self.render_block(block)? {
                parts.push(part);
            }
        }
        Ok(parts.join("\n\n"))
    }

    fn render_block(&mut self, block: &Block) -> Result<Option<String>> {
        if block.is_blank() {
            return Ok(None);
        }

        let rendered = match block {
            Block::Text { level, content } => self.render_text(*level, content)?,
            Block::Table(table) => self.render_table(table),
            Block::Image {
                asset_ref,
                alt_text,
            } => {
                self.stats.add_image();
                format!("![{}]({})", alt_text, asset_ref)
            }
            Block::Rule => {
                self.stats.add_rule();
                "---".to_string()
            }
        };
        Ok(Some(rendered))
    }

    fn render_text(&mut self, level: u8, content: &str) -> Result<String> {
        if level > MAX_HEADING_LEVEL {
            return Err(Error::Render(format!(
                "heading level {} exceeds {}",
                level, MAX_HEADING_LEVEL
            )));
        }

        let content = content.trim();
        if level == 0 {
            self.stats.add_paragraph();
            return Ok(content.to_string());
        }

        self.stats.add_heading();
        Ok(format!("{} {}", "#".repeat(level as usize), content))
    }

    fn render_table(&mut self, table: &Table) -> String {
        let (text, fallback) = render_table(table);
        self.stats.add_table();
        if fallback {
            self.stats.add_fallback_table();
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(blocks: Vec<Block>) -> Document {
        let mut doc = Document::new();
        doc.extend(blocks);
        doc
    }

    #[test]
    fn test_heading_levels() {
        let d = doc(vec![
            Block::heading("One", 1).unwrap(),
            Block::heading("Two", 2).unwrap(),
            Block::heading("Three", 3).unwrap(),
            Block::text("Body").unwrap(),
        ]);
        assert_eq!(to_markdown(&d).unwrap(), "# One\n\n## Two\n\n### Three\n\nBody");
    }

    #[test]
    fn test_table_scenario() {
        let d = doc(vec![Block::Table(Table::from_rows(vec![
            vec!["Name", "Age"],
            vec!["Ana", "30"],
        ]))]);
        assert_eq!(
            to_markdown(&d).unwrap(),
            "| Name | Age |\n| --- | --- |\n| Ana | 30 |"
        );
    }

    #[test]
    fn test_image_and_rule() {
        let d = doc(vec![
            Block::image_with_alt("images/a_img1.png", "Logo"),
            Block::Rule,
            Block::image("images/a_img2.png"),
        ]);
        assert_eq!(
            to_markdown(&d).unwrap(),
            "![Logo](images/a_img1.png)\n\n---\n\n![Image](images/a_img2.png)"
        );
    }

    #[test]
    fn test_hand_built_blank_text_skipped() {
        let blocks = vec![
            Block::text("a").unwrap(),
            Block::Text {
                level: 0,
                content: "   ".into(),
            },
            Block::text("b").unwrap(),
        ];
        assert_eq!(MarkdownRenderer::new().render_blocks(&blocks).unwrap(), "a\n\nb");
    }

    #[test]
    fn test_invalid_level_is_render_error() {
        let blocks = vec![Block::Text {
            level: 7,
            content: "deep".into(),
        }];
        assert!(matches!(
            MarkdownRenderer::new().render_blocks(&blocks),
            Err(Error::Render(_))
        ));
    }

    #[test]
    fn test_stats() {
        let d = doc(vec![
            Block::heading("Title", 1).unwrap(),
            Block::text("Some body text").unwrap(),
            Block::Table(Table::from_rows(vec![vec!["a"], vec!["1", "2"]])),
            Block::Rule,
        ]);
        let result = to_markdown_with_stats(&d).unwrap();
        assert_eq!(result.stats.heading_count, 1);
        assert_eq!(result.stats.paragraph_count, 1);
        assert_eq!(result.stats.table_count, 1);
        assert_eq!(result.stats.fallback_table_count, 1);
        assert_eq!(result.stats.rule_count, 1);
        assert!(result.content.contains("| a |\n| 1 | 2 |"));
    }

    #[test]
    fn test_deterministic() {
        let d = doc(vec![
            Block::heading("T", 2).unwrap(),
            Block::Table(Table::from_rows(vec![vec!["x", "y"]])),
        ]);
        assert_eq!(to_markdown(&d).unwrap(), to_markdown(&d).unwrap());
    }
}
