//! Content blocks.

use super::Table;
use serde::{Deserialize, Serialize};

/// Alt text used when the source gives none.
pub const DEFAULT_ALT_TEXT: &str = "Image";

/// Deepest heading level that is rendered as a heading.
pub const MAX_HEADING_LEVEL: u8 = 3;

/// A unit of Markdown-renderable content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Body text (level 0) or a heading (levels 1-3).
    Text {
        /// Heading level, 0 for body text
        level: u8,
        /// Trimmed, non-empty text
        content: String,
    },

    /// A grid of cells.
    Table(Table),

    /// A reference to an externalized image.
    Image {
        /// Path of the asset relative to the Markdown file
        asset_ref: String,
        /// Alternative text
        alt_text: String,
    },

    /// Separator between slides.
    Rule,
}

impl Block {
    /// Create a body text block.
    ///
    /// Returns `None` when the text is empty after trimming.
    pub fn text(content: impl AsRef<str>) -> Option<Self> {
        Self::with_level(content, 0)
    }

    /// Create a heading block. Levels above 3 are clamped to 3, level 0 is
    /// raised to 1.
    pub fn heading(content: impl AsRef<str>, level: u8) -> Option<Self> {
        Self::with_level(content, level.clamp(1, MAX_HEADING_LEVEL))
    }

    /// Create a text block at an explicit level (0 = body).
    pub fn with_level(content: impl AsRef<str>, level: u8) -> Option<Self> {
        let content = content.as_ref().trim();
        if content.is_empty() {
            return None;
        }
        Some(Block::Text {
            level: level.min(MAX_HEADING_LEVEL),
            content: content.to_string(),
        })
    }

    /// Create an image block with the default alt text.
    pub fn image(asset_ref: impl Into<String>) -> Self {
        Self::image_with_alt(asset_ref, DEFAULT_ALT_TEXT)
    }

    /// Create an image block; blank alt text falls back to the default.
    pub fn image_with_alt(asset_ref: impl Into<String>, alt_text: impl AsRef<str>) -> Self {
        let alt = alt_text.as_ref().trim();
        Block::Image {
            asset_ref: asset_ref.into(),
            alt_text: if alt.is_empty() {
                DEFAULT_ALT_TEXT.to_string()
            } else {
                alt.to_string()
            },
        }
    }

    /// Heading level for text blocks, `None` otherwise.
    pub fn level(&self) -> Option<u8> {
        match self {
            Block::Text { level, .. } => Some(*level),
            _ => None,
        }
    }

    /// Check if this is a heading.
    pub fn is_heading(&self) -> bool {
        matches!(self, Block::Text { level, .. } if *level > 0)
    }

    /// Check if this is a table.
    pub fn is_table(&self) -> bool {
        matches!(self, Block::Table(_))
    }

    /// Check if this is an image.
    pub fn is_image(&self) -> bool {
        matches!(self, Block::Image { .. })
    }

    /// Whether the block would render to nothing.
    ///
    /// Text variants built by hand, bypassing the constructors, may be blank.
    pub fn is_blank(&self) -> bool {
        match self {
            Block::Text { content, .. } => content.trim().is_empty(),
            Block::Table(t) => t.is_empty(),
            Block::Image { asset_ref, .. } => asset_ref.is_empty(),
            Block::Rule => false,
        }
    }

    /// Plain text content, without Markdown syntax.
    pub fn plain_text(&self) -> String {
        match self {
            Block::Text { content, .. } => content.clone(),
            Block::Table(t) => t.plain_text(),
            Block::Image { alt_text, .. } => alt_text.clone(),
            Block::Rule => String::new(),
        }
    }
}
