//! Rendering result with statistics.

use serde::{Deserialize, Serialize};

/// Result of rendering a document, including content and statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderResult {
    /// The rendered Markdown
    pub content: String,

    /// Rendering statistics
    pub stats: RenderStats,
}

impl RenderResult {
    /// Create a new render result.
    pub fn new(content: String, stats: RenderStats) -> Self {
        Self { content, stats }
    }
}

/// Statistics collected while rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderStats {
    /// Number of headings rendered
    pub heading_count: u32,

    /// Number of body paragraphs rendered
    pub paragraph_count: u32,

    /// Number of tables rendered
    pub table_count: u32,

    /// Tables that had to use the raw grid
    pub fallback_table_count: u32,

    /// Number of images referenced
    pub image_count: u32,

    /// Number of slide separators
    pub rule_count: u32,

    /// Approximate word count (whitespace-separated tokens)
    pub word_count: u32,

    /// Character count (excluding whitespace)
    pub char_count: u32,
}

impl RenderStats {
    /// Create new empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_heading(&mut self) {
        self.heading_count += 1;
    }

    pub fn add_paragraph(&mut self) {
        self.paragraph_count += 1;
    }

    pub fn add_table(&mut self) {
        self.table_count += 1;
    }

    pub fn add_fallback_table(&mut self) {
        self.fallback_table_count += 1;
    }

    pub fn add_image(&mut self) {
        self.image_count += 1;
    }

    pub fn add_rule(&mut self) {
        self.rule_count += 1;
    }

    /// Add word and character counts from text.
    pub fn count_text(&mut self, text: &str) {
        self.word_count += text.split_whitespace().count() as u32;
        self.char_count += text.chars().filter(|c| !c.is_whitespace()).count() as u32;
    }

    /// Merge another stats instance into this one.
    pub fn merge(&mut self, other: &RenderStats) {
        self.heading_count += other.heading_count;
        self.paragraph_count += other.paragraph_count;
        self.table_count += other.table_count;
        self.fallback_table_count += other.fallback_table_count;
        self.image_count += other.image_count;
        self.rule_count += other.rule_count;
        self.word_count += other.word_count;
        self.char_count += other.char_count;
    }
}
