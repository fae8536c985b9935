//! Page-layout adapter (PDF).
//!
//! Each page goes through the same steps:
//!
//! 1. Fragments on one line with small gaps are merged into pieces.
//! 2. The table strategies run over the pieces; pieces a table absorbed are
//!    removed from the text.
//! 3. The remaining pieces are grouped into lines and lines into
//!    paragraphs, using spacing, font size and indentation.
//! 4. Paragraphs, tables and images are handed to the reading-order
//!    resolver together and the ordered blocks are appended.
//!
//! Heading levels are inferred from font size relative to the body size
//! of the whole document.

use super::flow::{link_pattern, link_urls};
use super::{ExtractContext, FormatAdapter};
use crate::detect::SourceKind;
use crate::error::Result;
use crate::model::{Block, BoundingBox, Document, MAX_HEADING_LEVEL};
use crate::order::{resolve_page, PositionedBlock};
use crate::report::FailureKind;
use crate::parser::{
    is_spaceless_script_char, LayoutDocument, LayoutPage, LayoutReader, TextFragment,
};
use crate::table::TableExtractor;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Thresholds for grouping fragments into paragraphs.
#[derive(Debug, Clone, PartialEq)]
pub struct ParagraphConfig {
    /// Same line when vertical centers differ by at most this share of the font size
    pub line_tolerance: f32,
    /// Join fragments whose gap is at most this share of the font size
    pub join_gap: f32,
    /// Break when line spacing exceeds this multiple of the page average
    pub break_spacing: f32,
    /// Break when font size changes by more than this (points)
    pub font_delta: f32,
    /// Break when the left edge moves by more than this (points)
    pub indent_delta: f32,
    /// Break when the blank space between lines exceeds this share of the font size
    pub max_gap: f32,
    /// Headings are at least this much larger than body text (points)
    pub heading_delta: f32,
}

impl Default for ParagraphConfig {
    fn default() -> Self {
        Self {
            line_tolerance: 0.3,
            join_gap: 0.6,
            break_spacing: 1.5,
            font_delta: 1.0,
            indent_delta: 20.0,
            max_gap: 1.0,
            heading_delta: 1.5,
        }
    }
}

/// Builds documents from a [`LayoutReader`].
#[derive(Clone)]
pub struct LayoutAdapter {
    reader: Arc<dyn LayoutReader>,
    tables: Arc<TableExtractor>,
    config: ParagraphConfig,
}

impl LayoutAdapter {
    pub fn new(reader: Arc<dyn LayoutReader>) -> Self {
        Self {
            reader,
            tables: Arc::new(TableExtractor::new()),
            config: ParagraphConfig::default(),
        }
    }

    /// Replace the table strategies.
    pub fn with_tables(mut self, tables: TableExtractor) -> Self {
        self.tables = Arc::new(tables);
        self
    }

    pub fn with_config(mut self, config: ParagraphConfig) -> Self {
        self.config = config;
        self
    }

    /// Turn parsed pages into blocks, page by page.
    pub fn build(&self, source: LayoutDocument, ctx: &mut ExtractContext) -> Document {
        let fonts = FontSizes::collect(&source.pages, self.config.heading_delta);
        let mut doc = Document::new();

        for page in source.pages {
            let blocks = self.build_page(page, &fonts, ctx, &mut doc);
            doc.extend(blocks);
        }

        doc
    }

    fn build_page(
        &self,
        mut page: LayoutPage,
        fonts: &FontSizes,
        ctx: &mut ExtractContext,
        doc: &mut Document,
    ) -> Vec<Block> {
        page.fragments = merge_pieces(&page.fragments, &self.config);

        let tables = self.tables.extract(&page, &mut ctx.report);
        let consumed: HashSet<usize> = tables
            .iter()
            .flat_map(|t| t.consumed.iter().copied())
            .collect();
        let remaining: Vec<&TextFragment> = page
            .fragments
            .iter()
            .enumerate()
            .filter(|(i, _)| !consumed.contains(i))
            .map(|(_, f)| f)
            .collect();

        let links = link_pattern(&page.links);
        let barriers: Vec<BoundingBox> = tables
            .iter()
            .filter_map(|t| t.bbox)
            .chain(page.images.iter().filter_map(|i| i.bbox))
            .collect();
        let lines = lines_of(remaining, &self.config);
        let mut items = Vec::new();

        for paragraph in group_paragraphs(lines, &barriers, fonts, &self.config) {
            let text = match &links {
                Some(re) => link_urls(&paragraph.text, re),
                None => paragraph.text,
            };
            if let Some(block) = Block::with_level(text, paragraph.level) {
                items.push(PositionedBlock::new(block, paragraph.bbox));
            }
        }

        for detected in tables {
            items.push(placed(Block::Table(detected.table), detected.bbox));
        }

        for placed_image in &page.images {
            if let Some(block) = ctx.image_block(doc, &placed_image.image) {
                items.push(placed(block, placed_image.bbox));
            }
        }
        for reason in &page.skipped_images {
            ctx.report.record(
                FailureKind::AssetWrite,
                format!("page {}: {}", page.number, reason),
            );
        }

        log::debug!(
            "LayoutAdapter: page {} has {} blocks ({} fragments consumed by tables)",
            page.number,
            items.len(),
            consumed.len()
        );
        resolve_page(items)
    }
}

impl FormatAdapter for LayoutAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::PageLayout
    }

    fn extract(&self, path: &Path, ctx: &mut ExtractContext) -> Result<Document> {
        let reader = Arc::clone(&self.reader);
        let source = ctx.parse("page-layout parse", path, move |p| reader.read(p))?;
        log::debug!("LayoutAdapter: {} pages", source.pages.len());
        Ok(self.build(source, ctx))
    }
}

fn placed(block: Block, bbox: Option<BoundingBox>) -> PositionedBlock {
    match bbox {
        Some(bbox) => PositionedBlock::new(block, bbox),
        None => PositionedBlock::unplaced(block),
    }
}

/// Body size and heading sizes over a whole document.
#[derive(Debug, Clone)]
struct FontSizes {
    body: f32,
    /// Distinct heading sizes, largest first
    headings: Vec<f32>,
    delta: f32,
}

impl FontSizes {
    fn collect(pages: &[LayoutPage], delta: f32) -> Self {
        let mut histogram: HashMap<i32, usize> = HashMap::new();
        for fragment in pages.iter().flat_map(|p| &p.fragments) {
            let key = (fragment.font_size * 10.0).round() as i32;
            *histogram.entry(key).or_insert(0) += fragment.text.chars().count();
        }

        // Most common size wins; ties go to the smaller size
        let body = histogram
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(key, _)| *key as f32 / 10.0)
            .unwrap_or(12.0);

        let mut headings: Vec<f32> = histogram
            .keys()
            .map(|k| *k as f32 / 10.0)
            .filter(|size| *size >= body + delta)
            .collect();
        headings.sort_by(|a, b| b.total_cmp(a));

        Self {
            body,
            headings,
            delta,
        }
    }

    fn level(&self, size: f32) -> u8 {
        if size < self.body + self.delta {
            return 0;
        }
        let rank = self
            .headings
            .iter()
            .position(|h| size >= h - 0.5)
            .unwrap_or(self.headings.len());
        (rank + 1).min(MAX_HEADING_LEVEL as usize) as u8
    }
}

/// Group fragments into lines, top to bottom, each sorted left to right.
fn group_lines<'a>(
    mut fragments: Vec<&'a TextFragment>,
    config: &ParagraphConfig,
) -> Vec<Vec<&'a TextFragment>> {
    fragments.sort_by(|a, b| {
        center_y(a)
            .total_cmp(&center_y(b))
            .then(a.bbox.x0.total_cmp(&b.bbox.x0))
    });

    let mut lines: Vec<Vec<&TextFragment>> = Vec::new();
    let mut current_y: Option<f32> = None;

    for fragment in fragments {
        let y = center_y(fragment);
        let tolerance = fragment.font_size * config.line_tolerance;
        let same_line = current_y.is_some_and(|line_y| (y - line_y).abs() <= tolerance);
        match lines.last_mut() {
            Some(line) if same_line => line.push(fragment),
            _ => {
                current_y = Some(y);
                lines.push(vec![fragment]);
            }
        }
    }

    for line in &mut lines {
        line.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
    }
    lines
}

fn center_y(fragment: &TextFragment) -> f32 {
    (fragment.bbox.y0 + fragment.bbox.y1) / 2.0
}

/// Merge same-line fragments separated by small gaps.
fn merge_pieces(fragments: &[TextFragment], config: &ParagraphConfig) -> Vec<TextFragment> {
    let mut pieces = Vec::new();

    for line in group_lines(fragments.iter().collect(), config) {
        let mut current: Option<TextFragment> = None;
        for fragment in line {
            let joinable = current.as_ref().is_some_and(|piece| {
                let size = piece.font_size.max(fragment.font_size);
                fragment.bbox.x0 - piece.bbox.x1 <= config.join_gap * size
            });

            if joinable {
                if let Some(piece) = current.as_mut() {
                    append_text(piece, fragment);
                }
            } else if let Some(done) = current.replace(fragment.clone()) {
                pieces.push(done);
            }
        }
        pieces.extend(current);
    }

    pieces
}

fn append_text(piece: &mut TextFragment, next: &TextFragment) {
    let size = piece.font_size.max(next.font_size);
    let gap = next.bbox.x0 - piece.bbox.x1;
    let boundary_space = piece.text.ends_with(char::is_whitespace)
        || next.text.starts_with(char::is_whitespace);
    let spaceless = piece.text.chars().last().is_some_and(is_spaceless_script_char)
        && next.text.chars().next().is_some_and(is_spaceless_script_char);

    if !boundary_space && !spaceless && gap > 0.1 * size {
        piece.text.push(' ');
    }
    piece.text.push_str(&next.text);
    piece.bbox = piece.bbox.union(&next.bbox);
    piece.font_size = size;
}

/// One line of text.
#[derive(Debug, Clone)]
struct Line {
    text: String,
    bbox: BoundingBox,
    font_size: f32,
}

fn lines_of(fragments: Vec<&TextFragment>, config: &ParagraphConfig) -> Vec<Line> {
    group_lines(fragments, config)
        .into_iter()
        .filter_map(|pieces| {
            let first = pieces.first()?;
            let bbox = pieces.iter().fold(first.bbox, |acc, p| acc.union(&p.bbox));
            let font_size = pieces.iter().map(|p| p.font_size).fold(0.0, f32::max);
            let text = pieces
                .iter()
                .map(|p| p.text.trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            Some(Line {
                text,
                bbox,
                font_size,
            })
        })
        .filter(|line| !line.text.is_empty())
        .collect()
}

/// A paragraph ready to become a block.
#[derive(Debug, Clone)]
struct Paragraph {
    text: String,
    bbox: BoundingBox,
    level: u8,
}

/// Group lines into paragraphs. A table or image starting between two
/// lines always separates them.
fn group_paragraphs(
    lines: Vec<Line>,
    barriers: &[BoundingBox],
    fonts: &FontSizes,
    config: &ParagraphConfig,
) -> Vec<Paragraph> {
    let spacing = average_spacing(&lines);
    let mut paragraphs: Vec<Paragraph> = Vec::new();
    let mut previous: Option<(Line, u8)> = None;

    for line in lines {
        let level = fonts.level(line.font_size);
        let starts_new = match &previous {
            None => true,
            Some((prev, prev_level)) => {
                level > 0
                    || *prev_level > 0
                    || line.bbox.y0 - prev.bbox.y0 > spacing * config.break_spacing
                    || line.bbox.y0 - prev.bbox.y1 > prev.font_size * config.max_gap
                    || barriers
                        .iter()
                        .any(|b| b.y0 >= prev.bbox.y1 && b.y0 < line.bbox.y0)
                    || (line.font_size - prev.font_size).abs() > config.font_delta
                    || (line.bbox.x0 - prev.bbox.x0).abs() > config.indent_delta
            }
        };

        match paragraphs.last_mut() {
            Some(paragraph) if !starts_new => {
                paragraph.text.push(' ');
                paragraph.text.push_str(&line.text);
                paragraph.bbox = paragraph.bbox.union(&line.bbox);
            }
            _ => paragraphs.push(Paragraph {
                text: line.text.clone(),
                bbox: line.bbox,
                level,
            }),
        }
        previous = Some((line, level));
    }

    paragraphs
}

/// Mean distance between consecutive line tops on a page.
fn average_spacing(lines: &[Line]) -> f32 {
    let spacings: Vec<f32> = lines
        .windows(2)
        .map(|w| (w[1].bbox.y0 - w[0].bbox.y0).abs())
        .filter(|s| *s > 0.1)
        .collect();
    if spacings.is_empty() {
        return 12.0;
    }
    spacings.iter().sum::<f32>() / spacings.len() as f32
}
