//! Page-flow adapter (DOCX).
//!
//! Paragraphs and tables are emitted in body order. Images are not
//! positioned by the reader, so every embedded image is appended after the
//! body in relationship order.

use super::{ExtractContext, FormatAdapter};
use crate::detect::SourceKind;
use crate::error::Result;
use crate::model::{Block, Document};
use crate::parser::{FlowDocument, FlowElement, FlowParagraph, FlowReader};
use crate::table::structured;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;

/// Builds documents from a [`FlowReader`].
#[derive(Clone)]
pub struct FlowAdapter {
    reader: Arc<dyn FlowReader>,
}

impl FlowAdapter {
    pub fn new(reader: Arc<dyn FlowReader>) -> Self {
        Self { reader }
    }

    /// Turn a parsed document into blocks.
    pub fn build(&self, source: &FlowDocument, ctx: &mut ExtractContext) -> Document {
        let mut doc = Document::new();
        let links = link_pattern(&source.hyperlinks);

        for element in &source.elements {
            match element {
                FlowElement::Paragraph(paragraph) => {
                    let text = paragraph_text(paragraph);
                    let text = match &links {
                        Some(re) => link_urls(&text, re),
                        None => text,
                    };
                    doc.push_opt(Block::with_level(text, heading_level(paragraph)));
                }
                FlowElement::Table(rows) => {
                    if let Some(table) = structured(rows) {
                        doc.push(Block::Table(table));
                    }
                }
            }
        }

        for image in &source.images {
            let block = ctx.image_block(&mut doc, image);
            doc.push_opt(block);
        }

        doc
    }
}

impl FormatAdapter for FlowAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::PageFlow
    }

    fn extract(&self, path: &Path, ctx: &mut ExtractContext) -> Result<Document> {
        let reader = Arc::clone(&self.reader);
        let source = ctx.parse("page-flow parse", path, move |p| reader.read(p))?;
        log::debug!(
            "FlowAdapter: {} elements, {} images, {} links",
            source.elements.len(),
            source.images.len(),
            source.hyperlinks.len()
        );
        Ok(self.build(&source, ctx))
    }
}

/// Trimmed non-empty runs joined by a space.
fn paragraph_text(paragraph: &FlowParagraph) -> String {
    paragraph
        .runs
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Heading level from the style name: "heading 1" to "heading 3".
fn heading_level(paragraph: &FlowParagraph) -> u8 {
    let Some(style) = &paragraph.style else {
        return 0;
    };
    let style = style.to_lowercase();
    (1..=3)
        .find(|level| style.contains(&format!("heading {level}")))
        .unwrap_or(0)
}

/// Alternation over the given URLs, longest first, so a URL that is a
/// prefix of another never splits it.
pub(crate) fn link_pattern(urls: &[String]) -> Option<Regex> {
    let mut urls: Vec<&str> = urls
        .iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .collect();
    if urls.is_empty() {
        return None;
    }
    urls.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    urls.dedup();

    let alternation = urls
        .iter()
        .map(|u| regex::escape(u))
        .collect::<Vec<_>>()
        .join("|");
    match Regex::new(&alternation) {
        Ok(re) => Some(re),
        Err(e) => {
            log::warn!("Skipping link substitution: {e}");
            None
        }
    }
}

/// Replace verbatim URL occurrences with `[url](url)`.
pub(crate) fn link_urls(text: &str, pattern: &Regex) -> String {
    pattern
        .replace_all(text, |caps: &regex::Captures<'_>| {
            format!("[{0}]({0})", &caps[0])
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::Externalizer;
    use crate::parser::EmbeddedImage;
    use crate::report::FailureKind;

    struct NoReader;

    impl FlowReader for NoReader {
        fn read(&self, _path: &Path) -> Result<FlowDocument> {
            Ok(FlowDocument::default())
        }
    }

    fn paragraph(runs: &[&str], style: Option<&str>) -> FlowElement {
        FlowElement::Paragraph(FlowParagraph {
            runs: runs.iter().map(|r| r.to_string()).collect(),
            style: style.map(String::from),
        })
    }

    fn context(dir: &Path) -> ExtractContext {
        ExtractContext::new(Externalizer::new(dir, "images", "memo"))
    }

    #[test]
    fn test_paragraphs_and_headings() {
        let source = FlowDocument {
            elements: vec![
                paragraph(&["  Quarterly ", " Report "], Some("Heading 1")),
                paragraph(&["   "], None),
                paragraph(&["Details"], Some("Custom Heading 2 Style")),
                paragraph(&["Body", "text"], Some("Normal")),
            ],
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let doc = FlowAdapter::new(Arc::new(NoReader)).build(&source, &mut context(dir.path()));

        assert_eq!(
            doc.blocks,
            vec![
                Block::heading("Quarterly Report", 1).unwrap(),
                Block::heading("Details", 2).unwrap(),
                Block::text("Body text").unwrap(),
            ]
        );
    }

    #[test]
    fn test_hyperlinks_substituted() {
        let source = FlowDocument {
            elements: vec![paragraph(
                &["See https://example.com/docs and https://example.com"],
                None,
            )],
            hyperlinks: vec!["https://example.com".into(), "https://example.com/docs".into()],
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let doc = FlowAdapter::new(Arc::new(NoReader)).build(&source, &mut context(dir.path()));

        assert_eq!(
            doc.blocks[0].plain_text(),
            "See [https://example.com/docs](https://example.com/docs) and \
             [https://example.com](https://example.com)"
        );
    }

    #[test]
    fn test_tables_inline_and_images_trailing() {
        let source = FlowDocument {
            elements: vec![
                paragraph(&["Before"], None),
                FlowElement::Table(vec![
                    vec!["Name".into(), "Age".into()],
                    vec!["Ana".into(), "".into()],
                ]),
                paragraph(&["After"], None),
            ],
            images: vec![EmbeddedImage::new(b"not really an image".to_vec(), Some("png".into()))
                .with_alt_text(Some("Chart".into()))],
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        let doc = FlowAdapter::new(Arc::new(NoReader)).build(&source, &mut ctx);

        assert_eq!(doc.len(), 4);
        assert!(doc.blocks[1].is_table());
        assert_eq!(doc.blocks[2].plain_text(), "After");
        assert_eq!(doc.blocks[3], Block::image_with_alt("images/memo_img1.png", "Chart"));
        assert_eq!(doc.assets.len(), 1);
        assert!(ctx.report.is_clean());
    }

    #[test]
    fn test_empty_image_dropped_and_recorded() {
        let source = FlowDocument {
            elements: vec![paragraph(&["Text"], None)],
            images: vec![EmbeddedImage::new(Vec::new(), Some("png".into()))],
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        let doc = FlowAdapter::new(Arc::new(NoReader)).build(&source, &mut ctx);

        assert_eq!(doc.len(), 1);
        assert_eq!(ctx.report.count(FailureKind::AssetWrite), 1);
    }
}
