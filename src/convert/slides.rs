//! Slide adapter (PPTX).

use super::{ExtractContext, FormatAdapter};
use crate::detect::SourceKind;
use crate::error::Result;
use crate::model::{Block, Document};
use crate::parser::{DeckReader, SlideDeck, SlideShape};
use crate::table::structured;
use std::path::Path;
use std::sync::Arc;

/// Builds documents from a [`DeckReader`].
///
/// Every slide opens with a level-1 `Slide <n>` heading and its shapes
/// follow in placement order. With separators on, a rule closes each slide.
#[derive(Clone)]
pub struct SlideAdapter {
    reader: Arc<dyn DeckReader>,
    separators: bool,
}

impl SlideAdapter {
    pub fn new(reader: Arc<dyn DeckReader>) -> Self {
        Self {
            reader,
            separators: true,
        }
    }

    pub fn with_separators(mut self, separators: bool) -> Self {
        self.separators = separators;
        self
    }

    /// Turn a parsed deck into blocks.
    pub fn build(&self, deck: &SlideDeck, ctx: &mut ExtractContext) -> Document {
        let mut doc = Document::new();

        for (index, slide) in deck.slides.iter().enumerate() {
            doc.push_opt(Block::heading(format!("Slide {}", index + 1), 1));

            for shape in &slide.shapes {
                match shape {
                    SlideShape::Text(text) => doc.push_opt(Block::text(text)),
                    SlideShape::Table(rows) => {
                        if let Some(table) = structured(rows) {
                            doc.push(Block::Table(table));
                        }
                    }
                    SlideShape::Picture(image) => {
                        let block = ctx.image_block(&mut doc, image);
                        doc.push_opt(block);
                    }
                    SlideShape::Other => {}
                }
            }

            if self.separators {
                doc.push(Block::Rule);
            }
        }

        doc
    }
}

impl FormatAdapter for SlideAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Slide
    }

    fn extract(&self, path: &Path, ctx: &mut ExtractContext) -> Result<Document> {
        let reader = Arc::clone(&self.reader);
        let deck = ctx.parse("slide parse", path, move |p| reader.read(p))?;
        log::debug!("SlideAdapter: {} slides", deck.slides.len());
        Ok(self.build(&deck, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::Externalizer;
    use crate::parser::{EmbeddedImage, Slide};
    use crate::render::to_markdown;

    struct NoReader;

    impl DeckReader for NoReader {
        fn read(&self, _path: &Path) -> Result<SlideDeck> {
            Ok(SlideDeck::default())
        }
    }

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2];

    fn deck() -> SlideDeck {
        SlideDeck {
            slides: vec![
                Slide {
                    shapes: vec![
                        SlideShape::Text("Welcome".into()),
                        SlideShape::Other,
                        SlideShape::Picture(EmbeddedImage::new(PNG.to_vec(), None)),
                    ],
                },
                Slide {
                    shapes: vec![
                        SlideShape::Text("  ".into()),
                        SlideShape::Table(vec![vec!["Q".into(), "Total".into()]]),
                    ],
                },
            ],
        }
    }

    #[test]
    fn test_slides_in_order_with_separators() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ExtractContext::new(Externalizer::new(dir.path(), "images", "deck"));
        let doc = SlideAdapter::new(Arc::new(NoReader)).build(&deck(), &mut ctx);

        assert_eq!(
            to_markdown(&doc).unwrap(),
            "# Slide 1\n\nWelcome\n\n![Image](images/deck_img1.png)\n\n---\n\n\
             # Slide 2\n\n| Q | Total |\n\n---"
        );
    }

    #[test]
    fn test_without_separators() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ExtractContext::new(Externalizer::new(dir.path(), "images", "deck"));
        let doc = SlideAdapter::new(Arc::new(NoReader))
            .with_separators(false)
            .build(&deck(), &mut ctx);
        assert!(!doc.blocks.contains(&Block::Rule));
        assert_eq!(doc.blocks[0], Block::heading("Slide 1", 1).unwrap());
    }
}
