//! Raster adapter (scanned pages and photos).
//!
//! The source image itself is kept as the first block. Full-page OCR then
//! adds an `Extracted Text` section and vision table detection an
//! `Extracted Table(s)` section, each only when it found something.

use super::{ExtractContext, FormatAdapter};
use crate::detect::SourceKind;
use crate::error::Result;
use crate::model::{Block, Document};
use crate::parser::{EmbeddedImage, LayoutMode, OcrEngine, RasterDecoder};
use crate::report::FailureKind;
use crate::table::{VisionExtractor, VisionOptions};
use image::DynamicImage;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Builds documents from a [`RasterDecoder`] and an optional OCR engine.
#[derive(Clone)]
pub struct RasterAdapter {
    decoder: Arc<dyn RasterDecoder>,
    ocr: Option<Arc<dyn OcrEngine>>,
    vision: VisionOptions,
    parallel: bool,
}

impl RasterAdapter {
    pub fn new(decoder: Arc<dyn RasterDecoder>, ocr: Option<Arc<dyn OcrEngine>>) -> Self {
        Self {
            decoder,
            ocr,
            vision: VisionOptions::default(),
            parallel: true,
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn RasterDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_ocr(mut self, ocr: Option<Arc<dyn OcrEngine>>) -> Self {
        self.ocr = ocr;
        self
    }

    pub fn with_vision(mut self, vision: VisionOptions) -> Self {
        self.vision = vision;
        self
    }

    /// OCR table regions concurrently.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Build the document for a decoded image and its original bytes.
    pub fn build(
        &self,
        original: &EmbeddedImage,
        image: &DynamicImage,
        ctx: &mut ExtractContext,
    ) -> Document {
        let mut doc = Document::new();
        let block = ctx.image_block(&mut doc, original);
        doc.push_opt(block);

        let Some(ocr) = &self.ocr else {
            ctx.report.record(
                FailureKind::Ocr,
                "no OCR engine available; text and tables skipped",
            );
            return doc;
        };

        match ocr.recognize(image, LayoutMode::SingleBlock) {
            Ok(text) if !text.trim().is_empty() => {
                doc.push_opt(Block::heading("Extracted Text", 2));
                doc.push_opt(Block::text(text));
            }
            Ok(_) => log::debug!("RasterAdapter: OCR found no text"),
            Err(e) => ctx.report.record_error(FailureKind::Ocr, &e),
        }

        let tables = VisionExtractor::new(self.vision.clone())
            .with_parallel(self.parallel)
            .extract(image, ocr.as_ref(), &mut ctx.report);
        if !tables.is_empty() {
            doc.push_opt(Block::heading("Extracted Table(s)", 2));
            doc.extend(tables.into_iter().map(Block::Table));
        }

        doc
    }
}

impl FormatAdapter for RasterAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Image
    }

    fn extract(&self, path: &Path, ctx: &mut ExtractContext) -> Result<Document> {
        let decoder = Arc::clone(&self.decoder);
        let image = ctx.parse("image decode", path, move |p| decoder.decode(p))?;
        let original = EmbeddedImage::new(
            fs::read(path)?,
            path.extension().map(|e| e.to_string_lossy().into_owned()),
        );
        Ok(self.build(&original, &image, ctx))
    }
}
