//! Source readers.
//!
//! Each source family has a reader trait that turns a file into a plain
//! element stream: paragraphs and tables for page-flow documents, shapes
//! for slide decks, positioned fragments for page-layout documents, and a
//! pixel buffer for raster images. The format adapters in
//! [`crate::convert`] only see these element types, so any reader can be
//! swapped in. Default implementations backed by `zip`/`quick-xml`, `lopdf`,
//! `image` and the Tesseract executable live in the submodules.

mod docx;
mod elements;
mod ocr;
mod pdf;
mod pptx;
mod raster;
mod xml;

pub use docx::DocxReader;
pub use elements::{
    EmbeddedImage, FlowDocument, FlowElement, FlowParagraph, LayoutDocument, LayoutPage,
    PlacedGrid, PlacedImage, Segment, Slide, SlideDeck, SlideShape, TextFragment,
};
pub use ocr::{LayoutMode, OcrEngine, OcrOptions, TesseractEngine};
pub use pdf::PdfLayoutReader;
pub(crate) use pdf::is_spaceless_script_char;
pub use pptx::PptxReader;
pub use raster::ImageDecoder;

use crate::error::Result;
use image::DynamicImage;
use std::path::Path;

/// Reads page-flow documents (DOCX).
pub trait FlowReader: Send + Sync {
    /// Parse the document body in storage order.
    fn read(&self, path: &Path) -> Result<FlowDocument>;
}

/// Reads slide decks (PPTX).
pub trait DeckReader: Send + Sync {
    /// Parse all slides in presentation order.
    fn read(&self, path: &Path) -> Result<SlideDeck>;
}

/// Reads page-layout documents (PDF).
pub trait LayoutReader: Send + Sync {
    /// Parse every page into positioned fragments, rulings and images.
    fn read(&self, path: &Path) -> Result<LayoutDocument>;
}

/// Decodes raster images into a pixel buffer.
pub trait RasterDecoder: Send + Sync {
    /// Decode the image at `path`.
    fn decode(&self, path: &Path) -> Result<DynamicImage>;
}
