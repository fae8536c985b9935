//! Element types handed from readers to format adapters.

use crate::model::BoundingBox;

/// Image bytes pulled out of a container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddedImage {
    /// Raw encoded bytes
    pub data: Vec<u8>,
    /// Extension declared by the container (part name or filter), if any
    pub extension: Option<String>,
    /// Description from the source, if any
    pub alt_text: Option<String>,
}

impl EmbeddedImage {
    pub fn new(data: Vec<u8>, extension: Option<String>) -> Self {
        Self {
            data,
            extension,
            alt_text: None,
        }
    }

    pub fn with_alt_text(mut self, alt: Option<String>) -> Self {
        self.alt_text = alt.filter(|a| !a.trim().is_empty());
        self
    }
}

// ==================== Page-flow ====================

/// A parsed page-flow document.
#[derive(Debug, Clone, Default)]
pub struct FlowDocument {
    /// Body elements in storage order
    pub elements: Vec<FlowElement>,
    /// Hyperlink target URIs found in the document
    pub hyperlinks: Vec<String>,
    /// All embedded images, in relationship order
    pub images: Vec<EmbeddedImage>,
}

/// A top-level body element.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowElement {
    Paragraph(FlowParagraph),
    /// Rows of raw cell text
    Table(Vec<Vec<String>>),
}

/// A paragraph as a list of runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowParagraph {
    /// Raw run text, untrimmed
    pub runs: Vec<String>,
    /// Display name of the paragraph style (e.g. "heading 1")
    pub style: Option<String>,
}

// ==================== Slides ====================

/// A parsed slide deck.
#[derive(Debug, Clone, Default)]
pub struct SlideDeck {
    pub slides: Vec<Slide>,
}

/// One slide, shapes in placement order.
#[derive(Debug, Clone, Default)]
pub struct Slide {
    pub shapes: Vec<SlideShape>,
}

/// A shape on a slide.
#[derive(Debug, Clone, PartialEq)]
pub enum SlideShape {
    /// A shape with a text frame; paragraphs joined by newlines
    Text(String),
    /// A table frame, rows of raw cell text
    Table(Vec<Vec<String>>),
    /// A picture
    Picture(EmbeddedImage),
    /// Anything else (charts, connectors, media)
    Other,
}

// ==================== Page-layout ====================

/// A parsed page-layout document.
#[derive(Debug, Clone, Default)]
pub struct LayoutDocument {
    pub pages: Vec<LayoutPage>,
}

/// One page with everything positioned in top-left-origin page units.
#[derive(Debug, Clone, Default)]
pub struct LayoutPage {
    /// Page number (1-indexed)
    pub number: u32,
    /// Page width in points
    pub width: f32,
    /// Page height in points
    pub height: f32,
    /// Text fragments in content-stream order
    pub fragments: Vec<TextFragment>,
    /// Hyperlink target URIs on the page
    pub links: Vec<String>,
    /// Stroked or filled line segments (table rulings candidates)
    pub rulings: Vec<Segment>,
    /// Table grids the reader already knows about
    pub tables: Vec<PlacedGrid>,
    /// Images drawn on the page
    pub images: Vec<PlacedImage>,
    /// Images the reader found but could not decode, one reason each
    pub skipped_images: Vec<String>,
}

/// A run of text with its box.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    pub bbox: BoundingBox,
    /// Effective font size in points
    pub font_size: f32,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, bbox: BoundingBox, font_size: f32) -> Self {
        Self {
            text: text.into(),
            bbox,
            font_size,
        }
    }
}

/// A straight line segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Segment {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Horizontal within `tol` page units.
    pub fn is_horizontal(&self, tol: f32) -> bool {
        (self.y0 - self.y1).abs() <= tol && (self.x0 - self.x1).abs() > tol
    }

    /// Vertical within `tol` page units.
    pub fn is_vertical(&self, tol: f32) -> bool {
        (self.x0 - self.x1).abs() <= tol && (self.y0 - self.y1).abs() > tol
    }

    pub fn length(&self) -> f32 {
        ((self.x1 - self.x0).powi(2) + (self.y1 - self.y0).powi(2)).sqrt()
    }
}

/// A table grid with an optional position.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedGrid {
    pub rows: Vec<Vec<String>>,
    pub bbox: Option<BoundingBox>,
}

/// An image with an optional position.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedImage {
    pub image: EmbeddedImage,
    pub bbox: Option<BoundingBox>,
}
