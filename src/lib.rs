//! # anymd
//!
//! Convert office documents, PDFs and scanned images into Markdown.
//!
//! Every source is reduced to the same ordered sequence of blocks (text
//! with a heading level, tables, images and slide separators). Embedded
//! images are written next to the output as sidecar files and referenced
//! by relative path.
//!
//! ## Quick Start
//!
//! ```no_run
//! use anymd::{convert_file, ConvertOptions};
//!
//! fn main() -> anymd::Result<()> {
//!     let options = ConvertOptions::new().with_output_dir("output");
//!     let result = convert_file("slides.pptx", &options)?;
//!
//!     println!("{}", result.content);
//!     println!("{} images written", result.document.assets.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Sources
//!
//! - **Page-flow** (DOCX): paragraphs with heading styles, tables, images
//! - **Slides** (PPTX): one section per slide with text, tables and pictures
//! - **Page-layout** (PDF): positioned text put back into reading order,
//!   tables recovered from ruling lines or text alignment
//! - **Raster** (PNG, JPEG, ...): OCR text plus tables found by rule-line
//!   detection
//!
//! Failures that only affect one block (an image that cannot be written,
//! an OCR call that fails) never abort a conversion. They are collected in
//! the [`ConversionReport`] returned with the result.

pub mod assets;
pub mod convert;
pub mod detect;
pub mod error;
pub mod model;
pub mod order;
pub mod parser;
pub mod render;
pub mod report;
pub mod table;
pub mod timeout;

// Re-export commonly used types
pub use convert::{ConvertOptions, ConvertResult, Converter, FormatAdapter, OutputFormat};
pub use detect::{detect_kind_from_bytes, detect_kind_from_path, SourceKind};
pub use error::{Error, Result};
pub use model::{Asset, Block, BoundingBox, Document, Region, Table};
pub use render::{to_json, to_markdown, to_markdown_with_stats, JsonFormat, RenderStats};
pub use report::{BlockFailure, ConversionReport, FailureKind};

use std::path::Path;

/// Convert one file with the default readers.
///
/// # Example
///
/// ```no_run
/// use anymd::{convert_file, ConvertOptions, OutputFormat};
///
/// let options = ConvertOptions::new().with_format(OutputFormat::Json);
/// let result = convert_file("scan.png", &options).unwrap();
/// assert!(result.output_path.is_some());
/// ```
pub fn convert_file<P: AsRef<Path>>(path: P, options: &ConvertOptions) -> Result<ConvertResult> {
    Converter::new(options.clone()).convert(path)
}

/// Render a file to Markdown without writing anything but its images.
pub fn to_markdown_string<P: AsRef<Path>>(path: P, options: &ConvertOptions) -> Result<String> {
    let options = options
        .clone()
        .with_format(OutputFormat::Markdown)
        .with_write_output(false);
    Ok(convert_file(path, &options)?.content)
}
