//! Source kind detection.
//!
//! The kind is taken from the file extension when it is one we know, and
//! sniffed from the leading bytes otherwise. ZIP containers are opened and
//! classified by the part names they carry (`word/` or `ppt/`).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

/// The four source families the converter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Flowing word-processor documents (DOCX).
    PageFlow,
    /// Slide decks (PPTX).
    Slide,
    /// Raster images (scans, photos, screenshots).
    Image,
    /// Absolutely positioned pages (PDF).
    PageLayout,
}

impl SourceKind {
    /// All kinds, in a stable order.
    pub const ALL: [SourceKind; 4] = [
        SourceKind::PageFlow,
        SourceKind::Slide,
        SourceKind::Image,
        SourceKind::PageLayout,
    ];

    /// Map a file extension (without the dot, any case) to a kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "docx" => Some(SourceKind::PageFlow),
            "ppt" | "pptx" => Some(SourceKind::Slide),
            "png" | "jpg" | "jpeg" | "bmp" | "tif" | "tiff" | "gif" | "webp" => {
                Some(SourceKind::Image)
            }
            "pdf" => Some(SourceKind::PageLayout),
            _ => None,
        }
    }

    /// Short lowercase name, also accepted by [`str::parse`].
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::PageFlow => "docx",
            SourceKind::Slide => "pptx",
            SourceKind::Image => "image",
            SourceKind::PageLayout => "pdf",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "docx" | "page-flow" | "pageflow" => Ok(SourceKind::PageFlow),
            "pptx" | "ppt" | "slide" | "slides" => Ok(SourceKind::Slide),
            "image" | "raster" => Ok(SourceKind::Image),
            "pdf" | "page-layout" | "pagelayout" => Ok(SourceKind::PageLayout),
            other => Err(Error::UnsupportedSource(format!("unknown kind '{other}'"))),
        }
    }
}

/// PDF magic bytes: %PDF-
const PDF_MAGIC: &[u8] = b"%PDF-";
/// Local file header of a ZIP container.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Detect the source kind of a file.
///
/// # Example
/// ```no_run
/// use anymd::detect::{detect_kind_from_path, SourceKind};
///
/// let kind = detect_kind_from_path("report.docx").unwrap();
/// assert_eq!(kind, SourceKind::PageFlow);
/// ```
pub fn detect_kind_from_path<P: AsRef<Path>>(path: P) -> Result<SourceKind> {
    let path = path.as_ref();

    if let Some(kind) = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(SourceKind::from_extension)
    {
        return Ok(kind);
    }

    let mut file = File::open(path)?;
    let mut header = [0u8; 16];
    let read = file.read(&mut header)?;
    let header = &header[..read];

    if header.starts_with(ZIP_MAGIC) {
        file.rewind()?;
        return detect_zip_container(file)
            .ok_or_else(|| Error::UnsupportedSource(path.display().to_string()));
    }

    detect_kind_from_bytes(header)
        .ok_or_else(|| Error::UnsupportedSource(path.display().to_string()))
}

/// Detect a non-container source kind from its leading bytes.
///
/// ZIP containers need their part listing and are reported as `None` here.
pub fn detect_kind_from_bytes(data: &[u8]) -> Option<SourceKind> {
    if data.starts_with(PDF_MAGIC) {
        return Some(SourceKind::PageLayout);
    }
    if crate::model::detect_image_extension(data).is_some() {
        return Some(SourceKind::Image);
    }
    None
}

fn detect_zip_container<R: Read + Seek>(reader: R) -> Option<SourceKind> {
    let archive = zip::ZipArchive::new(reader).ok()?;
    let mut kind = None;
    for name in archive.file_names() {
        if name.starts_with("word/") {
            kind = Some(SourceKind::PageFlow);
            break;
        }
        if name.starts_with("ppt/") {
            kind = Some(SourceKind::Slide);
            break;
        }
    }
    log::debug!("detect: ZIP container classified as {:?}", kind);
    kind
}
