//! Externalized image assets.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An image written to the sidecar directory.
///
/// Once written, the bytes live on disk and only the reference is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// File name, unique within the sidecar directory
    pub name: String,
    /// Extension without the leading dot
    pub extension: String,
    /// Path relative to the Markdown file (e.g. `images/report_img1.png`)
    pub reference: String,
    /// Where the file was written
    pub path: PathBuf,
    /// Size in bytes
    pub size: usize,
}

/// Detect an image file extension from magic bytes.
pub fn detect_image_extension(data: &[u8]) -> Option<&'static str> {
    if data.len() < 8 {
        return None;
    }

    // JPEG: FF D8 FF
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("jpg");
    }

    // PNG: 89 50 4E 47 0D 0A 1A 0A
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("png");
    }

    // GIF: GIF87a or GIF89a
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some("gif");
    }

    // TIFF: 49 49 2A 00 (little-endian) or 4D 4D 00 2A (big-endian)
    if data.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || data.starts_with(&[0x4D, 0x4D, 0x00, 0x2A])
    {
        return Some("tiff");
    }

    // BMP: BM
    if data.starts_with(b"BM") {
        return Some("bmp");
    }

    // WEBP: RIFF....WEBP
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some("webp");
    }

    // JPEG 2000: 00 00 00 0C 6A 50 20 20
    if data.starts_with(&[0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20]) {
        return Some("jp2");
    }

    // EMF: record type 1, " EMF" signature at offset 40
    if data.len() >= 44 && data.starts_with(&[0x01, 0x00, 0x00, 0x00]) && &data[40..44] == b" EMF"
    {
        return Some("emf");
    }

    // WMF: placeable header D7 CD C6 9A
    if data.starts_with(&[0xD7, 0xCD, 0xC6, 0x9A]) {
        return Some("wmf");
    }

    None
}

/// Lowercase an extension and strip any leading dot. `jpeg` becomes `jpg`.
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
    match ext.as_str() {
        "jpeg" | "jpe" => "jpg".to_string(),
        "tif" => "tiff".to_string(),
        "" => "bin".to_string(),
        _ => ext,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_image_extension() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46];
        assert_eq!(detect_image_extension(&jpeg), Some("jpg"));

        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(detect_image_extension(&png), Some("png"));

        let mut emf = vec![0u8; 48];
        emf[0] = 0x01;
        emf[40..44].copy_from_slice(b" EMF");
        assert_eq!(detect_image_extension(&emf), Some("emf"));

        assert_eq!(detect_image_extension(&[0u8; 8]), None);
        assert_eq!(detect_image_extension(b"GIF"), None);
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension(".JPEG"), "jpg");
        assert_eq!(normalize_extension("png"), "png");
        assert_eq!(normalize_extension("tif"), "tiff");
        assert_eq!(normalize_extension(""), "bin");
    }
}
