//! Raster image decoding.

use super::RasterDecoder;
use crate::error::Result;
use image::DynamicImage;
use std::path::Path;

/// Decodes raster files with the `image` crate, guessing the format from
/// content rather than the extension.
#[derive(Debug, Clone, Default)]
pub struct ImageDecoder {
    _private: (),
}

impl ImageDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RasterDecoder for ImageDecoder {
    fn decode(&self, path: &Path) -> Result<DynamicImage> {
        let image = image::ImageReader::open(path)?
            .with_guessed_format()?
            .decode()?;
        log::debug!(
            "ImageDecoder: {} is {}x{}",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(image)
    }
}
