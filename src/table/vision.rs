//! Table detection on raster images.
//!
//! Rule lines are isolated with an adaptive threshold followed by a
//! horizontal and a vertical morphological opening. The outer contours of
//! the combined rule mask give candidate table regions, and each region is
//! read back with OCR: one row per non-empty line, one cell per
//! whitespace-separated token.

use crate::error::Result;
use crate::model::{Region, Table};
use crate::parser::{LayoutMode, OcrEngine};
use crate::report::{ConversionReport, FailureKind};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use rayon::prelude::*;

/// Vision detection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct VisionOptions {
    /// Side of the square neighbourhood for the adaptive threshold (odd)
    pub block_size: u32,
    /// Constant subtracted from the neighbourhood mean
    pub threshold_c: i32,
    /// Length of the line structuring element
    pub kernel_length: u32,
    /// Erosion/dilation iterations of the opening
    pub iterations: u32,
    /// Regions must be wider than this (pixels)
    pub min_width: u32,
    /// Regions must be taller than this (pixels)
    pub min_height: u32,
}

impl Default for VisionOptions {
    fn default() -> Self {
        Self {
            block_size: 15,
            threshold_c: 8,
            kernel_length: 40,
            iterations: 2,
            min_width: 50,
            min_height: 30,
        }
    }
}

impl VisionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum region size.
    pub fn with_min_size(mut self, width: u32, height: u32) -> Self {
        self.min_width = width;
        self.min_height = height;
        self
    }

    /// Set the rule kernel length.
    pub fn with_kernel_length(mut self, length: u32) -> Self {
        self.kernel_length = length.max(1);
        self
    }

    /// Shortest run of foreground pixels that survives the opening.
    ///
    /// Eroding `n` times with a line of length `k` equals one erosion with a
    /// line of length `n * (k - 1) + 1`.
    fn min_run(&self) -> u32 {
        self.iterations.max(1) * (self.kernel_length.max(1) - 1) + 1
    }
}

/// Inverse adaptive mean threshold: foreground (255) where a pixel is
/// darker than its neighbourhood mean minus `c`.
pub fn adaptive_threshold_inv(gray: &GrayImage, block_size: u32, c: i32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let radius = (block_size.max(3) / 2) as usize;

    // Summed-area table with a zero border row and column
    let mut integral = vec![0u64; (w + 1) * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += gray.get_pixel(x as u32, y as u32)[0] as u64;
            integral[(y + 1) * (w + 1) + x + 1] = integral[y * (w + 1) + x + 1] + row_sum;
        }
    }

    let mut mask = GrayImage::new(width, height);
    for y in 0..h {
        let (top, bottom) = (y.saturating_sub(radius), (y + radius + 1).min(h));
        for x in 0..w {
            let (left, right) = (x.saturating_sub(radius), (x + radius + 1).min(w));
            let sum = integral[bottom * (w + 1) + right] + integral[top * (w + 1) + left]
                - integral[top * (w + 1) + right]
                - integral[bottom * (w + 1) + left];
            let count = ((bottom - top) * (right - left)) as f64;
            let threshold = sum as f64 / count - c as f64;
            let value = gray.get_pixel(x as u32, y as u32)[0] as f64;
            if value <= threshold {
                mask.put_pixel(x as u32, y as u32, Luma([255]));
            }
        }
    }
    mask
}

/// Morphological opening of `mask` with a line element, expressed as a
/// run-length filter: foreground runs shorter than `min_run` along the
/// line direction are cleared, longer runs are kept whole.
pub fn open_lines(mask: &GrayImage, min_run: u32, horizontal: bool) -> GrayImage {
    let (width, height) = mask.dimensions();
    let mut out = GrayImage::new(width, height);
    let (outer, inner) = if horizontal {
        (height, width)
    } else {
        (width, height)
    };

    let at = |o: u32, i: u32| if horizontal { (i, o) } else { (o, i) };

    for o in 0..outer {
        let mut run_start: Option<u32> = None;
        for i in 0..=inner {
            let on = i < inner && {
                let (x, y) = at(o, i);
                mask.get_pixel(x, y)[0] > 0
            };
            match (on, run_start) {
                (true, None) => run_start = Some(i),
                (false, Some(start)) => {
                    if i - start >= min_run {
                        for j in start..i {
                            let (x, y) = at(o, j);
                            out.put_pixel(x, y, Luma([255]));
                        }
                    }
                    run_start = None;
                }
                _ => {}
            }
        }
    }
    out
}

/// Find candidate table regions in `image`, sorted top to bottom, then
/// left to right.
pub fn detect_regions(image: &DynamicImage, options: &VisionOptions) -> Vec<Region> {
    let gray = image.to_luma8();
    let mask = adaptive_threshold_inv(&gray, options.block_size, options.threshold_c);

    let min_run = options.min_run();
    let horizontal = open_lines(&mask, min_run, true);
    let vertical = open_lines(&mask, min_run, false);

    let mut rules = horizontal;
    for (x, y, pixel) in vertical.enumerate_pixels() {
        if pixel[0] > 0 {
            rules.put_pixel(x, y, Luma([255]));
        }
    }

    let mut regions = Vec::new();
    for contour in find_contours::<u32>(&rules) {
        if contour.border_type != BorderType::Outer || contour.parent.is_some() {
            continue;
        }
        if contour.points.is_empty() {
            continue;
        }

        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0u32, 0u32);
        for p in &contour.points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        let (w, h) = (max_x - min_x + 1, max_y - min_y + 1);
        if w <= options.min_width || h <= options.min_height {
            log::debug!("detect_regions: dropping {}x{} contour at ({}, {})", w, h, min_x, min_y);
            continue;
        }
        regions.push(Region::new(min_x, min_y, w, h));
    }

    regions.sort_by_key(|r| (r.y, r.x));
    log::debug!("detect_regions: {} candidate regions", regions.len());
    regions
}

/// Turn OCR output into rows of whitespace-separated tokens.
///
/// Returns `None` when there is no text at all.
pub fn tokenize_rows(text: &str) -> Option<Vec<Vec<String>>> {
    let rows: Vec<Vec<String>> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.split_whitespace().map(str::to_string).collect())
        .collect();
    if rows.is_empty() {
        None
    } else {
        Some(rows)
    }
}

/// Vision table extraction: region detection plus OCR.
#[derive(Debug, Clone, Default)]
pub struct VisionExtractor {
    options: VisionOptions,
    parallel: bool,
}

impl VisionExtractor {
    pub fn new(options: VisionOptions) -> Self {
        Self {
            options,
            parallel: true,
        }
    }

    /// Run OCR on regions concurrently.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Extract every table found in `image`.
    ///
    /// Regions whose OCR fails are recorded and skipped. Regions with no
    /// text produce no table.
    pub fn extract(
        &self,
        image: &DynamicImage,
        ocr: &dyn OcrEngine,
        report: &mut ConversionReport,
    ) -> Vec<Table> {
        let regions = detect_regions(image, &self.options);
        if regions.is_empty() {
            return Vec::new();
        }

        let recognize = |region: &Region| -> Result<String> {
            let crop = image.crop_imm(region.x, region.y, region.width, region.height);
            ocr.recognize(&crop, LayoutMode::SingleBlock)
        };

        let texts: Vec<Result<String>> = if self.parallel {
            regions.par_iter().map(recognize).collect()
        } else {
            regions.iter().map(recognize).collect()
        };

        let mut tables = Vec::new();
        for (region, text) in regions.iter().zip(texts) {
            match text {
                Ok(text) => match tokenize_rows(&text) {
                    Some(rows) => tables.push(Table::from_rows(rows)),
                    None => log::debug!(
                        "VisionExtractor: region {}x{} at ({}, {}) has no text",
                        region.width,
                        region.height,
                        region.x,
                        region.y
                    ),
                },
                Err(e) => report.record_error(FailureKind::Ocr, &e),
            }
        }
        tables
    }
}
