//! Conversion pipeline.
//!
//! A [`Converter`] picks the format adapter for the source kind, lets it
//! build a [`Document`], renders the result and writes it next to the
//! sidecar image directory.
//!
//! # Example
//!
//! ```no_run
//! use anymd::convert::{ConvertOptions, Converter};
//!
//! fn main() -> anymd::Result<()> {
//!     let options = ConvertOptions::new().with_output_dir("out");
//!     let result = Converter::new(options).convert("report.docx")?;
//!     println!("{}", result.content);
//!     for failure in &result.report.failures {
//!         eprintln!("degraded: {}", failure);
//!     }
//!     Ok(())
//! }
//! ```

mod flow;
mod layout;
mod raster;
mod slides;

pub use flow::FlowAdapter;
pub use layout::{LayoutAdapter, ParagraphConfig};
pub use raster::RasterAdapter;
pub use slides::SlideAdapter;

use crate::assets::{AssetSink, Externalizer, FsSink};
use crate::detect::{detect_kind_from_path, SourceKind};
use crate::error::{Error, Result};
use crate::model::{Block, Document};
use crate::parser::{
    DeckReader, DocxReader, EmbeddedImage, FlowReader, ImageDecoder, LayoutReader, OcrEngine,
    OcrOptions, PdfLayoutReader, PptxReader, RasterDecoder, TesseractEngine,
};
use crate::render::{to_json, to_markdown_with_stats, JsonFormat, RenderStats};
use crate::report::{ConversionReport, FailureKind};
use crate::table::{build_grid, VisionOptions};
use crate::timeout::{with_deadline, DeadlineOcr};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Options for document conversion.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Directory for the output file when `output_path` is not set
    pub output_dir: PathBuf,

    /// Exact output file path
    pub output_path: Option<PathBuf>,

    /// Name of the image directory, created next to the output file
    pub images_dir: String,

    /// Source kind override; detected from the file when `None`
    pub kind: Option<SourceKind>,

    /// Raster table detection settings
    pub vision: VisionOptions,

    /// OCR engine settings
    pub ocr: OcrOptions,

    /// Deadline for parsing the source container
    pub parse_timeout: Option<Duration>,

    /// OCR table regions concurrently
    pub parallel_ocr: bool,

    /// Emit a rule after every slide
    pub slide_separators: bool,

    /// Write the rendered output to disk
    pub write_output: bool,

    /// Output format
    pub format: OutputFormat,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            output_path: None,
            images_dir: "images".to_string(),
            kind: None,
            vision: VisionOptions::default(),
            ocr: OcrOptions::default(),
            parse_timeout: Some(Duration::from_secs(300)),
            parallel_ocr: true,
            slide_separators: true,
            write_output: true,
            format: OutputFormat::Markdown,
        }
    }
}

impl ConvertOptions {
    /// Create new conversion options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the exact output file path.
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Set the image directory name.
    pub fn with_images_dir(mut self, name: impl Into<String>) -> Self {
        self.images_dir = name.into();
        self
    }

    /// Force the source kind.
    pub fn with_kind(mut self, kind: SourceKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set vision options.
    pub fn with_vision(mut self, vision: VisionOptions) -> Self {
        self.vision = vision;
        self
    }

    /// Set OCR options.
    pub fn with_ocr(mut self, ocr: OcrOptions) -> Self {
        self.ocr = ocr;
        self
    }

    /// Set the parse deadline. `None` waits indefinitely.
    pub fn with_parse_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.parse_timeout = timeout;
        self
    }

    /// Enable or disable concurrent OCR of table regions.
    pub fn with_parallel_ocr(mut self, parallel: bool) -> Self {
        self.parallel_ocr = parallel;
        self
    }

    /// Enable or disable slide separators.
    pub fn with_slide_separators(mut self, separators: bool) -> Self {
        self.slide_separators = separators;
        self
    }

    /// Enable or disable writing the output file.
    pub fn with_write_output(mut self, write: bool) -> Self {
        self.write_output = write;
        self
    }

    /// Set output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }
}

/// Output format for conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Markdown format
    #[default]
    Markdown,

    /// JSON block sequence
    Json,
}

impl OutputFormat {
    /// File extension of the output file.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
        }
    }
}

/// Result of document conversion.
#[derive(Debug, Clone)]
pub struct ConvertResult {
    /// Source kind the file was converted as
    pub kind: SourceKind,

    /// Resolved block sequence and written assets
    pub document: Document,

    /// Rendered output in the requested format
    pub content: String,

    /// Markdown rendering statistics
    pub stats: RenderStats,

    /// Blocks that degraded during conversion
    pub report: ConversionReport,

    /// Where the output was written, if it was
    pub output_path: Option<PathBuf>,
}

/// State shared by the adapters during one conversion.
pub struct ExtractContext {
    /// Image writer for this document
    pub assets: Externalizer,

    /// Block-local failures so far
    pub report: ConversionReport,

    parse_timeout: Option<Duration>,
}

impl ExtractContext {
    pub fn new(assets: Externalizer) -> Self {
        Self {
            assets,
            report: ConversionReport::new(),
            parse_timeout: None,
        }
    }

    /// Bound reader calls made through [`ExtractContext::parse`].
    pub fn with_parse_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.parse_timeout = timeout;
        self
    }

    /// Run a reader on `path` under the parse deadline.
    ///
    /// An expired deadline is a [`Error::SourceParse`] failure of the file.
    pub fn parse<T, F>(&self, operation: &str, path: &Path, read: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T> + Send + 'static,
    {
        let path = path.to_path_buf();
        let Some(after) = self.parse_timeout else {
            return read(&path);
        };

        with_deadline(operation, after, move || read(&path)).map_err(|e| match e {
            Error::Timeout { operation, after } => {
                Error::SourceParse(format!("{operation} did not finish within {after:?}"))
            }
            other => other,
        })
    }

    /// Write an embedded image and return the block referencing it.
    ///
    /// A failed write is recorded and yields `None`; the rest of the
    /// document is unaffected.
    pub fn image_block(&mut self, doc: &mut Document, image: &EmbeddedImage) -> Option<Block> {
        match self
            .assets
            .externalize(&image.data, image.extension.as_deref())
        {
            Ok(asset) => {
                let block = match &image.alt_text {
                    Some(alt) => Block::image_with_alt(asset.reference.clone(), alt),
                    None => Block::image(asset.reference.clone()),
                };
                doc.add_asset(asset);
                Some(block)
            }
            Err(e) => {
                self.report.record_error(FailureKind::AssetWrite, &e);
                None
            }
        }
    }
}

/// Turns one source family into a block sequence.
pub trait FormatAdapter: Send + Sync {
    /// Source kind handled by this adapter.
    fn kind(&self) -> SourceKind;

    /// Build the document for the file at `path`.
    ///
    /// Only failures to read the source come back as errors; anything
    /// local to one block is recorded in the context.
    fn extract(&self, path: &Path, ctx: &mut ExtractContext) -> Result<Document>;
}

/// Per-file conversion entry point.
pub struct Converter {
    options: ConvertOptions,
    flow: FlowAdapter,
    slides: SlideAdapter,
    raster: RasterAdapter,
    layout: LayoutAdapter,
    sink: Arc<dyn AssetSink>,
}

impl Converter {
    /// Create a converter with the default readers.
    ///
    /// OCR uses the Tesseract executable named in the options. When it
    /// cannot be found, raster conversions keep the image and record an
    /// OCR failure.
    pub fn new(options: ConvertOptions) -> Self {
        // Tesseract enforces the OCR timeout itself by killing the process
        let ocr = match TesseractEngine::locate(&options.ocr) {
            Ok(engine) => Some(Arc::new(engine) as Arc<dyn OcrEngine>),
            Err(e) => {
                log::debug!("Converter: {e}");
                None
            }
        };

        Self {
            flow: FlowAdapter::new(Arc::new(DocxReader::new())),
            slides: SlideAdapter::new(Arc::new(PptxReader::new()))
                .with_separators(options.slide_separators),
            raster: RasterAdapter::new(Arc::new(ImageDecoder::new()), ocr)
                .with_vision(options.vision.clone())
                .with_parallel(options.parallel_ocr),
            layout: LayoutAdapter::new(Arc::new(PdfLayoutReader::new())),
            sink: Arc::new(FsSink),
            options,
        }
    }

    /// Replace the page-flow reader.
    pub fn with_flow_reader(mut self, reader: Arc<dyn FlowReader>) -> Self {
        self.flow = FlowAdapter::new(reader);
        self
    }

    /// Replace the slide deck reader.
    pub fn with_deck_reader(mut self, reader: Arc<dyn DeckReader>) -> Self {
        self.slides =
            SlideAdapter::new(reader).with_separators(self.options.slide_separators);
        self
    }

    /// Replace the page-layout reader.
    pub fn with_layout_reader(mut self, reader: Arc<dyn LayoutReader>) -> Self {
        self.layout = LayoutAdapter::new(reader);
        self
    }

    /// Replace the raster decoder.
    pub fn with_raster_decoder(mut self, decoder: Arc<dyn RasterDecoder>) -> Self {
        self.raster = self.raster.with_decoder(decoder);
        self
    }

    /// Use `engine` for OCR. Calls are bounded by the OCR timeout.
    pub fn with_ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        let engine = bounded_ocr(engine, &self.options);
        self.raster = self.raster.with_ocr(Some(engine));
        self
    }

    /// Convert without OCR.
    pub fn without_ocr(mut self) -> Self {
        self.raster = self.raster.with_ocr(None);
        self
    }

    /// Replace where images are written.
    pub fn with_asset_sink(mut self, sink: Arc<dyn AssetSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Conversion options.
    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    fn adapter(&self, kind: SourceKind) -> &dyn FormatAdapter {
        match kind {
            SourceKind::PageFlow => &self.flow,
            SourceKind::Slide => &self.slides,
            SourceKind::Image => &self.raster,
            SourceKind::PageLayout => &self.layout,
        }
    }

    /// Resolve the output file for `source`.
    pub fn output_path_for(&self, source: &Path) -> PathBuf {
        if let Some(path) = &self.options.output_path {
            return path.clone();
        }
        self.options
            .output_dir
            .join(format!("{}.{}", source_stem(source), self.options.format.extension()))
    }

    /// Convert one file.
    pub fn convert(&self, path: impl AsRef<Path>) -> Result<ConvertResult> {
        let path = path.as_ref();
        self.convert_to(path, self.output_path_for(path))
    }

    /// Convert one file, writing the result to `output_path` instead of the
    /// path derived from the options. Images go next to it as usual.
    pub fn convert_to(
        &self,
        path: impl AsRef<Path>,
        output_path: impl Into<PathBuf>,
    ) -> Result<ConvertResult> {
        let path = path.as_ref();
        let output_path = output_path.into();
        if !path.is_file() {
            return Err(Error::SourceParse(format!(
                "{} is not a readable file",
                path.display()
            )));
        }

        let kind = match self.options.kind {
            Some(kind) => kind,
            None => detect_kind_from_path(path)?,
        };

        let output_dir = match output_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let assets = Externalizer::new(
            output_dir.join(&self.options.images_dir),
            self.options.images_dir.replace('\\', "/"),
            source_stem(path),
        )
        .with_sink(Arc::clone(&self.sink));
        let mut ctx = ExtractContext::new(assets).with_parse_timeout(self.options.parse_timeout);

        log::debug!("Converter: {} as {}", path.display(), kind);
        let document = self.adapter(kind).extract(path, &mut ctx)?;
        let mut report = ctx.report;

        for (index, block) in document.blocks.iter().enumerate() {
            if let Block::Table(table) = block {
                if let Err(e) = build_grid(table) {
                    report.record(
                        FailureKind::TableExtraction,
                        format!("block {}: {}; rendered as raw grid", index + 1, e),
                    );
                }
            }
        }

        let rendered = to_markdown_with_stats(&document)?;
        let content = match self.options.format {
            OutputFormat::Markdown => rendered.content,
            OutputFormat::Json => to_json(&document, JsonFormat::Pretty)?,
        };

        let written = if self.options.write_output {
            write_atomic(&output_path, &content)?;
            Some(output_path)
        } else {
            None
        };

        log::info!(
            "Converted {} ({}): {} blocks, {} images, {} degraded",
            path.display(),
            kind,
            document.len(),
            document.assets.len(),
            report.failures.len()
        );

        Ok(ConvertResult {
            kind,
            document,
            content,
            stats: rendered.stats,
            report,
            output_path: written,
        })
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(ConvertOptions::default())
    }
}

fn bounded_ocr(engine: Arc<dyn OcrEngine>, options: &ConvertOptions) -> Arc<dyn OcrEngine> {
    Arc::new(DeadlineOcr::new(engine, options.ocr.timeout))
}

fn source_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

/// Write `content` to `path` through a temporary file in the same
/// directory, so a failed write never leaves a partial file behind.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(content.as_bytes())?;
    if !content.ends_with('\n') {
        tmp.write_all(b"\n")?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_options_builder() {
        let options = ConvertOptions::new()
            .with_output_dir("out")
            .with_kind(SourceKind::Slide)
            .with_parallel_ocr(false)
            .with_format(OutputFormat::Json);

        assert_eq!(options.output_dir, PathBuf::from("out"));
        assert_eq!(options.kind, Some(SourceKind::Slide));
        assert!(!options.parallel_ocr);
        assert!(options.slide_separators);
        assert_eq!(options.format, OutputFormat::Json);
        assert_eq!(options.images_dir, "images");
    }

    #[test]
    fn test_output_path_defaults() {
        let converter = Converter::new(ConvertOptions::new()).without_ocr();
        assert_eq!(
            converter.output_path_for(Path::new("docs/Q3 report.docx")),
            PathBuf::from("output").join("Q3 report.md")
        );

        let converter = Converter::new(
            ConvertOptions::new()
                .with_output_path("x/y.md")
                .with_format(OutputFormat::Json),
        );
        assert_eq!(
            converter.output_path_for(Path::new("a.pdf")),
            PathBuf::from("x/y.md")
        );
    }

    #[test]
    fn test_write_atomic_adds_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("a.md");
        write_atomic(&path, "# Title").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "# Title\n");

        write_atomic(&path, "replaced\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "replaced\n");

        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_missing_source_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Converter::new(ConvertOptions::new().with_output_dir(dir.path()));
        let err = converter.convert(dir.path().join("absent.docx")).unwrap_err();
        assert!(matches!(err, Error::SourceParse(_)));
    }

    #[test]
    fn test_parse_deadline_is_source_parse() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExtractContext::new(Externalizer::new(dir.path(), "images", "doc"))
            .with_parse_timeout(Some(Duration::from_millis(20)));
        let err = ctx
            .parse("slow read", dir.path(), |_| {
                std::thread::sleep(Duration::from_millis(500));
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, Error::SourceParse(msg) if msg.contains("slow read")));
    }
}
