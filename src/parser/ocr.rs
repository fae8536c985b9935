//! OCR engine contract and the Tesseract command-line engine.

use crate::error::{Error, Result};
use image::DynamicImage;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// How often a running tesseract process is checked for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Page segmentation hint passed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutMode {
    /// Let the engine find the layout
    Auto,
    /// One column of text of variable sizes
    SingleColumn,
    /// A single uniform block of text
    #[default]
    SingleBlock,
}

impl LayoutMode {
    /// Tesseract `--psm` value.
    pub fn psm(&self) -> u8 {
        match self {
            LayoutMode::Auto => 3,
            LayoutMode::SingleColumn => 4,
            LayoutMode::SingleBlock => 6,
        }
    }
}

/// Maps a pixel region and a layout hint to recognized text.
pub trait OcrEngine: Send + Sync {
    /// Recognize text in `image`.
    fn recognize(&self, image: &DynamicImage, mode: LayoutMode) -> Result<String>;
}

/// Options for the OCR engine.
#[derive(Debug, Clone)]
pub struct OcrOptions {
    /// Tesseract executable name or path
    pub executable: PathBuf,

    /// Language code(s), e.g. `eng` or `eng+deu`
    pub language: String,

    /// Deadline for a single recognition call
    pub timeout: Duration,
}

impl OcrOptions {
    /// Create new OCR options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the executable.
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Set the language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("tesseract"),
            language: "eng".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Runs the `tesseract` executable on a temporary PNG.
///
/// A process still running at the deadline is killed and reaped, and the
/// call fails with [`Error::Ocr`].
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    executable: PathBuf,
    language: String,
    timeout: Duration,
}

impl TesseractEngine {
    /// Locate the executable on `PATH` (or at the given path).
    pub fn locate(options: &OcrOptions) -> Result<Self> {
        let executable = which::which(&options.executable).map_err(|e| {
            Error::Ocr(format!(
                "tesseract executable '{}' not found: {e}",
                options.executable.display()
            ))
        })?;
        log::debug!("TesseractEngine: using {}", executable.display());
        Ok(Self {
            executable,
            language: options.language.clone(),
            timeout: options.timeout,
        })
    }

    pub fn executable(&self) -> &std::path::Path {
        &self.executable
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &DynamicImage, mode: LayoutMode) -> Result<String> {
        let input = tempfile::Builder::new()
            .prefix("anymd-ocr-")
            .suffix(".png")
            .tempfile()?;
        image
            .save_with_format(input.path(), image::ImageFormat::Png)
            .map_err(|e| Error::Ocr(format!("cannot stage OCR input: {e}")))?;

        // Output goes to files so a full pipe cannot stall the child
        let mut stdout = tempfile::tempfile()?;
        let mut stderr = tempfile::tempfile()?;

        let mut child = Command::new(&self.executable)
            .arg(input.path())
            .arg("stdout")
            .arg("--psm")
            .arg(mode.psm().to_string())
            .arg("-l")
            .arg(&self.language)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout.try_clone()?))
            .stderr(Stdio::from(stderr.try_clone()?))
            .spawn()
            .map_err(|e| Error::Ocr(format!("cannot run tesseract: {e}")))?;

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                // Already exited if kill fails; wait reaps it either way
                let _ = child.kill();
                child.wait()?;
                log::warn!(
                    "TesseractEngine: killed process {} after {:?}",
                    child.id(),
                    self.timeout
                );
                return Err(Error::Ocr(format!(
                    "tesseract timed out after {:?}",
                    self.timeout
                )));
            }
            thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            let stderr = read_all(&mut stderr)?;
            return Err(Error::Ocr(format!(
                "tesseract exited with {}: {}",
                status,
                stderr.trim()
            )));
        }

        read_all(&mut stdout)
    }
}

fn read_all(file: &mut File) -> Result<String> {
    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
