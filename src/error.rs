//! Error types for anymd library.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for anymd operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while converting a source document.
///
/// `UnsupportedSource`, `SourceParse`, `Render` and I/O errors on the final
/// Markdown file abort a conversion. The remaining variants describe
/// failures local to one block; the converter records them and keeps going.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The source kind could not be determined or is not handled.
    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    /// The source container is corrupt or unreadable.
    #[error("Source parsing error: {0}")]
    SourceParse(String),

    /// A table region could not be turned into a grid.
    #[error("Table extraction error: {0}")]
    TableExtraction(String),

    /// The OCR engine failed or is unavailable.
    #[error("OCR error: {0}")]
    Ocr(String),

    /// An image asset could not be written to the sidecar directory.
    #[error("Failed to write asset '{name}': {source}")]
    AssetWrite {
        /// File name that was being written
        name: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Error during rendering (Markdown, JSON).
    #[error("Rendering error: {0}")]
    Render(String),

    /// A collaborator call did not finish in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Name of the operation that expired
        operation: String,
        /// Deadline that was exceeded
        after: Duration,
    },
}

impl Error {
    /// Returns true for errors that only affect a single block.
    pub fn is_block_local(&self) -> bool {
        matches!(
            self,
            Error::TableExtraction(_)
                | Error::Ocr(_)
                | Error::AssetWrite { .. }
                | Error::Timeout { .. }
        )
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            _ => Error::SourceParse(format!("PDF: {err}")),
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Error::SourceParse(format!("container: {e}")),
            _ => Error::SourceParse(format!("container: {err}")),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::SourceParse(format!("XML: {err}"))
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::SourceParse(format!("image: {err}"))
    }
}
