//! Writing embedded images to the sidecar directory.

use crate::error::{Error, Result};
use crate::model::{detect_image_extension, normalize_extension, Asset};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Upper bound on names tried for one asset before giving up.
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// Where asset bytes go.
pub trait AssetSink: Send + Sync {
    /// Create `dir` if it does not exist yet. Must be idempotent.
    fn prepare(&self, dir: &Path) -> io::Result<()>;

    /// Write `data` to `path`, failing with [`io::ErrorKind::AlreadyExists`]
    /// when the file is already there.
    fn create_new(&self, path: &Path, data: &[u8]) -> io::Result<()>;
}

/// The local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSink;

impl AssetSink for FsSink {
    fn prepare(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)
    }

    fn create_new(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        write_new(path, file, data, |f| f.sync_all())
    }
}

/// Write `data` into the freshly created `path`, then `finish`.
///
/// On any error the file is removed so no truncated image stays behind.
fn write_new<W: Write>(
    path: &Path,
    mut writer: W,
    data: &[u8],
    finish: impl FnOnce(&mut W) -> io::Result<()>,
) -> io::Result<()> {
    let result = writer.write_all(data).and_then(|_| finish(&mut writer));
    drop(writer);
    if let Err(e) = &result {
        log::debug!("FsSink: removing partial {}: {e}", path.display());
        // The original error matters more than a failed cleanup
        let _ = fs::remove_file(path);
    }
    result
}

/// Allocates names and writes images for one document.
///
/// Names are `<stem>_img<n>.<ext>` with `n` counting from 1. A name that
/// already exists on disk is skipped, so two conversions sharing a
/// directory never overwrite each other's files.
pub struct Externalizer {
    dir: PathBuf,
    reference_prefix: String,
    stem: String,
    counter: u32,
    prepared: bool,
    sink: Arc<dyn AssetSink>,
}

impl Externalizer {
    /// Write into `dir`; references are `<reference_prefix>/<name>`.
    pub fn new(
        dir: impl Into<PathBuf>,
        reference_prefix: impl Into<String>,
        stem: impl AsRef<str>,
    ) -> Self {
        Self {
            dir: dir.into(),
            reference_prefix: reference_prefix.into(),
            stem: sanitize_stem(stem.as_ref()),
            counter: 0,
            prepared: false,
            sink: Arc::new(FsSink),
        }
    }

    /// Replace the filesystem sink.
    pub fn with_sink(mut self, sink: Arc<dyn AssetSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sidecar directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one image and return its asset record.
    ///
    /// The extension comes from the bytes when they carry a known
    /// signature, otherwise from `declared`.
    pub fn externalize(&mut self, data: &[u8], declared: Option<&str>) -> Result<Asset> {
        let extension = match detect_image_extension(data) {
            Some(ext) => ext.to_string(),
            None => normalize_extension(declared.unwrap_or("")),
        };

        if data.is_empty() {
            return Err(Error::AssetWrite {
                name: format!("{}_img{}.{}", self.stem, self.counter + 1, extension),
                source: io::Error::new(io::ErrorKind::InvalidData, "empty image payload"),
            });
        }

        if !self.prepared {
            self.sink.prepare(&self.dir).map_err(|e| Error::AssetWrite {
                name: self.dir.display().to_string(),
                source: e,
            })?;
            self.prepared = true;
        }

        for _ in 0..MAX_NAME_ATTEMPTS {
            self.counter += 1;
            let name = format!("{}_img{}.{}", self.stem, self.counter, extension);
            let path = self.dir.join(&name);

            match self.sink.create_new(&path, data) {
                Ok(()) => {
                    log::debug!("Externalizer: wrote {} ({} bytes)", path.display(), data.len());
                    return Ok(Asset {
                        reference: format!("{}/{}", self.reference_prefix, name),
                        name,
                        extension,
                        path,
                        size: data.len(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    log::debug!("Externalizer: {} exists, trying next name", name);
                }
                Err(e) => return Err(Error::AssetWrite { name, source: e }),
            }
        }

        Err(Error::AssetWrite {
            name: format!("{}_img*.{}", self.stem, extension),
            source: io::Error::new(io::ErrorKind::AlreadyExists, "no free file name"),
        })
    }

    /// Number of names handed out so far, skipped ones included.
    pub fn counter(&self) -> u32 {
        self.counter
    }
}

/// Keep a stem safe for file names.
fn sanitize_stem(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}
