//! Deadlines for blocking collaborator calls.
//!
//! The call runs on its own thread and the caller waits on a bounded
//! channel. On expiry the caller gets [`Error::Timeout`] and the worker is
//! left to finish in the background; its result is discarded.

use crate::error::{Error, Result};
use crate::parser::{LayoutMode, OcrEngine};
use crossbeam_channel::{bounded, RecvTimeoutError};
use image::DynamicImage;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Run `f` on a worker thread and wait at most `after` for its result.
pub fn with_deadline<T, F>(operation: &str, after: Duration, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = bounded(1);

    thread::Builder::new()
        .name(format!("anymd-{operation}"))
        .spawn(move || {
            // Receiver may be gone after a timeout
            let _ = tx.send(f());
        })?;

    match rx.recv_timeout(after) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            log::warn!("{} did not finish within {:?}", operation, after);
            Err(Error::Timeout {
                operation: operation.to_string(),
                after,
            })
        }
        Err(RecvTimeoutError::Disconnected) => Err(Error::Io(io::Error::other(format!(
            "{operation} worker exited without a result"
        )))),
    }
}

/// An [`OcrEngine`] that bounds every call of the wrapped engine.
///
/// Expiry is reported as [`Error::Ocr`] so callers treat it like any other
/// recognition failure of that region.
#[derive(Clone)]
pub struct DeadlineOcr {
    inner: Arc<dyn OcrEngine>,
    after: Duration,
}

impl DeadlineOcr {
    pub fn new(inner: Arc<dyn OcrEngine>, after: Duration) -> Self {
        Self { inner, after }
    }
}

impl OcrEngine for DeadlineOcr {
    fn recognize(&self, image: &DynamicImage, mode: LayoutMode) -> Result<String> {
        let engine = Arc::clone(&self.inner);
        let image = image.clone();
        with_deadline("ocr", self.after, move || engine.recognize(&image, mode)).map_err(
            |e| match e {
                Error::Timeout { .. } => Error::Ocr(e.to_string()),
                other => other,
            },
        )
    }
}
