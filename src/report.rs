//! Record of blocks that degraded during a conversion.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a non-fatal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A table fell back to the raw grid or a strategy failed
    TableExtraction,
    /// OCR failed; the region was dropped
    Ocr,
    /// An image could not be written; the block was dropped
    AssetWrite,
    /// A collaborator call expired
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::TableExtraction => "table extraction",
            FailureKind::Ocr => "ocr",
            FailureKind::AssetWrite => "asset write",
            FailureKind::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// One degraded block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl fmt::Display for BlockFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Non-fatal failures collected over one conversion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub failures: Vec<BlockFailure>,
}

impl ConversionReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure and log it.
    pub fn record(&mut self, kind: FailureKind, detail: impl Into<String>) {
        let detail = detail.into();
        log::warn!("{}: {}", kind, detail);
        self.failures.push(BlockFailure { kind, detail });
    }

    /// Record a block-local error, classifying it by variant.
    ///
    /// Errors that are not block-local are recorded under `fallback`.
    pub fn record_error(&mut self, fallback: FailureKind, err: &Error) {
        let kind = match err {
            Error::TableExtraction(_) => FailureKind::TableExtraction,
            Error::Ocr(_) => FailureKind::Ocr,
            Error::AssetWrite { .. } => FailureKind::AssetWrite,
            Error::Timeout { .. } => FailureKind::Timeout,
            _ => fallback,
        };
        self.record(kind, err.to_string());
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failures of one kind.
    pub fn count(&self, kind: FailureKind) -> usize {
        self.failures.iter().filter(|f| f.kind == kind).count()
    }

    pub fn merge(&mut self, other: ConversionReport) {
        self.failures.extend(other.failures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_record_error_classifies() {
        let mut report = ConversionReport::new();
        report.record_error(FailureKind::TableExtraction, &Error::Ocr("no engine".into()));
        report.record_error(
            FailureKind::Ocr,
            &Error::Timeout {
                operation: "ocr".into(),
                after: Duration::from_secs(1),
            },
        );
        report.record_error(FailureKind::TableExtraction, &Error::Render("x".into()));

        assert_eq!(report.count(FailureKind::Ocr), 1);
        assert_eq!(report.count(FailureKind::Timeout), 1);
        assert_eq!(report.count(FailureKind::TableExtraction), 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_merge() {
        let mut a = ConversionReport::new();
        a.record(FailureKind::AssetWrite, "img1");
        let mut b = ConversionReport::new();
        b.record(FailureKind::AssetWrite, "img2");
        a.merge(b);
        assert_eq!(a.count(FailureKind::AssetWrite), 2);
    }
}
