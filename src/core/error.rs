//! Typed failures surfaced by the recognition stages.
//!
//! Most stages are total and degrade to empty results; these variants exist so
//! callers can tell *why* something came back empty when they care.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The input could not be decoded as a raster image.
    #[error("failed to decode image {}", path.display())]
    DecodeFailure {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// No ruled table region survived the area and aspect-ratio filters.
    #[error("no table region found")]
    NoRegionFound,

    /// A region produced fewer than two row or column boundaries.
    #[error("table grid too small: {rows} row and {columns} column boundaries")]
    GridTooSmall { rows: usize, columns: usize },

    /// The OCR engine could not be invoked at all.
    #[error("OCR engine unavailable: {0}")]
    OcrUnavailable(String),

    #[error("OCR engine timed out after {seconds}s")]
    OcrTimeout { seconds: u64 },

    #[error("configuration: {0}")]
    Config(String),

    #[error("io")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn decode(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::DecodeFailure {
            path: path.into(),
            source,
        }
    }

    /// Soft failures are recorded as warnings on the document instead of
    /// aborting it.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Config(_))
    }
}
