use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessalignError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid SER file: {0}")]
    InvalidSer(String),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Frame index {index} out of range (total: {total})")]
    FrameIndexOutOfRange { index: usize, total: usize },

    #[error("Invalid alignment parameters: {0}")]
    InvalidParameters(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error(
        "Dimension mismatch: expected {expected_width}x{expected_height}, got {width}x{height}"
    )]
    DimensionMismatch {
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },

    #[error("Search space is empty")]
    EmptySearchSpace,

    #[error("Invalid blocked-row settings: {0}")]
    InvalidThreshold(String),

    #[error(
        "Cannot access {}: memory map failed ({mapped}); full read failed ({buffered})",
        .path.display()
    )]
    SourceAccessFailed {
        path: PathBuf,
        mapped: String,
        buffered: String,
    },

    #[error("Unsupported sample type: {0}")]
    UnsupportedSampleType(String),

    #[error("Output announced {expected} frames, {written} written")]
    FrameCountMismatch { expected: usize, written: usize },

    #[error("Empty frame sequence")]
    EmptySequence,

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Parameter file error: {0}")]
    ParameterFormat(String),
}

pub type Result<T> = std::result::Result<T, SessalignError>;
