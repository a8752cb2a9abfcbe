use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single grayscale image frame.
///
/// Samples are held as f32 in the source's native value range (0..=255 for
/// 8-bit data, 0..=65535 for 16-bit data), so integer sources survive the
/// round trip through f32 exactly.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Pixel data, row-major, shape = (height, width)
    pub data: Array2<f32>,
    /// Sample type of the data this frame was read from or will be written as.
    pub sample_type: SampleType,
    pub metadata: FrameMetadata,
}

impl Frame {
    pub fn new(data: Array2<f32>, sample_type: SampleType) -> Self {
        Self {
            data,
            sample_type,
            metadata: FrameMetadata::default(),
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// Replace the pixel data, keeping sample type and metadata.
    pub fn with_data(&self, data: Array2<f32>) -> Self {
        Self {
            data,
            sample_type: self.sample_type,
            metadata: self.metadata.clone(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FrameMetadata {
    /// Index of the frame within its session.
    pub frame_index: usize,
}

/// Numeric representation of samples in a source or output stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleType {
    U8,
    U16,
    F32,
}

impl SampleType {
    pub fn bit_depth(self) -> u32 {
        match self {
            Self::U8 => 8,
            Self::U16 => 16,
            Self::F32 => 32,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::F32 => 4,
        }
    }

    /// Largest representable sample value.
    pub fn max_value(self) -> f32 {
        match self {
            Self::U8 => u8::MAX as f32,
            Self::U16 => u16::MAX as f32,
            Self::F32 => f32::MAX,
        }
    }

    /// Snap a value onto the grid of representable samples.
    pub fn quantize(self, value: f32) -> f32 {
        match self {
            Self::F32 => value,
            _ => value.round().clamp(0.0, self.max_value()),
        }
    }

    /// Sample type matching a SER pixel depth.
    pub fn from_bit_depth(bits: u32) -> Option<Self> {
        match bits {
            1..=8 => Some(Self::U8),
            9..=16 => Some(Self::U16),
            _ => None,
        }
    }
}

impl std::fmt::Display for SampleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::U8 => write!(f, "uint8"),
            Self::U16 => write!(f, "uint16"),
            Self::F32 => write!(f, "float32"),
        }
    }
}

/// On-disk layout family of a session's source file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    /// SER video: 178-byte header followed by mono frames.
    Ser,
    /// Headerless little-endian u16 stack; dimensions come from sidecar
    /// metadata and samples are stored inverted.
    Sbx { width: u32, height: u32 },
    /// Multi-page grayscale TIFF, one frame per page.
    Tiff,
}

impl SourceFormat {
    /// File extensions, compared case-insensitively.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Ser => &["ser"],
            Self::Sbx { .. } => &["sbx"],
            Self::Tiff => &["tif", "tiff"],
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ser => write!(f, "SER"),
            Self::Sbx { width, height } => write!(f, "SBX ({}x{})", width, height),
            Self::Tiff => write!(f, "TIFF"),
        }
    }
}

/// Metadata about a source file.
#[derive(Clone, Debug)]
pub struct SourceInfo {
    pub filename: PathBuf,
    pub format: SourceFormat,
    pub total_frames: usize,
    pub width: u32,
    pub height: u32,
    pub sample_type: SampleType,
}
