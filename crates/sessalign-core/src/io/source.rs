use std::fs::File;

use memmap2::Mmap;
use ndarray::Array2;
use tracing::{debug, warn};

use crate::consts::SBX_MAX_SAMPLE;
use crate::error::{Result, SessalignError};
use crate::frame::{Frame, FrameMetadata, SampleType, SourceFormat, SourceInfo};
use crate::io::ser::{parse_header, SER_HEADER_SIZE};
use crate::io::tiff_stack::{BufferedTiff, MappedTiff};
use crate::session::Session;

/// Random access to the frames of one session.
pub trait FrameSource: Send + Sync {
    fn info(&self) -> &SourceInfo;

    fn read_frame(&self, index: usize) -> Result<Frame>;

    fn frame_count(&self) -> usize {
        self.info().total_frames
    }

    fn dims(&self) -> (usize, usize) {
        let info = self.info();
        (info.height as usize, info.width as usize)
    }

    fn sample_type(&self) -> SampleType {
        self.info().sample_type
    }
}

/// Iterator over every frame of a source, in order.
pub fn frames(source: &dyn FrameSource) -> impl Iterator<Item = Result<Frame>> + '_ {
    (0..source.frame_count()).map(move |i| source.read_frame(i))
}

/// Where frame bytes live inside a source file.
#[derive(Clone, Debug)]
struct StackLayout {
    data_offset: usize,
    width: usize,
    height: usize,
    /// Bytes per frame; fits in `usize` by construction.
    frame_bytes: usize,
    sample_type: SampleType,
    little_endian: bool,
    /// SBX stores `max - value`.
    inverted: bool,
}

impl StackLayout {
    /// Read the layout from the file contents and count complete frames.
    fn detect(format: SourceFormat, bytes: &[u8]) -> Result<(Self, usize)> {
        match format {
            SourceFormat::Ser => {
                let header = parse_header(bytes)?;
                let too_large = || {
                    SessalignError::InvalidSer(format!(
                        "{}x{} px, {} frames is too large to address",
                        header.width, header.height, header.frame_count
                    ))
                };
                let frame_bytes = header.frame_byte_size().ok_or_else(too_large)?;
                let layout = Self {
                    data_offset: SER_HEADER_SIZE,
                    width: header.width as usize,
                    height: header.height as usize,
                    frame_bytes,
                    sample_type: header.sample_type()?,
                    little_endian: header.little_endian,
                    inverted: false,
                };
                let expected = frame_bytes
                    .checked_mul(header.frame_count as usize)
                    .and_then(|data| data.checked_add(SER_HEADER_SIZE))
                    .ok_or_else(too_large)?;
                if bytes.len() < expected {
                    return Err(SessalignError::InvalidSer(format!(
                        "File truncated: expected at least {} bytes, got {}",
                        expected,
                        bytes.len()
                    )));
                }
                Ok((layout, header.frame_count as usize))
            }
            SourceFormat::Sbx { width, height } => {
                if width == 0 || height == 0 {
                    return Err(SessalignError::InvalidDimensions { width, height });
                }
                let sample_type = SampleType::U16;
                let frame_bytes = (width as usize)
                    .checked_mul(height as usize)
                    .and_then(|px| px.checked_mul(sample_type.bytes_per_sample()))
                    .ok_or(SessalignError::InvalidDimensions { width, height })?;
                let layout = Self {
                    data_offset: 0,
                    width: width as usize,
                    height: height as usize,
                    frame_bytes,
                    sample_type,
                    little_endian: true,
                    inverted: true,
                };
                // Trailing partial frames are ignored.
                let count = bytes.len() / frame_bytes;
                Ok((layout, count))
            }
            SourceFormat::Tiff => Err(SessalignError::UnsupportedSampleType(
                "TIFF pages have no raw frame layout".into(),
            )),
        }
    }
}

/// Frame reader over any byte container: a memory map or an owned buffer.
pub struct StackReader<B: AsRef<[u8]> + Send + Sync> {
    bytes: B,
    layout: StackLayout,
    info: SourceInfo,
}

/// Source backed by a read-only memory map.
pub type MappedStack = StackReader<Mmap>;

/// Source whose whole file has been read into memory.
pub type BufferedStack = StackReader<Vec<u8>>;

impl<B: AsRef<[u8]> + Send + Sync> StackReader<B> {
    pub fn from_bytes(bytes: B, session: &Session) -> Result<Self> {
        let (layout, total_frames) = StackLayout::detect(session.format, bytes.as_ref())?;
        let info = SourceInfo {
            filename: session.path.clone(),
            format: session.format,
            total_frames,
            width: layout.width as u32,
            height: layout.height as u32,
            sample_type: layout.sample_type,
        };
        Ok(Self {
            bytes,
            layout,
            info,
        })
    }

    /// Raw bytes of one frame (zero-copy).
    pub fn frame_raw(&self, index: usize) -> Result<&[u8]> {
        let total = self.info.total_frames;
        if index >= total {
            return Err(SessalignError::FrameIndexOutOfRange { index, total });
        }
        // In bounds: detection checked that every counted frame is present.
        let size = self.layout.frame_bytes;
        let offset = self.layout.data_offset + index * size;
        Ok(&self.bytes.as_ref()[offset..offset + size])
    }
}

impl MappedStack {
    pub fn open(session: &Session) -> Result<Self> {
        let file = File::open(&session.path)?;
        // SAFETY: the map is read-only and the file is not modified while
        // a session is being exported.
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_bytes(mmap, session)
    }
}

impl BufferedStack {
    pub fn open(session: &Session) -> Result<Self> {
        let bytes = std::fs::read(&session.path)?;
        Self::from_bytes(bytes, session)
    }
}

impl<B: AsRef<[u8]> + Send + Sync> FrameSource for StackReader<B> {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read_frame(&self, index: usize) -> Result<Frame> {
        let raw = self.frame_raw(index)?;
        let data = decode_plane(raw, &self.layout);
        let mut frame = Frame::new(data, self.layout.sample_type);
        frame.metadata = FrameMetadata { frame_index: index };
        Ok(frame)
    }
}

fn decode_plane(raw: &[u8], layout: &StackLayout) -> Array2<f32> {
    let (h, w) = (layout.height, layout.width);
    let bps = layout.sample_type.bytes_per_sample();
    let mut data = Array2::<f32>::zeros((h, w));

    for row in 0..h {
        for col in 0..w {
            let idx = (row * w + col) * bps;
            let val = if bps == 1 {
                raw[idx] as u16
            } else {
                let pair = [raw[idx], raw[idx + 1]];
                if layout.little_endian {
                    u16::from_le_bytes(pair)
                } else {
                    u16::from_be_bytes(pair)
                }
            };
            let val = if layout.inverted {
                SBX_MAX_SAMPLE - val
            } else {
                val
            };
            data[[row, col]] = val as f32;
        }
    }

    data
}

/// How a source ended up being read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessTier {
    Mapped,
    Buffered,
}

impl std::fmt::Display for AccessTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mapped => write!(f, "memory-mapped"),
            Self::Buffered => write!(f, "in-memory"),
        }
    }
}

/// The two ways of opening a session's source file.
///
/// The default implementation opens files from disk; tests substitute
/// implementations that fail on demand.
pub trait SourceOpener: Send + Sync {
    fn open_mapped(&self, session: &Session) -> Result<Box<dyn FrameSource>>;

    fn open_buffered(&self, session: &Session) -> Result<Box<dyn FrameSource>>;
}

/// Opens sessions straight from their files, picking the reader from the
/// session's format.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileOpener;

impl SourceOpener for FileOpener {
    fn open_mapped(&self, session: &Session) -> Result<Box<dyn FrameSource>> {
        match session.format {
            SourceFormat::Tiff => Ok(Box::new(MappedTiff::open(session)?)),
            _ => Ok(Box::new(MappedStack::open(session)?)),
        }
    }

    fn open_buffered(&self, session: &Session) -> Result<Box<dyn FrameSource>> {
        match session.format {
            SourceFormat::Tiff => Ok(Box::new(BufferedTiff::open(session)?)),
            _ => Ok(Box::new(BufferedStack::open(session)?)),
        }
    }
}

/// A source plus the tier it was opened with.
pub struct OpenedSource {
    pub source: Box<dyn FrameSource>,
    pub tier: AccessTier,
    /// Why the memory map was abandoned, when it was.
    pub degraded_reason: Option<String>,
}

/// Open a session memory-mapped, falling back to a full read.
///
/// The fallback is not an error; it is reported through
/// `degraded_reason`. Only when both tiers fail is
/// `SourceAccessFailed` returned.
pub fn open_with_fallback(opener: &dyn SourceOpener, session: &Session) -> Result<OpenedSource> {
    match opener.open_mapped(session) {
        Ok(source) => {
            debug!(session = %session.name, "Opened memory-mapped");
            Ok(OpenedSource {
                source,
                tier: AccessTier::Mapped,
                degraded_reason: None,
            })
        }
        Err(mapped_err) => {
            warn!(
                session = %session.name,
                error = %mapped_err,
                "Cannot use memory mapping, reading directly to memory instead"
            );
            match opener.open_buffered(session) {
                Ok(source) => Ok(OpenedSource {
                    source,
                    tier: AccessTier::Buffered,
                    degraded_reason: Some(mapped_err.to_string()),
                }),
                Err(buffered_err) => Err(SessalignError::SourceAccessFailed {
                    path: session.path.clone(),
                    mapped: mapped_err.to_string(),
                    buffered: buffered_err.to_string(),
                }),
            }
        }
    }
}
