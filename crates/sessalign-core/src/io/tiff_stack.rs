use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use std::sync::Mutex;

use memmap2::Mmap;
use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder, TiffKindBig};
use tiff::ColorType;
use tracing::debug;

use crate::error::{Result, SessalignError};
use crate::frame::{Frame, FrameMetadata, SampleType, SourceInfo};
use crate::io::source::FrameSource;
use crate::io::stack_writer::StackWriter;
use crate::session::Session;

/// Multi-page grayscale TIFF read page by page from any byte container.
///
/// The sample type is taken from the first page; every later page must
/// share its dimensions and color type.
pub struct TiffStack<B: AsRef<[u8]> + Send + Sync> {
    decoder: Mutex<Decoder<Cursor<B>>>,
    info: SourceInfo,
}

/// TIFF stack backed by a read-only memory map.
pub type MappedTiff = TiffStack<Mmap>;

/// TIFF stack read fully into memory.
pub type BufferedTiff = TiffStack<Vec<u8>>;

fn sample_type_of(page: &DecodingResult) -> Result<SampleType> {
    match page {
        DecodingResult::U8(_) => Ok(SampleType::U8),
        DecodingResult::U16(_) => Ok(SampleType::U16),
        DecodingResult::F32(_) => Ok(SampleType::F32),
        other => Err(unsupported(other)),
    }
}

fn unsupported(page: &DecodingResult) -> SessalignError {
    SessalignError::UnsupportedSampleType(format!("TIFF pages of {}", decoding_name(page)))
}

fn decoding_name(page: &DecodingResult) -> &'static str {
    match page {
        DecodingResult::U8(_) => "uint8",
        DecodingResult::U16(_) => "uint16",
        DecodingResult::U32(_) => "uint32",
        DecodingResult::U64(_) => "uint64",
        DecodingResult::I8(_) => "int8",
        DecodingResult::I16(_) => "int16",
        DecodingResult::I32(_) => "int32",
        DecodingResult::I64(_) => "int64",
        DecodingResult::F16(_) => "float16",
        DecodingResult::F32(_) => "float32",
        DecodingResult::F64(_) => "float64",
    }
}

fn page_to_array(page: DecodingResult, height: usize, width: usize) -> Result<Array2<f32>> {
    let samples: Vec<f32> = match page {
        DecodingResult::U8(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::F32(buf) => buf,
        other => return Err(unsupported(&other)),
    };
    let len = samples.len();
    Array2::from_shape_vec((height, width), samples).map_err(|_| {
        SessalignError::ShapeMismatch(format!(
            "TIFF page holds {} samples, expected {}x{}",
            len, width, height
        ))
    })
}

impl<B: AsRef<[u8]> + Send + Sync> TiffStack<B> {
    pub fn from_bytes(bytes: B, session: &Session) -> Result<Self> {
        // Large stacks exceed the decoder's default buffer limits.
        let mut decoder = Decoder::new(Cursor::new(bytes))?.with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions()?;
        let color = decoder.colortype()?;
        if !matches!(color, ColorType::Gray(_)) {
            return Err(SessalignError::UnsupportedSampleType(format!(
                "TIFF color type {:?}",
                color
            )));
        }
        let sample_type = sample_type_of(&decoder.read_image()?)?;

        let mut total_frames = 1usize;
        while decoder.more_images() {
            decoder.next_image()?;
            let (w, h) = decoder.dimensions()?;
            if (w, h) != (width, height) {
                return Err(SessalignError::DimensionMismatch {
                    expected_width: width as usize,
                    expected_height: height as usize,
                    width: w as usize,
                    height: h as usize,
                });
            }
            let page_color = decoder.colortype()?;
            if page_color != color {
                return Err(SessalignError::UnsupportedSampleType(format!(
                    "page {} is {:?}, the first page is {:?}",
                    total_frames, page_color, color
                )));
            }
            total_frames += 1;
        }
        debug!(
            session = %session.name,
            pages = total_frames,
            sample_type = %sample_type,
            "Indexed TIFF pages"
        );

        let info = SourceInfo {
            filename: session.path.clone(),
            format: session.format,
            total_frames,
            width,
            height,
            sample_type,
        };
        Ok(Self {
            decoder: Mutex::new(decoder),
            info,
        })
    }
}

impl MappedTiff {
    pub fn open(session: &Session) -> Result<Self> {
        let file = File::open(&session.path)?;
        // SAFETY: the map is read-only and the file is not modified while
        // a session is being exported.
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_bytes(mmap, session)
    }
}

impl BufferedTiff {
    pub fn open(session: &Session) -> Result<Self> {
        let bytes = std::fs::read(&session.path)?;
        Self::from_bytes(bytes, session)
    }
}

impl<B: AsRef<[u8]> + Send + Sync> FrameSource for TiffStack<B> {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read_frame(&self, index: usize) -> Result<Frame> {
        let total = self.info.total_frames;
        if index >= total {
            return Err(SessalignError::FrameIndexOutOfRange { index, total });
        }
        let page = {
            let mut decoder = self
                .decoder
                .lock()
                .map_err(|_| std::io::Error::other("TIFF decoder lock poisoned"))?;
            decoder.seek_to_image(index)?;
            decoder.read_image()?
        };
        let (h, w) = self.dims();
        let mut frame = Frame::new(page_to_array(page, h, w)?, self.info.sample_type);
        frame.metadata = FrameMetadata { frame_index: index };
        Ok(frame)
    }
}

/// Writes a stack as a multi-page BigTIFF, one page per frame.
///
/// BigTIFF offsets are 64-bit, so stacks larger than 4 GiB stay readable.
pub struct TiffStackWriter {
    encoder: TiffEncoder<File, TiffKindBig>,
    /// Second handle on the output, used to sync after the encoder is dropped.
    file: File,
    width: u32,
    height: u32,
    sample_type: SampleType,
    frame_count: usize,
    frames_written: usize,
}

impl TiffStackWriter {
    pub fn create(
        path: &Path,
        height: usize,
        width: usize,
        sample_type: SampleType,
        frame_count: usize,
    ) -> Result<Self> {
        let too_large = || {
            SessalignError::InvalidParameters(format!(
                "{}x{} frames exceed the TIFF page size",
                width, height
            ))
        };
        let width = u32::try_from(width).map_err(|_| too_large())?;
        let height = u32::try_from(height).map_err(|_| too_large())?;
        if width == 0 || height == 0 {
            return Err(SessalignError::InvalidDimensions { width, height });
        }

        let file = File::create(path)?;
        let handle = file.try_clone()?;
        let encoder = TiffEncoder::new_big(file)?;
        Ok(Self {
            encoder,
            file: handle,
            width,
            height,
            sample_type,
            frame_count,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    /// Quantize and append one page.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let (h, w) = frame.data.dim();
        if h != self.height as usize || w != self.width as usize {
            return Err(SessalignError::DimensionMismatch {
                expected_width: self.width as usize,
                expected_height: self.height as usize,
                width: w,
                height: h,
            });
        }

        let st = self.sample_type;
        match st {
            SampleType::U8 => {
                let page: Vec<u8> = frame.data.iter().map(|&v| st.quantize(v) as u8).collect();
                self.encoder
                    .write_image::<colortype::Gray8>(self.width, self.height, &page)?;
            }
            SampleType::U16 => {
                let page: Vec<u16> = frame.data.iter().map(|&v| st.quantize(v) as u16).collect();
                self.encoder
                    .write_image::<colortype::Gray16>(self.width, self.height, &page)?;
            }
            SampleType::F32 => {
                let page: Vec<f32> = frame.data.iter().copied().collect();
                self.encoder
                    .write_image::<colortype::Gray32Float>(self.width, self.height, &page)?;
            }
        }
        self.frames_written += 1;
        Ok(())
    }

    /// Sync the file. Fails if fewer or more pages were written than
    /// announced.
    pub fn finalize(self) -> Result<()> {
        if self.frames_written != self.frame_count {
            return Err(SessalignError::FrameCountMismatch {
                expected: self.frame_count,
                written: self.frames_written,
            });
        }
        let Self { encoder, file, .. } = self;
        drop(encoder);
        file.sync_all()?;
        Ok(())
    }
}

impl StackWriter for TiffStackWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        TiffStackWriter::write_frame(self, frame)
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.finalize()
    }
}
