use std::path::Path;

use crate::error::{Result, SessalignError};
use crate::frame::{Frame, SampleType};
use crate::io::ser::SerHeader;
use crate::io::ser_writer::SerWriter;
use crate::io::tiff_stack::TiffStackWriter;

/// Container written by an export.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Multi-page BigTIFF, one page per frame.
    Tiff,
    Ser,
}

impl OutputFormat {
    /// Pick the format from the output file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("tif") | Some("tiff") => Ok(Self::Tiff),
            Some("ser") => Ok(Self::Ser),
            _ => Err(SessalignError::InvalidParameters(format!(
                "cannot tell the output format of {}, use .tif, .tiff or .ser",
                path.display()
            ))),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tiff => write!(f, "BigTIFF"),
            Self::Ser => write!(f, "SER"),
        }
    }
}

/// Frame-by-frame sink for an exported stack.
pub trait StackWriter {
    /// Encode one frame in the stack's sample type.
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush everything to disk. Fails when the number of frames written
    /// differs from the number announced at creation.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Create a writer for `frame_count` frames of `height x width` samples.
pub fn create_stack_writer(
    format: OutputFormat,
    path: &Path,
    height: usize,
    width: usize,
    sample_type: SampleType,
    frame_count: usize,
) -> Result<Box<dyn StackWriter>> {
    match format {
        OutputFormat::Tiff => Ok(Box::new(TiffStackWriter::create(
            path,
            height,
            width,
            sample_type,
            frame_count,
        )?)),
        OutputFormat::Ser => {
            let header = SerHeader::mono(width, height, sample_type, frame_count)?;
            Ok(Box::new(SerWriter::create(path, &header)?))
        }
    }
}
